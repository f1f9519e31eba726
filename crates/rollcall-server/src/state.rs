//! Application state shared across handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceRoster, CheckInSession, Config, CourseRegistry, LatePolicy, PositionOptions,
    RollcallError, Student,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// One student's in-progress check-in for one course.
#[derive(Debug, Clone)]
pub struct CheckInAttempt {
    /// Attempt identifier handed to the client.
    pub id: Uuid,
    /// Course being checked in to.
    pub course_id: String,
    /// Student checking in.
    pub student: Student,
    /// When the attempt was opened.
    pub opened_at: DateTime<Utc>,
    /// The attempt's state machine.
    pub session: CheckInSession,
}

/// Everything the API needs.
#[derive(Debug)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Static courses and sessions.
    pub registry: CourseRegistry,
    /// Lateness policy derived from config.
    pub late_policy: LatePolicy,
    /// Position request options derived from config.
    pub position_options: PositionOptions,
    /// Open check-in attempts keyed by id.
    pub attempts: HashMap<Uuid, CheckInAttempt>,
    /// How long an unconfirmed attempt is kept.
    pub attempt_ttl: Duration,
    /// Attendance recorded since startup.
    pub roster: AttendanceRoster,
}

impl AppState {
    /// Build state from configuration, loading the course registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be loaded or the attendance
    /// timezone is unknown.
    pub fn new(config: Config) -> Result<Self, RollcallError> {
        let registry = config.course_registry()?;
        Self::with_registry(config, registry)
    }

    /// Build state from configuration and an already-loaded registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the attendance timezone is unknown.
    pub fn with_registry(config: Config, registry: CourseRegistry) -> Result<Self, RollcallError> {
        let late_policy = config.late_policy()?;
        let position_options = config.position_options();
        let attempt_ttl = Duration::from_secs(config.geolocation.attempt_ttl_secs);

        info!(
            courses = registry.courses().len(),
            timezone = %late_policy.timezone,
            "Application state initialized"
        );

        Ok(Self {
            config,
            registry,
            late_policy,
            position_options,
            attempts: HashMap::new(),
            attempt_ttl,
            roster: AttendanceRoster::new(),
        })
    }

    /// Wrap the state for sharing between handlers.
    #[must_use]
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Drop attempts opened more than `attempt_ttl` before `now`.
    ///
    /// Returns how many were dropped.
    pub fn evict_stale_attempts(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.attempt_ttl;
        let before = self.attempts.len();
        self.attempts
            .retain(|_, attempt| (now - attempt.opened_at).to_std().map_or(true, |age| age <= ttl));

        let evicted = before - self.attempts.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.attempts.len(), "Evicted stale check-in attempts");
        }
        evicted
    }

    /// Open a check-in attempt for `student` in `course_id`.
    ///
    /// Stale attempts are evicted first.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::CourseNotFound`] for an unknown course, or a
    /// geometry error if the course's classroom is malformed.
    pub fn open_attempt(
        &mut self,
        course_id: &str,
        student: Student,
        now: DateTime<Utc>,
    ) -> Result<&mut CheckInAttempt, RollcallError> {
        let course = self
            .registry
            .course(course_id)
            .ok_or_else(|| RollcallError::CourseNotFound(course_id.to_string()))?;
        let session = CheckInSession::new(course.classroom.location()?, self.position_options)?;
        self.evict_stale_attempts(now);

        let id = Uuid::now_v7();
        info!(attempt_id = %id, course_id, student_id = %student.id, "Opened check-in attempt");

        Ok(self.attempts.entry(id).or_insert(CheckInAttempt {
            id,
            course_id: course_id.to_string(),
            student,
            opened_at: now,
            session,
        }))
    }
}
