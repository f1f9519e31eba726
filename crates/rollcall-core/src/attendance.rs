//! In-memory attendance roster.
//!
//! Records accepted check-ins per class session and derives the
//! present / late / absent summary shown to instructors. Records live only
//! for the lifetime of the process.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AttendanceConfig;
use crate::geo::GeoCoordinate;
use crate::registry::ClassSession;

/// Attendance outcome for one student in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Checked in on time.
    Present,
    /// Checked in after the late threshold.
    Late,
    /// Did not check in.
    Absent,
}

/// Errors raised when recording attendance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttendanceError {
    /// The student already has a record for this session.
    #[error("Student '{student_id}' has already checked in to session '{session_id}'")]
    AlreadyCheckedIn {
        /// The student.
        student_id: String,
        /// The session.
        session_id: String,
    },
}

/// Who is checking in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    /// Student identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A single accepted check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Record identifier.
    pub id: Uuid,
    /// The student who checked in.
    pub student_id: String,
    /// The student's display name at check-in time.
    pub student_name: String,
    /// The course checked in to.
    pub course_id: String,
    /// The session checked in to.
    pub session_id: String,
    /// When the check-in was accepted.
    pub recorded_at: DateTime<Utc>,
    /// Present or late.
    pub status: AttendanceStatus,
    /// The verified device coordinate.
    pub coordinate: GeoCoordinate,
}

/// Counts for one course's attendance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSummary {
    /// Students checked in on time.
    pub present: u32,
    /// Students checked in late.
    pub late: u32,
    /// Enrolled students with no record.
    pub absent: u32,
    /// Enrolled students.
    pub enrolled: u32,
}

/// How lateness is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatePolicy {
    /// Timezone session times are expressed in.
    pub timezone: Tz,
    /// Grace period after the session start.
    pub late_after: TimeDelta,
}

impl LatePolicy {
    /// Classify a check-in at `at` for a session starting at `starts_at`.
    #[must_use]
    pub fn classify(&self, starts_at: NaiveTime, at: DateTime<Utc>) -> AttendanceStatus {
        let local = at.with_timezone(&self.timezone).time();
        let (threshold, wrapped) = starts_at.overflowing_add_signed(self.late_after);
        // A threshold past midnight means nothing on the start day is late.
        if wrapped == 0 && local > threshold {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }
}

impl TryFrom<&AttendanceConfig> for LatePolicy {
    type Error = String;

    fn try_from(config: &AttendanceConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            timezone: config
                .timezone
                .parse::<Tz>()
                .map_err(|err| format!("unknown timezone '{}': {err}", config.timezone))?,
            late_after: TimeDelta::minutes(i64::from(config.late_after_minutes)),
        })
    }
}

/// All attendance recorded since startup.
#[derive(Debug, Clone, Default)]
pub struct AttendanceRoster {
    records: Vec<AttendanceRecord>,
}

impl AttendanceRoster {
    /// Create an empty roster.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Record an accepted check-in.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::AlreadyCheckedIn`] if the student already
    /// has a record for `session`.
    pub fn record_check_in(
        &mut self,
        student: &Student,
        session: &ClassSession,
        coordinate: GeoCoordinate,
        now: DateTime<Utc>,
        policy: &LatePolicy,
    ) -> Result<&AttendanceRecord, AttendanceError> {
        let duplicate = self
            .records
            .iter()
            .any(|record| record.student_id == student.id && record.session_id == session.id);
        if duplicate {
            return Err(AttendanceError::AlreadyCheckedIn {
                student_id: student.id.clone(),
                session_id: session.id.clone(),
            });
        }

        let status = policy.classify(session.starts_at, now);
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            course_id: session.course_id.clone(),
            session_id: session.id.clone(),
            recorded_at: now,
            status,
            coordinate,
        };

        info!(
            record_id = %record.id,
            student_id = %record.student_id,
            session_id = %record.session_id,
            status = ?record.status,
            "Recorded attendance"
        );

        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Records for a course, oldest first.
    pub fn records_for_course<'a>(
        &'a self,
        course_id: &'a str,
    ) -> impl Iterator<Item = &'a AttendanceRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.course_id == course_id)
    }

    /// Present / late / absent counts for a course.
    #[must_use]
    pub fn summary(&self, course_id: &str, enrolled: u32) -> AttendanceSummary {
        let (mut present, mut late) = (0_u32, 0_u32);
        for record in self.records_for_course(course_id) {
            match record.status {
                AttendanceStatus::Present => present += 1,
                AttendanceStatus::Late => late += 1,
                AttendanceStatus::Absent => {}
            }
        }

        AttendanceSummary {
            present,
            late,
            absent: enrolled.saturating_sub(present).saturating_sub(late),
            enrolled,
        }
    }

    /// How many records the student has dated today in `timezone`.
    #[must_use]
    pub fn checked_in_today(&self, student_id: &str, now: DateTime<Utc>, timezone: Tz) -> usize {
        let today = now.with_timezone(&timezone).date_naive();
        self.records
            .iter()
            .filter(|record| {
                record.student_id == student_id
                    && record.recorded_at.with_timezone(&timezone).date_naive() == today
            })
            .count()
    }
}
