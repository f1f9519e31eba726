//! Static course, classroom and session registry.
//!
//! The registry is read once from TOML and never changes at runtime. A
//! bundled registry is used when no file is configured.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;

use crate::geo::{ClassroomLocation, GeoCoordinate, GeoResult};

const BUILTIN_REGISTRY: &str = include_str!("../data/courses.toml");

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("id pattern is valid"));

static COURSE_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,4} \d{3}[A-Z]?$").expect("course code pattern is valid"));

/// Errors raised while loading a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file could not be read.
    #[error("Failed to read course registry {}: {source}", path.display())]
    ReadError {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The registry is not valid TOML or has the wrong shape.
    #[error("Failed to parse course registry: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The registry parsed but contains invalid entries.
    #[error("Course registry is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Whether `id` is a valid course, classroom or session identifier.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// Whether `code` looks like a catalog code such as `ENG 101`.
#[must_use]
pub fn is_valid_course_code(code: &str) -> bool {
    COURSE_CODE_PATTERN.is_match(code)
}

/// A physical classroom and its check-in perimeter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "c1",
    "building": "Liberal Arts Building",
    "room_number": "201",
    "latitude": 40.7128,
    "longitude": -74.006,
    "radius_meters": 50.0
}))]
pub struct Classroom {
    /// Classroom identifier.
    pub id: String,
    /// Building name.
    pub building: String,
    /// Room number within the building.
    pub room_number: String,
    /// Latitude of the room center, in decimal degrees.
    pub latitude: f64,
    /// Longitude of the room center, in decimal degrees.
    pub longitude: f64,
    /// Accepted check-in perimeter, in meters.
    pub radius_meters: f64,
}

impl Classroom {
    /// The validated location used for proximity checks.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::geo::GeoError`] for bad coordinates or radius.
    pub fn location(&self) -> GeoResult<ClassroomLocation> {
        ClassroomLocation::new(
            GeoCoordinate::new(self.latitude, self.longitude)?,
            self.radius_meters,
        )
    }
}

/// A course offered this semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Course {
    /// Course identifier.
    pub id: String,
    /// Course title.
    #[schema(example = "College Composition")]
    pub name: String,
    /// Catalog code.
    #[schema(example = "ENG 101")]
    pub code: String,
    /// Owning department.
    pub department: String,
    /// Semester label.
    #[schema(example = "Fall 2025")]
    pub semester: String,
    /// Identifier of the teaching instructor.
    pub instructor_id: String,
    /// Display name of the teaching instructor.
    pub instructor_name: String,
    /// Where the course meets.
    pub classroom: Classroom,
    /// Human-readable meeting schedule.
    #[schema(example = "Mon, Wed 9:00 AM - 10:15 AM")]
    pub schedule: String,
    /// Number of enrolled students.
    #[schema(example = 32)]
    pub enrolled_count: u32,
}

/// A scheduled meeting of a course, in local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    /// Session identifier.
    pub id: String,
    /// The course that meets.
    pub course_id: String,
    /// Local start time.
    pub starts_at: NaiveTime,
    /// Local end time.
    pub ends_at: NaiveTime,
    /// Whether students can currently check in to this session.
    pub active: bool,
}

/// All registered courses and sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseRegistry {
    #[serde(default)]
    courses: Vec<Course>,
    #[serde(default)]
    sessions: Vec<ClassSession>,
}

impl CourseRegistry {
    /// The registry bundled with rollcall.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled data is malformed.
    pub fn builtin() -> RegistryResult<Self> {
        Self::from_toml(BUILTIN_REGISTRY)
    }

    /// Load and validate a registry file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            courses = registry.courses.len(),
            sessions = registry.sessions.len(),
            "Loaded course registry"
        );
        Ok(registry)
    }

    /// Parse and validate a registry from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validated.
    pub fn from_toml(content: &str) -> RegistryResult<Self> {
        let registry: Self = toml::from_str(content)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Check identifiers, codes, classroom geometry and session references.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Invalid`] listing every problem found.
    pub fn validate(&self) -> RegistryResult<()> {
        let mut problems = Vec::new();
        let mut course_ids = HashSet::new();
        let mut classroom_ids = HashSet::new();

        for course in &self.courses {
            if !is_valid_id(&course.id) {
                problems.push(format!("course id '{}' is not a valid identifier", course.id));
            }
            if !course_ids.insert(course.id.as_str()) {
                problems.push(format!("course id '{}' is duplicated", course.id));
            }
            if !is_valid_course_code(&course.code) {
                problems.push(format!(
                    "course '{}' has invalid code '{}'",
                    course.id, course.code
                ));
            }

            let classroom = &course.classroom;
            if !is_valid_id(&classroom.id) {
                problems.push(format!(
                    "classroom id '{}' is not a valid identifier",
                    classroom.id
                ));
            }
            // Courses may share a room, but one room id must mean one place.
            if !classroom_ids.insert(classroom.id.as_str())
                && self.classroom(&classroom.id) != Some(classroom)
            {
                problems.push(format!(
                    "classroom id '{}' is registered with conflicting details",
                    classroom.id
                ));
            }
            if let Err(err) = classroom.location() {
                problems.push(format!("classroom '{}': {err}", classroom.id));
            }
        }

        let mut session_ids = HashSet::new();
        for session in &self.sessions {
            if !is_valid_id(&session.id) {
                problems.push(format!("session id '{}' is not a valid identifier", session.id));
            }
            if !session_ids.insert(session.id.as_str()) {
                problems.push(format!("session id '{}' is duplicated", session.id));
            }
            if !course_ids.contains(session.course_id.as_str()) {
                problems.push(format!(
                    "session '{}' references unknown course '{}'",
                    session.id, session.course_id
                ));
            }
            if session.starts_at >= session.ends_at {
                problems.push(format!("session '{}' ends before it starts", session.id));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Invalid(problems))
        }
    }

    /// All courses in registry order.
    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// Look up a course by id.
    #[must_use]
    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|course| course.id == id)
    }

    /// Look up a classroom by id.
    #[must_use]
    pub fn classroom(&self, id: &str) -> Option<&Classroom> {
        self.courses
            .iter()
            .map(|course| &course.classroom)
            .find(|classroom| classroom.id == id)
    }

    /// Courses taught by the given instructor.
    pub fn courses_for_instructor<'a>(
        &'a self,
        instructor_id: &'a str,
    ) -> impl Iterator<Item = &'a Course> + 'a {
        self.courses
            .iter()
            .filter(move |course| course.instructor_id == instructor_id)
    }

    /// The session currently open for check-in, if any.
    #[must_use]
    pub fn active_session(&self, course_id: &str) -> Option<&ClassSession> {
        self.sessions
            .iter()
            .find(|session| session.course_id == course_id && session.active)
    }
}
