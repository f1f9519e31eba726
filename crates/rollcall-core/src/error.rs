//! Unified error types for the rollcall core library.
//!
//! This module provides a unified error type [`RollcallError`] that covers all
//! failure modes across rollcall. Each module also has its own specific error
//! type ([`GeoError`], [`LocationFailure`], [`CheckInError`],
//! [`RegistryError`], [`AttendanceError`], [`ConfigError`]) that converts into
//! it.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use rollcall_core::error::{Result, RollcallError};
//! use rollcall_core::geo::{evaluate, ClassroomLocation, GeoCoordinate};
//!
//! fn in_room(lat: f64, lon: f64) -> Result<bool> {
//!     let classroom = ClassroomLocation::new(GeoCoordinate::new(40.7128, -74.006)?, 50.0)?;
//!     Ok(evaluate(GeoCoordinate::new(lat, lon)?, classroom)?.within_range)
//! }
//!
//! assert!(in_room(40.7128, -74.006).unwrap());
//! assert!(matches!(in_room(91.0, 0.0), Err(RollcallError::InvalidCoordinate(_))));
//! ```

use thiserror::Error;

use crate::attendance::AttendanceError;
use crate::checkin::CheckInError;
use crate::config::ConfigError;
use crate::geo::GeoError;
use crate::locator::LocationFailure;
use crate::registry::RegistryError;

/// The unified error type for all rollcall operations.
#[derive(Debug, Error)]
pub enum RollcallError {
    // =========================================================================
    // GEOMETRY ERRORS
    // =========================================================================
    /// A coordinate component is outside its valid range.
    #[error("{0}")]
    InvalidCoordinate(String),

    /// A classroom radius is negative or not finite.
    #[error("Invalid classroom radius: {0} meters. Radius must be a finite, non-negative distance.")]
    InvalidRadius(f64),

    // =========================================================================
    // LOCATION ERRORS
    // =========================================================================
    /// The device could not supply a position.
    #[error("{0}")]
    LocationUnavailable(LocationFailure),

    // =========================================================================
    // CHECK-IN ERRORS
    // =========================================================================
    /// A position request is already outstanding for this attempt.
    #[error("A location request is already in progress for this check-in")]
    RequestPending,

    /// The requested transition is not available from the current state.
    #[error("{0}")]
    InvalidTransition(String),

    /// Check-in refused: device outside the classroom perimeter.
    #[error("You are not within the classroom's check-in area. Move closer and refresh your location.")]
    NotInRange,

    /// Check-in refused: location never verified.
    #[error("Location has not been verified for this check-in")]
    NotVerified,

    /// The student already checked in to this session.
    #[error("{0}")]
    AlreadyCheckedIn(String),

    /// The course has no session open for check-in.
    #[error("Course '{0}' has no active session to check in to")]
    NoActiveSession(String),

    // =========================================================================
    // LOOKUP ERRORS
    // =========================================================================
    /// No course is registered with this id.
    #[error("Course not found: '{0}'")]
    CourseNotFound(String),

    /// No classroom is registered with this id.
    #[error("Classroom not found: '{0}'")]
    ClassroomNotFound(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The course registry could not be loaded or is invalid.
    #[error("Course registry error: {0}")]
    Registry(String),
}

/// A specialized [`Result`] type for rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;

/// Short alias for [`RollcallError`].
pub type Error = RollcallError;

impl RollcallError {
    /// Returns `true` if this error came from coordinate or radius validation.
    #[inline]
    #[must_use]
    pub const fn is_geo_error(&self) -> bool {
        matches!(self, Self::InvalidCoordinate(_) | Self::InvalidRadius(_))
    }

    /// Returns `true` if the device could not supply a position.
    #[inline]
    #[must_use]
    pub const fn is_location_error(&self) -> bool {
        matches!(self, Self::LocationUnavailable(_))
    }

    /// Returns `true` if this error is related to a check-in attempt.
    #[inline]
    #[must_use]
    pub const fn is_check_in_error(&self) -> bool {
        matches!(
            self,
            Self::RequestPending
                | Self::InvalidTransition(_)
                | Self::NotInRange
                | Self::NotVerified
                | Self::AlreadyCheckedIn(_)
                | Self::NoActiveSession(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Registry(_))
    }

    /// Returns `true` if the user can recover by retrying the location check.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LocationUnavailable(_) | Self::NotInRange)
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidCoordinate(_) | Self::InvalidRadius(_) => 400,

            // 404 Not Found
            Self::CourseNotFound(_) | Self::ClassroomNotFound(_) => 404,

            // 409 Conflict - not allowed in the current state
            Self::RequestPending
            | Self::InvalidTransition(_)
            | Self::NotInRange
            | Self::NotVerified
            | Self::AlreadyCheckedIn(_)
            | Self::NoActiveSession(_)
            | Self::LocationUnavailable(_) => 409,

            // 500 Internal Server Error - server-side issues
            Self::Config(_) | Self::Registry(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCoordinate(_) => "invalid_coordinate",
            Self::InvalidRadius(_) => "invalid_radius",
            Self::LocationUnavailable(_) => "location_unavailable",
            Self::RequestPending => "request_pending",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::NotInRange => "not_in_range",
            Self::NotVerified => "not_verified",
            Self::AlreadyCheckedIn(_) => "already_checked_in",
            Self::NoActiveSession(_) => "no_active_session",
            Self::CourseNotFound(_) => "course_not_found",
            Self::ClassroomNotFound(_) => "classroom_not_found",
            Self::Config(_) => "config_error",
            Self::Registry(_) => "registry_error",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<GeoError> for RollcallError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::InvalidCoordinate { .. } => Self::InvalidCoordinate(err.to_string()),
            GeoError::InvalidRadius(radius) => Self::InvalidRadius(radius),
        }
    }
}

impl From<LocationFailure> for RollcallError {
    fn from(failure: LocationFailure) -> Self {
        Self::LocationUnavailable(failure)
    }
}

impl From<CheckInError> for RollcallError {
    fn from(err: CheckInError) -> Self {
        match err {
            CheckInError::RequestPending => Self::RequestPending,
            CheckInError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            CheckInError::NotInRange => Self::NotInRange,
            CheckInError::NotVerified => Self::NotVerified,
        }
    }
}

impl From<AttendanceError> for RollcallError {
    fn from(err: AttendanceError) -> Self {
        Self::AlreadyCheckedIn(err.to_string())
    }
}

impl From<RegistryError> for RollcallError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err.to_string())
    }
}

impl From<ConfigError> for RollcallError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
