//! # rollcall-core
//!
//! Core logic for the rollcall geolocation attendance system.
//!
//! This crate provides:
//! - Haversine proximity evaluation of a device against a classroom perimeter
//! - The check-in state machine with a single outstanding position request
//! - A static course and classroom registry
//! - An in-memory attendance roster with present / late / absent summaries
//! - Configuration loading and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`geo`] - Coordinates, classroom perimeters and the proximity evaluator
//! - [`locator`] - Position provider seam, request options and failure reasons
//! - [`checkin`] - Check-in attempt state machine
//! - [`registry`] - Courses, classrooms and class sessions loaded from TOML
//! - [`attendance`] - Attendance records and summaries
//! - [`config`] - Application configuration loading and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod attendance;
pub mod checkin;
pub mod config;
pub mod error;
pub mod geo;
pub mod locator;
pub mod registry;

// Re-export primary types for convenience
pub use attendance::{
    AttendanceError, AttendanceRecord, AttendanceRoster, AttendanceStatus, AttendanceSummary,
    LatePolicy, Student,
};
pub use checkin::{
    Acquisition, CheckInError, CheckInSession, CheckInSnapshot, CheckInStatus, PendingRequest,
    PositionTicket, Resolution,
};
pub use config::{
    default_config_path, is_valid_timezone_format, AttendanceConfig, Config, ConfigError,
    ConfigResult, GeolocationConfig, RegistryConfig, ServerConfig,
};
pub use error::{Error, Result, RollcallError};
pub use geo::{
    destination_point, evaluate, haversine_distance, ClassroomLocation, GeoCoordinate, GeoError,
    ProximityResult, BOUNDARY_TOLERANCE_METERS, EARTH_RADIUS_METERS,
};
pub use locator::{
    acquire_position, DevicePosition, FixedPositionProvider, LocationFailure, PositionOptions,
    PositionProvider,
};
pub use registry::{
    is_valid_course_code, is_valid_id, ClassSession, Classroom, Course, CourseRegistry,
    RegistryError,
};
