//! OpenAPI specification generation for the rollcall API.
//!
//! The generated document is served at `/api/openapi.json` and written to
//! the workspace root by the `gen-openapi` binary for client generation.

use axum::Json;
use rollcall_core::{AttendanceStatus, AttendanceSummary, Classroom, Course, LocationFailure};
use utoipa::OpenApi;

use super::attendance::{AttendanceRecordResponse, CourseAttendanceResponse, StudentTodayResponse};
use super::checkins::{
    CheckInResponse, CreateCheckInRequest, FailureReport, PositionReport, ReportResponse,
};
use super::config::{AttendanceConfigResponse, ConfigResponse, GeolocationConfigResponse};
use super::courses::CoursesResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::proximity::{CoordinateBody, PerimeterBody, ProximityRequest, ProximityResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Panics
///
/// Never in practice: the document is built from static types and always
/// serializes.
#[must_use]
pub fn get_openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|err| panic!("OpenAPI document failed to serialize: {err}"))
}

/// Main OpenAPI document structure for rollcall.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "rollcall API",
        version = "0.1.0",
        description = r#"
# rollcall API

rollcall lets students check in to class only while they are physically inside the classroom.

## Overview

1. **Proximity**: Haversine distance from a device to a classroom center, compared against the classroom radius (boundary inclusive)
2. **Check-in attempts**: A state machine per student and course. The server issues one position request at a time; the client answers it with a position or a failure reason
3. **Attendance**: Confirmed check-ins, marked present or late against the session start

## Check-in flow

- `createCheckIn` returns a `request_id` and a `request_deadline`
- Answer with `reportPosition` or `reportFailure` quoting that `request_id`
- Answers for older requests are ignored
- When `can_check_in` is true, call `confirmCheckIn`
- When `can_retry` is true, the user may call `retryCheckIn`. Nothing retries automatically
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local rollcall server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "proximity", description = "Device versus classroom perimeter evaluation"),
        (name = "checkins", description = "Check-in attempts and position answers"),
        (name = "courses", description = "Courses and their classrooms"),
        (name = "attendance", description = "Recorded attendance"),
        (name = "config", description = "Position request options and attendance policy")
    ),
    paths(
        super::health::health_check,
        super::proximity::check_proximity,
        super::checkins::create_check_in,
        super::checkins::get_check_in,
        super::checkins::request_position,
        super::checkins::report_position,
        super::checkins::report_failure,
        super::checkins::retry_check_in,
        super::checkins::dismiss_check_in,
        super::checkins::confirm_check_in,
        super::checkins::delete_check_in,
        super::courses::list_courses,
        super::courses::get_course,
        super::attendance::get_course_attendance,
        super::attendance::get_student_today,
        super::config::get_config,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            // Proximity types
            CoordinateBody,
            PerimeterBody,
            ProximityRequest,
            ProximityResponse,
            // Check-in types
            CreateCheckInRequest,
            PositionReport,
            FailureReport,
            CheckInResponse,
            ReportResponse,
            LocationFailure,
            // Course types
            Course,
            Classroom,
            CoursesResponse,
            // Attendance types
            AttendanceStatus,
            AttendanceSummary,
            AttendanceRecordResponse,
            CourseAttendanceResponse,
            StudentTodayResponse,
            // Config types
            ConfigResponse,
            GeolocationConfigResponse,
            AttendanceConfigResponse,
        )
    )
)]
pub struct ApiDoc;
