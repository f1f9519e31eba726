//! Attendance API endpoints.
//!
//! Attendance is recorded by confirming a verified check-in attempt (see
//! [`crate::api::checkins`]); these endpoints only read it back.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{AttendanceRecord, AttendanceStatus, AttendanceSummary, RollcallError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the students router.
pub fn students_router() -> Router<SharedState> {
    Router::new().route("/{student_id}/attendance/today", get(get_student_today))
}

// ============================================================================
// Response Types
// ============================================================================

/// One recorded check-in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0b9e4c1a-8a7d-4c37-9b3e-1f0c5b2e6d11",
    "student_id": "1",
    "student_name": "Alex Johnson",
    "course_id": "1",
    "session_id": "s1",
    "recorded_at": "2026-09-14T13:04:12Z",
    "status": "present",
    "latitude": 40.7128,
    "longitude": -74.006
}))]
pub struct AttendanceRecordResponse {
    /// Record identifier.
    pub id: Uuid,

    /// Student who checked in.
    #[schema(example = "1")]
    pub student_id: String,

    /// Student display name.
    #[schema(example = "Alex Johnson")]
    pub student_name: String,

    /// Course checked in to.
    #[schema(example = "1")]
    pub course_id: String,

    /// Class session checked in to.
    #[schema(example = "s1")]
    pub session_id: String,

    /// When the check-in was accepted.
    pub recorded_at: DateTime<Utc>,

    /// Present or late.
    pub status: AttendanceStatus,

    /// Verified latitude.
    pub latitude: f64,

    /// Verified longitude.
    pub longitude: f64,
}

impl From<&AttendanceRecord> for AttendanceRecordResponse {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            id: record.id,
            student_id: record.student_id.clone(),
            student_name: record.student_name.clone(),
            course_id: record.course_id.clone(),
            session_id: record.session_id.clone(),
            recorded_at: record.recorded_at,
            status: record.status,
            latitude: record.coordinate.latitude,
            longitude: record.coordinate.longitude,
        }
    }
}

/// Attendance for one course.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseAttendanceResponse {
    /// Course identifier.
    #[schema(example = "1")]
    pub course_id: String,

    /// Course code.
    #[schema(example = "ENG 101")]
    pub course_code: String,

    /// Session currently open for check-in, if any.
    #[schema(example = "s1", nullable)]
    pub active_session_id: Option<String>,

    /// Present / late / absent counts against enrollment.
    pub summary: AttendanceSummary,

    /// Records, oldest first.
    pub records: Vec<AttendanceRecordResponse>,
}

/// How many times a student checked in today.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"student_id": "1", "date": "2026-09-14", "checked_in": 2}))]
pub struct StudentTodayResponse {
    /// Student identifier.
    pub student_id: String,

    /// Today's date in the attendance timezone.
    pub date: NaiveDate,

    /// Check-ins recorded today.
    pub checked_in: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get attendance for a course.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/attendance",
    tag = "attendance",
    operation_id = "getCourseAttendance",
    summary = "Get course attendance",
    description = "Returns every check-in recorded for the course since the server \
        started, with present / late / absent counts. Absent is enrollment minus \
        recorded check-ins.",
    params(
        ("course_id" = String, Path, description = "Course identifier", example = "1")
    ),
    responses(
        (status = 200, description = "Attendance retrieved", body = CourseAttendanceResponse),
        (status = 404, description = "Unknown course", body = ErrorResponse)
    )
)]
pub async fn get_course_attendance(
    State(state): State<SharedState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<CourseAttendanceResponse>> {
    let state_guard = state.read().await;
    let course = state_guard
        .registry
        .course(&course_id)
        .ok_or_else(|| RollcallError::CourseNotFound(course_id.clone()))?;

    let records = state_guard
        .roster
        .records_for_course(&course.id)
        .map(AttendanceRecordResponse::from)
        .collect();

    Ok(Json(CourseAttendanceResponse {
        course_id: course.id.clone(),
        course_code: course.code.clone(),
        active_session_id: state_guard
            .registry
            .active_session(&course.id)
            .map(|session| session.id.clone()),
        summary: state_guard.roster.summary(&course.id, course.enrolled_count),
        records,
    }))
}

/// Count a student's check-ins today.
#[utoipa::path(
    get,
    path = "/students/{student_id}/attendance/today",
    tag = "attendance",
    operation_id = "getStudentToday",
    summary = "Count today's check-ins for a student",
    params(
        ("student_id" = String, Path, description = "Student identifier", example = "1")
    ),
    responses(
        (status = 200, description = "Count retrieved", body = StudentTodayResponse)
    )
)]
pub async fn get_student_today(
    State(state): State<SharedState>,
    Path(student_id): Path<String>,
) -> Json<StudentTodayResponse> {
    let state_guard = state.read().await;
    let now = Utc::now();
    let timezone = state_guard.late_policy.timezone;

    Json(StudentTodayResponse {
        checked_in: state_guard
            .roster
            .checked_in_today(&student_id, now, timezone),
        date: now.with_timezone(&timezone).date_naive(),
        student_id,
    })
}
