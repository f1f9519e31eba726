//! Check-in attempt API endpoints.
//!
//! A check-in attempt wraps the core state machine for one student and one
//! course. The client drives it:
//!
//! 1. `POST /checkins` opens the attempt and issues a position request.
//! 2. The client asks its platform for a position and answers with
//!    `POST /checkins/{id}/position` (or `/failure`), quoting `request_id`.
//! 3. Once verified, `POST /checkins/{id}/confirm` records attendance.
//!
//! Answers quoting a superseded `request_id` are accepted but ignored.
//! Retrying after a failure is always an explicit client call.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rollcall_core::{
    CheckInError, CheckInStatus, DevicePosition, GeoCoordinate, LocationFailure, PositionTicket,
    Resolution, RollcallError, Student,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::attendance::AttendanceRecordResponse;
use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::{AppState, CheckInAttempt, SharedState};

/// Creates the check-in router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(create_check_in))
        .route("/{attempt_id}", get(get_check_in))
        .route("/{attempt_id}", delete(delete_check_in))
        .route("/{attempt_id}/request", post(request_position))
        .route("/{attempt_id}/position", post(report_position))
        .route("/{attempt_id}/failure", post(report_failure))
        .route("/{attempt_id}/retry", post(retry_check_in))
        .route("/{attempt_id}/dismiss", post(dismiss_check_in))
        .route("/{attempt_id}/confirm", post(confirm_check_in))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to open a check-in attempt.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "course_id": "1",
    "student_id": "1",
    "student_name": "Alex Johnson"
}))]
pub struct CreateCheckInRequest {
    /// Course to check in to.
    #[schema(example = "1")]
    pub course_id: String,

    /// Student checking in.
    #[schema(example = "1")]
    pub student_id: String,

    /// Student display name.
    #[schema(example = "Alex Johnson")]
    pub student_name: String,
}

/// A position answer from the client's platform.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "request_id": 1,
    "latitude": 40.7128,
    "longitude": -74.006,
    "accuracy_meters": 12.0
}))]
pub struct PositionReport {
    /// The `request_id` this answers.
    #[schema(example = 1)]
    pub request_id: u64,

    /// Reported latitude.
    #[schema(example = 40.7128)]
    pub latitude: f64,

    /// Reported longitude.
    #[schema(example = -74.006)]
    pub longitude: f64,

    /// Reported horizontal accuracy in meters.
    #[schema(example = 12.0)]
    pub accuracy_meters: Option<f64>,

    /// When the platform took the fix. Defaults to receipt time.
    pub timestamp: Option<DateTime<Utc>>,
}

/// A failure answer from the client's platform.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({"request_id": 1, "reason": "permission_denied"}))]
pub struct FailureReport {
    /// The `request_id` this answers.
    #[schema(example = 1)]
    pub request_id: u64,

    /// Why no position could be produced.
    pub reason: LocationFailure,
}

/// Observable state of a check-in attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "attempt_id": "01926f3e-8f5a-7cc2-9a51-2d4e0c7b9f10",
    "course_id": "1",
    "student_id": "1",
    "state": "not_in_range",
    "reason": null,
    "message": "You are not within the classroom's check-in area. Move closer and refresh your location.",
    "distance_meters": 55.6,
    "within_range": false,
    "radius_meters": 50.0,
    "request_id": null,
    "request_deadline": null,
    "can_check_in": false,
    "can_retry": true
}))]
pub struct CheckInResponse {
    /// Attempt identifier.
    pub attempt_id: Uuid,

    /// Course being checked in to.
    pub course_id: String,

    /// Student checking in.
    pub student_id: String,

    /// One of `idle`, `acquiring_position`, `verified`, `not_in_range`,
    /// `acquisition_failed`.
    #[schema(example = "verified")]
    pub state: String,

    /// Failure reason when `state` is `acquisition_failed`.
    #[schema(nullable)]
    pub reason: Option<LocationFailure>,

    /// User-facing explanation for `not_in_range` and `acquisition_failed`.
    #[schema(nullable)]
    pub message: Option<String>,

    /// Distance from the last evaluation.
    #[schema(nullable)]
    pub distance_meters: Option<f64>,

    /// Outcome of the last evaluation.
    #[schema(nullable)]
    pub within_range: Option<bool>,

    /// Classroom radius in meters.
    #[schema(example = 50.0)]
    pub radius_meters: f64,

    /// Outstanding position request to answer, if any.
    #[schema(nullable)]
    pub request_id: Option<u64>,

    /// When the outstanding request times out.
    #[schema(nullable)]
    pub request_deadline: Option<DateTime<Utc>>,

    /// Whether `confirm` would be accepted now.
    pub can_check_in: bool,

    /// Whether `retry` is available now.
    pub can_retry: bool,
}

impl From<&CheckInAttempt> for CheckInResponse {
    fn from(attempt: &CheckInAttempt) -> Self {
        let snapshot = attempt.session.snapshot();
        let message = match snapshot.status {
            CheckInStatus::NotInRange => Some(CheckInError::NotInRange.to_string()),
            CheckInStatus::AcquisitionFailed(reason) => Some(reason.to_string()),
            _ => None,
        };

        Self {
            attempt_id: attempt.id,
            course_id: attempt.course_id.clone(),
            student_id: attempt.student.id.clone(),
            state: snapshot.status.as_str().to_string(),
            reason: snapshot.status.failure(),
            message,
            distance_meters: snapshot.last_result.map(|result| result.distance_meters),
            within_range: snapshot.last_result.map(|result| result.within_range),
            radius_meters: attempt.session.classroom().radius_meters,
            request_id: snapshot.pending.map(|pending| pending.ticket.get()),
            request_deadline: snapshot.pending.map(|pending| pending.deadline),
            can_check_in: snapshot.status.can_check_in(),
            can_retry: snapshot.status.can_retry(),
        }
    }
}

/// Response to a position or failure answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    /// Whether the answer matched the outstanding request. Stale answers
    /// are ignored and leave the attempt unchanged.
    pub applied: bool,

    /// Attempt state after the answer.
    pub attempt: CheckInResponse,
}

// ============================================================================
// Helpers
// ============================================================================

fn attempt_mut(state: &mut AppState, attempt_id: Uuid) -> ApiResult<&mut CheckInAttempt> {
    state
        .attempts
        .get_mut(&attempt_id)
        .ok_or_else(|| ApiError::attempt_not_found(attempt_id))
}

/// Attach the attempt's current state to a transition conflict.
fn conflict(err: CheckInError, status: CheckInStatus) -> ApiError {
    match ApiError::from(err) {
        ApiError::Conflict {
            error_code,
            message,
            ..
        } => ApiError::Conflict {
            error_code,
            message,
            details: Some(json!({ "state": status.as_str() })),
        },
        other => other,
    }
}

fn resolve_report(
    attempt: &mut CheckInAttempt,
    request_id: u64,
    outcome: Result<DevicePosition, LocationFailure>,
    now: DateTime<Utc>,
) -> ReportResponse {
    let resolution = attempt
        .session
        .resolve(PositionTicket::from_raw(request_id), outcome, now);

    ReportResponse {
        applied: matches!(resolution, Resolution::Applied(_)),
        attempt: CheckInResponse::from(&*attempt),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Open a check-in attempt.
#[utoipa::path(
    post,
    path = "/checkins",
    tag = "checkins",
    operation_id = "createCheckIn",
    summary = "Open a check-in attempt",
    description = "Opens an attempt for the student in the course and immediately \
        issues a position request. Answer it with the returned `request_id` \
        before `request_deadline`.",
    request_body = CreateCheckInRequest,
    responses(
        (status = 201, description = "Attempt opened", body = CheckInResponse),
        (status = 400, description = "Missing student", body = ErrorResponse),
        (status = 404, description = "Unknown course", body = ErrorResponse)
    )
)]
pub async fn create_check_in(
    State(state): State<SharedState>,
    Json(request): Json<CreateCheckInRequest>,
) -> ApiResult<(StatusCode, Json<CheckInResponse>)> {
    if request.student_id.trim().is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "invalid_student".to_string(),
            message: "'student_id' must not be empty".to_string(),
        });
    }

    let now = Utc::now();
    let student = Student {
        id: request.student_id,
        name: request.student_name,
    };

    let mut state_guard = state.write().await;
    let attempt = state_guard.open_attempt(&request.course_id, student, now)?;
    attempt
        .session
        .request_position(now)
        .map_err(|err| conflict(err, attempt.session.status()))?;

    Ok((StatusCode::CREATED, Json(CheckInResponse::from(&*attempt))))
}

/// Get a check-in attempt.
#[utoipa::path(
    get,
    path = "/checkins/{attempt_id}",
    tag = "checkins",
    operation_id = "getCheckIn",
    summary = "Get a check-in attempt",
    description = "Returns the attempt's current state. An outstanding request past \
        its deadline is reported as `acquisition_failed` with reason `timeout`.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 200, description = "Attempt retrieved", body = CheckInResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse)
    )
)]
pub async fn get_check_in(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<CheckInResponse>> {
    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;
    attempt.session.expire(Utc::now());

    Ok(Json(CheckInResponse::from(&*attempt)))
}

/// Request a position for an existing attempt.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/request",
    tag = "checkins",
    operation_id = "requestPosition",
    summary = "Request a position",
    description = "Issues a new position request, as when the check-in view is \
        reopened. A position acquired within the cache window is reused and \
        evaluated immediately, in which case no `request_id` is returned.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 200, description = "Request issued or cache reused", body = CheckInResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse),
        (status = 409, description = "A request is already outstanding", body = ErrorResponse)
    )
)]
pub async fn request_position(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<CheckInResponse>> {
    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;
    attempt
        .session
        .request_position(Utc::now())
        .map_err(|err| conflict(err, attempt.session.status()))?;

    Ok(Json(CheckInResponse::from(&*attempt)))
}

/// Answer a position request with a position.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/position",
    tag = "checkins",
    operation_id = "reportPosition",
    summary = "Report a device position",
    description = "Completes the outstanding request. Out-of-range coordinates are \
        treated as `position_unavailable`. Answers for any other `request_id` \
        are ignored (`applied: false`).",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    request_body = PositionReport,
    responses(
        (status = 200, description = "Answer processed", body = ReportResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse)
    )
)]
pub async fn report_position(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
    Json(report): Json<PositionReport>,
) -> ApiResult<Json<ReportResponse>> {
    let now = Utc::now();
    let coordinate = GeoCoordinate {
        latitude: report.latitude,
        longitude: report.longitude,
    };
    let mut position = DevicePosition::new(coordinate, report.timestamp.unwrap_or(now));
    if let Some(accuracy) = report.accuracy_meters {
        position = position.with_accuracy(accuracy);
    }

    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;

    Ok(Json(resolve_report(attempt, report.request_id, Ok(position), now)))
}

/// Answer a position request with a failure.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/failure",
    tag = "checkins",
    operation_id = "reportFailure",
    summary = "Report a position failure",
    description = "Completes the outstanding request with a failure reason. The \
        attempt stays failed until the client explicitly retries.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    request_body = FailureReport,
    responses(
        (status = 200, description = "Answer processed", body = ReportResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse)
    )
)]
pub async fn report_failure(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
    Json(report): Json<FailureReport>,
) -> ApiResult<Json<ReportResponse>> {
    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;

    Ok(Json(resolve_report(
        attempt,
        report.request_id,
        Err(report.reason),
        Utc::now(),
    )))
}

/// Retry after a failed or out-of-range attempt.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/retry",
    tag = "checkins",
    operation_id = "retryCheckIn",
    summary = "Retry the location check",
    description = "Discards any cached position and issues a fresh request. Only \
        available from `not_in_range` and `acquisition_failed`.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 200, description = "New request issued", body = CheckInResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse),
        (status = 409, description = "Retry not available in this state", body = ErrorResponse)
    )
)]
pub async fn retry_check_in(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<CheckInResponse>> {
    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;
    attempt
        .session
        .retry(Utc::now())
        .map_err(|err| conflict(err, attempt.session.status()))?;

    Ok(Json(CheckInResponse::from(&*attempt)))
}

/// Dismiss the check-in view.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/dismiss",
    tag = "checkins",
    operation_id = "dismissCheckIn",
    summary = "Dismiss the check-in view",
    description = "Returns the attempt to `idle`. Any outstanding request is \
        abandoned and its answer will be ignored. The attempt can be resumed \
        with `request`.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 200, description = "Attempt dismissed", body = CheckInResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse)
    )
)]
pub async fn dismiss_check_in(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<Json<CheckInResponse>> {
    let mut state_guard = state.write().await;
    let attempt = attempt_mut(&mut state_guard, attempt_id)?;
    attempt.session.dismiss();

    Ok(Json(CheckInResponse::from(&*attempt)))
}

/// Confirm a verified check-in and record attendance.
#[utoipa::path(
    post,
    path = "/checkins/{attempt_id}/confirm",
    tag = "checkins",
    operation_id = "confirmCheckIn",
    summary = "Confirm check-in",
    description = "Records attendance for the course's active session. Only \
        accepted while the attempt is `verified`; the record is marked late \
        once the grace period after the session start has passed. The \
        attempt is forgotten once attendance is recorded.",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 201, description = "Attendance recorded", body = AttendanceRecordResponse),
        (status = 404, description = "Unknown attempt", body = ErrorResponse),
        (status = 409, description = "Not verified, no active session, or already checked in", body = ErrorResponse)
    )
)]
pub async fn confirm_check_in(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<AttendanceRecordResponse>)> {
    let now = Utc::now();
    let mut state_guard = state.write().await;
    let AppState {
        attempts,
        registry,
        roster,
        late_policy,
        ..
    } = &mut *state_guard;

    let attempt = attempts
        .get_mut(&attempt_id)
        .ok_or_else(|| ApiError::attempt_not_found(attempt_id))?;
    attempt.session.expire(now);
    let position = attempt
        .session
        .check_in()
        .map_err(|err| conflict(err, attempt.session.status()))?;

    let session = registry
        .active_session(&attempt.course_id)
        .ok_or_else(|| RollcallError::NoActiveSession(attempt.course_id.clone()))?;
    let record = roster.record_check_in(
        &attempt.student,
        session,
        position.coordinate,
        now,
        late_policy,
    )?;

    info!(attempt_id = %attempt_id, record_id = %record.id, "Check-in confirmed");
    let response = AttendanceRecordResponse::from(record);
    attempts.remove(&attempt_id);

    Ok((StatusCode::CREATED, Json(response)))
}

/// Discard a check-in attempt.
#[utoipa::path(
    delete,
    path = "/checkins/{attempt_id}",
    tag = "checkins",
    operation_id = "deleteCheckIn",
    summary = "Discard a check-in attempt",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt identifier")
    ),
    responses(
        (status = 204, description = "Attempt discarded"),
        (status = 404, description = "Unknown attempt", body = ErrorResponse)
    )
)]
pub async fn delete_check_in(
    State(state): State<SharedState>,
    Path(attempt_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut state_guard = state.write().await;
    state_guard
        .attempts
        .remove(&attempt_id)
        .ok_or_else(|| ApiError::attempt_not_found(attempt_id))?;

    info!(attempt_id = %attempt_id, "Discarded check-in attempt");
    Ok(StatusCode::NO_CONTENT)
}
