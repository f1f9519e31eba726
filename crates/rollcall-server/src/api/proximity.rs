//! Proximity evaluation endpoint.
//!
//! A stateless check of one device position against one classroom
//! perimeter, either a registered classroom or one described inline.

use axum::extract::State;
use axum::Json;
use rollcall_core::{evaluate, ClassroomLocation, GeoCoordinate, RollcallError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"latitude": 40.7128, "longitude": -74.006}))]
pub struct CoordinateBody {
    /// Latitude in [-90, 90].
    #[schema(example = 40.7128)]
    pub latitude: f64,

    /// Longitude in [-180, 180].
    #[schema(example = -74.006)]
    pub longitude: f64,
}

impl From<CoordinateBody> for GeoCoordinate {
    fn from(body: CoordinateBody) -> Self {
        Self {
            latitude: body.latitude,
            longitude: body.longitude,
        }
    }
}

impl From<GeoCoordinate> for CoordinateBody {
    fn from(coordinate: GeoCoordinate) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }
}

/// A classroom perimeter described inline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"latitude": 40.7128, "longitude": -74.006, "radius_meters": 50.0}))]
pub struct PerimeterBody {
    /// Latitude of the classroom center.
    pub latitude: f64,

    /// Longitude of the classroom center.
    pub longitude: f64,

    /// Check-in radius in meters.
    #[schema(example = 50.0)]
    pub radius_meters: f64,
}

/// Proximity check request. Exactly one of `classroom_id` and `classroom`
/// must be given.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "device": {"latitude": 40.7133, "longitude": -74.006},
    "classroom_id": "c1"
}))]
pub struct ProximityRequest {
    /// Reported device position.
    pub device: CoordinateBody,

    /// Registered classroom to check against.
    #[schema(example = "c1")]
    pub classroom_id: Option<String>,

    /// Inline classroom perimeter to check against.
    pub classroom: Option<PerimeterBody>,
}

/// Result of a proximity check.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "distance_meters": 55.6,
    "within_range": false,
    "radius_meters": 50.0,
    "classroom_id": "c1"
}))]
pub struct ProximityResponse {
    /// Great-circle distance from the classroom center in meters.
    #[schema(example = 55.6)]
    pub distance_meters: f64,

    /// Whether the device is inside the perimeter (boundary inclusive).
    #[schema(example = false)]
    pub within_range: bool,

    /// Radius the device was checked against.
    #[schema(example = 50.0)]
    pub radius_meters: f64,

    /// Registered classroom id, when one was used.
    #[schema(example = "c1", nullable)]
    pub classroom_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Evaluate a device position against a classroom perimeter.
#[utoipa::path(
    post,
    path = "/proximity",
    tag = "proximity",
    operation_id = "checkProximity",
    summary = "Check whether a position is inside a classroom",
    description = "Computes the haversine distance between the device and the \
        classroom center. A device exactly on the perimeter is within range. \
        Does not touch any check-in attempt.",
    request_body = ProximityRequest,
    responses(
        (status = 200, description = "Proximity evaluated", body = ProximityResponse),
        (status = 400, description = "Invalid coordinate or radius", body = ErrorResponse),
        (status = 404, description = "Unknown classroom", body = ErrorResponse)
    )
)]
pub async fn check_proximity(
    State(state): State<SharedState>,
    Json(request): Json<ProximityRequest>,
) -> ApiResult<Json<ProximityResponse>> {
    let classroom = match (&request.classroom_id, request.classroom) {
        (Some(classroom_id), None) => {
            let state_guard = state.read().await;
            state_guard
                .registry
                .classroom(classroom_id)
                .ok_or_else(|| RollcallError::ClassroomNotFound(classroom_id.clone()))?
                .location()?
        }
        (None, Some(perimeter)) => ClassroomLocation {
            center: GeoCoordinate {
                latitude: perimeter.latitude,
                longitude: perimeter.longitude,
            },
            radius_meters: perimeter.radius_meters,
        },
        _ => {
            return Err(ApiError::BadRequest {
                error_code: "invalid_classroom".to_string(),
                message: "Provide exactly one of 'classroom_id' or 'classroom'".to_string(),
            });
        }
    };

    let result = evaluate(request.device.into(), classroom)?;
    debug!(
        distance_meters = result.distance_meters,
        within_range = result.within_range,
        "Proximity check"
    );

    Ok(Json(ProximityResponse {
        distance_meters: result.distance_meters,
        within_range: result.within_range,
        radius_meters: classroom.radius_meters,
        classroom_id: request.classroom_id,
    }))
}
