//! Configuration API endpoint.
//!
//! Exposes the settings a client needs to drive position requests: the
//! accuracy hint, request timeout and cache allowance, plus the attendance
//! timezone and grace period. Configuration is read-only at runtime.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config))
}

// ============================================================================
// Response Types
// ============================================================================

/// Current configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "geolocation": {
        "high_accuracy": true,
        "timeout_secs": 10,
        "maximum_age_secs": 60
    },
    "attendance": {
        "timezone": "America/New_York",
        "late_after_minutes": 10
    }
}))]
pub struct ConfigResponse {
    /// Position request options.
    pub geolocation: GeolocationConfigResponse,

    /// Attendance policy.
    pub attendance: AttendanceConfigResponse,
}

/// Position request options in response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeolocationConfigResponse {
    /// Whether clients should ask the platform for a high-accuracy fix.
    #[schema(example = true)]
    pub high_accuracy: bool,

    /// Seconds a position request may remain outstanding.
    #[schema(example = 10)]
    pub timeout_secs: u64,

    /// Seconds a previously acquired position may be reused.
    #[schema(example = 60)]
    pub maximum_age_secs: u64,
}

/// Attendance policy in response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttendanceConfigResponse {
    /// IANA timezone in which class sessions are scheduled.
    #[schema(example = "America/New_York")]
    pub timezone: String,

    /// Minutes after a session starts before a check-in counts as late.
    #[schema(example = 10)]
    pub late_after_minutes: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the position request options and attendance policy \
        the server was started with.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let state_guard = state.read().await;
    let config = &state_guard.config;

    Json(ConfigResponse {
        geolocation: GeolocationConfigResponse {
            high_accuracy: config.geolocation.high_accuracy,
            timeout_secs: config.geolocation.timeout_secs,
            maximum_age_secs: config.geolocation.maximum_age_secs,
        },
        attendance: AttendanceConfigResponse {
            timezone: config.attendance.timezone.clone(),
            late_after_minutes: config.attendance.late_after_minutes,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_response_serialization() {
        let response = ConfigResponse {
            geolocation: GeolocationConfigResponse {
                high_accuracy: true,
                timeout_secs: 10,
                maximum_age_secs: 60,
            },
            attendance: AttendanceConfigResponse {
                timezone: "America/New_York".to_string(),
                late_after_minutes: 10,
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"timeout_secs\":10"));
        assert!(json.contains("America/New_York"));
    }
}
