//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `proximity` - Stateless device-versus-classroom evaluation
//! - `checkins` - Check-in attempts driven by the client's position answers
//! - `courses` - Course and classroom lookups
//! - `attendance` - Recorded attendance and summaries
//! - `config` - Read-only configuration
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod attendance;
pub mod checkins;
pub mod config;
pub mod courses;
pub mod error;
pub mod health;
pub mod openapi;
pub mod proximity;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /api
/// ├── /proximity                   - Device versus classroom check
/// ├── /checkins                    - Check-in attempts
/// │   └── /{id}/{request,position,failure,retry,dismiss,confirm}
/// ├── /courses                     - Courses and classrooms
/// │   └── /{id}/attendance         - Course attendance
/// ├── /students/{id}/attendance/today
/// ├── /config                      - Configuration
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/proximity", post(proximity::check_proximity))
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/checkins", checkins::router())
                .nest("/courses", courses::router())
                .nest("/students", attendance::students_router())
                .nest("/config", config::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
