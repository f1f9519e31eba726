//! Course API endpoints.
//!
//! Courses and their classrooms come from the static registry loaded at
//! startup.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rollcall_core::{Course, RollcallError};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::attendance;
use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the courses router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_courses))
        .route("/{course_id}", get(get_course))
        .route("/{course_id}/attendance", get(attendance::get_course_attendance))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing courses.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CoursesQuery {
    /// Only return courses taught by this instructor.
    #[param(example = "2")]
    pub instructor_id: Option<String>,
}

/// Course list response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoursesResponse {
    /// Matching courses in registry order.
    pub courses: Vec<Course>,

    /// Number of courses returned.
    #[schema(example = 4)]
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List courses.
#[utoipa::path(
    get,
    path = "/courses",
    tag = "courses",
    operation_id = "listCourses",
    summary = "List courses",
    description = "Returns every registered course with its classroom, optionally \
        filtered to one instructor.",
    params(CoursesQuery),
    responses(
        (status = 200, description = "Courses retrieved", body = CoursesResponse)
    )
)]
pub async fn list_courses(
    State(state): State<SharedState>,
    Query(query): Query<CoursesQuery>,
) -> Json<CoursesResponse> {
    let state_guard = state.read().await;
    let courses: Vec<Course> = match query.instructor_id.as_deref() {
        Some(instructor_id) => state_guard
            .registry
            .courses_for_instructor(instructor_id)
            .cloned()
            .collect(),
        None => state_guard.registry.courses().to_vec(),
    };

    Json(CoursesResponse {
        total: courses.len(),
        courses,
    })
}

/// Get one course.
#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    tag = "courses",
    operation_id = "getCourse",
    summary = "Get a course",
    params(
        ("course_id" = String, Path, description = "Course identifier", example = "1")
    ),
    responses(
        (status = 200, description = "Course retrieved", body = Course),
        (status = 404, description = "Unknown course", body = ErrorResponse)
    )
)]
pub async fn get_course(
    State(state): State<SharedState>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Course>> {
    let state_guard = state.read().await;
    let course = state_guard
        .registry
        .course(&course_id)
        .cloned()
        .ok_or(RollcallError::CourseNotFound(course_id))?;

    Ok(Json(course))
}
