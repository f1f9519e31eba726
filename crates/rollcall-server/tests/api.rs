//! End-to-end tests against the full router.

use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use rollcall_core::{Config, CourseRegistry};
use rollcall_server::api::create_router;
use rollcall_server::state::AppState;
use serde_json::{json, Value};

fn server() -> TestServer {
    server_with(Config::default())
}

fn server_with(config: Config) -> TestServer {
    let state = AppState::new(config).unwrap();
    TestServer::new(create_router(state.into_shared())).unwrap()
}

async fn open_attempt(server: &TestServer, course_id: &str, student_id: &str) -> Value {
    let response = server
        .post("/api/checkins")
        .json(&json!({
            "course_id": course_id,
            "student_id": student_id,
            "student_name": "Alex Johnson"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

async fn answer_position(server: &TestServer, attempt: &Value, latitude: f64, longitude: f64) -> Value {
    let id = attempt["attempt_id"].as_str().unwrap();
    let response = server
        .post(&format!("/api/checkins/{id}/position"))
        .json(&json!({
            "request_id": attempt["request_id"],
            "latitude": latitude,
            "longitude": longitude
        }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["courses"], 4);
}

#[tokio::test]
async fn test_openapi_served() {
    let server = server();
    let response = server.get("/api/openapi.json").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["info"]["title"], "rollcall API");
}

#[tokio::test]
async fn test_config_exposes_position_options() {
    let server = server();
    let body = server.get("/api/config").await.json::<Value>();
    assert_eq!(body["geolocation"]["timeout_secs"], 10);
    assert_eq!(body["geolocation"]["maximum_age_secs"], 60);
    assert_eq!(body["geolocation"]["high_accuracy"], true);
}

#[tokio::test]
async fn test_courses_listing_and_filter() {
    let server = server();

    let all = server.get("/api/courses").await.json::<Value>();
    assert_eq!(all["total"], 4);

    let filtered = server
        .get("/api/courses")
        .add_query_param("instructor_id", "2")
        .await
        .json::<Value>();
    assert!(filtered["total"].as_u64().unwrap() >= 1);
    for course in filtered["courses"].as_array().unwrap() {
        assert_eq!(course["instructor_id"], "2");
    }

    let course = server.get("/api/courses/1").await.json::<Value>();
    assert_eq!(course["code"], "ENG 101");
    assert_eq!(course["classroom"]["radius_meters"], 50.0);

    let missing = server.get("/api/courses/99").await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["error"], "course_not_found");
}

#[tokio::test]
async fn test_proximity_against_registered_classroom() {
    let server = server();

    let inside = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 40.7128, "longitude": -74.006},
            "classroom_id": "c1"
        }))
        .await;
    inside.assert_status_ok();
    let body = inside.json::<Value>();
    assert_eq!(body["within_range"], true);
    assert!(body["distance_meters"].as_f64().unwrap() < 1e-6);

    let outside = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 40.7133, "longitude": -74.006},
            "classroom_id": "c1"
        }))
        .await
        .json::<Value>();
    assert_eq!(outside["within_range"], false);
    let distance = outside["distance_meters"].as_f64().unwrap();
    assert!((55.0..56.5).contains(&distance), "distance was {distance}");
}

#[tokio::test]
async fn test_proximity_rejects_invalid_input() {
    let server = server();

    let bad_latitude = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 91.0, "longitude": 0.0},
            "classroom": {"latitude": 0.0, "longitude": 0.0, "radius_meters": 50.0}
        }))
        .await;
    bad_latitude.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(bad_latitude.json::<Value>()["error"], "invalid_coordinate");

    let bad_radius = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 0.0, "longitude": 0.0},
            "classroom": {"latitude": 0.0, "longitude": 0.0, "radius_meters": -1.0}
        }))
        .await;
    bad_radius.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(bad_radius.json::<Value>()["error"], "invalid_radius");

    let ambiguous = server
        .post("/api/proximity")
        .json(&json!({"device": {"latitude": 0.0, "longitude": 0.0}}))
        .await;
    ambiguous.assert_status(StatusCode::BAD_REQUEST);

    let unknown = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 0.0, "longitude": 0.0},
            "classroom_id": "c99"
        }))
        .await;
    unknown.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_in_happy_path_records_attendance() {
    let server = server();
    let attempt = open_attempt(&server, "1", "1").await;
    assert_eq!(attempt["state"], "acquiring_position");
    assert!(attempt["request_id"].is_u64());

    let report = answer_position(&server, &attempt, 40.7128, -74.006).await;
    assert_eq!(report["applied"], true);
    assert_eq!(report["attempt"]["state"], "verified");
    assert_eq!(report["attempt"]["can_check_in"], true);

    let id = attempt["attempt_id"].as_str().unwrap();
    let confirm = server.post(&format!("/api/checkins/{id}/confirm")).await;
    confirm.assert_status(StatusCode::CREATED);
    let record = confirm.json::<Value>();
    assert_eq!(record["session_id"], "s1");
    assert!(record["status"] == "present" || record["status"] == "late");

    // The confirmed attempt is gone.
    let again = server.post(&format!("/api/checkins/{id}/confirm")).await;
    again.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(again.json::<Value>()["error"], "attempt_not_found");
    server
        .get(&format!("/api/checkins/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // A fresh attempt for the same session is refused by the roster.
    let second = open_attempt(&server, "1", "1").await;
    answer_position(&server, &second, 40.7128, -74.006).await;
    let second_id = second["attempt_id"].as_str().unwrap();
    let duplicate = server
        .post(&format!("/api/checkins/{second_id}/confirm"))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);
    assert_eq!(duplicate.json::<Value>()["error"], "already_checked_in");

    let attendance = server
        .get("/api/courses/1/attendance")
        .await
        .json::<Value>();
    let summary = &attendance["summary"];
    let recorded = summary["present"].as_u64().unwrap() + summary["late"].as_u64().unwrap();
    assert_eq!(recorded, 1);
    assert_eq!(summary["absent"], 31);
    assert_eq!(attendance["records"].as_array().unwrap().len(), 1);

    let today = server
        .get("/api/students/1/attendance/today")
        .await
        .json::<Value>();
    assert_eq!(today["checked_in"], 1);
}

#[tokio::test]
async fn test_confirmed_attempts_are_released() {
    let server = server();
    for student in 1..=20 {
        let attempt = open_attempt(&server, "1", &student.to_string()).await;
        answer_position(&server, &attempt, 40.7128, -74.006).await;
        let id = attempt["attempt_id"].as_str().unwrap();
        server
            .post(&format!("/api/checkins/{id}/confirm"))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let pending = open_attempt(&server, "1", "21").await;
    let health = server.get("/health").await.json::<Value>();
    assert_eq!(health["open_attempts"], 1);

    let id = pending["attempt_id"].as_str().unwrap();
    server
        .delete(&format!("/api/checkins/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let health = server.get("/health").await.json::<Value>();
    assert_eq!(health["open_attempts"], 0);
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let mut config = Config::default();
    config.geolocation.timeout_secs = 1;
    let server = server_with(config);

    let silent = open_attempt(&server, "1", "1").await;
    let late = open_attempt(&server, "1", "2").await;
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let id = silent["attempt_id"].as_str().unwrap();
    let snapshot = server
        .get(&format!("/api/checkins/{id}"))
        .await
        .json::<Value>();
    assert_eq!(snapshot["state"], "acquisition_failed");
    assert_eq!(snapshot["reason"], "timeout");
    assert_eq!(snapshot["can_retry"], true);
    assert!(snapshot["request_id"].is_null());

    let confirm = server.post(&format!("/api/checkins/{id}/confirm")).await;
    confirm.assert_status(StatusCode::CONFLICT);
    assert_eq!(confirm.json::<Value>()["error"], "not_verified");

    // An in-range answer after the deadline still counts as a timeout.
    let report = answer_position(&server, &late, 40.7128, -74.006).await;
    assert_eq!(report["applied"], true);
    assert_eq!(report["attempt"]["state"], "acquisition_failed");
    assert_eq!(report["attempt"]["reason"], "timeout");
    assert_eq!(report["attempt"]["can_check_in"], false);
}

#[tokio::test]
async fn test_out_of_range_then_retry() {
    let server = server();
    let attempt = open_attempt(&server, "1", "2").await;
    let id = attempt["attempt_id"].as_str().unwrap();

    let report = answer_position(&server, &attempt, 40.7133, -74.006).await;
    assert_eq!(report["attempt"]["state"], "not_in_range");
    assert_eq!(report["attempt"]["can_retry"], true);
    assert!(report["attempt"]["message"]
        .as_str()
        .unwrap()
        .contains("not within"));

    let refused = server.post(&format!("/api/checkins/{id}/confirm")).await;
    refused.assert_status(StatusCode::CONFLICT);
    let body = refused.json::<Value>();
    assert_eq!(body["error"], "not_in_range");
    assert_eq!(body["details"]["state"], "not_in_range");

    let retried = server.post(&format!("/api/checkins/{id}/retry")).await;
    retried.assert_status_ok();
    let retried = retried.json::<Value>();
    assert_eq!(retried["state"], "acquiring_position");
    assert_ne!(retried["request_id"], attempt["request_id"]);

    let report = answer_position(&server, &retried, 40.7128, -74.006).await;
    assert_eq!(report["attempt"]["state"], "verified");
}

#[tokio::test]
async fn test_failure_report_and_stale_answers() {
    let server = server();
    let attempt = open_attempt(&server, "2", "3").await;
    let id = attempt["attempt_id"].as_str().unwrap();

    let failed = server
        .post(&format!("/api/checkins/{id}/failure"))
        .json(&json!({"request_id": attempt["request_id"], "reason": "permission_denied"}))
        .await
        .json::<Value>();
    assert_eq!(failed["applied"], true);
    assert_eq!(failed["attempt"]["state"], "acquisition_failed");
    assert_eq!(failed["attempt"]["reason"], "permission_denied");

    // Answering the same request again changes nothing.
    let stale = answer_position(&server, &attempt, 40.7128, -74.006).await;
    assert_eq!(stale["applied"], false);
    assert_eq!(stale["attempt"]["state"], "acquisition_failed");
}

#[tokio::test]
async fn test_outstanding_request_blocks_new_request_and_retry() {
    let server = server();
    let attempt = open_attempt(&server, "1", "4").await;
    let id = attempt["attempt_id"].as_str().unwrap();

    let again = server.post(&format!("/api/checkins/{id}/request")).await;
    again.assert_status(StatusCode::CONFLICT);
    assert_eq!(again.json::<Value>()["error"], "request_pending");

    let retry = server.post(&format!("/api/checkins/{id}/retry")).await;
    retry.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_dismiss_ignores_late_answer_and_cache_is_reused() {
    let server = server();
    let attempt = open_attempt(&server, "1", "5").await;
    let id = attempt["attempt_id"].as_str().unwrap();

    let dismissed = server
        .post(&format!("/api/checkins/{id}/dismiss"))
        .await
        .json::<Value>();
    assert_eq!(dismissed["state"], "idle");
    assert!(dismissed["request_id"].is_null());

    let late = answer_position(&server, &attempt, 40.7128, -74.006).await;
    assert_eq!(late["applied"], false);
    assert_eq!(late["attempt"]["state"], "idle");

    // Reopen, verify, dismiss, reopen: the fresh position is reused.
    let reopened = server
        .post(&format!("/api/checkins/{id}/request"))
        .await
        .json::<Value>();
    answer_position(&server, &reopened, 40.7128, -74.006).await;
    server.post(&format!("/api/checkins/{id}/dismiss")).await;

    let cached = server
        .post(&format!("/api/checkins/{id}/request"))
        .await
        .json::<Value>();
    assert_eq!(cached["state"], "verified");
    assert!(cached["request_id"].is_null());
}

#[tokio::test]
async fn test_no_active_session() {
    let server = server();
    let attempt = open_attempt(&server, "3", "6").await;
    let classroom = server.get("/api/courses/3").await.json::<Value>()["classroom"].clone();
    answer_position(
        &server,
        &attempt,
        classroom["latitude"].as_f64().unwrap(),
        classroom["longitude"].as_f64().unwrap(),
    )
    .await;

    let id = attempt["attempt_id"].as_str().unwrap();
    let confirm = server.post(&format!("/api/checkins/{id}/confirm")).await;
    confirm.assert_status(StatusCode::CONFLICT);
    assert_eq!(confirm.json::<Value>()["error"], "no_active_session");
}

#[tokio::test]
async fn test_unknown_attempt_and_delete() {
    let server = server();
    let missing = server
        .get("/api/checkins/00000000-0000-0000-0000-000000000000")
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["error"], "attempt_not_found");

    let attempt = open_attempt(&server, "1", "7").await;
    let id = attempt["attempt_id"].as_str().unwrap();
    server
        .delete(&format!("/api/checkins/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/checkins/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_course_rejected_on_open() {
    let server = server();
    let response = server
        .post("/api/checkins")
        .json(&json!({"course_id": "99", "student_id": "1", "student_name": "Alex"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

const FIELD_COURSE: &str = r#"
[[courses]]
id = "geo"
name = "Field Geology"
code = "GEO 110"
department = "Earth Sciences"
semester = "Spring 2026"
instructor_id = "9"
instructor_name = "Dr. Lee"
schedule = "Fri 8:00 AM - 11:00 AM"
enrolled_count = 12

[courses.classroom]
id = "quarry"
building = "North Quarry"
room_number = "site"
latitude = 51.5
longitude = -0.12
radius_meters = 250.0
"#;

#[tokio::test]
async fn test_custom_registry() {
    let registry = CourseRegistry::from_toml(FIELD_COURSE).unwrap();
    let state = AppState::with_registry(Config::default(), registry).unwrap();
    let server = TestServer::new(create_router(state.into_shared())).unwrap();

    let body = server.get("/api/courses").await.json::<Value>();
    assert_eq!(body["total"], 1);
    assert_eq!(body["courses"][0]["classroom"]["id"], "quarry");
}

#[tokio::test]
async fn test_registry_loaded_from_configured_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courses.toml");
    std::fs::write(&path, FIELD_COURSE).unwrap();

    let mut config = Config::default();
    config.registry.path = Some(path);
    let state = AppState::new(config).unwrap();
    let server = TestServer::new(create_router(state.into_shared())).unwrap();

    let proximity = server
        .post("/api/proximity")
        .json(&json!({
            "device": {"latitude": 51.501, "longitude": -0.12},
            "classroom_id": "quarry"
        }))
        .await
        .json::<Value>();
    assert_eq!(proximity["within_range"], true);
}
