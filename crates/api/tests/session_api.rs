//! Integration tests for the session lifecycle endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, expect_error, get, post_empty, start_session};

// ---------------------------------------------------------------------------
// Test: start-session returns an id and an expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_session_returns_id_and_expiry() {
    let app = build_test_app();

    let response = app.send(post_empty("/api/start-session", None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let id = json["data"]["sessionId"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert!(json["data"]["expiresAt"].is_string());
    assert_eq!(app.state.sessions.len().await, 1);
}

#[tokio::test]
async fn sessions_are_distinct() {
    let app = build_test_app();
    let a = start_session(&app).await;
    let b = start_session(&app).await;
    assert_ne!(a, b);
}

// ---------------------------------------------------------------------------
// Test: ping-session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_live_session_succeeds() {
    let app = build_test_app();
    let session = start_session(&app).await;

    let response = app.send(post_empty("/api/ping-session", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["sessionId"], session.as_str());
}

#[tokio::test]
async fn ping_reports_store_expiry() {
    let app = build_test_app();
    let session = start_session(&app).await;
    let id = uuid::Uuid::parse_str(&session).unwrap();

    let response = app.send(post_empty("/api/ping-session", Some(&session))).await;
    let json = body_json(response).await;
    let reported: chrono::DateTime<chrono::Utc> =
        json["data"]["expiresAt"].as_str().unwrap().parse().unwrap();

    let stored = app.state.sessions.expires_at(id).await.unwrap();
    let remaining = stored.saturating_duration_since(tokio::time::Instant::now());
    let expected = chrono::Utc::now() + chrono::Duration::from_std(remaining).unwrap();
    let drift = (reported - expected).num_milliseconds().abs();
    assert!(drift < 1000, "reported expiry drifted by {drift}ms");
}

#[tokio::test]
async fn ping_unknown_session_is_invalid() {
    let app = build_test_app();
    let unknown = uuid::Uuid::new_v4().to_string();

    let response = app.send(post_empty("/api/ping-session", Some(&unknown))).await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_SESSION").await;
    assert_eq!(app.state.sessions.len().await, 0);
}

#[tokio::test]
async fn ping_without_header_is_invalid() {
    let app = build_test_app();
    let response = app.send(post_empty("/api/ping-session", None)).await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_SESSION").await;
}

#[tokio::test]
async fn malformed_session_id_is_invalid() {
    let app = build_test_app();
    let response = app.send(get("/api/all-images", "not-a-uuid")).await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_SESSION").await;
}

// ---------------------------------------------------------------------------
// Test: end-session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_session_removes_it() {
    let app = build_test_app();
    let session = start_session(&app).await;

    let response = app.send(post_empty("/api/end-session", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.send(get("/api/number-pages-total-images", &session)).await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_SESSION").await;

    let response = app.send(post_empty("/api/ping-session", Some(&session))).await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_SESSION").await;
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let app = build_test_app();
    let session = start_session(&app).await;

    for _ in 0..2 {
        let response = app.send(post_empty("/api/end-session", Some(&session))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn end_session_removes_session_directory() {
    let app = build_test_app();
    let session = start_session(&app).await;
    common::upload_pngs(&app, &session, 2).await;

    let entries = || std::fs::read_dir(app.scratch.path()).unwrap().count();
    assert_eq!(entries(), 1);

    app.send(post_empty("/api/end-session", Some(&session))).await;
    assert_eq!(entries(), 0);
}
