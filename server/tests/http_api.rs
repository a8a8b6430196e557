mod common;

use std::sync::Arc;

use agency_chat_server::app::{router, AppState};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let h = common::harness();
    router(Arc::new(AppState::new(h.engine)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn chat_requires_message_and_session_id() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "sessionId": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "message is required");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "message": "ciao", "sessionId": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "sessionId is required");
}

#[tokio::test]
async fn chat_turn_returns_the_reply_shape() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "message": "vorrei prenotare una consulenza", "sessionId": "web-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"], "choose_service");
    assert_eq!(body["flow"], "booking");
    assert_eq!(body["completed"], false);
    assert_eq!(body["sessionReset"], false);
    assert!(body["response"].as_str().unwrap().contains("1."));
}

#[tokio::test]
async fn entry_routes_force_the_flow() {
    let app = app();
    let (_, body) = call(
        &app,
        Method::POST,
        "/api/chat/booking",
        Some(json!({ "message": "ciao", "sessionId": "b-1" })),
    )
    .await;
    assert_eq!(body["flow"], "booking");
    assert_eq!(body["step"], "choose_service");

    let (_, body) = call(
        &app,
        Method::POST,
        "/api/chat/support",
        Some(json!({ "message": "ciao", "sessionId": "s-1" })),
    )
    .await;
    assert_eq!(body["flow"], "support");
    assert_eq!(body["step"], "name");
}

#[tokio::test]
async fn session_lifecycle() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat/session",
        Some(json!({ "language": "en" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["sessionId"].as_str().unwrap().to_string();

    let uri = format!("/api/chat/session/{id}");
    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["language"], "en");
    assert_eq!(body["step"], "general");
    assert_eq!(body["data"], json!({}));

    let (status, _) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session not found");
}

#[tokio::test]
async fn create_session_accepts_an_empty_body_and_rejects_garbage() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/api/chat/session", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["sessionId"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat/session")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_session_snapshot_is_not_found() {
    let app = app();
    let (status, _) = call(&app, Method::GET, "/api/chat/session/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
