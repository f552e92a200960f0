#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use fieldlink_central::server::{AppState, build_router};
use fieldlink_central::storage::RegistryDatabase;

async fn app() -> axum::Router {
    let db = RegistryDatabase::open_in_memory().await.unwrap();
    build_router(AppState::new(db))
}

/// Send a request and return (status, parsed JSON body or Null).
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Device-Token", token);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Register a device and return (id, token).
async fn register(app: &axum::Router, name: &str) -> (String, String) {
    let (status, body) = send(app, "POST", "/devices", None, Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["device"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_relay(app: &axum::Router, device_id: &str, pin: u32) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        &format!("/devices/{device_id}/relays"),
        None,
        Some(json!({ "name": format!("relay-{pin}"), "gpio_pin": pin })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_sensor(app: &axum::Router, device_id: &str, pin: u32) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        &format!("/devices/{device_id}/motion_sensors"),
        None,
        Some(json!({ "name": "hall", "gpio_pin": pin, "enable_scheduling": true,
                     "start_time": "22:00", "end_time": "06:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn registration_returns_token_once() {
    let app = app().await;
    let (id, token) = register(&app, "greenhouse").await;
    assert_eq!(token.len(), 64);

    let (status, body) = send(&app, "GET", &format!("/devices/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "greenhouse");
    assert!(body.get("token").is_none());
    assert!(body.get("token_hash").is_none());
}

#[tokio::test]
async fn registration_requires_name() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/devices", None, Some(json!({ "name": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn config_pull_lists_definitions() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    create_relay(&app, &id, 17).await;
    create_sensor(&app, &id, 4).await;

    let (status, body) = send(&app, "GET", &format!("/devices/{id}/relays/config"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_id"], id.as_str());
    assert_eq!(body["relays"][0]["gpio_pin"], 17);
    assert_eq!(body["relays"][0]["status"], false);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/devices/{id}/motion_sensors/config"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["motion_sensors"][0]["start_time"], "22:00");
    assert_eq!(body["motion_sensors"][0]["timezone"], "UTC");
}

#[tokio::test]
async fn config_pull_unknown_device_is_404() {
    let app = app().await;
    let (status, _) = send(&app, "GET", "/devices/nope/relays/config", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authenticated_pull_refreshes_last_seen() {
    let app = app().await;
    let (id, token) = register(&app, "node").await;

    send(&app, "GET", &format!("/devices/{id}/relays/config"), None, None).await;
    let (_, body) = send(&app, "GET", &format!("/devices/{id}"), None, None).await;
    assert!(body["last_seen"].is_null());

    send(&app, "GET", &format!("/devices/{id}/relays/config"), Some(&token), None).await;
    let (_, body) = send(&app, "GET", &format!("/devices/{id}"), None, None).await;
    assert!(body["last_seen"].is_i64());
}

#[tokio::test]
async fn status_report_requires_token() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    let relay = create_relay(&app, &id, 17).await;

    let uri = format!("/relays/{relay}/status");
    let (status, _) = send(&app, "PUT", &uri, None, Some(json!({ "status": true }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "PUT", &uri, Some("bogus"), Some(json!({ "status": true }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_report_updates_relay_and_audit() {
    let app = app().await;
    let (id, token) = register(&app, "node").await;
    let relay = create_relay(&app, &id, 17).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/relays/{relay}/status"),
        Some(&token),
        Some(json!({ "status": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);

    let (_, logs) = send(&app, "GET", &format!("/relays/{relay}/status_logs"), None, None).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn status_report_accepts_token_in_body() {
    let app = app().await;
    let (id, token) = register(&app, "node").await;
    let relay = create_relay(&app, &id, 17).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/relays/{relay}/status"),
        None,
        Some(json!({ "status": false, "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cross_device_status_report_is_forbidden() {
    let app = app().await;
    let (owner, _) = register(&app, "owner").await;
    let (_, intruder_token) = register(&app, "intruder").await;
    let relay = create_relay(&app, &owner, 17).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/relays/{relay}/status"),
        Some(&intruder_token),
        Some(json!({ "status": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, logs) = send(&app, "GET", &format!("/relays/{relay}/status_logs"), None, None).await;
    assert!(logs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn status_report_for_unknown_relay_is_404() {
    let app = app().await;
    let (_, token) = register(&app, "node").await;
    let (status, _) = send(
        &app,
        "PUT",
        "/relays/999/status",
        Some(&token),
        Some(json!({ "status": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn every_motion_report_is_counted() {
    let app = app().await;
    let (id, token) = register(&app, "node").await;
    let sensor = create_sensor(&app, &id, 4).await;
    let uri = format!("/motion_sensors/{sensor}/motion");

    let (status, _) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "detected_at": 1_700_000_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["motion_count"], 2);
    assert_eq!(body["last_motion_detected"], 1_700_000_000);

    let (_, events) = send(&app, "GET", &format!("/motion_sensors/{sensor}/events"), None, None).await;
    assert_eq!(events.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn cross_device_motion_report_is_forbidden() {
    let app = app().await;
    let (owner, _) = register(&app, "owner").await;
    let (_, other_token) = register(&app, "other").await;
    let sensor = create_sensor(&app, &owner, 4).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/motion_sensors/{sensor}/motion"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deactivated_device_cannot_report() {
    let app = app().await;
    let (id, token) = register(&app, "node").await;
    let relay = create_relay(&app, &id, 17).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/devices/{id}"),
        None,
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/relays/{relay}/status"),
        Some(&token),
        Some(json!({ "status": true })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_pin_is_rejected_before_write() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    create_relay(&app, &id, 17).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/devices/{id}/motion_sensors"),
        None,
        Some(json!({ "name": "pir", "gpio_pin": 17 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, "GET", &format!("/devices/{id}/motion_sensors"), None, None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_timezone_is_rejected() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/devices/{id}/motion_sensors"),
        None,
        Some(json!({ "name": "pir", "gpio_pin": 5, "timezone": "Mars/Olympus" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("timezone"));
}

#[tokio::test]
async fn non_ascii_timezone_is_rejected() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/devices/{id}/motion_sensors"),
        None,
        Some(json!({ "name": "pir", "gpio_pin": 5, "timezone": "+a\u{e9}1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("timezone"));
}

#[tokio::test]
async fn malformed_payloads_are_bad_requests() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/devices/{id}/motion_sensors"),
        None,
        Some(json!({ "name": "pir", "gpio_pin": 5, "enable_scheduling": true,
                     "start_time": "25:00", "end_time": "06:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        "POST",
        &format!("/devices/{id}/relays"),
        None,
        Some(json!({ "name": "pump", "gpio_pin": "seventeen" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No body and no content type.
    let (status, body) = send(&app, "POST", "/devices", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, body) = send(&app, "GET", &format!("/devices/{id}/relays"), None, None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn relay_update_and_delete() {
    let app = app().await;
    let (id, _) = register(&app, "node").await;
    let relay = create_relay(&app, &id, 17).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/relays/{relay}"),
        None,
        Some(json!({ "status": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);

    let (status, _) = send(&app, "DELETE", &format!("/relays/{relay}"), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/relays/{relay}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
