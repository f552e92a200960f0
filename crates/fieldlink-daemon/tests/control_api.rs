#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fieldlink_core::SchedulePolicy;
use fieldlink_daemon::binder::ActuatorBinder;
use fieldlink_daemon::control::{ControlState, build_router};
use fieldlink_daemon::gpio::{NoneBackend, PinBackend, SimulatedBackend};
use fieldlink_daemon::motion::MotionMonitor;
use fieldlink_daemon::storage::EventDatabase;
use fieldlink_daemon::store::{ConfigSnapshot, ConfigStore};
use fieldlink_daemon::sync::SyncClient;
use fieldlink_proto::{MotionSensorConfig, RelayConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Relay 1 on pin 17 (off), sensor 3 on pin 4 (active, unscheduled),
/// sensor 5 on pin 6 (inactive).
async fn app_with(backend: Arc<dyn PinBackend>) -> axum::Router {
    let (binder, _pins) = ActuatorBinder::new(backend);
    let binder = Arc::new(binder);
    let store = Arc::new(ConfigStore::in_memory());

    let relays = vec![RelayConfig {
        id: 1,
        name: "pump".into(),
        gpio_pin: 17,
        status: false,
    }];
    let sensors = vec![
        MotionSensorConfig {
            id: 3,
            name: "hall".into(),
            gpio_pin: 4,
            is_active: true,
            schedule: SchedulePolicy::default(),
        },
        MotionSensorConfig {
            id: 5,
            name: "shed".into(),
            gpio_pin: 6,
            is_active: false,
            schedule: SchedulePolicy::default(),
        },
    ];
    let snapshot = store
        .replace(ConfigSnapshot::from_pull(relays, sensors, 0).unwrap())
        .await
        .unwrap();
    binder.apply(&snapshot).await;

    let sync = Arc::new(SyncClient::new(
        None,
        Arc::clone(&store),
        Arc::clone(&binder),
        Duration::from_secs(5),
    ));
    let monitor = Arc::new(MotionMonitor::new(
        Arc::clone(&store),
        Arc::clone(&binder),
        EventDatabase::open_in_memory().await.unwrap(),
        None,
        None,
    ));

    build_router(ControlState {
        binder,
        store,
        sync,
        monitor,
    })
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
    let req = Request::builder().method(method).uri(uri).body(body).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_reports_local_only_mode() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gpio_backend"], "simulated");
    assert_eq!(body["actuators_available"], true);
    assert_eq!(body["sync"]["credentials"], false);
}

#[tokio::test]
async fn relay_listing_shows_live_state() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;
    let (status, body) = send(&app, "GET", "/relays", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], 1);
    assert_eq!(body[0]["desired"], false);
    assert_eq!(body[0]["state"], false);
}

#[tokio::test]
async fn relay_command_drives_the_pin() {
    let bank = SimulatedBackend::new();
    let app = app_with(Arc::new(bank.clone())).await;

    let (status, body) = send(&app, "POST", "/relays/1", Some(json!({ "action": "on" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], true);
    assert_eq!(body["changed"], true);
    assert_eq!(body["reported"], false);
    assert!(bank.level(17));

    let (_, body) = send(&app, "POST", "/relays/1", Some(json!({ "action": "on" }))).await;
    assert_eq!(body["changed"], false);
    assert_eq!(bank.writes(17), 1);
}

#[tokio::test]
async fn relay_command_errors() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;

    let (status, body) = send(&app, "POST", "/relays/1", Some(json!({ "action": "toggle" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("toggle"));

    let (status, _) = send(&app, "POST", "/relays/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/relays/99", Some(json!({ "action": "on" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn defined_relay_with_unbound_pin_is_a_hardware_error() {
    let bank = SimulatedBackend::new();
    bank.fail_pin(17);
    let app = app_with(Arc::new(bank)).await;

    let (status, body) = send(&app, "POST", "/relays/1", Some(json!({ "action": "on" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("not bound"));

    let (_, body) = send(&app, "GET", "/relays", None).await;
    assert_eq!(body[0]["id"], 1);
    assert!(body[0]["state"].is_null());

    // Undefined relays stay 404.
    let (status, _) = send(&app, "POST", "/relays/2", Some(json!({ "action": "on" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn host_without_gpio_is_not_implemented() {
    let app = app_with(Arc::new(NoneBackend)).await;

    let (status, _) = send(&app, "GET", "/relays", None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    let (status, _) = send(&app, "POST", "/relays/1", Some(json!({ "action": "on" }))).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    // Definitions are still visible; nothing could be watched.
    let (status, body) = send(&app, "GET", "/motion_sensors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["status"], "unbound");
}

#[tokio::test]
async fn sensor_listing_derives_status() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;
    let (status, body) = send(&app, "GET", "/motion_sensors", None).await;
    assert_eq!(status, StatusCode::OK);

    let sensors = body.as_array().unwrap();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0]["id"], 3);
    assert_eq!(sensors[0]["status"], "active");
    assert_eq!(sensors[0]["allowed_now"], true);
    assert_eq!(sensors[0]["timezone"], "UTC");
    assert_eq!(sensors[1]["status"], "inactive");
    assert_eq!(sensors[1]["allowed_now"], false);
}

#[tokio::test]
async fn test_trigger_feeds_alerts_until_cleared() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;

    let (status, body) = send(&app, "POST", "/motion_sensors/3/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["allowed"], true);
    assert_eq!(body["escalating"], false);

    // Disallowed triggers are logged but never alert.
    send(&app, "POST", "/motion_sensors/5/test", None).await;

    let (_, alerts) = send(&app, "GET", "/motion_alerts", None).await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["sensor_id"], 3);

    let (status, body) = send(&app, "POST", "/motion_alerts/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watermark"], 2);

    let (_, alerts) = send(&app, "GET", "/motion_alerts?limit=10", None).await;
    assert!(alerts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_trigger_for_unknown_sensor_is_404() {
    let app = app_with(Arc::new(SimulatedBackend::new())).await;
    let (status, _) = send(&app, "POST", "/motion_sensors/42/test", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
