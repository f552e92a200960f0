//! HTTP API for the central server.
//!
//! Routes are grouped by concern: operator CRUD over devices and channel
//! definitions, the config pull used by edge nodes, and the device-originated
//! telemetry ingest.

pub mod config_pull;
pub mod definitions;
pub mod devices;
pub mod extract;
pub mod ingest;

use axum::Json;
use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use fieldlink_proto::paths;
use fieldlink_proto::v1::DEVICE_TOKEN_HEADER;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthGate;
use crate::storage::RegistryDatabase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: RegistryDatabase,
    pub auth: AuthGate,
}

impl AppState {
    pub fn new(db: RegistryDatabase) -> Self {
        let auth = AuthGate::new(db.clone());
        Self { db, auth }
    }
}

/// Build the central router with tracing and permissive CORS for the
/// operator dashboard.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health))
        .route(
            "/devices",
            get(devices::list_devices).post(devices::register_device),
        )
        .route(
            "/devices/{id}",
            get(devices::get_device)
                .put(devices::update_device)
                .delete(devices::delete_device),
        )
        .route(
            "/devices/{id}/relays/config",
            get(config_pull::relays_config),
        )
        .route(
            "/devices/{id}/motion_sensors/config",
            get(config_pull::motion_sensors_config),
        )
        .route(
            "/devices/{id}/relays",
            get(definitions::list_relays).post(definitions::create_relay),
        )
        .route(
            "/devices/{id}/motion_sensors",
            get(definitions::list_motion_sensors).post(definitions::create_motion_sensor),
        )
        .route(
            "/relays/{id}",
            put(definitions::update_relay).delete(definitions::delete_relay),
        )
        .route("/relays/{id}/status", put(ingest::report_status))
        .route("/relays/{id}/status_logs", get(definitions::status_logs))
        .route(
            "/motion_sensors/{id}",
            put(definitions::replace_motion_sensor).delete(definitions::delete_motion_sensor),
        )
        .route("/motion_sensors/{id}/motion", post(ingest::report_motion))
        .route("/motion_sensors/{id}/events", get(definitions::motion_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Token from the `X-Device-Token` header, if present and readable.
pub(crate) fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
