//! Local control surface of the edge node.
//!
//! Operators on the LAN can inspect cached definitions, drive relays and
//! fire test triggers without going through central.

mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fieldlink_proto::paths;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ControlError;

use crate::binder::ActuatorBinder;
use crate::motion::MotionMonitor;
use crate::store::ConfigStore;
use crate::sync::{SyncClient, SyncStatus};

/// Shared state for control handlers.
#[derive(Clone)]
pub struct ControlState {
    pub binder: Arc<ActuatorBinder>,
    pub store: Arc<ConfigStore>,
    pub sync: Arc<SyncClient>,
    pub monitor: Arc<MotionMonitor>,
}

pub fn build_router(state: ControlState) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health))
        .route("/relays", get(handlers::list_relays))
        .route("/relays/{id}", post(handlers::set_relay))
        .route("/motion_sensors", get(handlers::list_motion_sensors))
        .route("/motion_sensors/{id}/test", post(handlers::test_motion))
        .route("/motion_alerts", get(handlers::list_alerts))
        .route("/motion_alerts/clear", post(handlers::clear_alerts))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    gpio_backend: &'static str,
    actuators_available: bool,
    snapshot_version: String,
    sync: SyncStatus,
}

async fn health(State(state): State<ControlState>) -> Json<Health> {
    let snapshot = state.store.current().await;
    Json(Health {
        status: "ok",
        gpio_backend: state.binder.backend_name(),
        actuators_available: state.binder.is_available(),
        snapshot_version: snapshot.version.clone(),
        sync: state.sync.status().await,
    })
}
