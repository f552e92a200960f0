//! Config pull served to edge nodes.
//!
//! Definitions are readable without a token. When the caller does present
//! the device's own token, the pull counts as contact and refreshes
//! `last_seen`.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use fieldlink_proto::v1::{MotionSensorsConfigResponse, RelaysConfigResponse};
use tracing::{debug, warn};

use super::{AppState, header_token};
use crate::error::ApiError;
use crate::storage::{MotionSensor, Relay};

async fn touch_if_authenticated(state: &AppState, headers: &HeaderMap, device_id: &str) {
    let token = header_token(headers);
    if !state.auth.is_device(token.as_deref(), device_id).await {
        return;
    }
    if let Err(e) = state.db.touch_device(device_id).await {
        warn!(device_id = %device_id, error = %e, "Failed to record device contact");
    }
}

/// `GET /devices/{id}/relays/config`
pub async fn relays_config(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RelaysConfigResponse>, ApiError> {
    let device = state.db.get_device(&device_id).await?;
    touch_if_authenticated(&state, &headers, &device.id).await;

    let relays = state.db.list_relays(&device.id).await?;
    debug!(device_id = %device.id, count = relays.len(), "Serving relay config");

    Ok(Json(RelaysConfigResponse {
        device_id: device.id,
        relays: relays.iter().map(Relay::config).collect(),
    }))
}

/// `GET /devices/{id}/motion_sensors/config`
pub async fn motion_sensors_config(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MotionSensorsConfigResponse>, ApiError> {
    let device = state.db.get_device(&device_id).await?;
    touch_if_authenticated(&state, &headers, &device.id).await;

    let sensors = state.db.list_motion_sensors(&device.id).await?;
    debug!(device_id = %device.id, count = sensors.len(), "Serving motion sensor config");

    Ok(Json(MotionSensorsConfigResponse {
        device_id: device.id,
        motion_sensors: sensors.iter().map(MotionSensor::config).collect(),
    }))
}
