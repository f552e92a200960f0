//! Operator CRUD over relay and motion sensor definitions, plus audit reads.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use fieldlink_proto::v1::{CreateRelayRequest, MotionSensorRequest, UpdateRelayRequest};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use super::extract::JsonBody;
use crate::error::ApiError;
use crate::storage::{
    MotionLog, MotionSensor, MotionSensorParams, Relay, RelayChanges, StatusLog,
};

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

impl LogQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

fn required_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    Ok(name)
}

// =========================================================================
// Relays
// =========================================================================

pub async fn list_relays(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<Relay>>, ApiError> {
    state.db.get_device(&device_id).await?;
    Ok(Json(state.db.list_relays(&device_id).await?))
}

pub async fn create_relay(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    JsonBody(req): JsonBody<CreateRelayRequest>,
) -> Result<(StatusCode, Json<Relay>), ApiError> {
    let name = required_name(&req.name)?;
    let relay = state
        .db
        .create_relay(&device_id, name, req.gpio_pin, req.status)
        .await?;

    info!(device_id = %device_id, relay_id = relay.id, gpio_pin = relay.gpio_pin, "Relay created");
    Ok((StatusCode::CREATED, Json(relay)))
}

pub async fn update_relay(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UpdateRelayRequest>,
) -> Result<Json<Relay>, ApiError> {
    let name = req.name.as_deref().map(required_name).transpose()?;
    let relay = state
        .db
        .update_relay(
            id,
            &RelayChanges {
                name,
                gpio_pin: req.gpio_pin,
                status: req.status,
            },
        )
        .await?;

    info!(relay_id = id, status = relay.status, "Relay updated");
    Ok(Json(relay))
}

pub async fn delete_relay(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_relay(id).await? {
        return Err(ApiError::NotFound(format!("Relay {id} not found")));
    }
    info!(relay_id = id, "Relay deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<StatusLog>>, ApiError> {
    state.db.get_relay(id).await?;
    Ok(Json(state.db.list_status_logs(id, query.limit()).await?))
}

// =========================================================================
// Motion sensors
// =========================================================================

pub async fn list_motion_sensors(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<MotionSensor>>, ApiError> {
    state.db.get_device(&device_id).await?;
    Ok(Json(state.db.list_motion_sensors(&device_id).await?))
}

pub async fn create_motion_sensor(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    JsonBody(req): JsonBody<MotionSensorRequest>,
) -> Result<(StatusCode, Json<MotionSensor>), ApiError> {
    let name = required_name(&req.name)?;
    req.schedule.validate()?;

    let sensor = state
        .db
        .create_motion_sensor(
            &device_id,
            &MotionSensorParams {
                name,
                gpio_pin: req.gpio_pin,
                is_active: req.is_active,
                schedule: &req.schedule,
            },
        )
        .await?;

    info!(device_id = %device_id, sensor_id = sensor.id, gpio_pin = sensor.gpio_pin, "Motion sensor created");
    Ok((StatusCode::CREATED, Json(sensor)))
}

pub async fn replace_motion_sensor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<MotionSensorRequest>,
) -> Result<Json<MotionSensor>, ApiError> {
    let name = required_name(&req.name)?;
    req.schedule.validate()?;

    let sensor = state
        .db
        .replace_motion_sensor(
            id,
            &MotionSensorParams {
                name,
                gpio_pin: req.gpio_pin,
                is_active: req.is_active,
                schedule: &req.schedule,
            },
        )
        .await?;

    info!(sensor_id = id, is_active = sensor.is_active, "Motion sensor updated");
    Ok(Json(sensor))
}

pub async fn delete_motion_sensor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_motion_sensor(id).await? {
        return Err(ApiError::NotFound(format!("Motion sensor {id} not found")));
    }
    info!(sensor_id = id, "Motion sensor deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn motion_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<MotionLog>>, ApiError> {
    state.db.get_motion_sensor(id).await?;
    Ok(Json(state.db.list_motion_logs(id, query.limit()).await?))
}
