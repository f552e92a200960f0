//! Device registration and management handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use fieldlink_proto::v1::{
    DeviceInfo, RegisterDeviceRequest, RegisterDeviceResponse, UpdateDeviceRequest,
};
use tracing::info;

use super::AppState;
use super::extract::JsonBody;
use crate::auth::{generate_token, hash_token};
use crate::error::ApiError;

/// Register a device and return its token. This is the only response that
/// ever carries the plaintext token.
pub async fn register_device(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<RegisterDeviceResponse>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Device name is required".into()));
    }

    let token = req
        .token
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(generate_token);
    let id = uuid::Uuid::new_v4().to_string();

    let device = state
        .db
        .create_device(
            &id,
            name,
            req.ip_address.as_deref(),
            req.description.as_deref(),
            &hash_token(&token),
        )
        .await?;

    info!(device_id = %device.id, name = %device.name, "Device registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device: device.info(),
            token,
        }),
    ))
}

pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    let devices = state.db.list_devices().await?;
    Ok(Json(devices.iter().map(crate::storage::Device::info).collect()))
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceInfo>, ApiError> {
    let device = state.db.get_device(&id).await?;
    Ok(Json(device.info()))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateDeviceRequest>,
) -> Result<Json<DeviceInfo>, ApiError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::Validation("Device name cannot be empty".into()));
    }

    let device = state
        .db
        .update_device(
            &id,
            req.name.as_deref().map(str::trim),
            req.ip_address.as_deref(),
            req.description.as_deref(),
            req.is_active,
        )
        .await?;

    info!(device_id = %device.id, is_active = device.is_active, "Device updated");
    Ok(Json(device.info()))
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_device(&id).await? {
        return Err(ApiError::NotFound(format!("Device {id} not found")));
    }
    info!(device_id = %id, "Device deleted");
    Ok(StatusCode::NO_CONTENT)
}
