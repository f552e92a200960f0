//! Device-originated telemetry: relay status and motion reports.
//!
//! Checks run in a fixed order: token (401), target (404), ownership (403).
//! The mutation and its audit row are committed together.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use fieldlink_core::db::unix_timestamp;
use fieldlink_proto::v1::{
    MotionReport, MotionReportResponse, StatusReport, StatusReportResponse,
};
use tracing::{info, instrument};

use super::{AppState, header_token};
use crate::auth::AuthGate;
use crate::error::ApiError;

/// `PUT /relays/{id}/status`
#[instrument(skip_all)]
pub async fn report_status(
    State(state): State<AppState>,
    Path(relay_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusReportResponse>, ApiError> {
    let parsed = serde_json::from_slice::<StatusReport>(&body);
    let body_token = parsed.as_ref().ok().and_then(|r| r.token.clone());
    let token = header_token(&headers).or(body_token);

    let device = state.auth.authenticate(token.as_deref()).await?;
    let report = parsed.map_err(|e| ApiError::Validation(format!("Invalid status report: {e}")))?;

    let relay = state.db.get_relay(relay_id).await?;
    AuthGate::authorize_owner(&device, &relay.device_id)?;

    let relay = state
        .db
        .record_relay_status(relay_id, &device.id, report.status)
        .await?;

    info!(device_id = %device.id, relay_id, status = relay.status, "Relay status reported");
    Ok(Json(StatusReportResponse {
        relay_id: relay.id,
        status: relay.status,
        last_update: relay.last_update,
    }))
}

/// `POST /motion_sensors/{id}/motion`
#[instrument(skip_all)]
pub async fn report_motion(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MotionReportResponse>, ApiError> {
    let parsed = if body.is_empty() {
        Ok(MotionReport::default())
    } else {
        serde_json::from_slice::<MotionReport>(&body)
    };
    let body_token = parsed.as_ref().ok().and_then(|r| r.token.clone());
    let token = header_token(&headers).or(body_token);

    let device = state.auth.authenticate(token.as_deref()).await?;
    let report = parsed.map_err(|e| ApiError::Validation(format!("Invalid motion report: {e}")))?;

    let sensor = state.db.get_motion_sensor(sensor_id).await?;
    AuthGate::authorize_owner(&device, &sensor.device_id)?;

    let detected_at = report.detected_at.unwrap_or_else(unix_timestamp);
    let sensor = state
        .db
        .record_motion(sensor_id, &device.id, detected_at)
        .await?;

    info!(device_id = %device.id, sensor_id, motion_count = sensor.motion_count, "Motion reported");
    Ok(Json(MotionReportResponse {
        motion_sensor_id: sensor.id,
        motion_count: sensor.motion_count,
        last_motion_detected: sensor.last_motion_detected.unwrap_or(detected_at),
    }))
}
