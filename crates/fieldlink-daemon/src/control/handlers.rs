use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use fieldlink_core::schedule;
use fieldlink_proto::{MotionSensorConfig, RelayAction};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{ControlError, ControlState};
use crate::binder::BinderError;
use crate::storage::MotionEvent;

const DEFAULT_ALERT_LIMIT: i64 = 100;
const MAX_ALERT_LIMIT: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct RelayView {
    pub id: i64,
    pub name: String,
    pub gpio_pin: u32,
    /// Level requested by central.
    pub desired: bool,
    /// Level read back from the pin; absent when the channel is not bound.
    pub state: Option<bool>,
}

/// `GET /relays`
pub async fn list_relays(
    State(state): State<ControlState>,
) -> Result<Json<Vec<RelayView>>, ControlError> {
    if !state.binder.is_available() {
        return Err(ControlError::Unavailable(
            "No actuator subsystem on this host".into(),
        ));
    }
    let snapshot = state.store.current().await;
    let live = state.binder.relay_states().await;

    let relays = snapshot
        .relays
        .values()
        .map(|r| RelayView {
            id: r.id,
            name: r.name.clone(),
            gpio_pin: r.gpio_pin,
            desired: r.status,
            state: live.get(&r.id).copied(),
        })
        .collect();
    Ok(Json(relays))
}

#[derive(Debug, Serialize)]
pub struct RelayCommandResponse {
    pub relay_id: i64,
    pub state: bool,
    pub changed: bool,
    /// Whether a status report to central was started.
    pub reported: bool,
}

/// `POST /relays/{id}` with `{"action": "on" | "off"}`.
///
/// The pin is set first; the report to central is best-effort and a failed
/// report does not undo the command.
#[instrument(skip_all)]
pub async fn set_relay(
    State(state): State<ControlState>,
    Path(relay_id): Path<i64>,
    body: Bytes,
) -> Result<Json<RelayCommandResponse>, ControlError> {
    if !state.binder.is_available() {
        return Err(ControlError::Unavailable(
            "No actuator subsystem on this host".into(),
        ));
    }
    let action: RelayAction = serde_json::from_slice(&body)
        .map_err(|e| ControlError::BadRequest(format!("Invalid relay command: {e}")))?;
    let on = action.desired().ok_or_else(|| {
        ControlError::BadRequest(format!(
            "Unknown action '{}', expected 'on' or 'off'",
            action.action
        ))
    })?;

    if !state.store.current().await.relays.contains_key(&relay_id) {
        return Err(ControlError::NotFound(format!("Relay {relay_id} not found")));
    }

    let changed = state
        .binder
        .set_relay(relay_id, on)
        .await
        .map_err(|e| match e {
            BinderError::NotFound(_) => ControlError::Hardware(format!(
                "Relay {relay_id} is defined but its pin is not bound"
            )),
            other => other.into(),
        })?;
    let reported = state.sync.report_relay_status(relay_id, on).is_some();

    info!(relay_id, on, changed, "Local relay command");
    Ok(Json(RelayCommandResponse {
        relay_id,
        state: on,
        changed,
        reported,
    }))
}

#[derive(Debug, Serialize)]
pub struct SensorView {
    #[serde(flatten)]
    pub config: MotionSensorConfig,
    /// `active` (watched), `inactive` (disabled centrally) or `unbound`
    /// (enabled but its pin could not be watched).
    pub status: &'static str,
    pub allowed_now: bool,
}

/// `GET /motion_sensors`
pub async fn list_motion_sensors(State(state): State<ControlState>) -> Json<Vec<SensorView>> {
    let snapshot = state.store.current().await;
    let watched = state.binder.watched_sensors().await;
    let now = Utc::now();

    let sensors = snapshot
        .motion_sensors
        .values()
        .map(|s| {
            let status = if !s.is_active {
                "inactive"
            } else if watched.contains(&s.id) {
                "active"
            } else {
                "unbound"
            };
            SensorView {
                allowed_now: s.is_active && schedule::allowed_at(&s.schedule, now),
                config: s.clone(),
                status,
            }
        })
        .collect();
    Json(sensors)
}

#[derive(Debug, Serialize)]
pub struct TestTriggerResponse {
    pub event: MotionEvent,
    pub escalating: bool,
}

/// `POST /motion_sensors/{id}/test`
#[instrument(skip_all)]
pub async fn test_motion(
    State(state): State<ControlState>,
    Path(sensor_id): Path<i64>,
) -> Result<Json<TestTriggerResponse>, ControlError> {
    let outcome = state.monitor.trigger(sensor_id, Utc::now()).await?;
    info!(sensor_id, event_id = outcome.event.id, "Test trigger");
    Ok(Json(TestTriggerResponse {
        escalating: outcome.push.is_some(),
        event: outcome.event,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `GET /motion_alerts`
pub async fn list_alerts(
    State(state): State<ControlState>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Vec<MotionEvent>>, ControlError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .clamp(1, MAX_ALERT_LIMIT);
    Ok(Json(state.monitor.events().list_alerts(limit).await?))
}

#[derive(Debug, Serialize)]
pub struct ClearAlertsResponse {
    pub watermark: i64,
}

/// `POST /motion_alerts/clear`
pub async fn clear_alerts(
    State(state): State<ControlState>,
) -> Result<Json<ClearAlertsResponse>, ControlError> {
    let watermark = state.monitor.events().clear_alerts().await?;
    info!(watermark, "Motion alerts cleared");
    Ok(Json(ClearAlertsResponse { watermark }))
}
