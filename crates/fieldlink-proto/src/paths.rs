//! HTTP paths shared between central and edge nodes.
//!
//! The central router and the edge client build their paths from the same
//! helpers so that routes and requests cannot drift apart. Both routers
//! serve liveness on [`HEALTH`].

/// `GET /health`
pub const HEALTH: &str = "/health";

/// `GET /devices/{id}/relays/config`
pub fn relays_config(device_id: &str) -> String {
    format!("/devices/{device_id}/relays/config")
}

/// `GET /devices/{id}/motion_sensors/config`
pub fn motion_sensors_config(device_id: &str) -> String {
    format!("/devices/{device_id}/motion_sensors/config")
}

/// `PUT /relays/{id}/status`
pub fn relay_status(relay_id: i64) -> String {
    format!("/relays/{relay_id}/status")
}

/// `POST /motion_sensors/{id}/motion`
pub fn motion_report(sensor_id: i64) -> String {
    format!("/motion_sensors/{sensor_id}/motion")
}
