//! Fieldlink wire protocol
//!
//! JSON request and response bodies exchanged between edge nodes and the
//! central server. Both sides depend on this crate so that field names stay
//! in sync without duplicating structs.

pub mod paths;

/// Fieldlink v1 API definitions.
pub mod v1 {
    use fieldlink_core::SchedulePolicy;
    use serde::{Deserialize, Serialize};

    /// Header carrying a device's bearer token.
    pub const DEVICE_TOKEN_HEADER: &str = "X-Device-Token";

    // -----------------------------------------------------------------------
    // Config pull
    // -----------------------------------------------------------------------

    /// Relay definition as pulled by an edge node.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RelayConfig {
        pub id: i64,
        pub name: String,
        pub gpio_pin: u32,
        /// Desired output level.
        pub status: bool,
    }

    /// Motion sensor definition as pulled by an edge node.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MotionSensorConfig {
        pub id: i64,
        pub name: String,
        pub gpio_pin: u32,
        #[serde(default = "default_active")]
        pub is_active: bool,
        #[serde(flatten)]
        pub schedule: SchedulePolicy,
    }

    const fn default_active() -> bool {
        true
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RelaysConfigResponse {
        pub device_id: String,
        pub relays: Vec<RelayConfig>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MotionSensorsConfigResponse {
        pub device_id: String,
        pub motion_sensors: Vec<MotionSensorConfig>,
    }

    // -----------------------------------------------------------------------
    // Device-originated writes
    // -----------------------------------------------------------------------

    /// Relay status report. The token may travel in the body when the
    /// header cannot be set.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusReport {
        pub status: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub token: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusReportResponse {
        pub relay_id: i64,
        pub status: bool,
        pub last_update: i64,
    }

    /// Motion report. `detected_at` is the edge's detection time (unix
    /// seconds); the server clock is used when absent.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MotionReport {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub detected_at: Option<i64>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MotionReportResponse {
        pub motion_sensor_id: i64,
        pub motion_count: i64,
        pub last_motion_detected: i64,
    }

    // -----------------------------------------------------------------------
    // Operator CRUD
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct RegisterDeviceRequest {
        pub name: String,
        #[serde(default)]
        pub ip_address: Option<String>,
        #[serde(default)]
        pub description: Option<String>,
        /// Pre-shared token. Generated server-side when absent.
        #[serde(default)]
        pub token: Option<String>,
    }

    /// Public view of a device. Never carries the token.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeviceInfo {
        pub id: String,
        pub name: String,
        pub ip_address: Option<String>,
        pub description: Option<String>,
        pub is_active: bool,
        pub last_seen: Option<i64>,
        pub created_at: i64,
    }

    /// Registration result. The plaintext token is only ever returned here.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RegisterDeviceResponse {
        pub device: DeviceInfo,
        pub token: String,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct UpdateDeviceRequest {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub ip_address: Option<String>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub is_active: Option<bool>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CreateRelayRequest {
        pub name: String,
        pub gpio_pin: u32,
        #[serde(default)]
        pub status: bool,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct UpdateRelayRequest {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub gpio_pin: Option<u32>,
        #[serde(default)]
        pub status: Option<bool>,
    }

    /// Create or replace a motion sensor definition.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MotionSensorRequest {
        pub name: String,
        pub gpio_pin: u32,
        #[serde(default = "default_active")]
        pub is_active: bool,
        #[serde(flatten)]
        pub schedule: SchedulePolicy,
    }

    // -----------------------------------------------------------------------
    // Edge local control
    // -----------------------------------------------------------------------

    /// `{"action": "on" | "off"}`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RelayAction {
        pub action: String,
    }

    impl RelayAction {
        /// Desired level, or `None` for an unknown action.
        pub fn desired(&self) -> Option<bool> {
            match self.action.trim().to_ascii_lowercase().as_str() {
                "on" => Some(true),
                "off" => Some(false),
                _ => None,
            }
        }
    }

    /// Error body returned by every Fieldlink HTTP surface.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ErrorBody {
        pub error: String,
    }
}

pub use v1::*;
