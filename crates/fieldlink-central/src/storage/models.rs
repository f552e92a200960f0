//! Data models for the central registry.

use fieldlink_core::schedule::{self, SchedulePolicy};
use fieldlink_proto::v1::{DeviceInfo, MotionSensorConfig, RelayConfig};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub description: Option<String>,
    pub token_hash: String,
    pub is_active: bool,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

impl Device {
    /// Public view without the token digest.
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            ip_address: self.ip_address.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Relay {
    pub id: i64,
    pub device_id: String,
    pub name: String,
    pub gpio_pin: u32,
    pub status: bool,
    pub last_update: i64,
}

impl Relay {
    pub fn config(&self) -> RelayConfig {
        RelayConfig {
            id: self.id,
            name: self.name.clone(),
            gpio_pin: self.gpio_pin,
            status: self.status,
        }
    }
}

/// Motion sensor as stored, with the policy columns still flat.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MotionSensorRow {
    pub id: i64,
    pub device_id: String,
    pub name: String,
    pub gpio_pin: u32,
    pub is_active: bool,
    pub enable_scheduling: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub weekday_monitoring: bool,
    pub weekend_monitoring: bool,
    pub timezone: String,
    pub sensitivity: String,
    pub delay_time: u32,
    pub trigger_mode: String,
    pub motion_count: i64,
    pub last_motion_detected: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotionSensor {
    pub id: i64,
    pub device_id: String,
    pub name: String,
    pub gpio_pin: u32,
    pub is_active: bool,
    #[serde(flatten)]
    pub schedule: SchedulePolicy,
    pub motion_count: i64,
    pub last_motion_detected: Option<i64>,
    pub created_at: i64,
}

impl MotionSensor {
    pub fn config(&self) -> MotionSensorConfig {
        MotionSensorConfig {
            id: self.id,
            name: self.name.clone(),
            gpio_pin: self.gpio_pin,
            is_active: self.is_active,
            schedule: self.schedule.clone(),
        }
    }
}

impl From<MotionSensorRow> for MotionSensor {
    fn from(row: MotionSensorRow) -> Self {
        // Rows are validated on write; anything unreadable falls back to the
        // permissive default for that field.
        let time = |v: Option<String>| v.and_then(|t| schedule::parse_time_of_day(&t).ok());
        let schedule = SchedulePolicy {
            enable_scheduling: row.enable_scheduling,
            start_time: time(row.start_time),
            end_time: time(row.end_time),
            weekday_monitoring: row.weekday_monitoring,
            weekend_monitoring: row.weekend_monitoring,
            timezone: row.timezone,
            sensitivity: row.sensitivity.parse().unwrap_or_default(),
            delay_time: row.delay_time,
            trigger_mode: row.trigger_mode.parse().unwrap_or_default(),
        };
        Self {
            id: row.id,
            device_id: row.device_id,
            name: row.name,
            gpio_pin: row.gpio_pin,
            is_active: row.is_active,
            schedule,
            motion_count: row.motion_count,
            last_motion_detected: row.last_motion_detected,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MotionLog {
    pub id: i64,
    pub motion_sensor_id: i64,
    pub device_id: String,
    pub detected_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusLog {
    pub id: i64,
    pub relay_id: i64,
    pub device_id: String,
    pub status: bool,
    pub created_at: i64,
}
