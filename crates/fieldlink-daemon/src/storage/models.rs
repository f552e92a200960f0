use serde::Serialize;

/// One motion trigger observed on this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MotionEvent {
    pub id: i64,
    pub sensor_id: i64,
    pub device_id: Option<String>,
    pub detected_at: i64,
    /// Schedule verdict at detection time.
    pub allowed: bool,
    /// Central accepted the push.
    pub escalated: bool,
    pub escalated_at: Option<i64>,
}
