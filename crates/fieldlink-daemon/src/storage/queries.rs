//! Motion event queries.

use fieldlink_core::db::{DatabaseError, unix_timestamp};

use super::db::EventDatabase;
use super::models::MotionEvent;

const ALERT_WATERMARK: &str = "alert_watermark";

impl EventDatabase {
    // =========================================================================
    // Events
    // =========================================================================

    /// Append one motion event.
    pub async fn record_motion_event(
        &self,
        sensor_id: i64,
        device_id: Option<&str>,
        detected_at: i64,
        allowed: bool,
    ) -> Result<MotionEvent, DatabaseError> {
        let id = sqlx::query(
            "INSERT INTO motion_events (sensor_id, device_id, detected_at, allowed) VALUES (?, ?, ?, ?)",
        )
        .bind(sensor_id)
        .bind(device_id)
        .bind(detected_at)
        .bind(allowed)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        self.get_event(id).await
    }

    pub async fn get_event(&self, id: i64) -> Result<MotionEvent, DatabaseError> {
        sqlx::query_as::<_, MotionEvent>("SELECT * FROM motion_events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Motion event {id}")))
    }

    /// Mark an event as accepted by central. Returns false if it was already
    /// marked or does not exist.
    pub async fn mark_escalated(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE motion_events SET escalated = 1, escalated_at = ? WHERE id = ? AND escalated = 0",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent events for one sensor, newest first.
    pub async fn list_events(
        &self,
        sensor_id: i64,
        limit: i64,
    ) -> Result<Vec<MotionEvent>, DatabaseError> {
        let events = sqlx::query_as::<_, MotionEvent>(
            "SELECT * FROM motion_events WHERE sensor_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(events)
    }

    pub async fn count_events(&self, sensor_id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM motion_events WHERE sensor_id = ?")
            .bind(sensor_id)
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Escalation-eligible events newer than the last clear, newest first.
    pub async fn list_alerts(&self, limit: i64) -> Result<Vec<MotionEvent>, DatabaseError> {
        let watermark = self.alert_watermark().await?;
        let events = sqlx::query_as::<_, MotionEvent>(
            "SELECT * FROM motion_events WHERE allowed = 1 AND id > ? ORDER BY id DESC LIMIT ?",
        )
        .bind(watermark)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(events)
    }

    /// Advance the alert watermark past every recorded event. Returns the new
    /// watermark.
    pub async fn clear_alerts(&self) -> Result<i64, DatabaseError> {
        let latest: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM motion_events")
            .fetch_one(self.pool())
            .await?;

        sqlx::query(
            "INSERT INTO edge_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
        )
        .bind(ALERT_WATERMARK)
        .bind(latest)
        .execute(self.pool())
        .await?;

        self.alert_watermark().await
    }

    async fn alert_watermark(&self) -> Result<i64, DatabaseError> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM edge_state WHERE key = ?")
            .bind(ALERT_WATERMARK)
            .fetch_optional(self.pool())
            .await?;

        Ok(value.unwrap_or(0))
    }
}
