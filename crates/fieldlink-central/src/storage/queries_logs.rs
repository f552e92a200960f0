//! Telemetry ingest and audit log queries.

use fieldlink_core::db::{DatabaseError, unix_timestamp};

use super::db::RegistryDatabase;
use super::models::{MotionLog, MotionSensor, Relay, StatusLog};

impl RegistryDatabase {
    // =========================================================================
    // Ingest
    // =========================================================================

    /// Store a reported relay status and append one audit row.
    pub async fn record_relay_status(
        &self,
        relay_id: i64,
        device_id: &str,
        status: bool,
    ) -> Result<Relay, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query("UPDATE relays SET status = ?, last_update = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(relay_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Relay {relay_id}")));
        }

        sqlx::query(
            "INSERT INTO status_logs (relay_id, device_id, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(relay_id)
        .bind(device_id)
        .bind(status)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_relay(relay_id).await
    }

    /// Count a motion detection and append one audit row. No deduplication.
    pub async fn record_motion(
        &self,
        sensor_id: i64,
        device_id: &str,
        detected_at: i64,
    ) -> Result<MotionSensor, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            "UPDATE motion_sensors SET motion_count = motion_count + 1, last_motion_detected = ? WHERE id = ?",
        )
        .bind(detected_at)
        .bind(sensor_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Motion sensor {sensor_id}")));
        }

        sqlx::query(
            "INSERT INTO motion_logs (motion_sensor_id, device_id, detected_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(sensor_id)
        .bind(device_id)
        .bind(detected_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_motion_sensor(sensor_id).await
    }

    // =========================================================================
    // Audit reads
    // =========================================================================

    /// Most recent status reports for a relay, newest first.
    pub async fn list_status_logs(
        &self,
        relay_id: i64,
        limit: i64,
    ) -> Result<Vec<StatusLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, StatusLog>(
            "SELECT * FROM status_logs WHERE relay_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(relay_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(logs)
    }

    /// Most recent motion reports for a sensor, newest first.
    pub async fn list_motion_logs(
        &self,
        sensor_id: i64,
        limit: i64,
    ) -> Result<Vec<MotionLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, MotionLog>(
            "SELECT * FROM motion_logs WHERE motion_sensor_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(logs)
    }
}
