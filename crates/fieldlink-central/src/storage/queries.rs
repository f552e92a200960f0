//! Registry queries for devices and channel definitions.

use fieldlink_core::SchedulePolicy;
use fieldlink_core::db::unix_timestamp;
use sqlx::SqliteConnection;

use super::db::RegistryDatabase;
use super::models::{Device, MotionSensor, MotionSensorRow, Relay};
use fieldlink_core::db::DatabaseError;

/// Partial update of a relay definition.
#[derive(Debug, Default, Clone)]
pub struct RelayChanges<'a> {
    pub name: Option<&'a str>,
    pub gpio_pin: Option<u32>,
    pub status: Option<bool>,
}

/// Full motion sensor definition for create and replace.
#[derive(Debug, Clone)]
pub struct MotionSensorParams<'a> {
    pub name: &'a str,
    pub gpio_pin: u32,
    pub is_active: bool,
    pub schedule: &'a SchedulePolicy,
}

/// Which channel to ignore when checking pin uniqueness on update.
#[derive(Debug, Clone, Copy)]
enum Exclude {
    Nothing,
    Relay(i64),
    Sensor(i64),
}

/// Refuse `pin` when another relay or motion sensor of the device uses it.
async fn ensure_pin_free(
    conn: &mut SqliteConnection,
    device_id: &str,
    pin: u32,
    exclude: Exclude,
) -> Result<(), DatabaseError> {
    let (skip_relay, skip_sensor) = match exclude {
        Exclude::Nothing => (-1, -1),
        Exclude::Relay(id) => (id, -1),
        Exclude::Sensor(id) => (-1, id),
    };

    let (taken,): (i64,) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM relays WHERE device_id = ? AND gpio_pin = ? AND id != ?)
              + (SELECT COUNT(*) FROM motion_sensors WHERE device_id = ? AND gpio_pin = ? AND id != ?)",
    )
    .bind(device_id)
    .bind(pin)
    .bind(skip_relay)
    .bind(device_id)
    .bind(pin)
    .bind(skip_sensor)
    .fetch_one(&mut *conn)
    .await?;

    if taken > 0 {
        return Err(DatabaseError::Constraint(format!(
            "GPIO pin {pin} is already in use on device {device_id}"
        )));
    }
    Ok(())
}

async fn ensure_device(conn: &mut SqliteConnection, device_id: &str) -> Result<(), DatabaseError> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM devices WHERE id = ?")
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?;
    found
        .map(|_| ())
        .ok_or_else(|| DatabaseError::NotFound(format!("Device {device_id}")))
}

fn time_column(t: Option<chrono::NaiveTime>) -> Option<String> {
    t.map(|t| t.format("%H:%M").to_string())
}

impl RegistryDatabase {
    // =========================================================================
    // Device queries
    // =========================================================================

    /// Register a device. `token_hash` is the SHA-256 digest of its token.
    pub async fn create_device(
        &self,
        id: &str,
        name: &str,
        ip_address: Option<&str>,
        description: Option<&str>,
        token_hash: &str,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO devices (id, name, ip_address, description, token_hash, is_active, created_at) VALUES (?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(ip_address)
        .bind(description)
        .bind(token_hash)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(id).await
    }

    /// Get a device by ID.
    pub async fn get_device(&self, id: &str) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Find the device holding a token digest.
    pub async fn get_device_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    /// List all devices, oldest first.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices =
            sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY created_at, id")
                .fetch_all(self.pool())
                .await?;

        Ok(devices)
    }

    /// Update the descriptive fields and the active flag of a device.
    pub async fn update_device(
        &self,
        id: &str,
        name: Option<&str>,
        ip_address: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Device, DatabaseError> {
        let result = sqlx::query(
            "UPDATE devices SET
                name = COALESCE(?, name),
                ip_address = COALESCE(?, ip_address),
                description = COALESCE(?, description),
                is_active = COALESCE(?, is_active)
             WHERE id = ?",
        )
        .bind(name)
        .bind(ip_address)
        .bind(description)
        .bind(is_active)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Device {id}")));
        }
        self.get_device(id).await
    }

    /// Delete a device together with its definitions and logs.
    pub async fn delete_device(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful authenticated contact.
    pub async fn touch_device(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // Relay queries
    // =========================================================================

    /// Create a relay. Fails with `Constraint` if the pin is taken.
    pub async fn create_relay(
        &self,
        device_id: &str,
        name: &str,
        gpio_pin: u32,
        status: bool,
    ) -> Result<Relay, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        ensure_device(&mut *tx, device_id).await?;
        ensure_pin_free(&mut *tx, device_id, gpio_pin, Exclude::Nothing).await?;

        let result = sqlx::query(
            "INSERT INTO relays (device_id, name, gpio_pin, status, last_update) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(name)
        .bind(gpio_pin)
        .bind(status)
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_relay(result.last_insert_rowid()).await
    }

    /// Get a relay by ID.
    pub async fn get_relay(&self, id: i64) -> Result<Relay, DatabaseError> {
        sqlx::query_as::<_, Relay>("SELECT * FROM relays WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Relay {id}")))
    }

    /// List the relays of a device ordered by ID.
    pub async fn list_relays(&self, device_id: &str) -> Result<Vec<Relay>, DatabaseError> {
        let relays =
            sqlx::query_as::<_, Relay>("SELECT * FROM relays WHERE device_id = ? ORDER BY id")
                .bind(device_id)
                .fetch_all(self.pool())
                .await?;

        Ok(relays)
    }

    /// Apply a partial update to a relay.
    pub async fn update_relay(
        &self,
        id: i64,
        changes: &RelayChanges<'_>,
    ) -> Result<Relay, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let current = sqlx::query_as::<_, Relay>("SELECT * FROM relays WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Relay {id}")))?;

        if let Some(pin) = changes.gpio_pin {
            if pin != current.gpio_pin {
                ensure_pin_free(&mut *tx, &current.device_id, pin, Exclude::Relay(id)).await?;
            }
        }

        sqlx::query(
            "UPDATE relays SET name = ?, gpio_pin = ?, status = ?, last_update = ? WHERE id = ?",
        )
        .bind(changes.name.unwrap_or(&current.name))
        .bind(changes.gpio_pin.unwrap_or(current.gpio_pin))
        .bind(changes.status.unwrap_or(current.status))
        .bind(unix_timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_relay(id).await
    }

    /// Delete a relay.
    pub async fn delete_relay(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM relays WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Motion sensor queries
    // =========================================================================

    /// Create a motion sensor. Fails with `Constraint` if the pin is taken.
    pub async fn create_motion_sensor(
        &self,
        device_id: &str,
        params: &MotionSensorParams<'_>,
    ) -> Result<MotionSensor, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        ensure_device(&mut *tx, device_id).await?;
        ensure_pin_free(&mut *tx, device_id, params.gpio_pin, Exclude::Nothing).await?;

        let s = params.schedule;
        let result = sqlx::query(
            "INSERT INTO motion_sensors (device_id, name, gpio_pin, is_active, enable_scheduling, start_time, end_time,
                weekday_monitoring, weekend_monitoring, timezone, sensitivity, delay_time, trigger_mode, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(params.name)
        .bind(params.gpio_pin)
        .bind(params.is_active)
        .bind(s.enable_scheduling)
        .bind(time_column(s.start_time))
        .bind(time_column(s.end_time))
        .bind(s.weekday_monitoring)
        .bind(s.weekend_monitoring)
        .bind(&s.timezone)
        .bind(s.sensitivity.as_str())
        .bind(s.delay_time)
        .bind(s.trigger_mode.as_str())
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_motion_sensor(result.last_insert_rowid()).await
    }

    /// Get a motion sensor by ID.
    pub async fn get_motion_sensor(&self, id: i64) -> Result<MotionSensor, DatabaseError> {
        sqlx::query_as::<_, MotionSensorRow>("SELECT * FROM motion_sensors WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .map(MotionSensor::from)
            .ok_or_else(|| DatabaseError::NotFound(format!("Motion sensor {id}")))
    }

    /// List the motion sensors of a device ordered by ID.
    pub async fn list_motion_sensors(
        &self,
        device_id: &str,
    ) -> Result<Vec<MotionSensor>, DatabaseError> {
        let rows = sqlx::query_as::<_, MotionSensorRow>(
            "SELECT * FROM motion_sensors WHERE device_id = ? ORDER BY id",
        )
        .bind(device_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(MotionSensor::from).collect())
    }

    /// Replace a motion sensor's definition. Counters are kept.
    pub async fn replace_motion_sensor(
        &self,
        id: i64,
        params: &MotionSensorParams<'_>,
    ) -> Result<MotionSensor, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let current: (String, u32) =
            sqlx::query_as("SELECT device_id, gpio_pin FROM motion_sensors WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("Motion sensor {id}")))?;

        if params.gpio_pin != current.1 {
            ensure_pin_free(&mut *tx, &current.0, params.gpio_pin, Exclude::Sensor(id)).await?;
        }

        let s = params.schedule;
        sqlx::query(
            "UPDATE motion_sensors SET name = ?, gpio_pin = ?, is_active = ?, enable_scheduling = ?,
                start_time = ?, end_time = ?, weekday_monitoring = ?, weekend_monitoring = ?,
                timezone = ?, sensitivity = ?, delay_time = ?, trigger_mode = ?
             WHERE id = ?",
        )
        .bind(params.name)
        .bind(params.gpio_pin)
        .bind(params.is_active)
        .bind(s.enable_scheduling)
        .bind(time_column(s.start_time))
        .bind(time_column(s.end_time))
        .bind(s.weekday_monitoring)
        .bind(s.weekend_monitoring)
        .bind(&s.timezone)
        .bind(s.sensitivity.as_str())
        .bind(s.delay_time)
        .bind(s.trigger_mode.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_motion_sensor(id).await
    }

    /// Delete a motion sensor.
    pub async fn delete_motion_sensor(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM motion_sensors WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
