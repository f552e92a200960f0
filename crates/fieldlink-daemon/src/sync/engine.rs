//! Periodic config sync.
//!
//! Each cycle pulls both definition lists, compares them by value with the
//! current snapshot and only persists and applies when something changed.
//! A failed cycle leaves the snapshot and the pins exactly as they were.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fieldlink_core::db::unix_timestamp;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{CentralApi, CentralClient};
use super::config::SyncConfig;
use super::error::SyncError;
use crate::binder::{ActuatorBinder, AppliedState};
use crate::store::{ConfigSnapshot, ConfigStore};

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No credentials; the node runs local-only.
    Skipped,
    /// Central returned the definitions already applied.
    Unchanged,
    Applied(AppliedState),
    Failed(String),
}

/// Health view of the sync loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub credentials: bool,
    pub last_attempt: Option<i64>,
    pub last_success: Option<i64>,
    pub last_error: Option<String>,
    pub version: Option<String>,
}

pub struct SyncClient {
    api: Option<Arc<dyn CentralApi>>,
    store: Arc<ConfigStore>,
    binder: Arc<ActuatorBinder>,
    interval: Duration,
    status: RwLock<SyncStatus>,
    local_only_logged: AtomicBool,
    /// Set when the last pass left channels unbound.
    retry_failed: AtomicBool,
}

impl SyncClient {
    pub fn new(
        api: Option<Arc<dyn CentralApi>>,
        store: Arc<ConfigStore>,
        binder: Arc<ActuatorBinder>,
        interval: Duration,
    ) -> Self {
        let status = SyncStatus {
            credentials: api.is_some(),
            ..SyncStatus::default()
        };
        Self {
            api,
            store,
            binder,
            interval,
            status: RwLock::new(status),
            local_only_logged: AtomicBool::new(false),
            retry_failed: AtomicBool::new(false),
        }
    }

    /// Build from settings. Missing credentials produce a local-only client.
    pub fn from_config(
        config: &SyncConfig,
        store: Arc<ConfigStore>,
        binder: Arc<ActuatorBinder>,
    ) -> Result<Self, SyncError> {
        let api: Option<Arc<dyn CentralApi>> = match config.endpoint() {
            Some((url, device_id, token)) => Some(Arc::new(CentralClient::new(
                url,
                device_id,
                token,
                config.request_timeout,
            )?)),
            None => None,
        };
        Ok(Self::new(api, store, binder, config.interval))
    }

    pub fn api(&self) -> Option<Arc<dyn CentralApi>> {
        self.api.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Drive the pins from the persisted snapshot before the first pull.
    pub async fn restore(&self) -> AppliedState {
        let snapshot = self.store.current().await;
        let applied = self.binder.apply(&snapshot).await;
        self.note_failures(&applied);
        info!(
            version = %snapshot.version,
            relays = snapshot.relays.len(),
            motion_sensors = snapshot.motion_sensors.len(),
            failures = applied.failures.len(),
            "Restored last-known-good config"
        );
        applied
    }

    /// Run one sync cycle.
    pub async fn cycle(&self) -> SyncOutcome {
        let Some(api) = self.api.as_deref() else {
            if !self.local_only_logged.swap(true, Ordering::Relaxed) {
                info!("No device credentials configured, running local-only");
            }
            return SyncOutcome::Skipped;
        };

        let now = unix_timestamp();
        let result = self.pull(api, now).await;

        let mut status = self.status.write().await;
        status.last_attempt = Some(now);
        match result {
            Ok(outcome) => {
                status.last_success = Some(now);
                status.last_error = None;
                status.version = Some(self.store.current().await.version.clone());
                outcome
            }
            Err(e) => {
                if e.is_auth() {
                    warn!(error = %e, "Central rejected device credentials");
                } else {
                    warn!(error = %e, "Config sync failed, keeping previous snapshot");
                }
                let message = e.to_string();
                status.last_error = Some(message.clone());
                SyncOutcome::Failed(message)
            }
        }
    }

    async fn pull(&self, api: &dyn CentralApi, now: i64) -> Result<SyncOutcome, SyncError> {
        let (relays, motion_sensors) =
            tokio::try_join!(api.fetch_relays(), api.fetch_motion_sensors())?;
        let candidate = ConfigSnapshot::from_pull(relays, motion_sensors, now)?;
        let current = self.store.current().await;

        if current.same_definitions(&candidate) {
            if self.retry_failed.load(Ordering::Relaxed) {
                // Bound channels keep their level so local commands survive.
                let applied = self.binder.bind_missing(&current).await;
                self.note_failures(&applied);
                return Ok(SyncOutcome::Applied(applied));
            }
            debug!(version = %current.version, "Config unchanged");
            return Ok(SyncOutcome::Unchanged);
        }

        let snapshot = self.store.replace(candidate).await?;
        let applied = self.binder.apply(&snapshot).await;
        self.note_failures(&applied);
        info!(
            version = %snapshot.version,
            claimed = applied.claimed.len(),
            released = applied.released.len(),
            toggled = applied.toggled.len(),
            failures = applied.failures.len(),
            "Applied new config"
        );
        Ok(SyncOutcome::Applied(applied))
    }

    fn note_failures(&self, applied: &AppliedState) {
        self.retry_failed
            .store(!applied.failures.is_empty(), Ordering::Relaxed);
    }

    /// Sync every interval until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Config sync started");
        loop {
            self.cycle().await;

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("Config sync stopping");
                    return;
                }
            }
        }
    }

    /// Push a relay's new level to central without waiting for it. Failures
    /// are logged and not retried.
    pub fn report_relay_status(&self, relay_id: i64, on: bool) -> Option<JoinHandle<()>> {
        let api = self.api.clone()?;
        Some(tokio::spawn(async move {
            match api.report_status(relay_id, on).await {
                Ok(()) => debug!(relay_id, on, "Relay status reported"),
                Err(e) => warn!(relay_id, error = %e, "Relay status report failed"),
            }
        }))
    }
}
