//! Last-known-good configuration snapshot.
//!
//! The snapshot is immutable once built; a reload swaps the `Arc` under a
//! lock. Every replacement is written to disk (temp file, then rename)
//! before it becomes current.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fieldlink_proto::{MotionSensorConfig, RelayConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Definitions pulled from central for this device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// SHA-256 of the canonical definition set. Empty for a node that has
    /// never synced.
    pub version: String,
    /// Unix seconds of the pull that produced this snapshot.
    pub fetched_at: i64,
    pub relays: BTreeMap<i64, RelayConfig>,
    pub motion_sensors: BTreeMap<i64, MotionSensorConfig>,
}

impl ConfigSnapshot {
    /// Build a snapshot from one pair of successful pulls.
    pub fn from_pull(
        relays: Vec<RelayConfig>,
        motion_sensors: Vec<MotionSensorConfig>,
        fetched_at: i64,
    ) -> Result<Self, StoreError> {
        let relays: BTreeMap<_, _> = relays.into_iter().map(|r| (r.id, r)).collect();
        let motion_sensors: BTreeMap<_, _> =
            motion_sensors.into_iter().map(|s| (s.id, s)).collect();
        let canonical = serde_json::to_vec(&(&relays, &motion_sensors))?;
        let version = hex::encode(Sha256::digest(&canonical));

        Ok(Self {
            version,
            fetched_at,
            relays,
            motion_sensors,
        })
    }

    /// Compare definitions by value, ignoring when they were fetched.
    pub fn same_definitions(&self, other: &Self) -> bool {
        self.relays == other.relays && self.motion_sensors == other.motion_sensors
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty() && self.motion_sensors.is_empty()
    }
}

/// Holder of the current snapshot.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load the persisted snapshot at `path`. A missing or unreadable file
    /// starts the node with no definitions.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match load(&path) {
            Ok(Some(snapshot)) => {
                info!(
                    path = %path.display(),
                    version = %snapshot.version,
                    relays = snapshot.relays.len(),
                    motion_sensors = snapshot.motion_sensors.len(),
                    "Loaded config snapshot"
                );
                snapshot
            }
            Ok(None) => ConfigSnapshot::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config snapshot");
                ConfigSnapshot::default()
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(ConfigSnapshot::default())),
        }
    }

    pub async fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Persist `snapshot`, then make it current. On a write failure the
    /// previous snapshot stays current.
    pub async fn replace(&self, snapshot: ConfigSnapshot) -> Result<Arc<ConfigSnapshot>, StoreError> {
        if let Some(path) = &self.path {
            persist(path, &snapshot).await?;
        }
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Arc::clone(&snapshot);
        Ok(snapshot)
    }
}

fn load(path: &Path) -> Result<Option<ConfigSnapshot>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn persist(path: &Path, snapshot: &ConfigSnapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
