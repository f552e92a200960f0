//! Configuration resolution for Fieldlink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`~/.config/fieldlink/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`FIELDLINK_*`)
//! 5. CLI arguments (highest priority, applied by each binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Fieldlink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub central: CentralConfig,
}

/// Edge node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base URL of the central server, e.g. `http://10.0.0.2:5000`.
    pub central_url: Option<String>,
    pub device_id: Option<String>,
    pub device_token: Option<String>,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub snapshot_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub listen_addr: String,
    /// `sysfs`, `simulated` or `none`.
    pub gpio_backend: String,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            central_url: None,
            device_id: None,
            device_token: None,
            sync_interval_secs: 5,
            request_timeout_secs: 5,
            snapshot_path: None,
            database_path: None,
            listen_addr: "0.0.0.0:5001".to_string(),
            gpio_backend: "sysfs".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Device id and token, when both are configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.device_id.as_deref(), self.device_token.as_deref()) {
            (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => Some((id, token)),
            _ => None,
        }
    }
}

/// Central server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    pub listen_addr: String,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    if let Some(path) = explicit {
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Directory holding Fieldlink settings and state.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".fieldlink"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("fieldlink"))
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    let node = overlay.node;
    let defaults = NodeConfig::default();
    if node.central_url.is_some() {
        base.node.central_url = node.central_url;
    }
    if node.device_id.is_some() {
        base.node.device_id = node.device_id;
    }
    if node.device_token.is_some() {
        base.node.device_token = node.device_token;
    }
    if node.snapshot_path.is_some() {
        base.node.snapshot_path = node.snapshot_path;
    }
    if node.database_path.is_some() {
        base.node.database_path = node.database_path;
    }
    if node.sync_interval_secs != defaults.sync_interval_secs {
        base.node.sync_interval_secs = node.sync_interval_secs;
    }
    if node.request_timeout_secs != defaults.request_timeout_secs {
        base.node.request_timeout_secs = node.request_timeout_secs;
    }
    if node.listen_addr != defaults.listen_addr {
        base.node.listen_addr = node.listen_addr;
    }
    if node.gpio_backend != defaults.gpio_backend {
        base.node.gpio_backend = node.gpio_backend;
    }
    if node.log_level != defaults.log_level {
        base.node.log_level = node.log_level;
    }

    let central = overlay.central;
    let defaults = CentralConfig::default();
    if central.database_path.is_some() {
        base.central.database_path = central.database_path;
    }
    if central.listen_addr != defaults.listen_addr {
        base.central.listen_addr = central.listen_addr;
    }
    if central.log_level != defaults.log_level {
        base.central.log_level = central.log_level;
    }
}

/// Apply `FIELDLINK_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("FIELDLINK_CENTRAL_URL") {
        config.node.central_url = Some(val);
    }
    if let Some(val) = lookup("FIELDLINK_DEVICE_ID") {
        config.node.device_id = Some(val);
    }
    if let Some(val) = lookup("FIELDLINK_DEVICE_TOKEN") {
        config.node.device_token = Some(val);
    }
    if let Some(n) = lookup("FIELDLINK_SYNC_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.node.sync_interval_secs = n;
    }
    if let Some(n) = lookup("FIELDLINK_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.node.request_timeout_secs = n;
    }
    if let Some(val) = lookup("FIELDLINK_GPIO_BACKEND") {
        config.node.gpio_backend = val;
    }
    if let Some(val) = lookup("FIELDLINK_LOG_LEVEL") {
        config.node.log_level.clone_from(&val);
        config.central.log_level = val;
    }
}
