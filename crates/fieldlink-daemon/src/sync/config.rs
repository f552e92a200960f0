use std::time::Duration;

use fieldlink_core::config::NodeConfig;

/// Settings for the sync loop and the central HTTP client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub central_url: Option<String>,
    pub device_id: Option<String>,
    pub device_token: Option<String>,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_node(&NodeConfig::default())
    }
}

impl SyncConfig {
    pub fn from_node(node: &NodeConfig) -> Self {
        Self {
            central_url: node.central_url.clone().filter(|u| !u.trim().is_empty()),
            device_id: node.device_id.clone(),
            device_token: node.device_token.clone(),
            interval: Duration::from_secs(node.sync_interval_secs.max(1)),
            request_timeout: Duration::from_secs(node.request_timeout_secs.max(1)),
        }
    }

    /// Central URL, device id and token, when all three are usable.
    pub fn endpoint(&self) -> Option<(&str, &str, &str)> {
        let url = self.central_url.as_deref()?;
        match (self.device_id.as_deref(), self.device_token.as_deref()) {
            (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => Some((url, id, token)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_requires_url_and_credentials() {
        let mut node = NodeConfig {
            device_id: Some("d1".into()),
            device_token: Some("t".into()),
            ..NodeConfig::default()
        };
        assert!(SyncConfig::from_node(&node).endpoint().is_none());

        node.central_url = Some("http://central:5000".into());
        let config = SyncConfig::from_node(&node);
        assert_eq!(config.endpoint(), Some(("http://central:5000", "d1", "t")));
        assert_eq!(config.interval, Duration::from_secs(5));

        node.device_token = Some(String::new());
        assert!(SyncConfig::from_node(&node).endpoint().is_none());
    }
}
