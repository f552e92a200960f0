//! HTTP client for the central server.

use std::time::Duration;

use async_trait::async_trait;
use fieldlink_proto::{
    DEVICE_TOKEN_HEADER, MotionReport, MotionSensorConfig, MotionSensorsConfigResponse,
    RelayConfig, RelaysConfigResponse, StatusReport, paths,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::error::SyncError;

/// Central operations used by the edge. A trait so the engine can be
/// driven without a network in tests.
#[async_trait]
pub trait CentralApi: Send + Sync {
    async fn fetch_relays(&self) -> Result<Vec<RelayConfig>, SyncError>;

    async fn fetch_motion_sensors(&self) -> Result<Vec<MotionSensorConfig>, SyncError>;

    async fn report_status(&self, relay_id: i64, status: bool) -> Result<(), SyncError>;

    async fn report_motion(&self, sensor_id: i64, detected_at: i64) -> Result<(), SyncError>;
}

/// reqwest-backed [`CentralApi`]. Every request carries the device token.
#[derive(Debug, Clone)]
pub struct CentralClient {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
}

impl CentralClient {
    pub fn new(
        base_url: &str,
        device_id: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        if base_url.trim().is_empty() {
            return Err(SyncError::Config("central_url is empty".into()));
        }
        if device_id.is_empty() || token.is_empty() {
            return Err(SyncError::Config("device credentials are empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(token)
            .map_err(|_| SyncError::Config("Invalid token format".into()))?;
        let name = HeaderName::from_bytes(DEVICE_TOKEN_HEADER.as_bytes())
            .map_err(|_| SyncError::Config("Invalid token header".into()))?;
        headers.insert(name, token_val);

        // reqwest is built with rustls-no-provider. Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-success statuses to [`SyncError::Api`].
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
        let message = resp
            .json::<fieldlink_proto::ErrorBody>()
            .await
            .map_or(fallback, |body| body.error);
        Err(SyncError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CentralApi for CentralClient {
    async fn fetch_relays(&self) -> Result<Vec<RelayConfig>, SyncError> {
        let resp = self
            .http
            .get(self.url(&paths::relays_config(&self.device_id)))
            .send()
            .await?;
        let body: RelaysConfigResponse = Self::check_status(resp).await?.json().await?;
        Ok(body.relays)
    }

    async fn fetch_motion_sensors(&self) -> Result<Vec<MotionSensorConfig>, SyncError> {
        let resp = self
            .http
            .get(self.url(&paths::motion_sensors_config(&self.device_id)))
            .send()
            .await?;
        let body: MotionSensorsConfigResponse = Self::check_status(resp).await?.json().await?;
        Ok(body.motion_sensors)
    }

    async fn report_status(&self, relay_id: i64, status: bool) -> Result<(), SyncError> {
        let resp = self
            .http
            .put(self.url(&paths::relay_status(relay_id)))
            .json(&StatusReport {
                status,
                token: None,
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn report_motion(&self, sensor_id: i64, detected_at: i64) -> Result<(), SyncError> {
        let resp = self
            .http
            .post(self.url(&paths::motion_report(sensor_id)))
            .json(&MotionReport {
                token: None,
                detected_at: Some(detected_at),
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_settings() {
        let timeout = Duration::from_secs(5);
        assert!(matches!(
            CentralClient::new("", "d1", "t", timeout),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            CentralClient::new("http://central", "d1", "", timeout),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            CentralClient::new("http://central", "d1", "bad\ntoken", timeout),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn urls_join_without_double_slash() {
        let client =
            CentralClient::new("http://central:5000/", "d1", "t", Duration::from_secs(5));
        let Ok(client) = client else {
            panic!("client should build");
        };
        assert_eq!(
            client.url(&paths::relays_config(client.device_id())),
            "http://central:5000/devices/d1/relays/config"
        );
    }
}
