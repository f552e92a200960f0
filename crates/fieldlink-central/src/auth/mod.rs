//! Device authentication for the central server.
//!
//! Every device owns exactly one bearer token. The registry keeps only its
//! SHA-256 digest; presented tokens are hashed, looked up, and compared in
//! constant time.

pub mod token;

pub use token::{generate_token, hash_token, verify_token};

use tracing::debug;

use crate::error::ApiError;
use crate::storage::{Device, RegistryDatabase};

/// Resolves device tokens and enforces ownership of device-originated writes.
#[derive(Clone)]
pub struct AuthGate {
    db: RegistryDatabase,
}

impl AuthGate {
    pub const fn new(db: RegistryDatabase) -> Self {
        Self { db }
    }

    /// Resolve a token to its device.
    ///
    /// Missing, unknown and inactive all map to `Unauthorized`.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Device, ApiError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing device token".into()))?;

        let digest = hash_token(token);
        let device = self
            .db
            .get_device_by_token_hash(&digest)
            .await?
            .filter(|d| verify_token(token, &d.token_hash))
            .ok_or_else(|| ApiError::Unauthorized("Invalid device token".into()))?;

        if !device.is_active {
            debug!(device_id = %device.id, "Rejected token of inactive device");
            return Err(ApiError::Unauthorized("Device is inactive".into()));
        }
        Ok(device)
    }

    /// Reject a write by `device` against a resource owned by `owner_id`.
    pub fn authorize_owner(device: &Device, owner_id: &str) -> Result<(), ApiError> {
        if device.id == owner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Device token does not own this resource".into(),
            ))
        }
    }

    /// Whether `token` authenticates as `device_id`. Never errors.
    pub async fn is_device(&self, token: Option<&str>, device_id: &str) -> bool {
        self.authenticate(token)
            .await
            .is_ok_and(|d| d.id == device_id)
    }
}
