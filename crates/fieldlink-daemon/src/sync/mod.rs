//! Pull-based config sync with central and best-effort telemetry pushes.

mod client;
mod config;
mod engine;
mod error;

pub use client::{CentralApi, CentralClient};
pub use config::SyncConfig;
pub use engine::{SyncClient, SyncOutcome, SyncStatus};
pub use error::SyncError;
