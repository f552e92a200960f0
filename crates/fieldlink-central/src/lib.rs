//! Fieldlink Central Server Library
//!
//! Core functionality for the central authority:
//! - `SQLite` registry for devices, relay and motion sensor definitions
//! - Device token authentication and ownership checks
//! - HTTP API: operator CRUD, config pull, telemetry ingest

pub mod auth;
pub mod error;
pub mod server;
pub mod storage;

pub use error::ApiError;
pub use server::{AppState, build_router};
