//! SQLite storage for the Fieldlink central registry.
//!
//! Provides persistence for devices, relay and motion sensor definitions, and
//! the append-only motion and status audit logs.

mod db;
mod models;
mod queries;
mod queries_logs;


pub use db::RegistryDatabase;
pub use fieldlink_core::db::DatabaseError;
pub use models::*;
pub use queries::{MotionSensorParams, RelayChanges};
