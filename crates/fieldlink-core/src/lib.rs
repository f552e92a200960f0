//! `Fieldlink` Core Library
//!
//! Shared functionality for `Fieldlink` components:
//! - Motion schedule policy and window evaluation
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers shared by the central and edge stores
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod schedule;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use schedule::{SchedulePolicy, Sensitivity, TriggerMode};
