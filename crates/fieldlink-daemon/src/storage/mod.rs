//! Local SQLite motion event log.
//!
//! Every trigger lands here whether or not it was escalated to central, so
//! the node keeps a full history through a central outage.

mod db;
mod models;
mod queries;


pub use db::EventDatabase;
pub use fieldlink_core::db::DatabaseError;
pub use models::MotionEvent;
