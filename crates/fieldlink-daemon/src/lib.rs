//! Fieldlink edge daemon.
//!
//! Pulls relay and motion sensor definitions from central, drives GPIO to
//! match them, evaluates motion against each sensor's schedule and escalates
//! allowed events. Keeps working from its last-known-good snapshot while
//! central is unreachable.

pub mod binder;
pub mod control;
pub mod gpio;
pub mod motion;
pub mod storage;
pub mod store;
pub mod sync;
