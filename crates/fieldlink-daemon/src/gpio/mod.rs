//! Physical pin access.
//!
//! The binder talks to hardware only through [`PinBackend`]. Three backends
//! exist:
//! - `sysfs`: Linux `/sys/class/gpio`
//! - `simulated`: in-memory pins that record every transition
//! - `none`: a host without an actuator subsystem

mod simulated;
mod sysfs;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use simulated::SimulatedBackend;
pub use sysfs::SysfsBackend;

/// Hardware access errors. Always scoped to one channel.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("No actuator subsystem on this host")]
    Unavailable,

    #[error("GPIO {0} is already claimed")]
    Busy(u32),

    #[error("GPIO {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin}: {message}")]
    Rejected { pin: u32, message: String },

    #[error("Unknown GPIO backend '{0}'")]
    UnknownBackend(String),
}

/// A claimed output pin. Dropping it releases the pin.
pub trait OutputLine: Send + Sync {
    fn pin(&self) -> u32;

    /// Live level as read back from the pin.
    fn level(&self) -> Result<bool, HardwareError>;

    fn set_level(&mut self, on: bool) -> Result<(), HardwareError>;
}

/// A watched input pin. Dropping it stops the watch and releases the pin.
pub trait InputLine: Send + Sync {
    fn pin(&self) -> u32;
}

/// Source of output and input lines.
pub trait PinBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this host can drive pins at all.
    fn is_available(&self) -> bool;

    fn claim_output(&self, pin: u32) -> Result<Box<dyn OutputLine>, HardwareError>;

    /// Watch `pin` for rising edges; each edge sends the pin number on
    /// `events`.
    fn watch_input(
        &self,
        pin: u32,
        events: mpsc::UnboundedSender<u32>,
    ) -> Result<Box<dyn InputLine>, HardwareError>;
}

/// Backend for hosts without GPIO. Every claim fails with `Unavailable`.
#[derive(Debug, Default)]
pub struct NoneBackend;

impl PinBackend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn claim_output(&self, _pin: u32) -> Result<Box<dyn OutputLine>, HardwareError> {
        Err(HardwareError::Unavailable)
    }

    fn watch_input(
        &self,
        _pin: u32,
        _events: mpsc::UnboundedSender<u32>,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        Err(HardwareError::Unavailable)
    }
}

/// Build a backend from its configured name.
pub fn backend_from_name(name: &str) -> Result<Arc<dyn PinBackend>, HardwareError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sysfs" => Ok(Arc::new(SysfsBackend::default())),
        "simulated" | "sim" => Ok(Arc::new(SimulatedBackend::new())),
        "none" => Ok(Arc::new(NoneBackend)),
        other => Err(HardwareError::UnknownBackend(other.to_string())),
    }
}
