//! Linux sysfs GPIO (`/sys/class/gpio`).
//!
//! Outputs are driven by writing `value`. Inputs are polled from a tokio task
//! and a rising edge (0 to 1) is forwarded to the motion dispatcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{HardwareError, InputLine, OutputLine, PinBackend};

const DEFAULT_ROOT: &str = "/sys/class/gpio";
const DEFAULT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SysfsBackend {
    root: PathBuf,
    poll_interval: Duration,
}

impl Default for SysfsBackend {
    fn default() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }
}

impl SysfsBackend {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: DEFAULT_POLL,
        }
    }

    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    /// Export `pin` unless the kernel already exposes it. Returns whether we
    /// exported it (and so must unexport on release).
    fn export(&self, pin: u32) -> Result<bool, HardwareError> {
        if self.pin_dir(pin).is_dir() {
            return Ok(false);
        }
        write_attr(&self.root.join("export"), pin, &pin.to_string())?;
        Ok(true)
    }

    fn configure(&self, pin: u32, direction: &str) -> Result<Exported, HardwareError> {
        let exported = self.export(pin)?;
        let guard = Exported {
            root: self.root.clone(),
            pin,
            exported,
        };
        write_attr(&self.pin_dir(pin).join("direction"), pin, direction)?;
        Ok(guard)
    }
}

impl PinBackend for SysfsBackend {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn claim_output(&self, pin: u32) -> Result<Box<dyn OutputLine>, HardwareError> {
        let exported = self.configure(pin, "out")?;
        debug!(pin, "Claimed sysfs output");
        Ok(Box::new(SysfsOutput {
            value: self.pin_dir(pin).join("value"),
            _exported: exported,
            pin,
        }))
    }

    fn watch_input(
        &self,
        pin: u32,
        events: mpsc::UnboundedSender<u32>,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| HardwareError::Rejected {
                pin,
                message: e.to_string(),
            })?;
        let exported = self.configure(pin, "in")?;
        let value = self.pin_dir(pin).join("value");
        let interval = self.poll_interval;

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last = read_level(&value, pin).unwrap_or(false);
            loop {
                ticker.tick().await;
                let level = match read_level(&value, pin) {
                    Ok(level) => level,
                    Err(e) => {
                        warn!(pin, error = %e, "Failed to read input");
                        continue;
                    }
                };
                if level && !last && events.send(pin).is_err() {
                    break;
                }
                last = level;
            }
        });

        debug!(pin, "Watching sysfs input");
        Ok(Box::new(SysfsInput {
            pin,
            task,
            _exported: exported,
        }))
    }
}

fn write_attr(path: &Path, pin: u32, value: &str) -> Result<(), HardwareError> {
    std::fs::write(path, value).map_err(|source| HardwareError::Io { pin, source })
}

fn read_level(path: &Path, pin: u32) -> Result<bool, HardwareError> {
    let raw = std::fs::read_to_string(path).map_err(|source| HardwareError::Io { pin, source })?;
    Ok(raw.trim() == "1")
}

/// Unexports the pin on drop when this process exported it.
struct Exported {
    root: PathBuf,
    pin: u32,
    exported: bool,
}

impl Drop for Exported {
    fn drop(&mut self) {
        if self.exported {
            if let Err(e) = std::fs::write(self.root.join("unexport"), self.pin.to_string()) {
                warn!(pin = self.pin, error = %e, "Failed to unexport GPIO");
            }
        }
    }
}

struct SysfsOutput {
    pin: u32,
    value: PathBuf,
    _exported: Exported,
}

impl OutputLine for SysfsOutput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn level(&self) -> Result<bool, HardwareError> {
        read_level(&self.value, self.pin)
    }

    fn set_level(&mut self, on: bool) -> Result<(), HardwareError> {
        write_attr(&self.value, self.pin, if on { "1" } else { "0" })
    }
}

struct SysfsInput {
    pin: u32,
    task: JoinHandle<()>,
    _exported: Exported,
}

impl InputLine for SysfsInput {
    fn pin(&self) -> u32 {
        self.pin
    }
}

impl Drop for SysfsInput {
    fn drop(&mut self) {
        self.task.abort();
    }
}
