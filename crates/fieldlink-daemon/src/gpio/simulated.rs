//! In-memory pins for development hosts and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::{HardwareError, InputLine, OutputLine, PinBackend};

#[derive(Default)]
struct SimState {
    levels: HashMap<u32, bool>,
    writes: HashMap<u32, usize>,
    claimed: HashSet<u32>,
    watchers: HashMap<u32, mpsc::UnboundedSender<u32>>,
    failing: HashSet<u32>,
}

/// Simulated GPIO bank.
///
/// Cloning shares the bank, so a test can keep a handle for inspection
/// while the binder owns another.
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire a rising edge on a watched pin. Returns false when nothing
    /// watches it.
    pub fn trigger(&self, pin: u32) -> bool {
        self.lock()
            .watchers
            .get(&pin)
            .is_some_and(|tx| tx.send(pin).is_ok())
    }

    /// Current output level (false for pins never driven).
    pub fn level(&self, pin: u32) -> bool {
        self.lock().levels.get(&pin).copied().unwrap_or(false)
    }

    /// Number of level writes issued to `pin` since the bank was created.
    pub fn writes(&self, pin: u32) -> usize {
        self.lock().writes.get(&pin).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, pin: u32) -> bool {
        self.lock().claimed.contains(&pin)
    }

    /// Make every future claim of `pin` fail.
    pub fn fail_pin(&self, pin: u32) {
        self.lock().failing.insert(pin);
    }

    /// Let claims of a previously failing `pin` succeed again.
    pub fn heal_pin(&self, pin: u32) {
        self.lock().failing.remove(&pin);
    }

    fn claim(&self, pin: u32) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.failing.contains(&pin) {
            return Err(HardwareError::Rejected {
                pin,
                message: "simulated fault".into(),
            });
        }
        if !state.claimed.insert(pin) {
            return Err(HardwareError::Busy(pin));
        }
        Ok(())
    }
}

impl PinBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn claim_output(&self, pin: u32) -> Result<Box<dyn OutputLine>, HardwareError> {
        self.claim(pin)?;
        Ok(Box::new(SimOutput {
            pin,
            bank: self.clone(),
        }))
    }

    fn watch_input(
        &self,
        pin: u32,
        events: mpsc::UnboundedSender<u32>,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        self.claim(pin)?;
        self.lock().watchers.insert(pin, events);
        Ok(Box::new(SimInput {
            pin,
            bank: self.clone(),
        }))
    }
}

struct SimOutput {
    pin: u32,
    bank: SimulatedBackend,
}

impl OutputLine for SimOutput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn level(&self) -> Result<bool, HardwareError> {
        Ok(self.bank.level(self.pin))
    }

    fn set_level(&mut self, on: bool) -> Result<(), HardwareError> {
        let mut state = self.bank.lock();
        state.levels.insert(self.pin, on);
        *state.writes.entry(self.pin).or_default() += 1;
        Ok(())
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        self.bank.lock().claimed.remove(&self.pin);
    }
}

struct SimInput {
    pin: u32,
    bank: SimulatedBackend,
}

impl InputLine for SimInput {
    fn pin(&self) -> u32 {
        self.pin
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        let mut state = self.bank.lock();
        state.watchers.remove(&self.pin);
        state.claimed.remove(&self.pin);
    }
}
