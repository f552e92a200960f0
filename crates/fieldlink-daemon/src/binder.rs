//! Reconciles definitions with physical pins.
//!
//! The binder owns every claimed line. An apply pass releases channels whose
//! definition vanished or moved, claims missing ones, and writes an output
//! only when its live level differs from the desired one. Applying the same
//! snapshot twice therefore issues no hardware writes the second time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::gpio::{HardwareError, InputLine, OutputLine, PinBackend};
use crate::store::ConfigSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum BinderError {
    #[error("Relay {0} is not bound")]
    NotFound(i64),

    #[error("No actuator subsystem on this host")]
    Unavailable,

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// One channel that could not be bound or driven during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFailure {
    pub pin: u32,
    pub error: String,
}

/// What an apply pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedState {
    /// Output pins newly claimed.
    pub claimed: Vec<u32>,
    /// Output pins released.
    pub released: Vec<u32>,
    /// Relays whose level was written.
    pub toggled: Vec<i64>,
    /// Input pins newly watched.
    pub watched: Vec<u32>,
    /// Input pins no longer watched.
    pub unwatched: Vec<u32>,
    pub failures: Vec<ChannelFailure>,
}

impl AppliedState {
    /// True when the pass touched no hardware.
    pub fn is_noop(&self) -> bool {
        self.claimed.is_empty()
            && self.released.is_empty()
            && self.toggled.is_empty()
            && self.watched.is_empty()
            && self.unwatched.is_empty()
    }

    fn fail(&mut self, pin: u32, error: &HardwareError) {
        warn!(pin, error = %error, "Channel bind failed");
        self.failures.push(ChannelFailure {
            pin,
            error: error.to_string(),
        });
    }
}

struct BoundRelay {
    relay_id: i64,
    line: Box<dyn OutputLine>,
}

#[derive(Default)]
struct BinderState {
    outputs: HashMap<u32, BoundRelay>,
    relays: HashMap<i64, u32>,
    inputs: HashMap<u32, Box<dyn InputLine>>,
    /// pin -> motion sensor id
    dispatch: HashMap<u32, i64>,
    /// Last sensor of each pin that stopped being watched. Edges queued
    /// before the unwatch still resolve through it.
    retired: HashMap<u32, i64>,
}

impl BinderState {
    fn output_mut(&mut self, relay_id: i64) -> Result<&mut BoundRelay, BinderError> {
        let pin = self
            .relays
            .get(&relay_id)
            .ok_or(BinderError::NotFound(relay_id))?;
        self.outputs
            .get_mut(pin)
            .ok_or(BinderError::NotFound(relay_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Full,
    MissingOnly,
}

pub struct ActuatorBinder {
    backend: Arc<dyn PinBackend>,
    events: mpsc::UnboundedSender<u32>,
    state: Mutex<BinderState>,
}

impl ActuatorBinder {
    /// Create a binder over `backend`. Rising edges on watched inputs arrive
    /// on the returned receiver as pin numbers.
    pub fn new(backend: Arc<dyn PinBackend>) -> (Self, mpsc::UnboundedReceiver<u32>) {
        let (events, rx) = mpsc::unbounded_channel();
        let binder = Self {
            backend,
            events,
            state: Mutex::new(BinderState::default()),
        };
        (binder, rx)
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Drive the hardware toward `snapshot`. Failures are per channel and
    /// never stop the pass.
    pub async fn apply(&self, snapshot: &ConfigSnapshot) -> AppliedState {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut applied = AppliedState::default();
        release_stale(state, snapshot, &mut applied);
        self.bind(state, snapshot, Pass::Full, &mut applied);
        applied
    }

    /// Claim and watch only the channels of `snapshot` that have no live
    /// line. Bound relays are left at whatever level they hold.
    pub async fn bind_missing(&self, snapshot: &ConfigSnapshot) -> AppliedState {
        let mut guard = self.state.lock().await;
        let mut applied = AppliedState::default();
        self.bind(&mut guard, snapshot, Pass::MissingOnly, &mut applied);
        applied
    }

    fn bind(
        &self,
        state: &mut BinderState,
        snapshot: &ConfigSnapshot,
        pass: Pass,
        applied: &mut AppliedState,
    ) {
        for relay in snapshot.relays.values() {
            let pin = relay.gpio_pin;
            match state.outputs.get(&pin) {
                Some(bound) if bound.relay_id != relay.id => {
                    applied.fail(pin, &HardwareError::Busy(pin));
                    continue;
                }
                Some(_) if pass == Pass::MissingOnly => continue,
                Some(_) => {}
                None => match self.backend.claim_output(pin) {
                    Ok(line) => {
                        state.outputs.insert(
                            pin,
                            BoundRelay {
                                relay_id: relay.id,
                                line,
                            },
                        );
                        state.relays.insert(relay.id, pin);
                        applied.claimed.push(pin);
                    }
                    Err(e) => {
                        applied.fail(pin, &e);
                        continue;
                    }
                },
            }

            let Some(bound) = state.outputs.get_mut(&pin) else {
                continue;
            };
            match drive(bound.line.as_mut(), relay.status) {
                Ok(true) => {
                    info!(relay_id = relay.id, pin, on = relay.status, "Relay set");
                    applied.toggled.push(relay.id);
                }
                Ok(false) => {}
                Err(e) => applied.fail(pin, &e),
            }
        }

        for sensor in snapshot.motion_sensors.values().filter(|s| s.is_active) {
            let pin = sensor.gpio_pin;
            if state.dispatch.contains_key(&pin) {
                continue;
            }
            if state.outputs.contains_key(&pin) {
                applied.fail(pin, &HardwareError::Busy(pin));
                continue;
            }
            match self.backend.watch_input(pin, self.events.clone()) {
                Ok(line) => {
                    state.inputs.insert(pin, line);
                    state.dispatch.insert(pin, sensor.id);
                    state.retired.remove(&pin);
                    debug!(pin, sensor_id = sensor.id, "Watching input");
                    applied.watched.push(pin);
                }
                Err(e) => applied.fail(pin, &e),
            }
        }
    }

    /// Live level of a bound relay.
    pub async fn current_state(&self, relay_id: i64) -> Result<bool, BinderError> {
        if !self.is_available() {
            return Err(BinderError::Unavailable);
        }
        let mut state = self.state.lock().await;
        let bound = state.output_mut(relay_id)?;
        Ok(bound.line.level()?)
    }

    /// Set a bound relay. Returns whether a hardware write happened.
    pub async fn set_relay(&self, relay_id: i64, on: bool) -> Result<bool, BinderError> {
        if !self.is_available() {
            return Err(BinderError::Unavailable);
        }
        let mut state = self.state.lock().await;
        let bound = state.output_mut(relay_id)?;
        let changed = drive(bound.line.as_mut(), on)?;
        if changed {
            info!(relay_id, on, "Relay set locally");
        }
        Ok(changed)
    }

    /// Live levels of every bound relay. Unreadable lines are omitted.
    pub async fn relay_states(&self) -> BTreeMap<i64, bool> {
        let state = self.state.lock().await;
        state
            .outputs
            .values()
            .filter_map(|bound| bound.line.level().ok().map(|on| (bound.relay_id, on)))
            .collect()
    }

    pub async fn sensor_for_pin(&self, pin: u32) -> Option<i64> {
        self.state.lock().await.dispatch.get(&pin).copied()
    }

    /// Sensor an edge on `pin` belongs to, including a pin unwatched after
    /// the edge was queued.
    pub async fn edge_source(&self, pin: u32) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .dispatch
            .get(&pin)
            .or_else(|| state.retired.get(&pin))
            .copied()
    }

    /// Sensor ids with a live input watch.
    pub async fn watched_sensors(&self) -> BTreeSet<i64> {
        self.state.lock().await.dispatch.values().copied().collect()
    }
}

/// Release every channel whose definition no longer matches `snapshot`.
fn release_stale(state: &mut BinderState, snapshot: &ConfigSnapshot, applied: &mut AppliedState) {
    // Release first so a pin can move between channels in one pass.
    let stale_outputs: Vec<u32> = state
        .outputs
        .iter()
        .filter(|(pin, bound)| {
            snapshot
                .relays
                .get(&bound.relay_id)
                .is_none_or(|r| r.gpio_pin != **pin)
        })
        .map(|(pin, _)| *pin)
        .collect();
    for pin in stale_outputs {
        if let Some(bound) = state.outputs.remove(&pin) {
            state.relays.remove(&bound.relay_id);
            debug!(pin, relay_id = bound.relay_id, "Released output");
            applied.released.push(pin);
        }
    }

    let stale_inputs: Vec<u32> = state
        .dispatch
        .iter()
        .filter(|(pin, sensor_id)| {
            snapshot
                .motion_sensors
                .get(*sensor_id)
                .is_none_or(|s| !s.is_active || s.gpio_pin != **pin)
        })
        .map(|(pin, _)| *pin)
        .collect();
    for pin in stale_inputs {
        if let Some(sensor_id) = state.dispatch.remove(&pin) {
            state.retired.insert(pin, sensor_id);
        }
        state.inputs.remove(&pin);
        debug!(pin, "Unwatched input");
        applied.unwatched.push(pin);
    }
}

/// Write `on` unless the line already reads it. Returns whether it wrote.
fn drive(line: &mut dyn OutputLine, on: bool) -> Result<bool, HardwareError> {
    if line.level()? == on {
        return Ok(false);
    }
    line.set_level(on)?;
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fieldlink_core::SchedulePolicy;
    use fieldlink_proto::{MotionSensorConfig, RelayConfig};

    use super::*;
    use crate::gpio::{NoneBackend, SimulatedBackend};

    fn snapshot(relays: &[(i64, u32, bool)], sensors: &[(i64, u32, bool)]) -> ConfigSnapshot {
        let relays = relays
            .iter()
            .map(|&(id, gpio_pin, status)| RelayConfig {
                id,
                name: format!("r{id}"),
                gpio_pin,
                status,
            })
            .collect();
        let sensors = sensors
            .iter()
            .map(|&(id, gpio_pin, is_active)| MotionSensorConfig {
                id,
                name: format!("s{id}"),
                gpio_pin,
                is_active,
                schedule: SchedulePolicy::default(),
            })
            .collect();
        ConfigSnapshot::from_pull(relays, sensors, 0).unwrap()
    }

    fn binder() -> (SimulatedBackend, ActuatorBinder, mpsc::UnboundedReceiver<u32>) {
        let bank = SimulatedBackend::new();
        let (binder, rx) = ActuatorBinder::new(Arc::new(bank.clone()));
        (bank, binder, rx)
    }

    #[tokio::test]
    async fn second_apply_is_a_noop() {
        let (bank, binder, _rx) = binder();
        let snap = snapshot(&[(1, 17, true), (2, 18, false)], &[(3, 4, true)]);

        let first = binder.apply(&snap).await;
        assert_eq!(first.claimed.len(), 2);
        assert_eq!(first.toggled, vec![1]);
        assert_eq!(first.watched, vec![4]);
        assert_eq!(bank.writes(17), 1);

        let second = binder.apply(&snap).await;
        assert!(second.is_noop());
        assert_eq!(bank.writes(17), 1);
        assert_eq!(bank.writes(18), 0);
    }

    #[tokio::test]
    async fn changed_status_writes_once() {
        let (bank, binder, _rx) = binder();
        binder.apply(&snapshot(&[(1, 17, false)], &[])).await;
        let applied = binder.apply(&snapshot(&[(1, 17, true)], &[])).await;

        assert_eq!(applied.toggled, vec![1]);
        assert!(applied.claimed.is_empty());
        assert!(bank.level(17));
        assert!(binder.current_state(1).await.unwrap());
    }

    #[tokio::test]
    async fn removed_and_moved_channels_are_released() {
        let (bank, binder, _rx) = binder();
        binder
            .apply(&snapshot(&[(1, 17, false), (2, 18, false)], &[(3, 4, true)]))
            .await;

        let applied = binder.apply(&snapshot(&[(1, 27, false)], &[])).await;
        assert_eq!(applied.claimed, vec![27]);
        let mut released = applied.released.clone();
        released.sort_unstable();
        assert_eq!(released, vec![17, 18]);
        assert_eq!(applied.unwatched, vec![4]);
        assert!(!bank.is_claimed(17));
        assert!(!bank.is_claimed(4));
        assert!(matches!(
            binder.current_state(2).await,
            Err(BinderError::NotFound(2))
        ));
    }

    #[tokio::test]
    async fn inactive_sensor_is_not_watched() {
        let (bank, binder, _rx) = binder();
        binder.apply(&snapshot(&[], &[(3, 4, false)])).await;
        assert!(binder.watched_sensors().await.is_empty());
        assert!(!bank.trigger(4));
    }

    #[tokio::test]
    async fn dispatch_table_routes_edges() {
        let (bank, binder, mut rx) = binder();
        binder.apply(&snapshot(&[], &[(3, 4, true)])).await;

        assert!(bank.trigger(4));
        let pin = rx.recv().await.unwrap();
        assert_eq!(binder.sensor_for_pin(pin).await, Some(3));
        assert_eq!(binder.sensor_for_pin(5).await, None);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_pass() {
        let (bank, binder, _rx) = binder();
        bank.fail_pin(17);
        let applied = binder
            .apply(&snapshot(&[(1, 17, true), (2, 18, true)], &[]))
            .await;

        assert_eq!(applied.failures.len(), 1);
        assert_eq!(applied.failures[0].pin, 17);
        assert_eq!(applied.toggled, vec![2]);
        assert!(bank.level(18));
    }

    #[tokio::test]
    async fn bind_missing_leaves_bound_relays_alone() {
        let (bank, binder, _rx) = binder();
        bank.fail_pin(18);
        let snap = snapshot(&[(1, 17, false), (2, 18, true)], &[(3, 4, true)]);
        binder.apply(&snap).await;
        binder.set_relay(1, true).await.unwrap();

        bank.heal_pin(18);
        let applied = binder.bind_missing(&snap).await;
        assert_eq!(applied.claimed, vec![18]);
        assert_eq!(applied.toggled, vec![2]);
        assert!(applied.watched.is_empty());
        assert!(bank.level(17));
        assert_eq!(bank.writes(17), 1);
    }

    #[tokio::test]
    async fn unwatched_pin_still_resolves_queued_edges() {
        let (_, binder, _rx) = binder();
        binder.apply(&snapshot(&[], &[(3, 4, true)])).await;
        binder.apply(&snapshot(&[], &[(3, 4, false)])).await;

        assert_eq!(binder.sensor_for_pin(4).await, None);
        assert_eq!(binder.edge_source(4).await, Some(3));
        assert_eq!(binder.edge_source(5).await, None);

        binder.apply(&snapshot(&[], &[(7, 4, true)])).await;
        assert_eq!(binder.edge_source(4).await, Some(7));
    }

    #[tokio::test]
    async fn set_relay_skips_redundant_writes() {
        let (bank, binder, _rx) = binder();
        binder.apply(&snapshot(&[(1, 17, false)], &[])).await;

        assert!(binder.set_relay(1, true).await.unwrap());
        assert!(!binder.set_relay(1, true).await.unwrap());
        assert_eq!(bank.writes(17), 1);
        assert!(matches!(
            binder.set_relay(9, true).await,
            Err(BinderError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn unavailable_host_reports_unavailable() {
        let (binder, _rx) = ActuatorBinder::new(Arc::new(NoneBackend));
        let applied = binder.apply(&snapshot(&[(1, 17, true)], &[])).await;
        assert_eq!(applied.failures.len(), 1);
        assert!(matches!(
            binder.current_state(1).await,
            Err(BinderError::Unavailable)
        ));
    }
}
