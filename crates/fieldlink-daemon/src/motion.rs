//! Motion handling.
//!
//! Every trigger, physical or injected, is evaluated against the sensor's
//! schedule and recorded locally. Allowed triggers are pushed to central from
//! a spawned task so a slow central never blocks the dispatcher; success marks
//! the local event escalated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fieldlink_core::schedule;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binder::ActuatorBinder;
use crate::storage::{DatabaseError, EventDatabase, MotionEvent};
use crate::store::ConfigStore;
use crate::sync::CentralApi;

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Motion sensor {0} is not defined")]
    UnknownSensor(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of one trigger.
pub struct TriggerOutcome {
    pub event: MotionEvent,
    /// Escalation push, when the trigger was allowed and credentials exist.
    /// Resolves to whether central accepted it.
    pub push: Option<JoinHandle<bool>>,
}

pub struct MotionMonitor {
    store: Arc<ConfigStore>,
    binder: Arc<ActuatorBinder>,
    events: EventDatabase,
    api: Option<Arc<dyn CentralApi>>,
    device_id: Option<String>,
}

impl MotionMonitor {
    pub fn new(
        store: Arc<ConfigStore>,
        binder: Arc<ActuatorBinder>,
        events: EventDatabase,
        api: Option<Arc<dyn CentralApi>>,
        device_id: Option<String>,
    ) -> Self {
        Self {
            store,
            binder,
            events,
            api,
            device_id,
        }
    }

    pub fn events(&self) -> &EventDatabase {
        &self.events
    }

    /// Handle one trigger of `sensor_id` observed at `now`.
    ///
    /// Inactive sensors are recorded but never escalated.
    pub async fn trigger(
        &self,
        sensor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, MotionError> {
        let snapshot = self.store.current().await;
        let sensor = snapshot
            .motion_sensors
            .get(&sensor_id)
            .ok_or(MotionError::UnknownSensor(sensor_id))?;

        let allowed = sensor.is_active && schedule::allowed_at(&sensor.schedule, now);
        let event = self
            .events
            .record_motion_event(sensor_id, self.device_id.as_deref(), now.timestamp(), allowed)
            .await?;

        info!(
            sensor_id,
            event_id = event.id,
            allowed,
            "Motion detected"
        );

        let push = if allowed { self.escalate(&event) } else { None };
        Ok(TriggerOutcome { event, push })
    }

    fn escalate(&self, event: &MotionEvent) -> Option<JoinHandle<bool>> {
        let api = self.api.clone()?;
        let events = self.events.clone();
        let (event_id, sensor_id, detected_at) = (event.id, event.sensor_id, event.detected_at);

        Some(tokio::spawn(async move {
            if let Err(e) = api.report_motion(sensor_id, detected_at).await {
                warn!(sensor_id, event_id, error = %e, "Motion escalation failed");
                return false;
            }
            match events.mark_escalated(event_id).await {
                Ok(_) => {
                    debug!(sensor_id, event_id, "Motion escalated");
                    true
                }
                Err(e) => {
                    warn!(event_id, error = %e, "Failed to mark event escalated");
                    false
                }
            }
        }))
    }

    /// Dispatch rising edges from the binder until shutdown or until the
    /// channel closes.
    pub async fn run(
        &self,
        mut pins: mpsc::UnboundedReceiver<u32>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                pin = pins.recv() => match pin {
                    Some(pin) => self.on_edge(pin).await,
                    None => return,
                },
                _ = shutdown.changed() => {
                    info!("Motion dispatcher stopping");
                    return;
                }
            }
        }
    }

    async fn on_edge(&self, pin: u32) {
        let Some(sensor_id) = self.binder.edge_source(pin).await else {
            debug!(pin, "Edge on unbound pin");
            return;
        };
        if let Err(e) = self.trigger(sensor_id, Utc::now()).await {
            warn!(pin, sensor_id, error = %e, "Failed to handle motion");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone};
    use fieldlink_core::SchedulePolicy;
    use fieldlink_proto::{MotionSensorConfig, RelayConfig};

    use super::*;
    use crate::gpio::SimulatedBackend;
    use crate::store::ConfigSnapshot;
    use crate::sync::SyncError;

    #[derive(Default)]
    struct FakeCentral {
        down: AtomicBool,
        motions: Mutex<Vec<(i64, i64)>>,
    }

    #[async_trait]
    impl CentralApi for FakeCentral {
        async fn fetch_relays(&self) -> Result<Vec<RelayConfig>, SyncError> {
            Ok(Vec::new())
        }

        async fn fetch_motion_sensors(&self) -> Result<Vec<MotionSensorConfig>, SyncError> {
            Ok(Vec::new())
        }

        async fn report_status(&self, _relay_id: i64, _status: bool) -> Result<(), SyncError> {
            Ok(())
        }

        async fn report_motion(&self, sensor_id: i64, detected_at: i64) -> Result<(), SyncError> {
            if self.down.load(Ordering::Relaxed) {
                return Err(SyncError::Api {
                    status: 502,
                    message: "Bad Gateway".into(),
                });
            }
            self.motions.lock().unwrap().push((sensor_id, detected_at));
            Ok(())
        }
    }

    /// Sensor 3 on pin 4 that only monitors 22:00-06:00 UTC.
    fn night_sensor(is_active: bool) -> MotionSensorConfig {
        MotionSensorConfig {
            id: 3,
            name: "yard".into(),
            gpio_pin: 4,
            is_active,
            schedule: SchedulePolicy {
                enable_scheduling: true,
                start_time: NaiveTime::from_hms_opt(22, 0, 0),
                end_time: NaiveTime::from_hms_opt(6, 0, 0),
                ..SchedulePolicy::default()
            },
        }
    }

    struct Fixture {
        bank: SimulatedBackend,
        binder: Arc<ActuatorBinder>,
        pins: Option<mpsc::UnboundedReceiver<u32>>,
        store: Arc<ConfigStore>,
        monitor: Arc<MotionMonitor>,
        central: Arc<FakeCentral>,
    }

    async fn fixture(sensor: MotionSensorConfig) -> Fixture {
        let bank = SimulatedBackend::new();
        let (binder, pins) = ActuatorBinder::new(Arc::new(bank.clone()));
        let binder = Arc::new(binder);
        let store = Arc::new(ConfigStore::in_memory());
        let snapshot = ConfigSnapshot::from_pull(vec![], vec![sensor], 0).unwrap();
        let snapshot = store.replace(snapshot).await.unwrap();
        binder.apply(&snapshot).await;

        let central = Arc::new(FakeCentral::default());
        let monitor = MotionMonitor::new(
            Arc::clone(&store),
            Arc::clone(&binder),
            EventDatabase::open_in_memory().await.unwrap(),
            Some(Arc::clone(&central) as Arc<dyn CentralApi>),
            Some("node-1".into()),
        );
        Fixture {
            bank,
            binder,
            pins: Some(pins),
            store,
            monitor: Arc::new(monitor),
            central,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        // 2024-01-03 is a Wednesday.
        Utc.with_ymd_and_hms(2024, 1, 3, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn disallowed_trigger_is_recorded_but_not_pushed() {
        let f = fixture(night_sensor(true)).await;
        let outcome = f.monitor.trigger(3, at(12)).await.unwrap();

        assert!(!outcome.event.allowed);
        assert!(outcome.push.is_none());
        assert_eq!(f.monitor.events().count_events(3).await.unwrap(), 1);
        assert!(f.central.motions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn allowed_trigger_is_escalated() {
        let f = fixture(night_sensor(true)).await;
        let outcome = f.monitor.trigger(3, at(23)).await.unwrap();

        assert!(outcome.event.allowed);
        assert!(outcome.push.unwrap().await.unwrap());
        assert_eq!(
            *f.central.motions.lock().unwrap(),
            vec![(3, at(23).timestamp())]
        );
        let stored = f.monitor.events().get_event(outcome.event.id).await.unwrap();
        assert!(stored.escalated);
        assert_eq!(stored.device_id.as_deref(), Some("node-1"));
    }

    #[tokio::test]
    async fn failed_push_leaves_event_unescalated() {
        let f = fixture(night_sensor(true)).await;
        f.central.down.store(true, Ordering::Relaxed);

        let outcome = f.monitor.trigger(3, at(1)).await.unwrap();
        assert!(!outcome.push.unwrap().await.unwrap());
        let stored = f.monitor.events().get_event(outcome.event.id).await.unwrap();
        assert!(stored.allowed);
        assert!(!stored.escalated);
    }

    #[tokio::test]
    async fn inactive_sensor_never_escalates() {
        let f = fixture(night_sensor(false)).await;
        let outcome = f.monitor.trigger(3, at(23)).await.unwrap();
        assert!(!outcome.event.allowed);
        assert!(outcome.push.is_none());
    }

    #[tokio::test]
    async fn unknown_sensor_is_rejected() {
        let f = fixture(night_sensor(true)).await;
        assert!(matches!(
            f.monitor.trigger(99, at(23)).await,
            Err(MotionError::UnknownSensor(99))
        ));
    }

    #[tokio::test]
    async fn physical_edge_goes_through_dispatch() {
        let mut f = fixture(night_sensor(true)).await;
        let (tx, rx) = watch::channel(false);
        let pins = f.pins.take().unwrap();
        let task = tokio::spawn({
            let monitor = Arc::clone(&f.monitor);
            async move { monitor.run(pins, rx).await }
        });

        assert!(f.bank.trigger(4));
        let mut recorded = 0;
        for _ in 0..100 {
            recorded = f.monitor.events().count_events(3).await.unwrap();
            if recorded > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorded, 1);
        assert_eq!(f.binder.sensor_for_pin(4).await, Some(3));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn edge_queued_before_unwatch_is_still_recorded() {
        let mut f = fixture(night_sensor(true)).await;
        assert!(f.bank.trigger(4));

        // Central deactivates the sensor before the dispatcher drains the edge.
        let snapshot = ConfigSnapshot::from_pull(vec![], vec![night_sensor(false)], 1).unwrap();
        let snapshot = f.store.replace(snapshot).await.unwrap();
        let applied = f.binder.apply(&snapshot).await;
        assert_eq!(applied.unwatched, vec![4]);
        assert_eq!(f.binder.sensor_for_pin(4).await, None);

        let (tx, rx) = watch::channel(false);
        let pins = f.pins.take().unwrap();
        let task = tokio::spawn({
            let monitor = Arc::clone(&f.monitor);
            async move { monitor.run(pins, rx).await }
        });

        let mut events = Vec::new();
        for _ in 0..100 {
            events = f.monitor.events().list_events(3, 10).await.unwrap();
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(events.len(), 1);
        assert!(!events[0].allowed);
        assert!(f.central.motions.lock().unwrap().is_empty());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
