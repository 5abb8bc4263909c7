//! Outbound events
//!
//! The coordinator publishes through two seams:
//!
//! - [`CoordinatorObserver`]: every registered observer sees every snapshot,
//!   fired scheduled feed, dispensed delta and refresh failure.
//! - [`FeederListeners`]: at most one [`DispenseListener`] per feeder id,
//!   looked up directly when that feeder's counter advances.

use crate::coordinator::CoordinatorState;
use crate::error::PetkitError;
use crate::model::{FeederId, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A scheduled slot whose time has passed today
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub feeder_id: FeederId,
    pub amount_grams: u32,
    /// Feeder-local seconds since midnight of the slot
    pub slot_time: u32,
}

/// Receives coordinator output; all methods default to no-ops
pub trait CoordinatorObserver: Send + Sync {
    /// Published once per successful cycle
    fn on_snapshot_updated(&self, _snapshot: &Snapshot, _state: &CoordinatorState) {}

    /// Published when the detector fires a slot
    fn on_scheduled_feed_fired(&self, _event: &FiredEvent) {}

    /// Published when the accumulator records a positive delta
    fn on_food_dispensed(&self, _feeder_id: &str, _delta_grams: u64) {}

    /// Published when a cycle fails; the last good snapshot stays current
    fn on_refresh_failed(&self, _error: &PetkitError) {}
}

/// Ordered list of observers
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn CoordinatorObserver>>,
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn CoordinatorObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl CoordinatorObserver for ObserverSet {
    fn on_snapshot_updated(&self, snapshot: &Snapshot, state: &CoordinatorState) {
        for observer in &self.observers {
            observer.on_snapshot_updated(snapshot, state);
        }
    }

    fn on_scheduled_feed_fired(&self, event: &FiredEvent) {
        for observer in &self.observers {
            observer.on_scheduled_feed_fired(event);
        }
    }

    fn on_food_dispensed(&self, feeder_id: &str, delta_grams: u64) {
        for observer in &self.observers {
            observer.on_food_dispensed(feeder_id, delta_grams);
        }
    }

    fn on_refresh_failed(&self, error: &PetkitError) {
        for observer in &self.observers {
            observer.on_refresh_failed(error);
        }
    }
}

/// Per-feeder sink for dispensed-food deltas
pub trait DispenseListener: Send + Sync {
    fn food_dispensed(&self, feeder_id: &str, delta_grams: u64);

    /// Called when the daily window resets, before the new day's first delta
    fn day_rolled_over(&self, _feeder_id: &str) {}
}

impl<F> DispenseListener for F
where
    F: Fn(&str, u64) + Send + Sync,
{
    fn food_dispensed(&self, feeder_id: &str, delta_grams: u64) {
        self(feeder_id, delta_grams)
    }
}

/// Feeder id to zero or one listener
#[derive(Clone, Default)]
pub struct FeederListeners {
    listeners: HashMap<FeederId, Arc<dyn DispenseListener>>,
}

impl std::fmt::Debug for FeederListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeederListeners")
            .field("feeders", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FeederListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning the one it replaces
    pub fn register(
        &mut self,
        feeder_id: impl Into<FeederId>,
        listener: Arc<dyn DispenseListener>,
    ) -> Option<Arc<dyn DispenseListener>> {
        self.listeners.insert(feeder_id.into(), listener)
    }

    pub fn unregister(&mut self, feeder_id: &str) -> Option<Arc<dyn DispenseListener>> {
        self.listeners.remove(feeder_id)
    }

    pub fn get(&self, feeder_id: &str) -> Option<&Arc<dyn DispenseListener>> {
        self.listeners.get(feeder_id)
    }

    /// Deliver a delta; silently does nothing if no listener is registered
    pub fn notify(&self, feeder_id: &str, delta_grams: u64) {
        match self.listeners.get(feeder_id) {
            Some(listener) => listener.food_dispensed(feeder_id, delta_grams),
            None => debug!("No dispense listener for feeder {}", feeder_id),
        }
    }

    /// Tell every listener a new day has started
    pub fn notify_rollover(&self) {
        for (feeder_id, listener) in &self.listeners {
            listener.day_rolled_over(feeder_id);
        }
    }
}

/// Listener that keeps and logs a running total for one day
#[derive(Debug, Default)]
pub struct RunningTotal {
    grams: AtomicU64,
}

impl RunningTotal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grams(&self) -> u64 {
        self.grams.load(Ordering::Relaxed)
    }

    /// Back to zero, returning the total it held
    pub fn reset(&self) -> u64 {
        self.grams.swap(0, Ordering::Relaxed)
    }
}

impl DispenseListener for RunningTotal {
    fn food_dispensed(&self, feeder_id: &str, delta_grams: u64) {
        let running = self.grams.fetch_add(delta_grams, Ordering::Relaxed) + delta_grams;
        info!(
            feeder_id = %feeder_id,
            delta_grams,
            running_total = running,
            "Watched feeder dispensed"
        );
    }

    fn day_rolled_over(&self, feeder_id: &str) {
        let previous = self.reset();
        info!(
            feeder_id = %feeder_id,
            previous_total = previous,
            "Watched total reset for new day"
        );
    }
}

/// Logs every coordinator event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CoordinatorObserver for TracingObserver {
    fn on_snapshot_updated(&self, snapshot: &Snapshot, state: &CoordinatorState) {
        for (feeder_id, record) in &snapshot.feeders {
            info!(
                feeder_id = %feeder_id,
                name = %record.name,
                dispensed_today = state.dispensed_today.get(feeder_id).copied().unwrap_or(0),
                fired_slots = state.fired_slots_today.get(feeder_id).map_or(0, |s| s.len()),
                "Feeder updated"
            );
        }
    }

    fn on_scheduled_feed_fired(&self, event: &FiredEvent) {
        info!(
            feeder_id = %event.feeder_id,
            amount_grams = event.amount_grams,
            slot_time = event.slot_time,
            "Scheduled feed detected"
        );
    }

    fn on_food_dispensed(&self, feeder_id: &str, delta_grams: u64) {
        info!(feeder_id = %feeder_id, delta_grams, "Food dispensed");
    }

    fn on_refresh_failed(&self, error: &PetkitError) {
        warn!(
            failure_kind = ?error.failure_kind(),
            "Refresh failed: {}",
            error.sanitized_message()
        );
    }
}

/// Serializable form of every coordinator event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    SnapshotUpdated {
        snapshot: Snapshot,
        dispensed_today: HashMap<FeederId, u64>,
    },
    ScheduledFeedFired(FiredEvent),
    FoodDispensed {
        feeder_id: FeederId,
        delta_grams: u64,
    },
    RefreshFailed {
        message: String,
        retryable: bool,
    },
}

/// Forwards events to a broadcast channel
///
/// Sending never blocks; receivers that fall behind observe `Lagged`.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: broadcast::Sender<CoordinatorEvent>,
}

impl ChannelObserver {
    /// Create an observer and its first receiver
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<CoordinatorEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: CoordinatorEvent) {
        // No receivers is not an error
        let _ = self.sender.send(event);
    }
}

impl CoordinatorObserver for ChannelObserver {
    fn on_snapshot_updated(&self, snapshot: &Snapshot, state: &CoordinatorState) {
        self.publish(CoordinatorEvent::SnapshotUpdated {
            snapshot: snapshot.clone(),
            dispensed_today: state.dispensed_today.clone(),
        });
    }

    fn on_scheduled_feed_fired(&self, event: &FiredEvent) {
        self.publish(CoordinatorEvent::ScheduledFeedFired(event.clone()));
    }

    fn on_food_dispensed(&self, feeder_id: &str, delta_grams: u64) {
        self.publish(CoordinatorEvent::FoodDispensed {
            feeder_id: feeder_id.to_string(),
            delta_grams,
        });
    }

    fn on_refresh_failed(&self, error: &PetkitError) {
        self.publish(CoordinatorEvent::RefreshFailed {
            message: error.sanitized_message(),
            retryable: error.is_retryable(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_listener_lookup_is_per_feeder() {
        let kitchen = Arc::new(RunningTotal::new());
        let mut listeners = FeederListeners::new();
        listeners.register("kitchen", kitchen.clone());

        listeners.notify("kitchen", 20);
        listeners.notify("hallway", 50);
        listeners.notify("kitchen", 5);

        assert_eq!(kitchen.grams(), 25);
    }

    #[test]
    fn test_register_replaces_existing() {
        let first = Arc::new(RunningTotal::new());
        let second = Arc::new(RunningTotal::new());
        let mut listeners = FeederListeners::new();

        assert!(listeners.register("f1", first.clone()).is_none());
        assert!(listeners.register("f1", second.clone()).is_some());

        listeners.notify("f1", 10);
        assert_eq!(first.grams(), 0);
        assert_eq!(second.grams(), 10);
    }

    #[test]
    fn test_closure_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut listeners = FeederListeners::new();
        listeners.register(
            "f1",
            Arc::new(move |id: &str, grams: u64| sink.lock().unwrap().push((id.to_string(), grams))),
        );

        listeners.notify("f1", 7);
        listeners.notify_rollover();
        assert_eq!(*seen.lock().unwrap(), vec![("f1".to_string(), 7)]);
    }

    #[test]
    fn test_rollover_resets_running_totals() {
        let kitchen = Arc::new(RunningTotal::new());
        let hallway = Arc::new(RunningTotal::new());
        let mut listeners = FeederListeners::new();
        listeners.register("kitchen", kitchen.clone());
        listeners.register("hallway", hallway.clone());

        listeners.notify("kitchen", 40);
        listeners.notify("hallway", 15);
        listeners.notify_rollover();
        listeners.notify("kitchen", 20);

        assert_eq!(kitchen.grams(), 20);
        assert_eq!(hallway.grams(), 0);
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_events() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let event = FiredEvent {
            feeder_id: "f1".to_string(),
            amount_grams: 20,
            slot_time: 28_800,
        };

        observer.on_scheduled_feed_fired(&event);
        observer.on_food_dispensed("f1", 20);

        assert_eq!(
            rx.recv().await.unwrap(),
            CoordinatorEvent::ScheduledFeedFired(event)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            CoordinatorEvent::FoodDispensed {
                feeder_id: "f1".to_string(),
                delta_grams: 20
            }
        );
    }
}
