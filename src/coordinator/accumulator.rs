//! Dispensed-food accumulator
//!
//! Reconstructs "dispensed today" from successive readings of each
//! feeder's lifetime counter. A reading lower than the previous one (device
//! reset or vendor glitch) contributes nothing.

use crate::events::{DispenseListener, FeederListeners};
use crate::model::FeederId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Grams dispensed between two counter readings
///
/// Zero on the first observation and whenever the counter went backwards.
pub fn dispensed_delta(lifetime_total: u64, previous: Option<u64>) -> u64 {
    previous.map_or(0, |prev| lifetime_total.saturating_sub(prev))
}

/// Accumulates per-feeder deltas and notifies per-feeder listeners
#[derive(Debug, Clone, Default)]
pub struct DispensedFoodAccumulator {
    listeners: FeederListeners,
}

impl DispensedFoodAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(listeners: FeederListeners) -> Self {
        Self { listeners }
    }

    /// Register the running-total listener for one feeder
    pub fn register_listener(
        &mut self,
        feeder_id: impl Into<FeederId>,
        listener: Arc<dyn DispenseListener>,
    ) -> Option<Arc<dyn DispenseListener>> {
        self.listeners.register(feeder_id, listener)
    }

    pub fn unregister_listener(&mut self, feeder_id: &str) -> Option<Arc<dyn DispenseListener>> {
        self.listeners.unregister(feeder_id)
    }

    pub fn listeners(&self) -> &FeederListeners {
        &self.listeners
    }

    /// Reset per-feeder listeners at the start of a new day
    pub fn start_new_day(&self) {
        self.listeners.notify_rollover();
    }

    /// Fold one counter reading into `dispensed_today`, returning the delta
    pub fn observe(
        &self,
        dispensed_today: &mut HashMap<FeederId, u64>,
        feeder_id: &str,
        lifetime_total: u64,
        previous: Option<u64>,
    ) -> u64 {
        let delta = dispensed_delta(lifetime_total, previous);

        let total = dispensed_today.entry(feeder_id.to_string()).or_insert(0);
        *total = total.saturating_add(delta);

        if delta > 0 {
            debug!(
                "Feeder {} dispensed {}g (today: {}g)",
                feeder_id, delta, total
            );
            self.listeners.notify(feeder_id, delta);
        } else if let Some(prev) = previous.filter(|prev| lifetime_total < *prev) {
            warn!(
                "Feeder {} lifetime counter went backwards ({} -> {}), ignoring",
                feeder_id, prev, lifetime_total
            );
        }

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunningTotal;

    #[test]
    fn test_first_observation_yields_zero() {
        let accumulator = DispensedFoodAccumulator::new();
        let mut today = HashMap::new();

        assert_eq!(accumulator.observe(&mut today, "f1", 9_999, None), 0);
        assert_eq!(today.get("f1"), Some(&0));
    }

    #[test]
    fn test_scenario_totals() {
        let accumulator = DispensedFoodAccumulator::new();
        let mut today = HashMap::new();

        let deltas = vec![
            accumulator.observe(&mut today, "F1", 100, None),
            accumulator.observe(&mut today, "F1", 150, Some(100)),
            accumulator.observe(&mut today, "F1", 150, Some(150)),
        ];

        assert_eq!(deltas, vec![0, 50, 0]);
        assert_eq!(today["F1"], 50);
    }

    #[test]
    fn test_backwards_counter_clamped() {
        let accumulator = DispensedFoodAccumulator::new();
        let mut today = HashMap::new();

        accumulator.observe(&mut today, "f1", 120, Some(100));
        assert_eq!(accumulator.observe(&mut today, "f1", 30, Some(120)), 0);
        assert_eq!(accumulator.observe(&mut today, "f1", 45, Some(30)), 15);
        assert_eq!(today["f1"], 35);
    }

    #[test]
    fn test_listener_only_sees_positive_deltas() {
        let total = Arc::new(RunningTotal::new());
        let mut accumulator = DispensedFoodAccumulator::new();
        accumulator.register_listener("f1", total.clone());
        let mut today = HashMap::new();

        accumulator.observe(&mut today, "f1", 10, None);
        accumulator.observe(&mut today, "f1", 25, Some(10));
        accumulator.observe(&mut today, "f1", 5, Some(25));
        accumulator.observe(&mut today, "f2", 80, Some(60));

        assert_eq!(total.grams(), 15);
    }
}
