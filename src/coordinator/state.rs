//! Coordinator state and the daily window
//!
//! [`CoordinatorState`] is a plain value: the refresh cycle owns it, passes
//! it through [`apply_snapshot`](super::apply_snapshot) and stores the
//! result. Nothing else mutates it.

use crate::model::{FeederId, Snapshot};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-day derived state plus the previous poll's snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorState {
    /// Date the daily totals were last reset; unset before the first cycle
    pub current_local_date: Option<NaiveDate>,
    /// Grams dispensed since the last reset, per feeder
    pub dispensed_today: HashMap<FeederId, u64>,
    /// Slot times already notified since the last reset, per feeder
    pub fired_slots_today: HashMap<FeederId, BTreeSet<u32>>,
    /// Previous successful snapshot; survives rollovers
    pub last_snapshot: Option<Arc<Snapshot>>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the daily totals when `today` differs from the watermark
    ///
    /// Returns `true` on the first call and whenever the date changes. The
    /// reference snapshot is kept so the first poll of a new day still diffs
    /// against the last reading of the previous one.
    pub fn rollover_if_needed(&mut self, today: NaiveDate) -> bool {
        if self.current_local_date == Some(today) {
            return false;
        }

        match self.current_local_date {
            Some(previous) => info!(
                "Date change detected ({} -> {}), resetting daily counters",
                previous, today
            ),
            None => debug!("Starting daily window at {}", today),
        }

        self.dispensed_today.clear();
        self.fired_slots_today.clear();
        self.current_local_date = Some(today);
        true
    }

    /// Grams dispensed today by one feeder
    pub fn dispensed_today(&self, feeder_id: &str) -> u64 {
        self.dispensed_today.get(feeder_id).copied().unwrap_or(0)
    }

    /// Whether a slot has already fired today
    pub fn has_fired(&self, feeder_id: &str, slot_time: u32) -> bool {
        self.fired_slots_today
            .get(feeder_id)
            .is_some_and(|slots| slots.contains(&slot_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_rollover_fires_once_per_day() {
        let mut state = CoordinatorState::new();
        let fired: Vec<bool> = [date(1), date(1), date(2), date(2)]
            .into_iter()
            .map(|d| state.rollover_if_needed(d))
            .collect();

        assert_eq!(fired, vec![true, false, true, false]);
        assert_eq!(state.current_local_date, Some(date(2)));
    }

    #[test]
    fn test_rollover_clears_daily_maps_only() {
        let mut state = CoordinatorState::new();
        state.rollover_if_needed(date(1));
        state.dispensed_today.insert("f1".to_string(), 40);
        state
            .fired_slots_today
            .entry("f1".to_string())
            .or_default()
            .insert(28_800);
        state.last_snapshot = Some(Arc::new(Snapshot::new(chrono::Utc::now(), [])));

        assert!(!state.rollover_if_needed(date(1)));
        assert_eq!(state.dispensed_today("f1"), 40);

        assert!(state.rollover_if_needed(date(2)));
        assert_eq!(state.dispensed_today("f1"), 0);
        assert!(!state.has_fired("f1", 28_800));
        assert!(state.last_snapshot.is_some());
    }
}
