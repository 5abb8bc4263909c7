//! Scheduled-feed detector
//!
//! Fires each schedule slot once per day, the first time the feeder's local
//! clock is at or past the slot time. Detection latency is bounded by the
//! poll interval.

use crate::events::FiredEvent;
use crate::model::{FeederId, ScheduleSlot};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Fire every due slot not yet recorded for `feeder_id`
///
/// Slots are keyed by their time of day, so two slots at the same second
/// fire once, with the amount of the first one listed.
pub fn check_slots(
    fired_slots_today: &mut HashMap<FeederId, BTreeSet<u32>>,
    feeder_id: &str,
    now_seconds_local: u32,
    slots: &[ScheduleSlot],
) -> Vec<FiredEvent> {
    let fired = fired_slots_today.entry(feeder_id.to_string()).or_default();
    let mut events = Vec::new();

    for slot in slots {
        let slot_time = slot.seconds_since_local_midnight;
        if slot_time > now_seconds_local {
            continue;
        }
        if !fired.insert(slot_time) {
            continue;
        }

        debug!(
            "Detected scheduled feeding of {}g at {}s for feeder {}",
            slot.amount_grams, slot_time, feeder_id
        );
        events.push(FiredEvent {
            feeder_id: feeder_id.to_string(),
            amount_grams: slot.amount_grams,
            slot_time,
        });
    }

    events
}
