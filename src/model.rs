//! Snapshot data model
//!
//! A [`Snapshot`] is the immutable result of one poll of the PetKit cloud:
//! every feeder on the account, keyed by its id, with the fields the
//! coordinator derives state from plus the raw device document for
//! presentation consumers.

use crate::error::{PetkitError, Result};
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Stable feeder identifier as reported by the vendor
pub type FeederId = String;

/// Seconds in one local day; slot times must be strictly below this
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Largest UTC offset a feeder may report, in hours
const MAX_UTC_OFFSET_HOURS: f64 = 24.0;

/// Result of one complete poll across all feeders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot finished downloading
    pub fetched_at: DateTime<Utc>,
    /// Feeder records keyed by feeder id
    pub feeders: BTreeMap<FeederId, FeederRecord>,
}

impl Snapshot {
    /// Build a snapshot from parsed feeder records
    pub fn new(fetched_at: DateTime<Utc>, records: impl IntoIterator<Item = FeederRecord>) -> Self {
        let feeders = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            fetched_at,
            feeders,
        }
    }

    /// Look up one feeder
    pub fn feeder(&self, feeder_id: &str) -> Option<&FeederRecord> {
        self.feeders.get(feeder_id)
    }
}

/// One feeder's state at poll time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederRecord {
    pub id: FeederId,
    pub name: String,
    /// Vendor model key, e.g. `feedermini` or `d4s`
    pub device_type: String,
    /// Device-local offset from UTC in (possibly fractional) hours
    pub utc_offset_hours: f64,
    /// Monotonic lifetime dispensed-food counter in grams, when reported
    pub lifetime_dispensed_total: Option<u64>,
    pub schedule: FeedSchedule,
    pub status: FeederStatus,
    /// Unmodified device document
    pub raw: Value,
}

/// Feeding plan configured on the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSchedule {
    /// ISO weekdays (1 = Monday .. 7 = Sunday) the plan repeats on
    pub repeat_days: Vec<u8>,
    /// Slots in the order the vendor lists them
    pub slots: Vec<ScheduleSlot>,
}

impl FeedSchedule {
    /// Repeat days for display: `daily`, `none`, or weekday names
    pub fn repeat_summary(&self) -> String {
        let days: BTreeSet<u8> = self.repeat_days.iter().copied().collect();
        match days.len() {
            0 => "none".to_string(),
            7 => "daily".to_string(),
            _ => days
                .into_iter()
                .filter_map(|d| d.checked_sub(1).and_then(|d| Weekday::try_from(d).ok()))
                .map(|day| day.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// One scheduled feeding time-of-day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Feeder-local seconds since midnight, `0..86400`
    pub seconds_since_local_midnight: u32,
    pub amount_grams: u32,
    pub name: Option<String>,
}

impl ScheduleSlot {
    pub fn new(seconds_since_local_midnight: u32, amount_grams: u32) -> Self {
        Self {
            seconds_since_local_midnight,
            amount_grams,
            name: None,
        }
    }

    /// Slot time rendered as `HH:MM`
    pub fn time_of_day(&self) -> String {
        let hours = self.seconds_since_local_midnight / 3600;
        let minutes = (self.seconds_since_local_midnight % 3600) / 60;
        format!("{hours:02}:{minutes:02}")
    }
}

/// Device status fields surfaced for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederStatus {
    /// 1 when the hopper has food, 0 when empty
    pub food_level: Option<i64>,
    pub feeding: Option<bool>,
    pub battery_power: Option<i64>,
    pub battery_status: Option<i64>,
    pub runtime_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevice {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    timezone: Option<f64>,
    #[serde(default)]
    feed: Option<RawFeed>,
    #[serde(default)]
    state: Option<RawState>,
}

#[derive(Debug, Deserialize)]
struct RawFeed {
    #[serde(default)]
    repeats: Option<Value>,
    #[serde(default)]
    items: Vec<RawFeedItem>,
}

#[derive(Debug, Deserialize)]
struct RawFeedItem {
    #[serde(default)]
    time: i64,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    #[serde(default)]
    food: Option<i64>,
    #[serde(default)]
    feeding: Option<i64>,
    #[serde(default)]
    battery_power: Option<i64>,
    #[serde(default)]
    battery_status: Option<i64>,
    #[serde(default)]
    runtime: Option<i64>,
    #[serde(default)]
    feed_state: Option<RawFeedState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeedState {
    #[serde(default)]
    real_amount_total: Option<i64>,
}

impl FeederRecord {
    /// Parse a vendor device-detail document
    ///
    /// Fails on slot times outside one day, negative amounts, a negative
    /// lifetime counter or an offset beyond ±24 h, so that malformed data
    /// never reaches the coordinator.
    pub fn from_device_json(device_type: &str, raw: Value) -> Result<Self> {
        let device: RawDevice = serde_json::from_value(raw.clone())?;

        let id = match &device.id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(PetkitError::parsing(format!(
                    "Unsupported feeder id: {other}"
                )))
            }
        };

        let utc_offset_hours = device.timezone.unwrap_or(0.0);
        if !utc_offset_hours.is_finite() || utc_offset_hours.abs() >= MAX_UTC_OFFSET_HOURS {
            return Err(PetkitError::parsing(format!(
                "Feeder {id} reports invalid UTC offset {utc_offset_hours}h"
            )));
        }

        let schedule = match device.feed {
            Some(feed) => parse_schedule(&id, feed)?,
            None => FeedSchedule::default(),
        };

        let state = device.state.unwrap_or_default();
        let lifetime_dispensed_total = match state.feed_state.and_then(|f| f.real_amount_total) {
            Some(total) => Some(u64::try_from(total).map_err(|_| {
                PetkitError::parsing(format!(
                    "Feeder {id} reports negative lifetime total {total}"
                ))
            })?),
            None => None,
        };

        let status = FeederStatus {
            food_level: state.food,
            feeding: state.feeding.map(|f| f != 0),
            battery_power: state.battery_power,
            battery_status: state.battery_status,
            runtime_seconds: state.runtime,
        };

        Ok(Self {
            name: device.name.unwrap_or_else(|| id.clone()),
            id,
            device_type: device_type.to_string(),
            utc_offset_hours,
            lifetime_dispensed_total,
            schedule,
            status,
            raw,
        })
    }
}

fn parse_schedule(feeder_id: &str, feed: RawFeed) -> Result<FeedSchedule> {
    let mut slots = Vec::with_capacity(feed.items.len());
    for item in feed.items {
        let seconds = u32::try_from(item.time)
            .ok()
            .filter(|s| *s < SECONDS_PER_DAY)
            .ok_or_else(|| {
                PetkitError::parsing(format!(
                    "Feeder {feeder_id} has slot at {}s outside one day",
                    item.time
                ))
            })?;
        let amount = u32::try_from(item.amount).map_err(|_| {
            PetkitError::parsing(format!(
                "Feeder {feeder_id} has slot with invalid amount {}",
                item.amount
            ))
        })?;
        slots.push(ScheduleSlot {
            seconds_since_local_midnight: seconds,
            amount_grams: amount,
            name: item.name,
        });
    }

    Ok(FeedSchedule {
        repeat_days: feed.repeats.as_ref().map(parse_repeat_days).unwrap_or_default(),
        slots,
    })
}

/// Repeat days arrive either as `"1,2,3"` or as `[1, 2, 3]`
fn parse_repeat_days(value: &Value) -> Vec<u8> {
    let days: Vec<u8> = match value {
        Value::String(s) => s
            .split(',')
            .filter_map(|d| d.trim().parse::<u8>().ok())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|d| u8::try_from(d).ok())
            .collect(),
        _ => Vec::new(),
    };
    days.into_iter().filter(|d| (1..=7).contains(d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feedermini() -> Value {
        json!({
            "id": 100234,
            "name": "Kitchen",
            "timezone": 5.5,
            "feed": {
                "repeats": "1,2,3,4,5,6,7",
                "items": [
                    {"time": 28800, "amount": 20, "name": "Breakfast"},
                    {"time": 64800, "amount": 30, "name": "Dinner"}
                ]
            },
            "state": {
                "food": 1,
                "feeding": 0,
                "batteryPower": 4,
                "batteryStatus": 0,
                "runtime": 3600,
                "feedState": {"realAmountTotal": 150}
            }
        })
    }

    #[test]
    fn test_parse_device_detail() {
        let record = FeederRecord::from_device_json("feedermini", feedermini()).unwrap();

        assert_eq!(record.id, "100234");
        assert_eq!(record.name, "Kitchen");
        assert_eq!(record.utc_offset_hours, 5.5);
        assert_eq!(record.lifetime_dispensed_total, Some(150));
        assert_eq!(record.schedule.repeat_days, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(record.schedule.slots.len(), 2);
        assert_eq!(record.schedule.slots[1].amount_grams, 30);
        assert_eq!(record.schedule.slots[1].time_of_day(), "18:00");
        assert_eq!(record.status.feeding, Some(false));
        assert_eq!(record.status.food_level, Some(1));
    }

    #[test]
    fn test_missing_fields_default() {
        let record = FeederRecord::from_device_json("d4", json!({"id": "abc"})).unwrap();

        assert_eq!(record.name, "abc");
        assert_eq!(record.utc_offset_hours, 0.0);
        assert_eq!(record.lifetime_dispensed_total, None);
        assert!(record.schedule.slots.is_empty());
    }

    #[test]
    fn test_rejects_slot_outside_day() {
        let raw = json!({"id": 1, "feed": {"items": [{"time": 86400, "amount": 10}]}});
        let err = FeederRecord::from_device_json("d4", raw).unwrap_err();
        assert!(matches!(err, PetkitError::Parsing(_)));
    }

    #[test]
    fn test_rejects_invalid_offset() {
        let raw = json!({"id": 1, "timezone": 25.0});
        assert!(FeederRecord::from_device_json("d4", raw).is_err());
    }

    #[test]
    fn test_repeat_days_array_form() {
        let raw = json!({"id": 1, "feed": {"repeats": [1, 3, 9], "items": []}});
        let record = FeederRecord::from_device_json("d4", raw).unwrap();
        assert_eq!(record.schedule.repeat_days, vec![1, 3]);
        assert_eq!(record.schedule.repeat_summary(), "Mon, Wed");
    }

    #[test]
    fn test_repeat_summary() {
        let mut schedule = FeedSchedule::default();
        assert_eq!(schedule.repeat_summary(), "none");

        schedule.repeat_days = vec![7, 1, 2, 3, 4, 5, 6];
        assert_eq!(schedule.repeat_summary(), "daily");

        schedule.repeat_days = vec![6, 7];
        assert_eq!(schedule.repeat_summary(), "Sat, Sun");
    }
}
