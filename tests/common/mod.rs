//! Common test utilities

#![allow(dead_code)]

pub mod petkit_mock;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, TimeZone, Utc};
use petkit_feeder_rust::clock::Clock;
use petkit_feeder_rust::client::SnapshotSource;
use petkit_feeder_rust::config::{MonitorConfig, PetkitCredentials};
use petkit_feeder_rust::model::{FeedSchedule, FeederRecord, FeederStatus, ScheduleSlot, Snapshot};
use petkit_feeder_rust::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Snapshot source that replays a fixed script of replies
#[derive(Debug, Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Result<Snapshot>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(replies: impl IntoIterator<Item = Result<Snapshot>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Result<Snapshot>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| Err(petkit_feeder_rust::PetkitError::generic("script exhausted")))
    }

    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}

/// Clock the test moves by hand
///
/// The process's local date is derived from `now` at `local_offset`.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    local_offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_local_offset(now, FixedOffset::east_opt(0).unwrap())
    }

    pub fn with_local_offset(now: DateTime<Utc>, local_offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            local_offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn local_today(&self) -> NaiveDate {
        self.now_utc().with_timezone(&self.local_offset).date_naive()
    }
}

/// UTC instant on 2024-05-`day` at `seconds` past midnight
pub fn at(day: u32, seconds: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap() + ChronoDuration::seconds(seconds as i64)
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

/// Feeder in UTC with the given counter and schedule
pub fn feeder(id: &str, lifetime_total: Option<u64>, slots: Vec<ScheduleSlot>) -> FeederRecord {
    FeederRecord {
        id: id.to_string(),
        name: format!("Feeder {id}"),
        device_type: "feedermini".to_string(),
        utc_offset_hours: 0.0,
        lifetime_dispensed_total: lifetime_total,
        schedule: FeedSchedule {
            repeat_days: vec![1, 2, 3, 4, 5, 6, 7],
            slots,
        },
        status: FeederStatus::default(),
        raw: serde_json::Value::Null,
    }
}

/// The two-slot schedule used throughout: 08:00 20g and 18:00 30g
pub fn breakfast_and_dinner() -> Vec<ScheduleSlot> {
    vec![ScheduleSlot::new(28_800, 20), ScheduleSlot::new(64_800, 30)]
}

pub fn snapshot(fetched_at: DateTime<Utc>, records: Vec<FeederRecord>) -> Snapshot {
    Snapshot::new(fetched_at, records)
}

/// Config pointing the HTTP client at a mock server
pub fn create_test_config(base_url: &str) -> MonitorConfig {
    let mut config = MonitorConfig {
        account: PetkitCredentials::new("owner@example.com", "hunter2"),
        request_timeout: Duration::from_secs(5),
        ..MonitorConfig::default()
    };
    config.api.passport_url = url::Url::parse(base_url).unwrap();
    config
}
