//! Refresh cycle
//!
//! One cycle fetches a snapshot, folds it into the coordinator state and
//! publishes the result. The fetch is the only await point; the state is
//! replaced only after the whole snapshot has arrived, so a failed,
//! timed-out or abandoned fetch leaves the previous state untouched.

use super::accumulator::DispensedFoodAccumulator;
use super::detector::check_slots;
use super::state::CoordinatorState;
use crate::client::SnapshotSource;
use crate::clock::{feeder_local_seconds, Clock};
use crate::config::{MonitorConfig, TimezoneSetting};
use crate::error::{ErrorContext, ErrorReporter, FailureKind, PetkitError, Result};
use crate::events::{CoordinatorObserver, DispenseListener, FiredEvent, ObserverSet};
use crate::model::{FeederId, Snapshot};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Positive counter delta recorded in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispensedDelta {
    pub feeder_id: FeederId,
    pub delta_grams: u64,
}

/// Everything a single snapshot application produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub rolled_over: bool,
    pub dispensed: Vec<DispensedDelta>,
    pub fired: Vec<FiredEvent>,
}

/// Fold a snapshot into the state
///
/// Runs the daily rollover, then for each feeder the accumulator (against
/// the previous snapshot's counter) and the detector (against the feeder's
/// local clock), and finally makes `snapshot` the new reference. A date
/// change resets the per-feeder listeners before any new delta reaches them.
pub fn apply_snapshot(
    mut state: CoordinatorState,
    snapshot: Arc<Snapshot>,
    today: NaiveDate,
    now_utc: DateTime<Utc>,
    timezone: &TimezoneSetting,
    accumulator: &DispensedFoodAccumulator,
) -> (CoordinatorState, CycleOutcome) {
    let had_window = state.current_local_date.is_some();
    let mut outcome = CycleOutcome {
        rolled_over: state.rollover_if_needed(today),
        ..CycleOutcome::default()
    };
    if outcome.rolled_over && had_window {
        accumulator.start_new_day();
    }
    let previous = state.last_snapshot.take();

    for (feeder_id, record) in &snapshot.feeders {
        let previous_total = previous
            .as_ref()
            .and_then(|s| s.feeder(feeder_id))
            .and_then(|r| r.lifetime_dispensed_total);

        match record.lifetime_dispensed_total {
            Some(total) => {
                let delta =
                    accumulator.observe(&mut state.dispensed_today, feeder_id, total, previous_total);
                if delta > 0 {
                    outcome.dispensed.push(DispensedDelta {
                        feeder_id: feeder_id.clone(),
                        delta_grams: delta,
                    });
                }
            }
            None => {
                state.dispensed_today.entry(feeder_id.clone()).or_insert(0);
            }
        }

        match timezone.offset_for(record.utc_offset_hours, now_utc) {
            Some(offset) => {
                let now_local = feeder_local_seconds(now_utc, offset);
                debug!(
                    "Feeder {} current time (seconds since midnight): {}",
                    feeder_id, now_local
                );
                outcome.fired.extend(check_slots(
                    &mut state.fired_slots_today,
                    feeder_id,
                    now_local,
                    &record.schedule.slots,
                ));
            }
            None => warn!(
                "Feeder {} has unusable UTC offset {}h, skipping schedule check",
                feeder_id, record.utc_offset_hours
            ),
        }
    }

    state.last_snapshot = Some(snapshot);
    (state, outcome)
}

/// Whether a poll is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    Polling,
}

/// Last failed cycle
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub kind: FailureKind,
    pub message: String,
    pub requires_reconfiguration: bool,
}

/// Health of the refresh loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureRecord>,
    pub consecutive_failures: u32,
    pub cycles_completed: u64,
}

impl RefreshStatus {
    /// Whether the most recent cycle succeeded
    pub fn last_update_success(&self) -> bool {
        self.consecutive_failures == 0 && self.last_success_at.is_some()
    }
}

/// Result of a successful cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub feeders: usize,
    pub outcome: CycleOutcome,
}

/// Orchestrates fetch, state transition and publication
///
/// `refresh` takes `&mut self`, so two cycles can never overlap on the same
/// coordinator.
pub struct RefreshCycle {
    source: Arc<dyn SnapshotSource>,
    clock: Arc<dyn Clock>,
    timezone: TimezoneSetting,
    fetch_timeout: Duration,
    accumulator: DispensedFoodAccumulator,
    observers: ObserverSet,
    state: CoordinatorState,
    phase: CyclePhase,
    status: RefreshStatus,
}

impl std::fmt::Debug for RefreshCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCycle")
            .field("source", &self.source.describe())
            .field("timezone", &self.timezone)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("phase", &self.phase)
            .field("status", &self.status)
            .finish()
    }
}

impl RefreshCycle {
    pub fn new(source: Arc<dyn SnapshotSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            timezone: TimezoneSetting::Automatic,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            accumulator: DispensedFoodAccumulator::new(),
            observers: ObserverSet::new(),
            state: CoordinatorState::new(),
            phase: CyclePhase::Idle,
            status: RefreshStatus::default(),
        }
    }

    /// Build a cycle with the timezone and timeout from configuration
    pub fn from_config(
        config: &MonitorConfig,
        source: Arc<dyn SnapshotSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(source, clock)
            .with_timezone(config.timezone)
            .with_fetch_timeout(config.request_timeout)
    }

    pub fn with_timezone(mut self, timezone: TimezoneSetting) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CoordinatorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CoordinatorObserver>) {
        self.observers.push(observer);
    }

    /// Register the dispense listener for one feeder, replacing any previous one
    pub fn register_listener(
        &mut self,
        feeder_id: impl Into<FeederId>,
        listener: Arc<dyn DispenseListener>,
    ) -> Option<Arc<dyn DispenseListener>> {
        self.accumulator.register_listener(feeder_id, listener)
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn status(&self) -> &RefreshStatus {
        &self.status
    }

    /// Last known-good snapshot, kept across failed cycles
    pub fn last_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.state.last_snapshot.as_ref()
    }

    /// Run one cycle
    pub async fn refresh(&mut self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("refresh_cycle", cycle_id = %cycle_id);
        self.run_cycle(cycle_id).instrument(span).await
    }

    async fn run_cycle(&mut self, cycle_id: Uuid) -> Result<CycleReport> {
        self.abandon_in_flight();
        self.phase = CyclePhase::Polling;
        let fetched = timeout(self.fetch_timeout, self.source.fetch_snapshot()).await;
        self.phase = CyclePhase::Idle;

        let snapshot = match fetched {
            Ok(Ok(snapshot)) => Arc::new(snapshot),
            Ok(Err(error)) => return Err(self.record_failure(error, cycle_id)),
            Err(_) => {
                let error = PetkitError::timeout(format!(
                    "snapshot fetch exceeded {:?}",
                    self.fetch_timeout
                ));
                return Err(self.record_failure(error, cycle_id));
            }
        };
        debug!("Fetched PetKit data for {} feeder(s)", snapshot.feeders.len());

        let today = self.clock.local_today();
        let now_utc = self.clock.now_utc();
        let (state, outcome) = apply_snapshot(
            std::mem::take(&mut self.state),
            snapshot.clone(),
            today,
            now_utc,
            &self.timezone,
            &self.accumulator,
        );
        self.state = state;

        for dispensed in &outcome.dispensed {
            self.observers
                .on_food_dispensed(&dispensed.feeder_id, dispensed.delta_grams);
        }
        for fired in &outcome.fired {
            self.observers.on_scheduled_feed_fired(fired);
        }
        self.observers.on_snapshot_updated(&snapshot, &self.state);

        self.status.last_success_at = Some(now_utc);
        self.status.consecutive_failures = 0;
        self.status.cycles_completed += 1;

        if outcome.rolled_over || !outcome.fired.is_empty() || !outcome.dispensed.is_empty() {
            info!(
                rolled_over = outcome.rolled_over,
                fired = outcome.fired.len(),
                dispensed = outcome.dispensed.len(),
                "Refresh cycle applied"
            );
        }

        Ok(CycleReport {
            cycle_id,
            feeders: snapshot.feeders.len(),
            outcome,
        })
    }

    /// Forget a fetch whose future was dropped mid-flight
    pub(crate) fn abandon_in_flight(&mut self) {
        if self.phase == CyclePhase::Polling {
            debug!("Abandoning in-flight fetch, state left unchanged");
            self.phase = CyclePhase::Idle;
        }
    }

    fn record_failure(&mut self, error: PetkitError, cycle_id: Uuid) -> PetkitError {
        let context = ErrorContext::new(error.to_error_code(), "refresh_cycle", "fetch_snapshot")
            .with_metadata("source", self.source.describe())
            .with_metadata("consecutive_failures", self.status.consecutive_failures + 1)
            .with_correlation_id(cycle_id.to_string());
        ErrorReporter::log_error(&error, Some(context));

        self.status.consecutive_failures += 1;
        self.status.last_failure = Some(FailureRecord {
            at: self.clock.now_utc(),
            kind: error.failure_kind(),
            message: error.sanitized_message(),
            requires_reconfiguration: error.requires_reconfiguration(),
        });
        self.observers.on_refresh_failed(&error);
        error
    }
}
