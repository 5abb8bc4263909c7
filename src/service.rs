//! Periodic polling
//!
//! Drives a [`RefreshCycle`] on a fixed interval until cancelled. Transient
//! failures keep the loop going; credential, region and configuration
//! failures end it so the caller can ask for new settings.

use crate::coordinator::{CycleReport, RefreshCycle};
use crate::error::Result;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs refresh cycles every `interval`
#[derive(Debug)]
pub struct PollingService {
    cycle: RefreshCycle,
    interval: Duration,
}

impl PollingService {
    pub fn new(cycle: RefreshCycle, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    pub fn cycle(&self) -> &RefreshCycle {
        &self.cycle
    }

    pub fn cycle_mut(&mut self) -> &mut RefreshCycle {
        &mut self.cycle
    }

    pub fn into_cycle(self) -> RefreshCycle {
        self.cycle
    }

    /// Poll until `shutdown` is cancelled or a failure needs reconfiguration
    ///
    /// The first cycle runs immediately. A tick that comes due while a cycle
    /// is still running is delayed, never queued, so cycles do not overlap.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling PetKit every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Polling stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                outcome = self.cycle.refresh() => Some(outcome),
            };

            match outcome {
                None => {
                    self.cycle.abandon_in_flight();
                    info!("Polling stopped during fetch");
                    return Ok(());
                }
                Some(Ok(report)) => log_report(&report),
                Some(Err(err)) if err.requires_reconfiguration() => {
                    crate::log_structured_error!(err, "polling_service", "run");
                    return Err(err);
                }
                Some(Err(_)) => {
                    debug!("Keeping last snapshot, retrying in {:?}", self.interval);
                }
            }
        }
    }

    /// Run a single cycle outside the loop
    pub async fn refresh_once(&mut self) -> Result<CycleReport> {
        self.cycle.refresh().await
    }
}

fn log_report(report: &CycleReport) {
    debug!(
        cycle_id = %report.cycle_id,
        feeders = report.feeders,
        fired = report.outcome.fired.len(),
        "Refresh cycle completed"
    );
}
