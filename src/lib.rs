//! PetKit feeder monitor
//!
//! Polls the PetKit cloud for every feeder on an account and derives what
//! the vendor does not report directly:
//!
//! - grams of food dispensed today, reconstructed from the lifetime counter
//! - scheduled feeds that have come due today, each reported once
//!
//! Daily totals reset when the local calendar date changes. Feeding
//! schedules are evaluated against each feeder's own wall clock.

// Core modules
pub mod client;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod service;

// Re-export main types for convenience
pub use client::{PetkitHttpClient, SnapshotSource};
pub use config::MonitorConfig;
pub use coordinator::{CoordinatorState, RefreshCycle};
pub use error::{FailureKind, PetkitError, Result};
pub use service::PollingService;
