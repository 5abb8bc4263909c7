//! Refresh coordination
//!
//! Daily window tracking, the dispensed-food accumulator, the scheduled-feed
//! detector and the cycle that ties them to a [`SnapshotSource`](crate::client::SnapshotSource).

pub mod accumulator;
pub mod cycle;
pub mod detector;
pub mod state;

pub use accumulator::{dispensed_delta, DispensedFoodAccumulator};
pub use cycle::{
    apply_snapshot, CycleOutcome, CyclePhase, CycleReport, DispensedDelta, FailureRecord,
    RefreshCycle, RefreshStatus,
};
pub use detector::check_slots;
pub use state::CoordinatorState;
