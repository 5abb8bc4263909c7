//! Snapshot sources
//!
//! The coordinator only ever sees the [`SnapshotSource`] trait. The
//! production implementation talks to the PetKit cloud over HTTPS; tests
//! substitute scripted sources.

pub mod http_client;

pub use http_client::PetkitHttpClient;

use crate::error::Result;
use crate::model::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces one complete snapshot of every feeder on the account
///
/// Implementations must either return a fully parsed snapshot or an error;
/// partially downloaded data is never surfaced.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current state of all feeders
    async fn fetch_snapshot(&self) -> Result<Snapshot>;

    /// Short label for logs
    fn describe(&self) -> String {
        "snapshot source".to_string()
    }
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        (**self).fetch_snapshot().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
