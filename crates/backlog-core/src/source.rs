//! Snapshot sources
//!
//! A [`SnapshotSource`] is the read-only query capability the poller samples
//! and the fetch-all endpoint reads directly. It must return rows in a
//! deterministic order; it may fail transiently.

use crate::error::{Result, SourceError};
use crate::value::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;

#[cfg(any(feature = "sqlx-postgres", feature = "sqlx-sqlite"))]
pub mod sql;

/// Read-only access to the current state of the monitored data set
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current ordered rows
    async fn query(&self) -> Result<Snapshot>;

    /// Name used in logs
    fn name(&self) -> &str {
        "source"
    }
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn query(&self) -> Result<Snapshot> {
        (**self).query().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Query a source, failing with [`SourceError::Timeout`] if it takes too long
pub async fn query_with_timeout(
    source: &dyn SnapshotSource,
    timeout: Option<Duration>,
) -> Result<Snapshot> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, source.query())
            .await
            .map_err(|_| SourceError::Timeout(limit))?,
        None => source.query().await,
    }
}
