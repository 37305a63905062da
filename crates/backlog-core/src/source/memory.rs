use super::SnapshotSource;
use crate::error::{Result, SourceError};
use crate::value::Snapshot;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// In-memory snapshot source (for tests, demos and local development)
///
/// The contents can be swapped at any time, and the source can be told to
/// fail a number of upcoming queries to simulate an unreachable database.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    rows: Mutex<Snapshot>,
    failures: AtomicUsize,
    queries: AtomicUsize,
}

impl MemorySource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self::named("memory", snapshot)
    }

    pub fn named(name: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(snapshot),
            failures: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Replace the contents returned by subsequent queries
    pub fn set(&self, snapshot: Snapshot) {
        *self.rows.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Make the next `count` queries fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of queries served so far, failed ones included
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    async fn query(&self) -> Result<Snapshot> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SourceError::Unavailable(format!(
                "{} is unreachable",
                self.name
            )));
        }

        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
