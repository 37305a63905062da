//! Change-detection loop
//!
//! The [`Poller`] samples a [`SnapshotSource`] at a fixed interval, compares
//! the result to the [`SnapshotStore`] and hands changed snapshots to the
//! [`Broadcaster`].
//!
//! Cycles never overlap. The background loop awaits each cycle before taking
//! the next tick (late ticks are delayed, not bursted), and
//! [`Poller::run_cycle`] serializes concurrent callers behind a cycle lock.
//!
//! # Example
//!
//! ```rust,ignore
//! let poller = Arc::new(Poller::new(source, store, broadcaster));
//! let handle = poller.spawn();
//! // ...
//! handle.shutdown().await;
//! ```

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::error::Result;
use crate::source::{query_with_timeout, SnapshotSource};
use crate::store::SnapshotStore;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default spacing between poll cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default limit on a single source query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Poller timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Minimum spacing between the starts of two cycles
    pub interval: Duration,
    /// Abandon a cycle whose query takes longer than this
    pub query_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
        }
    }
}

impl PollerConfig {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }
}

/// Result of one successful poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source matched the stored snapshot; nothing was sent
    Unchanged,
    /// The snapshot changed and was broadcast
    Broadcast(BroadcastReport),
}

/// Drives the change-detection cycle
pub struct Poller {
    source: Arc<dyn SnapshotSource>,
    store: Arc<SnapshotStore>,
    broadcaster: Broadcaster,
    config: PollerConfig,
    cycle: Mutex<()>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<SnapshotStore>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            source,
            store,
            broadcaster,
            config: PollerConfig::default(),
            cycle: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run exactly one cycle
    ///
    /// On a source failure the store and the subscriber set are left
    /// untouched and the error is returned.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let _cycle = self.cycle.lock().await;

        let snapshot = query_with_timeout(self.source.as_ref(), self.config.query_timeout).await?;
        match self.store.replace_if_changed(snapshot) {
            None => Ok(CycleOutcome::Unchanged),
            Some(changed) => {
                let report = self.broadcaster.broadcast(changed).await;
                Ok(CycleOutcome::Broadcast(report))
            }
        }
    }

    /// Start the background loop
    ///
    /// The first cycle runs immediately. The loop runs until the returned
    /// handle is shut down or dropped.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            source = self.source.name(),
            interval_ms = period.as_millis() as u64,
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        tracing::info!(source = self.source.name(), "Poller stopped");
    }

    async fn tick(&self) {
        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(CycleOutcome::Unchanged)) => {
                tracing::trace!(source = self.source.name(), "No change detected");
            }
            Ok(Ok(CycleOutcome::Broadcast(report))) => {
                tracing::info!(
                    source = self.source.name(),
                    delivered = report.delivered,
                    evicted = report.evicted,
                    "Change detected, snapshot broadcast"
                );
            }
            Ok(Err(err)) => {
                tracing::error!(source = self.source.name(), error = %err, "Polling failed");
            }
            Err(_) => {
                tracing::error!(source = self.source.name(), "Polling cycle panicked");
            }
        }
    }
}

/// Handle to a running poller loop
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the loop after any in-flight cycle and wait for it to exit
    pub async fn shutdown(self) {
        let PollerHandle { shutdown, task } = self;
        let _ = shutdown.send(());
        if let Err(err) = task.await {
            tracing::error!(error = %err, "Poller task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubscriberRegistry;
    use crate::source::memory::MemorySource;
    use crate::value::{Row, Snapshot};

    fn rows(ids: &[i64]) -> Snapshot {
        ids.iter().map(|id| Row::new().with("id", *id)).collect()
    }

    fn poller(source: Arc<MemorySource>) -> (Poller, SubscriberRegistry) {
        let registry = SubscriberRegistry::new();
        let poller = Poller::new(
            source,
            Arc::new(SnapshotStore::new()),
            Broadcaster::new(registry.clone()),
        );
        (poller, registry)
    }

    #[tokio::test]
    async fn test_cycle_broadcasts_change_once() {
        let source = Arc::new(MemorySource::new(rows(&[1])));
        let (poller, registry) = poller(source.clone());
        let mut sub = registry.register();

        let first = poller.run_cycle().await.unwrap();
        let second = poller.run_cycle().await.unwrap();

        assert!(matches!(first, CycleOutcome::Broadcast(r) if r.delivered == 1));
        assert_eq!(second, CycleOutcome::Unchanged);
        assert_eq!(sub.try_recv().as_deref(), Some(&rows(&[1])));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_empty_source_on_fresh_store_is_unchanged() {
        let source = Arc::new(MemorySource::new(Snapshot::empty()));
        let (poller, _registry) = poller(source);

        assert_eq!(poller.run_cycle().await.unwrap(), CycleOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_source_failure_leaves_store_untouched() {
        let source = Arc::new(MemorySource::new(rows(&[1])));
        let (poller, registry) = poller(source.clone());
        let _sub = registry.register();

        poller.run_cycle().await.unwrap();
        source.set(rows(&[2, 1]));
        source.fail_next(1);

        assert!(poller.run_cycle().await.is_err());
        assert_eq!(*poller.store().current(), rows(&[1]));
        assert_eq!(registry.len(), 1);

        assert!(matches!(
            poller.run_cycle().await.unwrap(),
            CycleOutcome::Broadcast(_)
        ));
        assert_eq!(*poller.store().current(), rows(&[2, 1]));
    }

    #[test]
    fn test_config_builder() {
        let config = PollerConfig::default()
            .interval(Duration::from_secs(1))
            .query_timeout(None);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.query_timeout, None);
        assert_eq!(PollerConfig::default().interval, Duration::from_secs(15));
    }
}
