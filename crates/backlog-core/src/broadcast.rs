//! Fan-out of snapshots to subscribers

use crate::error::DeliveryError;
use crate::registry::{Subscriber, SubscriberRegistry};
use crate::value::Snapshot;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// How a snapshot is handed to each subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Enqueue without waiting; a full buffer evicts the subscriber
    #[default]
    Immediate,
    /// Wait up to the given duration for buffer space before evicting
    ///
    /// Deliveries within a round run concurrently, so a stalled subscriber
    /// delays the round by at most this duration.
    Timeout(Duration),
}

/// Outcome of one broadcast round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that received the snapshot
    pub delivered: usize,
    /// Subscribers evicted because delivery failed
    pub evicted: usize,
    /// Subscribers in the view that had already closed
    pub skipped: usize,
}

/// Delivers snapshots to every subscriber in a registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: SubscriberRegistry,
    policy: DeliveryPolicy,
}

impl Broadcaster {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self::with_policy(registry, DeliveryPolicy::default())
    }

    pub fn with_policy(registry: SubscriberRegistry, policy: DeliveryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Run one broadcast round
    ///
    /// The subscriber view is captured once at the start of the round. Each
    /// subscriber either receives `snapshot` or is evicted; a failure for one
    /// subscriber never affects delivery to the others.
    pub async fn broadcast(&self, snapshot: Arc<Snapshot>) -> BroadcastReport {
        let view = self.registry.snapshot();
        let mut report = BroadcastReport::default();

        let results: Vec<Result<(), DeliveryError>> = match self.policy {
            DeliveryPolicy::Immediate => view.iter().map(|s| s.try_deliver(&snapshot)).collect(),
            DeliveryPolicy::Timeout(timeout) => {
                join_all(view.iter().map(|s| s.deliver_within(&snapshot, timeout))).await
            }
        };

        for (subscriber, result) in view.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Closed) => {
                    self.registry.unregister(subscriber.id());
                    report.skipped += 1;
                }
                Err(err) => {
                    self.evict(subscriber, err);
                    report.evicted += 1;
                }
            }
        }

        tracing::debug!(
            rows = snapshot.len(),
            delivered = report.delivered,
            evicted = report.evicted,
            skipped = report.skipped,
            "Broadcast round complete"
        );
        report
    }

    fn evict(&self, subscriber: &Subscriber, err: DeliveryError) {
        if self.registry.unregister(subscriber.id()) {
            tracing::warn!(subscriber = %subscriber.id(), error = %err, "Evicting subscriber");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    fn snapshot(status: &str) -> Arc<Snapshot> {
        Arc::new(Snapshot::from(vec![Row::new().with("id", 1).with("status", status)]))
    }

    #[tokio::test]
    async fn test_broadcast_to_all() {
        let registry = SubscriberRegistry::new();
        let mut subs: Vec<_> = (0..3).map(|_| registry.register()).collect();
        let broadcaster = Broadcaster::new(registry.clone());

        let report = broadcaster.broadcast(snapshot("open")).await;

        assert_eq!(report.delivered, 3);
        assert_eq!(report.evicted, 0);
        for sub in subs.iter_mut() {
            assert_eq!(sub.try_recv(), Some(snapshot("open")));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers() {
        let broadcaster = Broadcaster::new(SubscriberRegistry::new());
        let report = broadcaster.broadcast(snapshot("open")).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_full_buffer_evicts_only_that_subscriber() {
        let registry = SubscriberRegistry::with_buffer(1);
        let mut fast = registry.register();
        let slow = registry.register();
        let broadcaster = Broadcaster::new(registry.clone());

        broadcaster.broadcast(snapshot("open")).await;
        fast.try_recv().unwrap();

        // `slow` never drained its buffer
        let report = broadcaster.broadcast(snapshot("closed")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(fast.try_recv(), Some(snapshot("closed")));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(slow.id()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_policy_bounds_slow_subscriber() {
        let registry = SubscriberRegistry::with_buffer(1);
        let mut fast = registry.register();
        let _slow = registry.register();
        let broadcaster = Broadcaster::with_policy(
            registry.clone(),
            DeliveryPolicy::Timeout(Duration::from_millis(50)),
        );

        broadcaster.broadcast(snapshot("open")).await;
        fast.try_recv().unwrap();

        let report = broadcaster.broadcast(snapshot("closed")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(fast.try_recv(), Some(snapshot("closed")));
    }

    #[tokio::test]
    async fn test_closed_subscriber_in_view_is_skipped() {
        let registry = SubscriberRegistry::new();
        let sub = registry.register();
        let handle = registry.get(sub.id()).unwrap();
        let broadcaster = Broadcaster::new(registry.clone());

        // Closed but still present, as if the disconnect raced the round
        handle.close();

        let report = broadcaster.broadcast(snapshot("open")).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 0);
        assert!(registry.is_empty());
    }
}
