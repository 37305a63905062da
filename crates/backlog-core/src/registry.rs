//! Subscriber registry
//!
//! The registry owns the set of active subscribers. Each subscriber is one
//! live push-capable connection, backed by a bounded channel whose receiving
//! half is the [`Subscription`] held by the connection task.
//!
//! Membership is stored copy-on-write: [`SubscriberRegistry::snapshot`] hands
//! out an immutable point-in-time view, so a broadcast round can iterate
//! without holding the lock while connections register and unregister
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use backlog_core::SubscriberRegistry;
//!
//! let registry = SubscriberRegistry::new();
//! let subscription = registry.register();
//! assert_eq!(registry.len(), 1);
//!
//! // Dropping the subscription unregisters it
//! drop(subscription);
//! assert!(registry.is_empty());
//! ```

use crate::error::DeliveryError;
use crate::value::Snapshot;
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use uuid::Uuid;

/// Default number of undelivered snapshots a subscriber may have queued
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Unique identity of one subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Registered and eligible for pushes
    Active,
    /// Removed from the registry; no further pushes are attempted
    Closed,
}

/// Handle to one live subscriber, as seen by the registry and broadcaster
///
/// Cloning the handle does not create a new subscriber; all clones share
/// identity and state.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Arc<Snapshot>>,
    closed: Arc<AtomicBool>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        if self.closed.load(Ordering::Acquire) {
            SubscriberState::Closed
        } else {
            SubscriberState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriberState::Active
    }

    /// Transition to `Closed`. Returns `true` only for the call that performed
    /// the transition.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Enqueue a snapshot without waiting
    ///
    /// A full buffer is a delivery failure: the subscriber is not keeping up.
    pub fn try_deliver(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError> {
        if !self.is_active() {
            return Err(DeliveryError::Closed);
        }
        self.sender.try_send(snapshot.clone()).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::BufferFull,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }

    /// Enqueue a snapshot, waiting at most `timeout` for buffer space
    pub async fn deliver_within(
        &self,
        snapshot: &Arc<Snapshot>,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        if !self.is_active() {
            return Err(DeliveryError::Closed);
        }
        self.sender
            .send_timeout(snapshot.clone(), timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
                SendTimeoutError::Closed(_) => DeliveryError::Disconnected,
            })
    }
}

/// The connection side of a subscriber
///
/// Yields every snapshot delivered to this subscriber. The stream ends once
/// the subscriber has been evicted and its buffer drained. Dropping the
/// subscription unregisters the subscriber, so a connection task that ends
/// for any reason cleans up after itself.
pub struct Subscription {
    id: SubscriberId,
    closed: Arc<AtomicBool>,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
    registry: SubscriberRegistry,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        if self.closed.load(Ordering::Acquire) {
            SubscriberState::Closed
        } else {
            SubscriberState::Active
        }
    }

    /// Wait for the next delivered snapshot
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.recv().await
    }

    /// Take a delivered snapshot if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.try_recv().ok()
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Arc<Snapshot>>> {
        self.receiver.poll_recv(cx)
    }

    /// Explicitly end this subscription
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = Arc<Snapshot>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        if self.registry.unregister(self.id) {
            tracing::debug!(subscriber = %self.id, "Subscriber disconnected");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Concurrency-safe set of active subscribers
///
/// Cheap to clone; clones share the same membership.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
    buffer: usize,
}

impl SubscriberRegistry {
    /// Create a registry with the default per-subscriber buffer
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Create a registry whose subscribers can each queue `buffer` snapshots
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: RwLock::new(Arc::new(Vec::new())),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new active subscriber
    pub fn register(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let id = SubscriberId::new();
        let closed = Arc::new(AtomicBool::new(false));
        let subscriber = Subscriber {
            id,
            sender,
            closed: closed.clone(),
        };

        let count = {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::make_mut(&mut *subscribers).push(subscriber);
            subscribers.len()
        };
        tracing::debug!(subscriber = %id, subscribers = count, "Subscriber registered");

        Subscription {
            id,
            closed,
            receiver,
            registry: self.clone(),
        }
    }

    /// Remove a subscriber and mark it closed
    ///
    /// Idempotent. Returns `true` if the subscriber was still registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(index) = subscribers.iter().position(|s| s.id == id) else {
            return false;
        };
        let removed = Arc::make_mut(&mut *subscribers).swap_remove(index);
        removed.close();
        true
    }

    /// Look up a registered subscriber by id
    pub fn get(&self, id: SubscriberId) -> Option<Subscriber> {
        self.snapshot().iter().find(|s| s.id == id).cloned()
    }

    /// Point-in-time view of the registered subscribers
    ///
    /// Later registrations and removals do not affect a view already taken.
    pub fn snapshot(&self) -> Arc<Vec<Subscriber>> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-subscriber buffer capacity
    pub fn buffer(&self) -> usize {
        self.inner.buffer
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}
