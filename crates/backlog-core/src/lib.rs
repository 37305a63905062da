//! # Backlog Core
//!
//! Change-detection and fan-out engine.
//!
//! A [`Poller`] samples a [`SnapshotSource`] at a fixed interval. When the
//! sampled [`Snapshot`] differs from the one held by the [`SnapshotStore`],
//! the store is updated and the [`Broadcaster`] pushes the new snapshot to
//! every subscriber in the [`SubscriberRegistry`], evicting subscribers whose
//! delivery fails.
//!
//! This crate knows nothing about HTTP; connection handling lives in
//! `backlog-http`.

mod broadcast;
mod error;
mod poller;
mod registry;
pub mod source;
mod store;
mod value;

pub use broadcast::{BroadcastReport, Broadcaster, DeliveryPolicy};
pub use error::{DeliveryError, Result, SourceError};
pub use poller::{
    CycleOutcome, Poller, PollerConfig, PollerHandle, DEFAULT_POLL_INTERVAL, DEFAULT_QUERY_TIMEOUT,
};
pub use registry::{
    Subscriber, SubscriberId, SubscriberRegistry, SubscriberState, Subscription,
    DEFAULT_SUBSCRIBER_BUFFER,
};
pub use source::memory::MemorySource;
#[cfg(any(feature = "sqlx-postgres", feature = "sqlx-sqlite"))]
pub use source::sql::{SqlPool, SqlSource, DEFAULT_QUERY};
pub use source::SnapshotSource;
pub use store::SnapshotStore;
pub use value::{Row, Snapshot, Value};
