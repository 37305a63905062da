//! Shared state handed to every request handler

use crate::cors::CorsLayer;
use backlog_core::{SnapshotSource, SnapshotStore, SubscriberRegistry, DEFAULT_QUERY_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between `: keep-alive` comments on idle streams
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Everything the handlers need, cheap to clone per connection
#[derive(Clone)]
pub struct AppState {
    pub(crate) source: Arc<dyn SnapshotSource>,
    pub(crate) registry: SubscriberRegistry,
    pub(crate) store: Arc<SnapshotStore>,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) keep_alive: Option<Duration>,
    pub(crate) expose_errors: bool,
    pub(crate) cors: CorsLayer,
}

impl AppState {
    /// Create state over the poller's source, registry and store
    ///
    /// Fetch-all queries `source` directly; the stream endpoint registers
    /// subscribers in `registry`; health reports on `store`.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        registry: SubscriberRegistry,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            source,
            registry,
            store,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            expose_errors: false,
            cors: CorsLayer::permissive(),
        }
    }

    /// Bound on a fetch-all query (`None` waits indefinitely)
    pub fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Keep-alive comment interval for idle streams (`None` disables it)
    pub fn keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Include internal error details in error bodies
    pub fn expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    pub fn cors(mut self, cors: CorsLayer) -> Self {
        self.cors = cors;
        self
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("source", &self.source.name())
            .field("subscribers", &self.registry.len())
            .field("query_timeout", &self.query_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("expose_errors", &self.expose_errors)
            .finish()
    }
}
