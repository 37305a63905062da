//! Route table (matchit radix tree)
//!
//! The feed exposes a fixed set of endpoints. Only the prefix under which the
//! backlog routes are mounted is configurable.

use crate::error::ServerError;
use matchit::Router as MatchitRouter;

/// Default mount point for the backlog routes
pub const DEFAULT_PREFIX: &str = "/backlog";

/// Endpoint a request path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET {prefix}/stream`
    Stream,
    /// `GET {prefix}/all`
    FetchAll,
    /// `GET /health`
    Health,
}

/// Result of matching a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    Found(Route),
    NotFound,
}

/// Path to [`Route`] lookup
#[derive(Clone)]
pub struct Routes {
    inner: MatchitRouter<Route>,
    prefix: String,
}

impl Routes {
    /// Build the route table with the backlog endpoints under `prefix`
    pub fn new(prefix: &str) -> Result<Self, ServerError> {
        let prefix = normalize_prefix(prefix);
        let mut inner = MatchitRouter::new();

        for (path, route) in [
            (format!("{}/stream", prefix), Route::Stream),
            (format!("{}/all", prefix), Route::FetchAll),
            ("/health".to_string(), Route::Health),
        ] {
            inner
                .insert(path.clone(), route)
                .map_err(|err| ServerError::Route {
                    path,
                    reason: err.to_string(),
                })?;
        }

        Ok(Self { inner, prefix })
    }

    /// Normalized prefix the backlog routes are mounted under
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn match_route(&self, path: &str) -> RouteMatch {
        match self.inner.at(path) {
            Ok(matched) => RouteMatch::Found(*matched.value),
            Err(_) => RouteMatch::NotFound,
        }
    }
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routes")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Ensure a leading `/` and strip trailing ones; `""` and `"/"` mount at root
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
