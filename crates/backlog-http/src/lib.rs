//! # Backlog HTTP
//!
//! HTTP surface of the backlog feed, served with hyper.
//!
//! - `GET {prefix}/stream`: Server-Sent Events, one `backlog-update` event
//!   per changed snapshot
//! - `GET {prefix}/all`: the source queried on demand, as JSON
//! - `GET /health`: subscriber count and size of the last broadcast snapshot
//!
//! ```rust,ignore
//! use backlog_http::{bind, shutdown_signal, AppState, Server};
//!
//! let state = AppState::new(source, registry, store);
//! let listener = bind("0.0.0.0:8080").await?;
//! Server::new(state, "/backlog")?.serve(listener, shutdown_signal()).await?;
//! ```

pub mod cors;
mod error;
mod handlers;
mod response;
mod router;
mod server;
pub mod sse;
mod state;

pub use cors::{AllowedOrigins, CorsLayer};
pub use error::{ApiError, ServerError};
pub use handlers::UPDATE_EVENT;
pub use response::{Body, IntoResponse, Json, Response};
pub use router::{normalize_prefix, Route, RouteMatch, Routes, DEFAULT_PREFIX};
pub use server::{bind, shutdown_signal, Server};
pub use sse::{Sse, SseEvent};
pub use state::{AppState, DEFAULT_KEEP_ALIVE};
