//! Error types for the change-detection engine

use std::time::Duration;
use thiserror::Error;

/// Failure to read a snapshot from the source
///
/// All variants are treated as transient: the poller logs them and tries
/// again on the next tick.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Column `{column}` has an unsupported type")]
    UnsupportedColumn { column: String },

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported database scheme `{0}`")]
    UnsupportedDatabase(String),
}

impl SourceError {
    /// Whether the failure means the source could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::Timeout(_))
    }
}

/// Failure to hand a snapshot to a single subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Subscriber disconnected")]
    Disconnected,

    #[error("Subscriber buffer is full")]
    BufferFull,

    #[error("Delivery timed out")]
    TimedOut,

    #[error("Subscriber already closed")]
    Closed,
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Pool and connection level failures → unavailable
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => SourceError::Unavailable(err.to_string()),

            sqlx::Error::ColumnDecode { index, .. } => SourceError::UnsupportedColumn {
                column: index.clone(),
            },

            _ => SourceError::Query(err.to_string()),
        }
    }
}
