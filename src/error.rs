//! Error taxonomy for the sync engine.
//!
//! Nothing here is fatal: transient failures are retried by the next poll tick
//! or the next scroll-to-edge event, malformed payloads degrade to an empty
//! result for that cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Request never produced a response (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the failure should simply be retried on the next cycle.
    /// Client errors other than timeouts and rate limits are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Status { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
