//! Error types for stallplass-link

use thiserror::Error;

/// Errors produced by the synchronization layer.
///
/// Only [`SyncError::CompileError`] and [`SyncError::ConfigurationError`]
/// are ever returned from public calls once a subscription is open; every
/// other failure is captured into the `error` field of the exposed view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Invalid filter expression: {0}")]
    CompileError(String),

    #[error("Snapshot fetch failed: {0}")]
    FetchError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Malformed change event: {0}")]
    NormalizeError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors reported by a [`QueryBackend`](crate::snapshot::QueryBackend).
///
/// `NotFound` is kept apart from the other variants because a record
/// snapshot treats it as a successful "row does not exist" outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("No row matched the query")]
    NotFound,

    #[error("Server error {status_code}: {message}")]
    Server { status_code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QueryError::Decode(err.to_string())
        } else {
            QueryError::Transport(err.to_string())
        }
    }
}

impl From<QueryError> for SyncError {
    fn from(err: QueryError) -> Self {
        SyncError::FetchError(err.to_string())
    }
}
