//! Error types for the deployment watcher

use thiserror::Error;

/// Main error type for the deployment watcher
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Already watching DAO: {0}")]
    AlreadyWatching(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatchError {
    /// Whether the poll loop should retry after this error.
    ///
    /// Only transport-level failures qualify. A missing resource or a
    /// record that cannot be decoded ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::HttpError(_)
                | WatchError::Unavailable(_)
                | WatchError::Timeout(_)
                | WatchError::IoError(_)
        )
    }

    /// Whether this error is the distinguished "resource not found" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, WatchError::NotFound(_))
    }
}

impl From<anyhow::Error> for WatchError {
    fn from(err: anyhow::Error) -> Self {
        WatchError::Internal(err.to_string())
    }
}

/// Errors raised while decoding backend records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected a one-key variant record, got {0}")]
    NotAVariant(String),

    #[error("unhandled variant tag `{0}`")]
    UnhandledTag(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("nested `failed` status is not allowed in `lastStatus`")]
    NestedFailure,
}
