use std::time::Duration;
use thiserror::Error;

/// Result type for tokenlimit operations
pub type Result<T> = std::result::Result<T, TokenLimitError>;

/// Errors raised while building or configuring a limiter.
///
/// Admission checks never return these: a failing store is absorbed by the
/// limiter and answered from the in-process bucket.
#[derive(Error, Debug)]
pub enum TokenLimitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by a [`ScriptStore`](crate::rate_limit::ScriptStore).
///
/// A nil script reply is not an error; it is `ScriptReply::Nil`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported script")]
    UnsupportedScript,

    #[error("Malformed script argument: {0}")]
    MalformedArgument(String),
}

impl StoreError {
    /// Whether the failure is a connectivity problem rather than a bad request
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_timeout(),
            StoreError::Timeout(_) | StoreError::Unavailable(_) => true,
            StoreError::UnsupportedScript | StoreError::MalformedArgument(_) => false,
        }
    }
}
