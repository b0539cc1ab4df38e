//! Relay error types.

use outbox_config::ConfigError;
use outbox_database::StoreError;
use thiserror::Error;

/// Failure to hand a record to the messaging system.
///
/// Every variant is treated the same by the dispatcher: one failed attempt
/// that counts against the record's retry budget.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Failure that may succeed on a later attempt
    #[error("Transient publish failure: {0}")]
    Transient(String),

    /// Failure that will not succeed on retry
    #[error("Permanent publish failure: {0}")]
    Permanent(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The sink has been closed
    #[error("Sink is closed")]
    Closed,
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Http(_))
    }
}

/// Result type alias using PublishError.
pub type PublishResult<T> = Result<T, PublishError>;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Record store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Publish sink error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// `start()` called on a running service
    #[error("Service already started")]
    AlreadyStarted,

    /// `start()` called after `stop()`
    #[error("Service has been stopped")]
    Stopped,
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
