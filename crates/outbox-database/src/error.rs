//! Store error types.

use crate::OutboxStatus;
use thiserror::Error;

/// Record store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection or executor error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// A record with this ID already exists
    #[error("Duplicate record ID: {0}")]
    DuplicateId(String),

    /// Not found error
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record is not in a state that allows the requested transition
    #[error("Record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: OutboxStatus,
        to: OutboxStatus,
    },

    /// The record is in progress under a different claim
    #[error("Record {id} is no longer claimed by {claimant_id}")]
    ClaimLost { id: String, claimant_id: String },

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
