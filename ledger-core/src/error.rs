//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every `apply` call ends in exactly one of: a committed entry, a
/// duplicate replay (not an error, see [`crate::engine::ApplyOutcome`]),
/// or one of the rejections below.
#[derive(Error, Debug)]
pub enum Error {
    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account exists but was soft-deleted
    #[error("Account inactive: {0}")]
    AccountInactive(String),

    /// Purchase would drive the balance below zero
    #[error("Insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the check
        balance: i64,
        /// Signed amount that was requested
        requested: i64,
    },

    /// Catalogue option does not exist or is inactive
    #[error("Option not found: {0}")]
    OptionNotFound(String),

    /// Card identifier already assigned to another account
    #[error("Card already in use: {0}")]
    CardInUse(String),

    /// Storage failed or did not answer in time; safe to retry with the
    /// same idempotency key
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed input (missing fields, wrong sign, bad identifiers)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Concurrency error (blocking task panicked, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Concurrency(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Concurrency(err.to_string())
    }
}
