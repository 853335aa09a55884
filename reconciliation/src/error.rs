//! Error types for reconciliation

use thiserror::Error;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] brewtab_ledger::Error),

    /// Invalid schedule configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Background task failed to stop cleanly
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
