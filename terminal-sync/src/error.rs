//! Error types for terminal sync

use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sync errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] brewtab_ledger::Error),

    /// Reconciliation error
    #[error("Reconciliation error: {0}")]
    Reconciliation(#[from] brewtab_reconciliation::Error),

    /// Request rejected before reaching the engine
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Stable machine-readable code for terminals
    pub fn code(&self) -> &'static str {
        use brewtab_ledger::Error as L;
        match self {
            Error::Ledger(L::AccountNotFound(_)) => "ACCOUNT_NOT_FOUND",
            Error::Ledger(L::AccountInactive(_)) => "ACCOUNT_INACTIVE",
            Error::Ledger(L::InsufficientBalance { .. }) => "INSUFFICIENT_BALANCE",
            Error::Ledger(L::OptionNotFound(_)) => "OPTION_NOT_FOUND",
            Error::Ledger(L::CardInUse(_)) => "CARD_IN_USE",
            Error::Ledger(L::StorageUnavailable(_)) => "STORAGE_UNAVAILABLE",
            Error::Ledger(L::Validation(_)) | Error::Validation(_) => "VALIDATION_ERROR",
            Error::Ledger(_) | Error::Reconciliation(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the terminal should retry unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }
}
