//! Brewtab Ledger Core
//!
//! Shared balance ledger for coffee terminals that may run offline.
//!
//! # Architecture
//!
//! - **Append-only entries**: every balance change is an immutable ledger
//!   entry keyed by a client-generated idempotency key
//! - **Per-account serialization**: one async lock per account; distinct
//!   accounts never contend
//! - **Atomic batches**: entry, indices and new balance land in one RocksDB
//!   `WriteBatch`
//! - **Commit watermark**: a gap-free sequence cursor for terminal sync
//!
//! # Invariants
//!
//! - `account.balance == Σ entry.amount` for the account (checked by the
//!   auditor, repaired on drift)
//! - An idempotency key produces at most one entry
//! - A purchase never drives a balance below zero

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;
pub mod watermark;

// Re-exports
pub use cache::ProjectionCache;
pub use config::Config;
pub use engine::{
    AccountUpdate, ApplyOutcome, HistoryPage, LedgerEngine, NewAccount, NewOption, OptionUpdate,
};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use registry::TerminalRegistry;
pub use storage::Storage;
pub use types::{
    Account, AccountId, CatalogueOption, EntryKind, LedgerEntry, OptionId, Terminal, TerminalId,
    TerminalStatus, TransactionRequest,
};
