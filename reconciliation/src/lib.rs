//! Brewtab Reconciliation
//!
//! Periodic consistency auditing of account balances against the ledger.
//!
//! # Example
//!
//! ```no_run
//! use brewtab_ledger::{Config, LedgerEngine};
//! use brewtab_reconciliation::{Cadence, ConsistencyAuditor, DailySchedule, RecurringTask};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> brewtab_reconciliation::Result<()> {
//!     let engine = Arc::new(LedgerEngine::open(Config::default()).await?);
//!     let auditor = Arc::new(ConsistencyAuditor::new(engine));
//!
//!     // Direct invocation
//!     let report = auditor.run_once().await;
//!     println!("corrected {} accounts", report.corrected_count());
//!
//!     // Nightly at 03:00 UTC
//!     let task = RecurringTask::start(auditor, Cadence::Daily(DailySchedule::parse("03:00")?));
//!     task.stop().await?;
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod auditor;
pub mod error;
pub mod scheduler;

// Re-exports
pub use auditor::{AuditReport, ConsistencyAuditor, Correction};
pub use error::{Error, Result};
pub use scheduler::{Cadence, DailySchedule, RecurringTask, ScheduledJob};
