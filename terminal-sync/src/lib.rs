//! Brewtab Terminal Sync
//!
//! Terminal-facing surface of the ledger: the Sync Protocol (pull and
//! offline batch push), the typed request envelope, and the service facade
//! that wires the Ledger Engine, Terminal Registry and Consistency Auditor.
//!
//! # Example
//!
//! ```no_run
//! use brewtab_ledger::Config;
//! use brewtab_sync::{BrewtabService, Request, Response};
//!
//! #[tokio::main]
//! async fn main() -> brewtab_sync::Result<()> {
//!     let service = BrewtabService::open(Config::default()).await?;
//!
//!     let request: Request = serde_json::from_str(r#"{"op": "health"}"#)
//!         .map_err(|e| brewtab_sync::Error::Validation(e.to_string()))?;
//!     if let Response::Health(report) = service.handle(request).await {
//!         println!("status: {}", report.status);
//!     }
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

pub mod api;
pub mod error;
pub mod protocol;
pub mod service;

// Re-exports
pub use api::{Request, Response};
pub use error::{Error, Result};
pub use protocol::{
    BatchItemResult, ItemStatus, OfflineTransaction, PullRequest, PullResponse, PushBatchRequest,
    SyncProtocol,
};
pub use service::{BrewtabService, DailyCount, HealthReport, SystemStatus};
