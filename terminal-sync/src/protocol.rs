//! Sync Protocol
//!
//! Terminals keep a local copy of accounts, options and recent entries and
//! may sell while disconnected. Two calls keep them aligned:
//!
//! - `pull`: incremental diff since the terminal's cursor
//! - `push_batch`: replay of transactions recorded offline, each applied
//!   through the Ledger Engine on its own
//!
//! # Cursors
//!
//! The timestamp cursor (`since`) returns records with
//! `since < t <= serverTime`; re-pulling with the returned `serverTime`
//! never re-delivers. Entries committed out of timestamp order can still
//! slip past it, so terminals that need gap-free transaction sync send
//! `afterSequence` (the previous `lastSequence`) as well.

use crate::{Error, Result};
use brewtab_ledger::{
    config::SyncConfig, validation, Account, ApplyOutcome, CatalogueOption, EntryKind,
    LedgerEngine, LedgerEntry, OptionId, TerminalId, TerminalRegistry, TransactionRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Input to [`SyncProtocol::pull`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Calling terminal
    pub terminal_id: TerminalId,
    /// Timestamp cursor; absent for a bootstrap snapshot
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Sequence cursor for transactions
    #[serde(default)]
    pub after_sequence: Option<u64>,
}

impl PullRequest {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        validation::identifier("terminalId", self.terminal_id.as_str())?;
        Ok(())
    }
}

/// Diff returned by [`SyncProtocol::pull`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Cursor for the next timestamp pull
    pub server_time: DateTime<Utc>,
    /// Cursor for the next sequence pull
    pub last_sequence: u64,
    /// Accounts (snapshot: active only; diff: every change, incl. deactivations)
    pub accounts: Vec<Account>,
    /// Options (snapshot: active only; diff: every change)
    pub options: Vec<CatalogueOption>,
    /// Ledger entries past the cursor
    pub transactions: Vec<LedgerEntry>,
}

/// One transaction recorded while offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineTransaction {
    /// Target account
    pub account_id: brewtab_ledger::AccountId,
    /// Recharge or purchase
    pub kind: EntryKind,
    /// Signed amount
    #[serde(default)]
    pub amount: Option<i64>,
    /// Catalogue option for option-priced purchases
    #[serde(default)]
    pub option_id: Option<OptionId>,
    /// Optional label
    #[serde(default)]
    pub item: Option<String>,
    /// Key generated on the terminal
    pub idempotency_key: String,
    /// Terminal clock at recording time
    #[serde(default)]
    pub client_timestamp: Option<DateTime<Utc>>,
}

impl OfflineTransaction {
    fn into_request(self, terminal_id: &TerminalId) -> TransactionRequest {
        TransactionRequest {
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            option_id: self.option_id,
            item: self.item,
            terminal_id: terminal_id.clone(),
            idempotency_key: self.idempotency_key,
            client_timestamp: self.client_timestamp,
        }
    }
}

/// Input to [`SyncProtocol::push_batch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatchRequest {
    /// Submitting terminal
    pub terminal_id: TerminalId,
    /// Transactions in the order they were recorded
    pub transactions: Vec<OfflineTransaction>,
}

impl PushBatchRequest {
    /// Validate the batch as a whole; items are validated one by one later
    pub fn validate(&self, max_batch_size: usize) -> Result<()> {
        validation::identifier("terminalId", self.terminal_id.as_str())?;
        if self.transactions.is_empty() {
            return Err(Error::Validation("Batch contains no transactions".to_string()));
        }
        if self.transactions.len() > max_batch_size {
            return Err(Error::Validation(format!(
                "Batch of {} exceeds the limit of {}",
                self.transactions.len(),
                max_batch_size
            )));
        }
        Ok(())
    }
}

/// Per-item outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Applied now
    Success,
    /// Key already applied earlier
    Skipped,
    /// Rejected; see `error`
    Error,
}

/// Outcome of one offline transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Key of the submitted item
    pub idempotency_key: String,
    /// Outcome
    pub status: ItemStatus,
    /// Resulting entry for success and skipped items
    pub entry: Option<LedgerEntry>,
    /// Machine-readable rejection code
    pub error_code: Option<String>,
    /// Human-readable rejection reason
    pub error: Option<String>,
    /// Whether resubmitting the item unchanged may succeed
    pub retryable: bool,
}

impl BatchItemResult {
    fn from_outcome(idempotency_key: String, outcome: Result<ApplyOutcome>) -> Self {
        match outcome {
            Ok(ApplyOutcome::Committed(entry)) => Self {
                idempotency_key,
                status: ItemStatus::Success,
                entry: Some(entry),
                error_code: None,
                error: None,
                retryable: false,
            },
            Ok(ApplyOutcome::Duplicate(entry)) => Self {
                idempotency_key,
                status: ItemStatus::Skipped,
                entry: Some(entry),
                error_code: None,
                error: None,
                retryable: false,
            },
            Err(e) => Self {
                idempotency_key,
                status: ItemStatus::Error,
                entry: None,
                error_code: Some(e.code().to_string()),
                retryable: e.is_retryable(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Sync Protocol
#[derive(Debug, Clone)]
pub struct SyncProtocol {
    engine: Arc<LedgerEngine>,
    registry: TerminalRegistry,
    config: SyncConfig,
}

impl SyncProtocol {
    /// Create the protocol over `engine`
    pub fn new(engine: Arc<LedgerEngine>, registry: TerminalRegistry, config: SyncConfig) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    /// Serve the diff since the terminal's cursor
    pub async fn pull(&self, request: PullRequest) -> Result<PullResponse> {
        request.validate()?;

        // Upper bound for this response; also the next cursor
        let server_time = Utc::now();
        let watermark = self.engine.storage().commit_watermark();

        let (accounts, options) = match request.since {
            None => (
                self.engine.list_active_accounts().await?,
                self.engine.list_active_options().await?,
            ),
            Some(since) => (
                self.engine.accounts_changed(since, server_time).await?,
                self.engine.options_changed(since, server_time).await?,
            ),
        };

        let (transactions, last_sequence) = match (request.after_sequence, request.since) {
            (Some(after), _) => self.engine.entries_after_sequence(after).await?,
            (None, Some(since)) => (
                self.engine
                    .entries_recorded_between(Some(since), server_time)
                    .await?,
                watermark,
            ),
            // Bootstrap: balances come with the accounts
            (None, None) => (Vec::new(), watermark),
        };

        self.registry.touch_best_effort(&request.terminal_id).await;

        debug!(
            terminal_id = %request.terminal_id,
            since = ?request.since,
            after_sequence = ?request.after_sequence,
            accounts = accounts.len(),
            options = options.len(),
            transactions = transactions.len(),
            "Pull served"
        );

        Ok(PullResponse {
            server_time,
            last_sequence,
            accounts,
            options,
            transactions,
        })
    }

    /// Apply a batch of offline transactions in submission order
    ///
    /// One failing item never aborts the batch.
    pub async fn push_batch(&self, request: PushBatchRequest) -> Result<Vec<BatchItemResult>> {
        request.validate(self.config.max_batch_size)?;
        self.engine.metrics().record_sync_batch(request.transactions.len());

        let terminal_id = request.terminal_id;
        let mut results = Vec::with_capacity(request.transactions.len());

        for item in request.transactions {
            let key = item.idempotency_key.clone();
            let outcome = self
                .engine
                .apply(item.into_request(&terminal_id))
                .await
                .map_err(Error::from);

            if let Err(e) = &outcome {
                warn!(
                    terminal_id = %terminal_id,
                    idempotency_key = %key,
                    "Offline transaction rejected: {}",
                    e
                );
            }
            results.push(BatchItemResult::from_outcome(key, outcome));
        }

        self.registry.touch_best_effort(&terminal_id).await;

        let applied = results.iter().filter(|r| r.status == ItemStatus::Success).count();
        let skipped = results.iter().filter(|r| r.status == ItemStatus::Skipped).count();
        info!(
            terminal_id = %terminal_id,
            total = results.len(),
            applied,
            skipped,
            failed = results.len() - applied - skipped,
            "Offline batch processed"
        );

        Ok(results)
    }
}
