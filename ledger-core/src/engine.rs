//! Ledger Engine
//!
//! Applies balance-affecting transactions atomically and idempotently, and
//! owns the administrative operations on accounts and catalogue options.
//!
//! # Apply pipeline
//!
//! 1. Validate the request shape
//! 2. Replay check: an existing entry with the same idempotency key is
//!    returned unchanged
//! 3. Resolve the amount (explicit, or `-price` of a catalogue option)
//! 4. Under the account's lock: read balance, check funds, then write the
//!    entry, its indices and the new balance in one batch
//! 5. Invalidate cached projections
//!
//! # Example
//!
//! ```no_run
//! use brewtab_ledger::{AccountId, Config, LedgerEngine, TerminalId, TransactionRequest};
//!
//! #[tokio::main]
//! async fn main() -> brewtab_ledger::Result<()> {
//!     let engine = LedgerEngine::open(Config::default()).await?;
//!
//!     let request = TransactionRequest::recharge(
//!         AccountId::new("0192f3a1"),
//!         100,
//!         TerminalId::new("t1"),
//!         "t1-1700000000000-k3j9x0a",
//!     );
//!     let outcome = engine.apply(request).await?;
//!     println!("balance now {}", outcome.entry().resulting_balance);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    cache::{keys, Invalidations, ProjectionCache},
    config::{CacheConfig, EngineConfig},
    locks::{AccountGuard, AccountLocks},
    metrics::Metrics,
    storage::{run_blocking, AppendOutcome},
    types::{
        Account, AccountId, CatalogueOption, EntryDraft, EntryKind, LedgerEntry, OptionId,
        TerminalId, TransactionRequest, ADMIN_TERMINAL,
    },
    validation, Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// History page size when the caller gives none
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Largest history page served
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Result of a successful `apply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New entry written, balance changed
    Committed(LedgerEntry),
    /// Idempotency key already used; the original entry, nothing written
    Duplicate(LedgerEntry),
}

impl ApplyOutcome {
    /// The committed or previously committed entry
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            ApplyOutcome::Committed(entry) | ApplyOutcome::Duplicate(entry) => entry,
        }
    }

    /// Consume into the entry
    pub fn into_entry(self) -> LedgerEntry {
        match self {
            ApplyOutcome::Committed(entry) | ApplyOutcome::Duplicate(entry) => entry,
        }
    }

    /// Whether this was a replay
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate(_))
    }
}

/// Page of account history, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Entries in this page
    pub entries: Vec<LedgerEntry>,
    /// Total entries for the account
    pub total: usize,
    /// Effective page size
    pub limit: usize,
    /// Entries skipped
    pub offset: usize,
    /// Whether more entries follow this page
    pub has_more: bool,
}

/// Input to [`LedgerEngine::create_account`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    /// Name shown on terminals
    pub display_name: String,
    /// RFID card identifier
    pub card_id: String,
    /// Opening credit; the configured default when absent
    #[serde(default)]
    pub initial_credit: Option<i64>,
    /// Administrative privileges
    #[serde(default)]
    pub is_admin: bool,
}

impl NewAccount {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        validation::label("displayName", &self.display_name)?;
        validation::identifier("cardId", &self.card_id)?;
        if let Some(credit) = self.initial_credit {
            if credit < 0 {
                return Err(Error::Validation(format!(
                    "initialCredit must not be negative, got {}",
                    credit
                )));
            }
        }
        Ok(())
    }
}

/// Partial update for an account's administrative fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    /// New name shown on terminals
    #[serde(default)]
    pub display_name: Option<String>,
    /// Replacement RFID card
    #[serde(default)]
    pub card_id: Option<String>,
    /// Grant or revoke administrative privileges
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl AccountUpdate {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.display_name {
            validation::label("displayName", name)?;
        }
        if let Some(card_id) = &self.card_id {
            validation::identifier("cardId", card_id)?;
        }
        Ok(())
    }
}

/// Input to [`LedgerEngine::create_option`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOption {
    /// Label
    pub name: String,
    /// Price in minor units
    pub price: i64,
}

impl NewOption {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        validation::label("name", &self.name)?;
        validation::price(self.price)
    }
}

/// Partial update for a catalogue option
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionUpdate {
    /// New label
    #[serde(default)]
    pub name: Option<String>,
    /// New price
    #[serde(default)]
    pub price: Option<i64>,
    /// Activate or retire
    #[serde(default)]
    pub active: Option<bool>,
}

impl OptionUpdate {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validation::label("name", name)?;
        }
        if let Some(price) = self.price {
            validation::price(price)?;
        }
        Ok(())
    }
}

/// Ledger Engine
#[derive(Debug)]
pub struct LedgerEngine {
    storage: Arc<Storage>,
    locks: AccountLocks,
    cache: Arc<ProjectionCache>,
    invalidations: Invalidations,
    metrics: Metrics,
    engine_config: EngineConfig,
    cache_config: CacheConfig,
}

impl LedgerEngine {
    /// Open storage and build the configured cache
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let cache = Arc::new(ProjectionCache::connect(&config.cache).await);
        Self::new(storage, cache, &config)
    }

    /// Assemble from existing parts
    pub fn new(storage: Arc<Storage>, cache: Arc<ProjectionCache>, config: &Config) -> Result<Self> {
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        info!(
            cache = cache.backend_name(),
            watermark = storage.commit_watermark(),
            "Ledger engine ready"
        );

        Ok(Self {
            storage,
            locks: AccountLocks::new(),
            cache,
            invalidations: Invalidations::new(),
            metrics,
            engine_config: config.engine.clone(),
            cache_config: config.cache.clone(),
        })
    }

    /// Underlying storage
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Projection cache
    pub fn cache(&self) -> &Arc<ProjectionCache> {
        &self.cache
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Bound for lock waits and storage calls
    pub fn storage_timeout(&self) -> Duration {
        self.engine_config.storage_timeout()
    }

    /// Take the account's lock
    ///
    /// Anything that rewrites an account balance outside `apply` (the
    /// auditor) must hold this guard for the whole read-modify-write.
    pub async fn lock_account(&self, account_id: &AccountId) -> Result<AccountGuard> {
        self.locks.acquire(account_id, self.storage_timeout()).await
    }

    async fn blocking<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        run_blocking(self.storage_timeout(), what, f).await
    }

    // Transactions

    /// Apply one transaction
    ///
    /// Ends in exactly one of: `Committed`, `Duplicate`, or an error. A
    /// `StorageUnavailable` error never means the entry was written unless a
    /// retry with the same idempotency key reports `Duplicate`.
    pub async fn apply(&self, request: TransactionRequest) -> Result<ApplyOutcome> {
        let start = Instant::now();
        let result = self.apply_inner(request).await;

        self.metrics.record_apply_duration(start.elapsed().as_secs_f64());
        match &result {
            Ok(ApplyOutcome::Committed(_)) => self.metrics.record_committed(),
            Ok(ApplyOutcome::Duplicate(_)) => self.metrics.record_duplicate(),
            Err(e) => self.metrics.record_rejected(rejection_reason(e)),
        }

        result
    }

    async fn apply_inner(&self, request: TransactionRequest) -> Result<ApplyOutcome> {
        request.validate()?;

        if let Some(existing) = self.find_entry_by_key(&request.idempotency_key).await? {
            debug!(
                idempotency_key = %request.idempotency_key,
                sequence = existing.sequence,
                "Replay answered with existing entry"
            );
            return Ok(ApplyOutcome::Duplicate(existing));
        }

        let (amount, item) = self.resolve_amount(&request).await?;

        let guard = self.lock_account(&request.account_id).await?;
        let storage = self.storage.clone();

        let outcome = self
            .blocking("apply", move || {
                let _guard = guard;
                commit_locked(&storage, request, amount, item)
            })
            .await?;

        match &outcome {
            ApplyOutcome::Committed(entry) => {
                info!(
                    account_id = %entry.account_id,
                    kind = %entry.kind,
                    amount = entry.amount,
                    resulting_balance = entry.resulting_balance,
                    sequence = entry.sequence,
                    terminal_id = %entry.terminal_id,
                    "Entry committed"
                );
                self.invalidate_accounts().await;
            }
            ApplyOutcome::Duplicate(entry) => {
                debug!(idempotency_key = %entry.idempotency_key, "Concurrent replay collapsed");
            }
        }

        Ok(outcome)
    }

    async fn resolve_amount(&self, request: &TransactionRequest) -> Result<(i64, Option<String>)> {
        match (request.amount, &request.option_id) {
            (Some(amount), _) => Ok((amount, request.item.clone())),
            (None, Some(option_id)) => {
                let option = self.get_option(option_id).await?;
                if !option.active {
                    return Err(Error::OptionNotFound(option_id.to_string()));
                }
                let item = request.item.clone().or(Some(option.name));
                Ok((-option.price, item))
            }
            (None, None) => Err(Error::Validation(
                "Either amount or optionId is required".to_string(),
            )),
        }
    }

    /// Look up an entry by idempotency key
    pub async fn find_entry_by_key(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        let storage = self.storage.clone();
        let key = idempotency_key.to_string();
        self.blocking("entry lookup", move || storage.get_entry_by_key(&key))
            .await
    }

    // Accounts

    /// Resolve a card or account identifier to an active account
    ///
    /// Read-only: no ledger effect and no activity timestamp change.
    /// Soft-deleted accounts are reported as not found.
    pub async fn verify_identity(&self, identifier: &str) -> Result<Account> {
        validation::identifier("identifier", identifier)?;

        let storage = self.storage.clone();
        let id = identifier.to_string();
        let account = self
            .blocking("verify identity", move || {
                match storage.find_account_by_card(&id)? {
                    Some(account) => Ok(Some(account)),
                    None => storage.get_account(&AccountId::new(id)),
                }
            })
            .await?;

        match account {
            Some(account) if account.active => Ok(account),
            _ => Err(Error::AccountNotFound(identifier.to_string())),
        }
    }

    /// Get account by ID
    pub async fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        let storage = self.storage.clone();
        let id = account_id.clone();
        self.blocking("account lookup", move || storage.get_account(&id))
            .await?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
    }

    /// Page through an account's history, newest first
    pub async fn get_account_history(
        &self,
        account_id: &AccountId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<HistoryPage> {
        validation::identifier("accountId", account_id.as_str())?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let storage = self.storage.clone();
        let id = account_id.clone();
        let (entries, total) = self
            .blocking("account history", move || {
                if storage.get_account(&id)?.is_none() {
                    return Err(Error::AccountNotFound(id.to_string()));
                }
                storage.account_history(&id, limit, offset)
            })
            .await?;

        Ok(HistoryPage {
            has_more: offset + entries.len() < total,
            entries,
            total,
            limit,
            offset,
        })
    }

    /// Create an account, recording any opening credit as a recharge
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        new.validate()?;

        let now = Utc::now();
        let credit = new
            .initial_credit
            .unwrap_or(self.engine_config.default_initial_credit)
            .max(0);
        let id = AccountId::generate();

        let account = Account {
            id: id.clone(),
            card_id: new.card_id,
            display_name: new.display_name.trim().to_string(),
            balance: credit,
            active: true,
            is_admin: new.is_admin,
            last_activity_at: (credit > 0).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let opening = (credit > 0).then(|| EntryDraft {
            id: Uuid::now_v7(),
            account_id: id.clone(),
            kind: EntryKind::Recharge,
            amount: credit,
            resulting_balance: credit,
            item: Some("Opening balance".to_string()),
            terminal_id: TerminalId::new(ADMIN_TERMINAL),
            idempotency_key: format!("opening-{}", id),
            recorded_at: now,
            client_timestamp: None,
        });

        let storage = self.storage.clone();
        let record = account.clone();
        self.blocking("create account", move || {
            storage.create_account(&record, opening)
        })
        .await?;

        info!(account_id = %account.id, initial_credit = credit, "Account created");
        self.invalidate_accounts().await;
        Ok(account)
    }

    /// Whether no account holds `card_id`
    pub async fn card_available(&self, card_id: &str) -> Result<bool> {
        validation::identifier("cardId", card_id)?;
        let storage = self.storage.clone();
        let card = card_id.to_string();
        self.blocking("card lookup", move || storage.card_available(&card))
            .await
    }

    /// Soft-delete an account
    pub async fn deactivate_account(&self, account_id: &AccountId) -> Result<Account> {
        let guard = self.lock_account(account_id).await?;
        let storage = self.storage.clone();
        let id = account_id.clone();

        let account = self
            .blocking("deactivate account", move || {
                let _guard = guard;
                let mut account = storage
                    .get_account(&id)?
                    .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
                if account.active {
                    account.active = false;
                    account.updated_at = Utc::now();
                    storage.put_account(&account)?;
                }
                Ok(account)
            })
            .await?;

        info!(account_id = %account.id, "Account deactivated");
        self.invalidate_accounts().await;
        Ok(account)
    }

    /// Rename, reassign the card of, or change privileges of an account
    ///
    /// A card change frees the old card and fails with `CardInUse` when the
    /// new one belongs to another account. Balance and activity are never
    /// touched here.
    pub async fn update_account(&self, account_id: &AccountId, update: AccountUpdate) -> Result<Account> {
        update.validate()?;

        let guard = self.lock_account(account_id).await?;
        let storage = self.storage.clone();
        let id = account_id.clone();

        let account = self
            .blocking("update account", move || {
                let _guard = guard;
                let mut account = storage
                    .get_account(&id)?
                    .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
                let previous_card = account.card_id.clone();

                if let Some(name) = update.display_name {
                    account.display_name = name.trim().to_string();
                }
                if let Some(card_id) = update.card_id {
                    account.card_id = card_id;
                }
                if let Some(is_admin) = update.is_admin {
                    account.is_admin = is_admin;
                }
                account.updated_at = Utc::now();

                storage.update_account(&previous_card, &account)?;
                Ok(account)
            })
            .await?;

        info!(account_id = %account.id, is_admin = account.is_admin, "Account updated");
        self.invalidate_accounts().await;
        Ok(account)
    }

    /// Active accounts, served from the projection cache when warm
    pub async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        if let Some(cached) = self.cache.get::<Vec<Account>>(keys::ACTIVE_ACCOUNTS).await {
            self.metrics.record_cache_lookup(true);
            return Ok(cached);
        }
        self.metrics.record_cache_lookup(false);

        let generation = self.invalidations.generation(keys::ACTIVE_ACCOUNTS).await;
        let storage = self.storage.clone();
        let accounts: Vec<Account> = self
            .blocking("list accounts", move || {
                Ok(storage
                    .list_accounts()?
                    .into_iter()
                    .filter(|a| a.active)
                    .collect())
            })
            .await?;

        self.invalidations
            .fill(
                &self.cache,
                keys::ACTIVE_ACCOUNTS,
                generation,
                &accounts,
                Duration::from_secs(self.cache_config.accounts_ttl_secs),
            )
            .await;
        Ok(accounts)
    }

    /// Accounts modified in `(after, until]`, active or not
    pub async fn accounts_changed(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        let storage = self.storage.clone();
        self.blocking("changed accounts", move || {
            Ok(storage
                .list_accounts()?
                .into_iter()
                .filter(|a| a.updated_at > after && a.updated_at <= until)
                .collect())
        })
        .await
    }

    /// Drop the cached account projection
    pub async fn invalidate_accounts(&self) {
        self.invalidations
            .invalidate(&self.cache, keys::ACTIVE_ACCOUNTS)
            .await;
    }

    // Catalogue options

    /// Add a catalogue option
    pub async fn create_option(&self, new: NewOption) -> Result<CatalogueOption> {
        new.validate()?;
        let now = Utc::now();
        let option = CatalogueOption {
            id: OptionId::generate(),
            name: new.name.trim().to_string(),
            price: new.price,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let storage = self.storage.clone();
        let record = option.clone();
        self.blocking("create option", move || storage.put_option(&record))
            .await?;

        info!(option_id = %option.id, price = option.price, "Option created");
        self.invalidate_options().await;
        Ok(option)
    }

    /// Change name, price or active flag of an option
    pub async fn update_option(&self, option_id: &OptionId, update: OptionUpdate) -> Result<CatalogueOption> {
        update.validate()?;
        let storage = self.storage.clone();
        let id = option_id.clone();

        let option = self
            .blocking("update option", move || {
                let mut option = storage
                    .get_option(&id)?
                    .ok_or_else(|| Error::OptionNotFound(id.to_string()))?;
                if let Some(name) = update.name {
                    option.name = name.trim().to_string();
                }
                if let Some(price) = update.price {
                    option.price = price;
                }
                if let Some(active) = update.active {
                    option.active = active;
                }
                option.updated_at = Utc::now();
                storage.put_option(&option)?;
                Ok(option)
            })
            .await?;

        info!(option_id = %option.id, active = option.active, "Option updated");
        self.invalidate_options().await;
        Ok(option)
    }

    /// Get option by ID, active or not
    pub async fn get_option(&self, option_id: &OptionId) -> Result<CatalogueOption> {
        let storage = self.storage.clone();
        let id = option_id.clone();
        self.blocking("option lookup", move || storage.get_option(&id))
            .await?
            .ok_or_else(|| Error::OptionNotFound(option_id.to_string()))
    }

    /// Active options, served from the projection cache when warm
    pub async fn list_active_options(&self) -> Result<Vec<CatalogueOption>> {
        if let Some(cached) = self.cache.get::<Vec<CatalogueOption>>(keys::ACTIVE_OPTIONS).await {
            self.metrics.record_cache_lookup(true);
            return Ok(cached);
        }
        self.metrics.record_cache_lookup(false);

        let generation = self.invalidations.generation(keys::ACTIVE_OPTIONS).await;
        let storage = self.storage.clone();
        let mut options: Vec<CatalogueOption> = self
            .blocking("list options", move || {
                Ok(storage
                    .list_options()?
                    .into_iter()
                    .filter(|o| o.active)
                    .collect())
            })
            .await?;
        options.sort_by(|a, b| a.name.cmp(&b.name));

        self.invalidations
            .fill(
                &self.cache,
                keys::ACTIVE_OPTIONS,
                generation,
                &options,
                Duration::from_secs(self.cache_config.options_ttl_secs),
            )
            .await;
        Ok(options)
    }

    async fn invalidate_options(&self) {
        self.invalidations
            .invalidate(&self.cache, keys::ACTIVE_OPTIONS)
            .await;
    }

    /// Options modified in `(after, until]`, active or not
    pub async fn options_changed(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CatalogueOption>> {
        let storage = self.storage.clone();
        self.blocking("changed options", move || {
            Ok(storage
                .list_options()?
                .into_iter()
                .filter(|o| o.updated_at > after && o.updated_at <= until)
                .collect())
        })
        .await
    }

    // Ledger reads for sync

    /// Entries recorded in `(after, until]`
    pub async fn entries_recorded_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let storage = self.storage.clone();
        self.blocking("entries by time", move || {
            storage.entries_recorded_between(after, until)
        })
        .await
    }

    /// Entries after `after_sequence` up to the commit watermark, plus the
    /// watermark itself
    pub async fn entries_after_sequence(&self, after_sequence: u64) -> Result<(Vec<LedgerEntry>, u64)> {
        let storage = self.storage.clone();
        self.blocking("entries by sequence", move || {
            let watermark = storage.commit_watermark();
            let entries = storage.entries_in_sequence_range(after_sequence, watermark)?;
            Ok((entries, watermark))
        })
        .await
    }
}

/// Read-check-write for one transaction; caller holds the account lock
fn commit_locked(
    storage: &Storage,
    request: TransactionRequest,
    amount: i64,
    item: Option<String>,
) -> Result<ApplyOutcome> {
    // Same-account replays are serialized by the lock, so this re-check is
    // exact for them; cross-account reuse is caught by `append_entry`.
    if let Some(existing) = storage.get_entry_by_key(&request.idempotency_key)? {
        return Ok(ApplyOutcome::Duplicate(existing));
    }

    let mut account = storage
        .get_account(&request.account_id)?
        .ok_or_else(|| Error::AccountNotFound(request.account_id.to_string()))?;

    if !account.active {
        return Err(Error::AccountInactive(account.id.to_string()));
    }

    let new_balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| Error::Validation(format!("Amount {} overflows balance", amount)))?;

    if request.kind == EntryKind::Purchase && new_balance < 0 {
        warn!(
            account_id = %account.id,
            balance = account.balance,
            requested = amount,
            "Purchase rejected for insufficient balance"
        );
        return Err(Error::InsufficientBalance {
            balance: account.balance,
            requested: amount,
        });
    }

    let now = Utc::now();
    let draft = EntryDraft {
        id: Uuid::now_v7(),
        account_id: account.id.clone(),
        kind: request.kind,
        amount,
        resulting_balance: new_balance,
        item,
        terminal_id: request.terminal_id,
        idempotency_key: request.idempotency_key,
        recorded_at: now,
        client_timestamp: request.client_timestamp,
    };

    account.balance = new_balance;
    account.last_activity_at = Some(now);
    account.updated_at = now;

    Ok(match storage.append_entry(draft, &account)? {
        AppendOutcome::Inserted(entry) => ApplyOutcome::Committed(entry),
        AppendOutcome::Duplicate(entry) => ApplyOutcome::Duplicate(entry),
    })
}

/// Metric label for a rejected apply
pub fn rejection_reason(err: &Error) -> &'static str {
    match err {
        Error::AccountNotFound(_) => "account_not_found",
        Error::AccountInactive(_) => "account_inactive",
        Error::InsufficientBalance { .. } => "insufficient_balance",
        Error::OptionNotFound(_) => "option_not_found",
        Error::Validation(_) => "validation",
        Error::StorageUnavailable(_) => "storage_unavailable",
        _ => "internal",
    }
}
