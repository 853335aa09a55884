//! Service facade
//!
//! Single entry point for collaborators (HTTP layer, admin UI, hardware
//! bridge): every operation as a typed method, plus `handle` for the
//! tagged [`Request`] envelope.

use crate::api::{
    ApplyResponse, AuditResponse, ErrorResponse, HistoryRequest, Request, Response,
    VerifyIdentityRequest,
};
use crate::protocol::{BatchItemResult, PullRequest, PullResponse, PushBatchRequest, SyncProtocol};
use crate::{Error, Result};
use brewtab_ledger::{
    storage::run_blocking, Account, AccountId, AccountUpdate, ApplyOutcome, CatalogueOption, Config,
    HistoryPage, LedgerEngine, NewAccount, NewOption, OptionId, OptionUpdate, ProjectionCache,
    Storage, Terminal, TerminalRegistry, TransactionRequest,
};
use brewtab_reconciliation::{AuditReport, ConsistencyAuditor};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Days covered by the status history
const STATUS_HISTORY_DAYS: i64 = 7;

/// Entries recorded on one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    /// Day
    pub date: NaiveDate,
    /// Entries recorded
    pub count: usize,
}

/// Usage overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// Active accounts
    pub active_accounts: usize,
    /// All ledger entries
    pub total_entries: usize,
    /// Entries recorded since UTC midnight
    pub entries_today: usize,
    /// Per-day counts, oldest first, today last
    pub daily_entries: Vec<DailyCount>,
    /// Most recently seen terminals
    pub recent_terminals: Vec<Terminal>,
    /// Current sync watermark
    pub commit_watermark: u64,
    /// Snapshot time
    pub generated_at: DateTime<Utc>,
}

/// Store and cache reachability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// "ok", "degraded" (cache down) or "unavailable" (store down)
    pub status: String,
    /// Store answered a read
    pub storage: bool,
    /// Cache mode: connected, in_memory or degraded
    pub cache: String,
    /// Cache answered a ping
    pub cache_reachable: bool,
    /// Check time
    pub checked_at: DateTime<Utc>,
}

/// Service facade
#[derive(Debug, Clone)]
pub struct BrewtabService {
    engine: Arc<LedgerEngine>,
    registry: TerminalRegistry,
    protocol: SyncProtocol,
    auditor: Arc<ConsistencyAuditor>,
    config: Config,
}

impl BrewtabService {
    /// Open storage, build the cache and wire all components
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let cache = Arc::new(ProjectionCache::connect(&config.cache).await);
        Self::from_parts(storage, cache, config)
    }

    /// Wire components over an existing store and cache
    pub fn from_parts(storage: Arc<Storage>, cache: Arc<ProjectionCache>, config: Config) -> Result<Self> {
        let engine = Arc::new(LedgerEngine::new(storage.clone(), cache, &config)?);
        let registry = TerminalRegistry::new(
            storage,
            std::time::Duration::from_secs(config.sync.terminal_stale_after_secs),
            config.engine.storage_timeout(),
        );
        let protocol = SyncProtocol::new(engine.clone(), registry.clone(), config.sync.clone());
        let auditor = Arc::new(ConsistencyAuditor::new(engine.clone()));

        Ok(Self {
            engine,
            registry,
            protocol,
            auditor,
            config,
        })
    }

    /// Ledger Engine
    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    /// Auditor, for scheduling
    pub fn auditor(&self) -> &Arc<ConsistencyAuditor> {
        &self.auditor
    }

    /// Terminal registry
    pub fn registry(&self) -> &TerminalRegistry {
        &self.registry
    }

    // Core operations

    /// Resolve a card or account identifier
    pub async fn verify_identity(&self, request: VerifyIdentityRequest) -> Result<Account> {
        request.validate()?;
        if let Some(terminal_id) = &request.terminal_id {
            self.registry.touch_best_effort(terminal_id).await;
        }
        Ok(self.engine.verify_identity(&request.identifier).await?)
    }

    /// Apply one online transaction
    pub async fn apply_transaction(&self, request: TransactionRequest) -> Result<ApplyOutcome> {
        Ok(self.engine.apply(request).await?)
    }

    /// Serve a sync diff
    pub async fn pull_changes(&self, request: PullRequest) -> Result<PullResponse> {
        self.protocol.pull(request).await
    }

    /// Replay an offline batch
    pub async fn push_offline_batch(&self, request: PushBatchRequest) -> Result<Vec<BatchItemResult>> {
        self.protocol.push_batch(request).await
    }

    /// Page through an account's history
    pub async fn get_account_history(&self, request: HistoryRequest) -> Result<HistoryPage> {
        request.validate()?;
        Ok(self
            .engine
            .get_account_history(&request.account_id, request.limit, request.offset)
            .await?)
    }

    /// Run one auditor pass now
    pub async fn run_consistency_audit(&self) -> AuditReport {
        self.auditor.run_once().await
    }

    // Administration

    /// Create an account
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        Ok(self.engine.create_account(new).await?)
    }

    /// Whether a card identifier is free
    pub async fn card_available(&self, card_id: &str) -> Result<bool> {
        Ok(self.engine.card_available(card_id).await?)
    }

    /// Soft-delete an account
    pub async fn deactivate_account(&self, account_id: &AccountId) -> Result<Account> {
        Ok(self.engine.deactivate_account(account_id).await?)
    }

    /// Rename, re-card or change privileges of an account
    pub async fn update_account(&self, account_id: &AccountId, update: AccountUpdate) -> Result<Account> {
        Ok(self.engine.update_account(account_id, update).await?)
    }

    /// Active accounts
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.engine.list_active_accounts().await?)
    }

    /// Create a catalogue option
    pub async fn create_option(&self, new: NewOption) -> Result<CatalogueOption> {
        Ok(self.engine.create_option(new).await?)
    }

    /// Change a catalogue option
    pub async fn update_option(&self, option_id: &OptionId, update: OptionUpdate) -> Result<CatalogueOption> {
        Ok(self.engine.update_option(option_id, update).await?)
    }

    /// Active catalogue options
    pub async fn list_options(&self) -> Result<Vec<CatalogueOption>> {
        Ok(self.engine.list_active_options().await?)
    }

    /// Terminals by last contact, newest first
    pub async fn list_terminals(&self, limit: Option<usize>) -> Result<Vec<Terminal>> {
        Ok(self.registry.list(limit).await?)
    }

    // Monitoring

    /// Usage overview
    pub async fn system_status(&self) -> Result<SystemStatus> {
        let now = Utc::now();
        let today = now.date_naive();
        let storage = self.engine.storage().clone();

        let (total_entries, daily_entries) = run_blocking(
            self.engine.storage_timeout(),
            "system status",
            move || {
                let total = storage.count_entries()?;
                let mut daily = Vec::with_capacity(STATUS_HISTORY_DAYS as usize);
                for back in (0..STATUS_HISTORY_DAYS).rev() {
                    let date = today - Duration::days(back);
                    let start = day_start(date);
                    let count = storage.count_entries_between(start, start + Duration::days(1))?;
                    daily.push(DailyCount { date, count });
                }
                Ok((total, daily))
            },
        )
        .await?;

        let entries_today = daily_entries.last().map(|d| d.count).unwrap_or(0);
        let active_accounts = self.engine.list_active_accounts().await?.len();
        let recent_terminals = self
            .registry
            .list(Some(self.config.sync.recent_terminals))
            .await?;

        Ok(SystemStatus {
            active_accounts,
            total_entries,
            entries_today,
            daily_entries,
            recent_terminals,
            commit_watermark: self.engine.storage().commit_watermark(),
            generated_at: now,
        })
    }

    /// Store and cache reachability
    pub async fn health(&self) -> HealthReport {
        let storage = self.engine.storage().clone();
        let storage_ok = match run_blocking(self.engine.storage_timeout(), "health check", move || {
            storage.ping()
        })
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Storage health check failed: {}", e);
                false
            }
        };

        let cache = self.engine.cache();
        let cache_reachable = cache.ping().await;

        let status = if !storage_ok {
            "unavailable"
        } else if !cache_reachable {
            "degraded"
        } else {
            "ok"
        };

        HealthReport {
            status: status.to_string(),
            storage: storage_ok,
            cache: cache.backend_name().to_string(),
            cache_reachable,
            checked_at: Utc::now(),
        }
    }

    // Envelope

    /// Validate and dispatch a tagged request
    ///
    /// Never fails: rejections come back as [`Response::Error`].
    pub async fn handle(&self, request: Request) -> Response {
        let op = request.op();
        debug!(op, "Handling request");

        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(op, code = e.code(), "Request rejected: {}", e);
                Response::Error(ErrorResponse::from(&e))
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        request.validate(self.config.sync.max_batch_size)?;

        Ok(match request {
            Request::VerifyIdentity(req) => Response::Account(self.verify_identity(req).await?),
            Request::ApplyTransaction(req) => {
                let outcome = self.apply_transaction(req).await?;
                Response::Applied(ApplyResponse {
                    duplicate: outcome.is_duplicate(),
                    entry: outcome.into_entry(),
                })
            }
            Request::PullChanges(req) => Response::Changes(self.pull_changes(req).await?),
            Request::PushOfflineBatch(req) => {
                Response::BatchResults(self.push_offline_batch(req).await?)
            }
            Request::GetAccountHistory(req) => {
                Response::History(self.get_account_history(req).await?)
            }
            Request::RunConsistencyAudit => {
                let report = self.run_consistency_audit().await;
                Response::Audit(AuditResponse {
                    corrected: report.corrected_count(),
                    report,
                })
            }
            Request::CreateAccount(req) => Response::Account(self.create_account(req).await?),
            Request::CheckCard(req) => {
                Response::CardAvailable(self.card_available(&req.card_id).await?)
            }
            Request::DeactivateAccount(req) => {
                Response::Account(self.deactivate_account(&req.account_id).await?)
            }
            Request::UpdateAccount(req) => {
                Response::Account(self.update_account(&req.account_id, req.update).await?)
            }
            Request::ListAccounts => Response::Accounts(self.list_accounts().await?),
            Request::CreateOption(req) => Response::OptionSaved(self.create_option(req).await?),
            Request::UpdateOption(req) => {
                Response::OptionSaved(self.update_option(&req.option_id, req.update).await?)
            }
            Request::ListOptions => Response::Options(self.list_options().await?),
            Request::ListTerminals(req) => {
                Response::Terminals(self.list_terminals(req.limit).await?)
            }
            Request::SystemStatus => Response::Status(self.system_status().await?),
            Request::Health => Response::Health(self.health().await),
        })
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::Error(ErrorResponse::from(&err))
    }
}
