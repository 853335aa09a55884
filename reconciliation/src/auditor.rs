//! Consistency Auditor
//!
//! Recomputes every active account's balance from its ledger history and
//! rewrites the stored balance when they differ. Ledger entries are never
//! touched. Each account is checked under the same per-account lock as
//! `apply`, so a correction cannot interleave with a live purchase.
//!
//! Amounts are integer minor units, so any difference is drift.

use crate::{scheduler::ScheduledJob, Error, Result};
use async_trait::async_trait;
use brewtab_ledger::{
    storage::run_blocking, Account, AccountId, LedgerEngine,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One rewritten balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    /// Account that drifted
    pub account_id: AccountId,
    /// Stored balance before the correction
    pub previous_balance: i64,
    /// Σ amounts, now the stored balance
    pub corrected_balance: i64,
    /// Entries summed
    pub entry_count: usize,
}

impl Correction {
    /// Signed drift (stored minus expected)
    pub fn drift(&self) -> i64 {
        self.previous_balance - self.corrected_balance
    }
}

/// Outcome of one auditor pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// Pass start
    pub started_at: DateTime<Utc>,
    /// Pass end
    pub finished_at: DateTime<Utc>,
    /// Active accounts examined
    pub accounts_checked: usize,
    /// Balances rewritten
    pub corrections: Vec<Correction>,
    /// Accounts that could not be checked
    pub failures: usize,
}

impl AuditReport {
    /// Number of corrected accounts
    pub fn corrected_count(&self) -> usize {
        self.corrections.len()
    }
}

/// Self-healing balance auditor
#[derive(Debug, Clone)]
pub struct ConsistencyAuditor {
    engine: Arc<LedgerEngine>,
}

impl ConsistencyAuditor {
    /// Create an auditor over `engine`
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Run one full pass
    ///
    /// Never fails: per-account problems are logged and counted in
    /// `failures`.
    pub async fn run_once(&self) -> AuditReport {
        let started_at = Utc::now();
        info!("Consistency audit started");

        let mut report = AuditReport {
            started_at,
            finished_at: started_at,
            accounts_checked: 0,
            corrections: Vec::new(),
            failures: 0,
        };

        let accounts = match self.active_account_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Consistency audit could not list accounts: {}", e);
                report.failures += 1;
                report.finished_at = Utc::now();
                return report;
            }
        };

        for account_id in accounts {
            report.accounts_checked += 1;
            match self.audit_account(&account_id).await {
                Ok(Some(correction)) => report.corrections.push(correction),
                Ok(None) => {}
                Err(e) => {
                    warn!(account_id = %account_id, "Audit of account failed: {}", e);
                    report.failures += 1;
                }
            }
        }

        if !report.corrections.is_empty() {
            self.engine.invalidate_accounts().await;
        }
        self.engine.metrics().record_audit_run();

        report.finished_at = Utc::now();
        info!(
            accounts_checked = report.accounts_checked,
            corrected = report.corrected_count(),
            failures = report.failures,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Consistency audit finished"
        );
        report
    }

    /// Check one account, correcting it if it drifted
    pub async fn audit_account(&self, account_id: &AccountId) -> Result<Option<Correction>> {
        let guard = self.engine.lock_account(account_id).await?;
        let storage = self.engine.storage().clone();
        let id = account_id.clone();

        let correction = run_blocking(self.engine.storage_timeout(), "audit account", move || {
            let _guard = guard;
            let mut account = storage
                .get_account(&id)?
                .ok_or_else(|| brewtab_ledger::Error::AccountNotFound(id.to_string()))?;

            // Deactivated after the listing
            if !account.active {
                return Ok(None);
            }

            let (expected, entry_count) = storage.account_totals(&id)?;
            if account.balance == expected {
                return Ok(None);
            }

            let previous_balance = account.balance;
            account.balance = expected;
            account.updated_at = Utc::now();
            storage.put_account(&account)?;

            Ok(Some(Correction {
                account_id: id,
                previous_balance,
                corrected_balance: expected,
                entry_count,
            }))
        })
        .await?;

        match &correction {
            Some(c) => {
                warn!(
                    account_id = %c.account_id,
                    stored = c.previous_balance,
                    expected = c.corrected_balance,
                    drift = c.drift(),
                    "Balance drift corrected"
                );
                self.engine.metrics().record_audit_correction();
            }
            None => debug!(account_id = %account_id, "Balance consistent"),
        }

        Ok(correction)
    }

    async fn active_account_ids(&self) -> Result<Vec<AccountId>> {
        let storage = self.engine.storage().clone();
        let accounts: Vec<Account> = run_blocking(
            self.engine.storage_timeout(),
            "list accounts",
            move || storage.list_accounts(),
        )
        .await
        .map_err(Error::from)?;

        Ok(accounts
            .into_iter()
            .filter(|a| a.active)
            .map(|a| a.id)
            .collect())
    }
}

#[async_trait]
impl ScheduledJob for ConsistencyAuditor {
    fn name(&self) -> &str {
        "consistency-audit"
    }

    async fn run(&self) {
        self.run_once().await;
    }
}
