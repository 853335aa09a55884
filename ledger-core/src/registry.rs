//! Terminal registry
//!
//! Best-effort telemetry: which terminals have been in contact and when.
//! Staleness is derived on read from `last_seen_at`; nothing runs in the
//! background and nothing here ever blocks a ledger operation.

use crate::{
    storage::run_blocking,
    types::{Terminal, TerminalId, TerminalStatus},
    Result, Storage,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Tracks last contact per terminal
#[derive(Debug, Clone)]
pub struct TerminalRegistry {
    storage: Arc<Storage>,
    stale_after: Duration,
    timeout: std::time::Duration,
    // Serializes read-modify-write of terminal records
    touch_lock: Arc<Mutex<()>>,
}

impl TerminalRegistry {
    /// Create a registry over `storage`
    pub fn new(storage: Arc<Storage>, stale_after: std::time::Duration, timeout: std::time::Duration) -> Self {
        Self {
            storage,
            stale_after: Duration::from_std(stale_after).unwrap_or_else(|_| Duration::minutes(15)),
            timeout,
            touch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Upsert on contact: `last_seen_at = now`, `status = active`
    pub async fn touch(&self, terminal_id: &TerminalId, description: Option<String>) -> Result<Terminal> {
        let storage = self.storage.clone();
        let lock = self.touch_lock.clone();
        let terminal_id = terminal_id.clone();

        self.blocking(move || {
            let _guard = lock.lock();
            let now = Utc::now();
            let terminal = match storage.get_terminal(&terminal_id)? {
                Some(mut existing) => {
                    existing.last_seen_at = existing.last_seen_at.max(now);
                    existing.status = TerminalStatus::Active;
                    if description.is_some() {
                        existing.description = description;
                    }
                    existing
                }
                None => {
                    tracing::info!(terminal_id = %terminal_id, "First contact from terminal");
                    Terminal {
                        id: terminal_id,
                        description,
                        first_seen_at: now,
                        last_seen_at: now,
                        status: TerminalStatus::Active,
                    }
                }
            };
            storage.put_terminal(&terminal)?;
            Ok(terminal)
        })
        .await
    }

    /// Touch, logging instead of failing
    ///
    /// Used on the sync paths where terminal telemetry must not turn a
    /// successful ledger call into an error.
    pub async fn touch_best_effort(&self, terminal_id: &TerminalId) {
        if let Err(e) = self.touch(terminal_id, None).await {
            tracing::warn!(terminal_id = %terminal_id, error = %e, "Failed to record terminal contact");
        }
    }

    /// Look up one terminal with its effective status
    pub async fn get(&self, terminal_id: &TerminalId) -> Result<Option<Terminal>> {
        let storage = self.storage.clone();
        let terminal_id = terminal_id.clone();
        let now = Utc::now();
        let stale_after = self.stale_after;

        self.blocking(move || {
            Ok(storage
                .get_terminal(&terminal_id)?
                .map(|t| with_effective_status(t, now, stale_after)))
        })
        .await
    }

    /// Terminals ordered by `last_seen_at` descending
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Terminal>> {
        let storage = self.storage.clone();
        let now = Utc::now();
        let stale_after = self.stale_after;

        self.blocking(move || {
            let mut terminals = storage.list_terminals()?;
            terminals.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
            if let Some(limit) = limit {
                terminals.truncate(limit);
            }
            Ok(terminals
                .into_iter()
                .map(|t| with_effective_status(t, now, stale_after))
                .collect())
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        run_blocking(self.timeout, "terminal registry", f).await
    }
}

/// Status as seen at `now`
pub fn effective_status(terminal: &Terminal, now: DateTime<Utc>, stale_after: Duration) -> TerminalStatus {
    if now - terminal.last_seen_at > stale_after {
        TerminalStatus::Stale
    } else {
        TerminalStatus::Active
    }
}

fn with_effective_status(mut terminal: Terminal, now: DateTime<Utc>, stale_after: Duration) -> Terminal {
    terminal.status = effective_status(&terminal, now, stale_after);
    terminal
}
