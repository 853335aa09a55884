//! Per-account serialization
//!
//! Every read-modify-write of an account balance happens while holding that
//! account's lock. Writes to different accounts proceed in parallel.
//!
//! Entries live only while someone holds or waits for them, so ids that
//! never resolve to an account do not accumulate.

use crate::{types::AccountId, Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<AccountId, Arc<Mutex<()>>>;

/// Guard proving exclusive access to one account
///
/// Owned, so it can move into a blocking task and stay held until the
/// storage write behind it has finished.
#[derive(Debug)]
pub struct AccountGuard {
    guard: Option<OwnedMutexGuard<()>>,
    account_id: AccountId,
    table: Arc<LockTable>,
}

impl AccountGuard {
    /// Account this guard serializes
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table's own Arc is the only one left when nobody else holds
        // or waits; `remove_if` runs under the shard lock `acquire` uses.
        self.table
            .remove_if(&self.account_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Lazily created async mutex per account
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Arc<LockTable>,
}

impl AccountLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to `account_id`
    pub async fn acquire(&self, account_id: &AccountId, timeout: Duration) -> Result<AccountGuard> {
        let lock = self
            .locks
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let acquired = tokio::time::timeout(timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(AccountGuard {
                guard: Some(guard),
                account_id: account_id.clone(),
                table: self.locks.clone(),
            }),
            Err(_) => {
                // The timed-out future already released its clone
                self.locks
                    .remove_if(account_id, |_, lock| Arc::strong_count(lock) == 1);
                Err(Error::StorageUnavailable(format!(
                    "Timed out waiting for account {} after {:?}",
                    account_id, timeout
                )))
            }
        }
    }

    /// Number of accounts currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no account is held or awaited
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
