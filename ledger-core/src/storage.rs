//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `cards` - Unique card index (key: card_id, value: account_id)
//! - `entries` - Append-only ledger entries (key: sequence, big-endian)
//! - `idempotency` - Unique idempotency index (key: idempotency_key, value: sequence)
//! - `indices` - Secondary indices: `t || recorded_at || seq` and
//!   `a || account_id || 0x00 || recorded_at || seq`
//! - `options` - Catalogue options (key: option_id)
//! - `terminals` - Terminal telemetry (key: terminal_id)
//!
//! # Atomicity
//!
//! A ledger write stages the entry, its idempotency key, both index rows and
//! the updated account in one `WriteBatch`. The idempotency check and the
//! batch commit run under a key-striped lock, so the unique constraint on
//! `idempotency_key` holds here regardless of what callers do.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, CatalogueOption, EntryDraft, LedgerEntry, OptionId, Terminal, TerminalId},
    watermark::{CommitWatermark, Reservation},
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_CARDS: &str = "cards";
const CF_ENTRIES: &str = "entries";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_INDICES: &str = "indices";
const CF_OPTIONS: &str = "options";
const CF_TERMINALS: &str = "terminals";

const ALL_COLUMN_FAMILIES: [&str; 7] = [
    CF_ACCOUNTS,
    CF_CARDS,
    CF_ENTRIES,
    CF_IDEMPOTENCY,
    CF_INDICES,
    CF_OPTIONS,
    CF_TERMINALS,
];

/// Index prefixes inside `indices`
const IDX_TIME: u8 = b't';
const IDX_ACCOUNT: u8 = b'a';

/// Number of idempotency lock stripes
const KEY_STRIPES: usize = 64;

/// Result of appending a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry and account update committed
    Inserted(LedgerEntry),
    /// An entry with the same idempotency key already exists; nothing written
    Duplicate(LedgerEntry),
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    watermark: CommitWatermark,
    key_stripes: Vec<Mutex<()>>,
    card_lock: Mutex<()>,
    sync_writes: bool,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("watermark", &self.watermark.current())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = ALL_COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let last_sequence = Self::read_last_sequence(&db)?;

        tracing::info!(
            path = ?path,
            last_sequence,
            "Opened RocksDB with {} column families",
            ALL_COLUMN_FAMILIES.len()
        );

        Ok(Self {
            db,
            watermark: CommitWatermark::new(last_sequence),
            key_stripes: (0..KEY_STRIPES).map(|_| Mutex::new(())).collect(),
            card_lock: Mutex::new(()),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            CF_ENTRIES => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            CF_IDEMPOTENCY | CF_INDICES | CF_CARDS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                // Point lookups on unique keys benefit from bloom filters
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn read_last_sequence(db: &DB) -> Result<u64> {
        let cf = db
            .cf_handle(CF_ENTRIES)
            .ok_or_else(|| Error::StorageUnavailable(format!("Column family {} not found", CF_ENTRIES)))?;

        match db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                decode_sequence(&key)
            }
            None => Ok(0),
        }
    }

    // Helpers

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StorageUnavailable(format!("Column family {} not found", name)))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write_opt(batch, &self.write_options())?;
        Ok(())
    }

    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        let bytes = bincode::serialize(value)?;
        self.db.put_cf_opt(cf, key, bytes, &self.write_options())?;
        Ok(())
    }

    fn scan_values<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(bincode::deserialize(&value)?);
        }
        Ok(values)
    }

    fn stripe(&self, idempotency_key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        idempotency_key.hash(&mut hasher);
        &self.key_stripes[(hasher.finish() as usize) % KEY_STRIPES]
    }

    fn stage_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let seq_key = entry.sequence.to_be_bytes();

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, seq_key, bincode::serialize(entry)?);

        let cf_idempotency = self.cf_handle(CF_IDEMPOTENCY)?;
        batch.put_cf(cf_idempotency, entry.idempotency_key.as_bytes(), seq_key);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(cf_indices, index_key_time(&entry.recorded_at, entry.sequence), b"");
        batch.put_cf(
            cf_indices,
            index_key_account(&entry.account_id, &entry.recorded_at, entry.sequence),
            b"",
        );
        Ok(())
    }

    fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(cf, account.id.as_str().as_bytes(), bincode::serialize(account)?);
        Ok(())
    }

    // Account operations

    /// Get account by ID
    pub fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get_value(CF_ACCOUNTS, account_id.as_str().as_bytes())
    }

    /// Resolve a card identifier to its account
    pub fn find_account_by_card(&self, card_id: &str) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_CARDS)?;
        match self.db.get_cf(cf, card_id.as_bytes())? {
            Some(account_id) => {
                let account_id = AccountId::new(String::from_utf8_lossy(&account_id).into_owned());
                self.get_account(&account_id)
            }
            None => Ok(None),
        }
    }

    /// Whether a card identifier is free
    pub fn card_available(&self, card_id: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_CARDS)?;
        Ok(self.db.get_cf(cf, card_id.as_bytes())?.is_none())
    }

    /// All accounts, active or not
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.scan_values(CF_ACCOUNTS)
    }

    /// Overwrite an existing account record
    ///
    /// Callers must hold the account's lock. The card index is not touched.
    pub fn put_account(&self, account: &Account) -> Result<()> {
        self.put_value(CF_ACCOUNTS, account.id.as_str().as_bytes(), account)
    }

    /// Rewrite an account record, moving its card index row when the card
    /// changed
    ///
    /// Callers must hold the account's lock. The old row is removed and the
    /// new one written in the same batch as the record.
    pub fn update_account(&self, previous_card_id: &str, account: &Account) -> Result<()> {
        let _card_guard = self.card_lock.lock();

        let mut batch = WriteBatch::default();
        if previous_card_id != account.card_id {
            if !self.card_available(&account.card_id)? {
                return Err(Error::CardInUse(account.card_id.clone()));
            }
            let cf_cards = self.cf_handle(CF_CARDS)?;
            batch.delete_cf(cf_cards, previous_card_id.as_bytes());
            batch.put_cf(cf_cards, account.card_id.as_bytes(), account.id.as_str().as_bytes());
        }
        self.stage_account(&mut batch, account)?;
        self.write(batch)
    }

    /// Create an account, its card index row and an optional opening entry
    /// in one atomic batch
    pub fn create_account(
        &self,
        account: &Account,
        opening: Option<EntryDraft>,
    ) -> Result<Option<LedgerEntry>> {
        let _card_guard = self.card_lock.lock();

        if !self.card_available(&account.card_id)? {
            return Err(Error::CardInUse(account.card_id.clone()));
        }
        if self.get_account(&account.id)?.is_some() {
            return Err(Error::Validation(format!("Account {} already exists", account.id)));
        }

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, account)?;
        let cf_cards = self.cf_handle(CF_CARDS)?;
        batch.put_cf(cf_cards, account.card_id.as_bytes(), account.id.as_str().as_bytes());

        let Some(draft) = opening else {
            self.write(batch)?;
            return Ok(None);
        };

        let _key_guard = self.stripe(&draft.idempotency_key).lock();
        if self.get_entry_by_key(&draft.idempotency_key)?.is_some() {
            return Err(Error::Validation(format!(
                "Idempotency key {} already used",
                draft.idempotency_key
            )));
        }

        let reservation = Reservation::new(&self.watermark);
        let entry = draft.into_entry(reservation.seq());
        self.stage_entry(&mut batch, &entry)?;
        self.write(batch)?;
        drop(reservation);

        Ok(Some(entry))
    }

    // Ledger operations

    /// Append a ledger entry together with the updated account
    ///
    /// `account` must already carry `balance == draft.resulting_balance`.
    pub fn append_entry(&self, draft: EntryDraft, account: &Account) -> Result<AppendOutcome> {
        let _key_guard = self.stripe(&draft.idempotency_key).lock();

        if let Some(existing) = self.get_entry_by_key(&draft.idempotency_key)? {
            return Ok(AppendOutcome::Duplicate(existing));
        }

        let reservation = Reservation::new(&self.watermark);
        let entry = draft.into_entry(reservation.seq());

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &entry)?;
        self.stage_account(&mut batch, account)?;
        self.write(batch)?;
        drop(reservation);

        tracing::debug!(
            sequence = entry.sequence,
            account_id = %entry.account_id,
            idempotency_key = %entry.idempotency_key,
            "Entry appended"
        );

        Ok(AppendOutcome::Inserted(entry))
    }

    /// Get entry by sequence
    pub fn get_entry(&self, sequence: u64) -> Result<Option<LedgerEntry>> {
        self.get_value(CF_ENTRIES, &sequence.to_be_bytes())
    }

    /// Get entry by idempotency key
    pub fn get_entry_by_key(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;
        match self.db.get_cf(cf, idempotency_key.as_bytes())? {
            Some(seq) => {
                let sequence = decode_sequence(&seq)?;
                self.get_entry(sequence).and_then(|entry| {
                    entry.map(Some).ok_or_else(|| {
                        Error::StorageUnavailable(format!(
                            "Idempotency index points at missing entry {}",
                            sequence
                        ))
                    })
                })
            }
            None => Ok(None),
        }
    }

    fn account_sequences(&self, account_id: &AccountId) -> Result<Vec<u64>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_account(account_id);

        let mut sequences = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            sequences.push(decode_sequence(&key[key.len() - 8..])?);
        }
        Ok(sequences)
    }

    fn load_entries(&self, sequences: impl IntoIterator<Item = u64>) -> Result<Vec<LedgerEntry>> {
        sequences
            .into_iter()
            .map(|seq| {
                self.get_entry(seq)?.ok_or_else(|| {
                    Error::StorageUnavailable(format!("Index points at missing entry {}", seq))
                })
            })
            .collect()
    }

    /// Full history of an account, oldest first
    pub fn account_entries(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        let sequences = self.account_sequences(account_id)?;
        self.load_entries(sequences)
    }

    /// Page of an account's history, newest first, plus the total count
    pub fn account_history(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<LedgerEntry>, usize)> {
        let sequences = self.account_sequences(account_id)?;
        let total = sequences.len();
        let page = self.load_entries(sequences.into_iter().rev().skip(offset).take(limit))?;
        Ok((page, total))
    }

    /// Sum of amounts and entry count for an account
    pub fn account_totals(&self, account_id: &AccountId) -> Result<(i64, usize)> {
        let entries = self.account_entries(account_id)?;
        let sum = entries.iter().map(|e| e.amount).sum();
        Ok((sum, entries.len()))
    }

    /// Entries with `after < recorded_at <= until`, in time order
    pub fn entries_recorded_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let start = after.map(|t| time_nanos(&t).saturating_add(1)).unwrap_or(0);
        let end = time_nanos(&until);
        let sequences = self.time_index_scan(start, end)?;
        self.load_entries(sequences)
    }

    /// Number of entries with `from <= recorded_at < to`
    pub fn count_entries_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize> {
        let end = time_nanos(&to);
        if end == 0 {
            return Ok(0);
        }
        Ok(self.time_index_scan(time_nanos(&from), end - 1)?.len())
    }

    fn time_index_scan(&self, start_nanos: u64, end_nanos: u64) -> Result<Vec<u64>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let mut start_key = vec![IDX_TIME];
        start_key.extend_from_slice(&start_nanos.to_be_bytes());

        let mut sequences = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward))
        {
            let (key, _) = item?;
            if key.len() != 17 || key[0] != IDX_TIME {
                break;
            }
            if decode_sequence(&key[1..9])? > end_nanos {
                break;
            }
            sequences.push(decode_sequence(&key[9..17])?);
        }
        Ok(sequences)
    }

    /// Entries with `after < sequence <= until`, in sequence order
    pub fn entries_in_sequence_range(&self, after: u64, until: u64) -> Result<Vec<LedgerEntry>> {
        if until <= after {
            return Ok(Vec::new());
        }
        let cf = self.cf_handle(CF_ENTRIES)?;
        let start_key = (after + 1).to_be_bytes();

        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward))
        {
            let (key, value) = item?;
            if decode_sequence(&key)? > until {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    /// Exact number of ledger entries
    pub fn count_entries(&self) -> Result<usize> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Highest sequence with nothing in flight below it
    pub fn commit_watermark(&self) -> u64 {
        self.watermark.current()
    }

    // Catalogue operations

    /// Insert or overwrite a catalogue option
    pub fn put_option(&self, option: &CatalogueOption) -> Result<()> {
        self.put_value(CF_OPTIONS, option.id.as_str().as_bytes(), option)
    }

    /// Get catalogue option by ID
    pub fn get_option(&self, option_id: &OptionId) -> Result<Option<CatalogueOption>> {
        self.get_value(CF_OPTIONS, option_id.as_str().as_bytes())
    }

    /// All catalogue options
    pub fn list_options(&self) -> Result<Vec<CatalogueOption>> {
        self.scan_values(CF_OPTIONS)
    }

    // Terminal operations

    /// Insert or overwrite a terminal record
    pub fn put_terminal(&self, terminal: &Terminal) -> Result<()> {
        self.put_value(CF_TERMINALS, terminal.id.as_str().as_bytes(), terminal)
    }

    /// Get terminal by ID
    pub fn get_terminal(&self, terminal_id: &TerminalId) -> Result<Option<Terminal>> {
        self.get_value(CF_TERMINALS, terminal_id.as_str().as_bytes())
    }

    /// All terminals
    pub fn list_terminals(&self) -> Result<Vec<Terminal>> {
        self.scan_values(CF_TERMINALS)
    }

    // Statistics

    /// Round-trip a read to prove the store answers
    pub fn ping(&self) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db.get_cf(cf, b"\0ping")?;
        Ok(())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_entries: self.approximate_count(CF_ENTRIES)?,
            total_terminals: self.approximate_count(CF_TERMINALS)?,
            commit_watermark: self.watermark.current(),
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of accounts
    pub total_accounts: u64,
    /// Approximate number of ledger entries
    pub total_entries: u64,
    /// Approximate number of terminals
    pub total_terminals: u64,
    /// Current commit watermark
    pub commit_watermark: u64,
}

/// Run a synchronous storage closure on the blocking pool, bounded by
/// `timeout`
///
/// On timeout the closure keeps running to completion in the background;
/// anything it holds (account guards, reservations) is released only then.
pub async fn run_blocking<T, F>(timeout: std::time::Duration, what: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(joined) => joined?,
        Err(_) => Err(Error::StorageUnavailable(format!(
            "{} did not finish within {:?}",
            what, timeout
        ))),
    }
}

// Index key helpers

fn time_nanos(ts: &DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX).max(0) as u64
}

fn index_key_time(recorded_at: &DateTime<Utc>, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(IDX_TIME);
    key.extend_from_slice(&time_nanos(recorded_at).to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn index_prefix_account(account_id: &AccountId) -> Vec<u8> {
    let mut key = Vec::with_capacity(account_id.as_str().len() + 2);
    key.push(IDX_ACCOUNT);
    key.extend_from_slice(account_id.as_str().as_bytes());
    key.push(0); // Separator
    key
}

fn index_key_account(account_id: &AccountId, recorded_at: &DateTime<Utc>, sequence: u64) -> Vec<u8> {
    let mut key = index_prefix_account(account_id);
    key.extend_from_slice(&time_nanos(recorded_at).to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn decode_sequence(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Serialization(format!("Expected 8-byte key, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryKind, TerminalStatus};
    use crate::Config;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn test_account(id: &str, balance: i64) -> Account {
        let now = Utc::now();
        Account {
            id: AccountId::new(id),
            card_id: format!("card-{}", id),
            display_name: format!("User {}", id),
            balance,
            active: true,
            is_admin: false,
            last_activity_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn draft(account: &Account, amount: i64, key: &str, recorded_at: DateTime<Utc>) -> EntryDraft {
        EntryDraft {
            id: Uuid::now_v7(),
            account_id: account.id.clone(),
            kind: if amount > 0 { EntryKind::Recharge } else { EntryKind::Purchase },
            amount,
            resulting_balance: account.balance + amount,
            item: None,
            terminal_id: TerminalId::new("t1"),
            idempotency_key: key.to_string(),
            recorded_at,
            client_timestamp: None,
        }
    }

    fn append(storage: &Storage, account: &mut Account, amount: i64, key: &str) -> AppendOutcome {
        let d = draft(account, amount, key, Utc::now());
        let mut updated = account.clone();
        updated.balance = d.resulting_balance;
        let outcome = storage.append_entry(d, &updated).unwrap();
        if matches!(outcome, AppendOutcome::Inserted(_)) {
            *account = updated;
        }
        outcome
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        for name in ALL_COLUMN_FAMILIES {
            assert!(storage.db.cf_handle(name).is_some());
        }
        assert_eq!(storage.commit_watermark(), 0);
    }

    #[test]
    fn test_create_account_with_opening_entry() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let account = test_account("a1", 500);
        let opening = draft(&test_account("a1", 0), 500, "opening-a1", Utc::now());
        let entry = storage.create_account(&account, Some(opening)).unwrap().unwrap();

        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.resulting_balance, 500);
        assert_eq!(storage.get_account(&account.id).unwrap().unwrap().balance, 500);
        assert_eq!(
            storage.find_account_by_card("card-a1").unwrap().unwrap().id,
            account.id
        );
        assert_eq!(storage.account_totals(&account.id).unwrap(), (500, 1));
    }

    #[test]
    fn test_card_uniqueness() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.create_account(&test_account("a1", 0), None).unwrap();
        let mut other = test_account("a2", 0);
        other.card_id = "card-a1".to_string();

        let err = storage.create_account(&other, None).unwrap_err();
        assert!(matches!(err, Error::CardInUse(_)));
        assert!(!storage.card_available("card-a1").unwrap());
        assert!(storage.card_available("card-zz").unwrap());
    }

    #[test]
    fn test_update_account_moves_card_row() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        storage.create_account(&test_account("a1", 0), None).unwrap();
        storage.create_account(&test_account("a2", 0), None).unwrap();

        let mut account = storage.get_account(&AccountId::new("a1")).unwrap().unwrap();
        account.card_id = "card-new".to_string();
        storage.update_account("card-a1", &account).unwrap();

        assert!(storage.card_available("card-a1").unwrap());
        assert_eq!(
            storage.find_account_by_card("card-new").unwrap().unwrap().id,
            account.id
        );

        account.card_id = "card-a2".to_string();
        let err = storage.update_account("card-new", &account).unwrap_err();
        assert!(matches!(err, Error::CardInUse(_)));
        assert_eq!(
            storage.get_account(&account.id).unwrap().unwrap().card_id,
            "card-new"
        );
    }

    #[test]
    fn test_append_is_unique_per_key() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let mut account = test_account("a1", 0);
        storage.create_account(&account, None).unwrap();

        let first = append(&storage, &mut account, 100, "t1-1-abc");
        let second = append(&storage, &mut account, 100, "t1-1-abc");

        let AppendOutcome::Inserted(inserted) = first else { panic!("expected insert") };
        assert_eq!(second, AppendOutcome::Duplicate(inserted));
        assert_eq!(storage.get_account(&account.id).unwrap().unwrap().balance, 100);
        assert_eq!(storage.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_account_history_paging() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let mut account = test_account("a1", 0);
        storage.create_account(&account, None).unwrap();

        for i in 0..5 {
            append(&storage, &mut account, 10 + i, &format!("k{}", i));
        }

        let (page, total) = storage.account_history(&account.id, 2, 1).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        // Newest first, skipping the newest
        assert_eq!(page[0].idempotency_key, "k3");
        assert_eq!(page[1].idempotency_key, "k2");
    }

    #[test]
    fn test_account_index_does_not_leak_between_prefixes() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let mut short = test_account("ab", 0);
        let mut long = test_account("abc", 0);
        storage.create_account(&short, None).unwrap();
        storage.create_account(&long, None).unwrap();

        append(&storage, &mut short, 10, "k-short");
        append(&storage, &mut long, 20, "k-long");

        assert_eq!(storage.account_totals(&short.id).unwrap(), (10, 1));
        assert_eq!(storage.account_totals(&long.id).unwrap(), (20, 1));
    }

    #[test]
    fn test_time_range_is_exclusive_inclusive() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let account = test_account("a1", 0);
        storage.create_account(&account, None).unwrap();

        let base = Utc::now();
        let mut balance_holder = account.clone();
        for (i, offset) in [0i64, 10, 20].iter().enumerate() {
            let d = draft(&balance_holder, 5, &format!("k{}", i), base + Duration::milliseconds(*offset));
            balance_holder.balance = d.resulting_balance;
            storage.append_entry(d, &balance_holder).unwrap();
        }

        let after_first = storage
            .entries_recorded_between(Some(base), base + Duration::milliseconds(20))
            .unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].idempotency_key, "k1");

        let bounded = storage
            .entries_recorded_between(None, base + Duration::milliseconds(10))
            .unwrap();
        assert_eq!(bounded.len(), 2);

        let counted = storage
            .count_entries_between(base, base + Duration::milliseconds(20))
            .unwrap();
        assert_eq!(counted, 2);
    }

    #[test]
    fn test_sequence_range_and_restart() {
        let (config, _temp) = test_config();
        {
            let storage = Storage::open(&config).unwrap();
            let mut account = test_account("a1", 0);
            storage.create_account(&account, None).unwrap();
            for i in 0..3 {
                append(&storage, &mut account, 1, &format!("k{}", i));
            }
            assert_eq!(storage.commit_watermark(), 3);

            let range = storage.entries_in_sequence_range(1, 3).unwrap();
            assert_eq!(range.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
            assert!(storage.entries_in_sequence_range(3, 3).unwrap().is_empty());
        }

        // Sequences resume after the last committed entry
        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.commit_watermark(), 3);
    }

    #[test]
    fn test_options_and_terminals() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let now = Utc::now();

        let option = CatalogueOption {
            id: OptionId::new("espresso"),
            name: "Espresso".to_string(),
            price: 45,
            active: true,
            created_at: now,
            updated_at: now,
        };
        storage.put_option(&option).unwrap();
        assert_eq!(storage.get_option(&option.id).unwrap(), Some(option.clone()));
        assert_eq!(storage.list_options().unwrap().len(), 1);

        let terminal = Terminal {
            id: TerminalId::new("t1"),
            description: None,
            first_seen_at: now,
            last_seen_at: now,
            status: TerminalStatus::Active,
        };
        storage.put_terminal(&terminal).unwrap();
        assert_eq!(storage.get_terminal(&terminal.id).unwrap(), Some(terminal));
        storage.ping().unwrap();
    }
}
