//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode on disk, JSON on the wire)
//! - Exact arithmetic (signed integers in the smallest currency unit)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get as string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque, stable account identifier
    AccountId
);

string_id!(
    /// Catalogue option identifier
    OptionId
);

string_id!(
    /// Physical terminal (dispenser) identifier
    TerminalId
);

impl AccountId {
    /// Allocate a fresh, time-ordered account ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}

impl OptionId {
    /// Allocate a fresh, time-ordered option ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}

/// Terminal ID recorded on entries created by administrative actions
pub const ADMIN_TERMINAL: &str = "admin";

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Credit added to the account (amount > 0)
    Recharge,
    /// Item bought from a terminal (amount < 0)
    Purchase,
}

impl EntryKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Recharge => "recharge",
            EntryKind::Purchase => "purchase",
        }
    }

    /// Whether `amount` carries the sign this kind requires
    pub fn accepts(&self, amount: i64) -> bool {
        match self {
            EntryKind::Recharge => amount > 0,
            EntryKind::Purchase => amount < 0,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account (balance + identity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account ID
    pub id: AccountId,

    /// RFID card identifier, unique across accounts
    pub card_id: String,

    /// Name shown on terminals
    pub display_name: String,

    /// Balance in the smallest currency unit
    pub balance: i64,

    /// False once soft-deleted
    pub active: bool,

    /// Administrative privileges (enforced outside the core)
    pub is_admin: bool,

    /// Last balance-affecting activity
    pub last_activity_at: Option<DateTime<Utc>>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last modification (drives incremental sync)
    pub updated_at: DateTime<Utc>,
}

/// Item terminals can sell, with a fixed price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueOption {
    /// Option ID
    pub id: OptionId,

    /// Label, copied onto purchase entries
    pub name: String,

    /// Price in the smallest currency unit (> 0)
    pub price: i64,

    /// Inactive options are hidden from terminals
    pub active: bool,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last modification (drives incremental sync)
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one balance-affecting event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Server-assigned unique ID
    pub id: Uuid,

    /// Server-assigned, strictly increasing commit sequence
    pub sequence: u64,

    /// Account the entry belongs to
    pub account_id: AccountId,

    /// Recharge or purchase
    pub kind: EntryKind,

    /// Signed amount (positive for recharge, negative for purchase)
    pub amount: i64,

    /// Balance immediately after this entry
    pub resulting_balance: i64,

    /// Optional label (purchases)
    pub item: Option<String>,

    /// Terminal that produced the entry
    pub terminal_id: TerminalId,

    /// Client-generated key, unique across the store
    pub idempotency_key: String,

    /// Server time at apply
    pub recorded_at: DateTime<Utc>,

    /// Terminal-reported time, advisory only
    pub client_timestamp: Option<DateTime<Utc>>,
}

/// Ledger entry before the storage layer assigns its sequence
#[derive(Debug, Clone)]
pub struct EntryDraft {
    /// Server-assigned unique ID
    pub id: Uuid,
    /// Account the entry belongs to
    pub account_id: AccountId,
    /// Recharge or purchase
    pub kind: EntryKind,
    /// Signed amount
    pub amount: i64,
    /// Balance immediately after this entry
    pub resulting_balance: i64,
    /// Optional label
    pub item: Option<String>,
    /// Originating terminal
    pub terminal_id: TerminalId,
    /// Client-generated idempotency key
    pub idempotency_key: String,
    /// Server time at apply
    pub recorded_at: DateTime<Utc>,
    /// Terminal-reported time
    pub client_timestamp: Option<DateTime<Utc>>,
}

impl EntryDraft {
    /// Seal the draft with its commit sequence
    pub fn into_entry(self, sequence: u64) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            sequence,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            resulting_balance: self.resulting_balance,
            item: self.item,
            terminal_id: self.terminal_id,
            idempotency_key: self.idempotency_key,
            recorded_at: self.recorded_at,
            client_timestamp: self.client_timestamp,
        }
    }
}

/// Input to [`crate::engine::LedgerEngine::apply`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Target account
    pub account_id: AccountId,

    /// Recharge or purchase
    pub kind: EntryKind,

    /// Signed amount; may be omitted for purchases that reference an option
    #[serde(default)]
    pub amount: Option<i64>,

    /// Catalogue option the purchase refers to
    #[serde(default)]
    pub option_id: Option<OptionId>,

    /// Optional label
    #[serde(default)]
    pub item: Option<String>,

    /// Originating terminal
    pub terminal_id: TerminalId,

    /// Client-generated idempotency key
    pub idempotency_key: String,

    /// Terminal-reported time
    #[serde(default)]
    pub client_timestamp: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    /// Plain recharge
    pub fn recharge(
        account_id: AccountId,
        amount: i64,
        terminal_id: TerminalId,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            kind: EntryKind::Recharge,
            amount: Some(amount),
            option_id: None,
            item: None,
            terminal_id,
            idempotency_key: idempotency_key.into(),
            client_timestamp: None,
        }
    }

    /// Purchase with an explicit (positive) price
    pub fn purchase(
        account_id: AccountId,
        price: i64,
        item: Option<String>,
        terminal_id: TerminalId,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            kind: EntryKind::Purchase,
            amount: Some(-price),
            option_id: None,
            item,
            terminal_id,
            idempotency_key: idempotency_key.into(),
            client_timestamp: None,
        }
    }

    /// Purchase priced from a catalogue option
    pub fn purchase_option(
        account_id: AccountId,
        option_id: OptionId,
        terminal_id: TerminalId,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            kind: EntryKind::Purchase,
            amount: None,
            option_id: Some(option_id),
            item: None,
            terminal_id,
            idempotency_key: idempotency_key.into(),
            client_timestamp: None,
        }
    }

    /// Validate shape before it reaches the engine
    pub fn validate(&self) -> crate::Result<()> {
        crate::validation::identifier("accountId", self.account_id.as_str())?;
        crate::validation::identifier("terminalId", self.terminal_id.as_str())?;
        crate::validation::idempotency_key(&self.idempotency_key)?;

        match (self.amount, &self.option_id) {
            (Some(amount), _) => crate::validation::signed_amount(self.kind, amount)?,
            (None, Some(option_id)) => {
                if self.kind != EntryKind::Purchase {
                    return Err(crate::Error::Validation(
                        "Only purchases can be priced from an option".to_string(),
                    ));
                }
                crate::validation::identifier("optionId", option_id.as_str())?;
            }
            (None, None) => {
                return Err(crate::Error::Validation(
                    "Either amount or optionId is required".to_string(),
                ));
            }
        }

        if let Some(item) = &self.item {
            crate::validation::label("item", item)?;
        }

        Ok(())
    }
}

/// Terminal as observed by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    /// Touched within the stale window
    Active,
    /// Not touched within the stale window
    Stale,
}

/// Terminal telemetry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    /// Terminal ID
    pub id: TerminalId,

    /// Free-form description
    pub description: Option<String>,

    /// First contact
    pub first_seen_at: DateTime<Utc>,

    /// Last sync or verification call
    pub last_seen_at: DateTime<Utc>,

    /// Status written on touch; readers derive staleness lazily
    pub status: TerminalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_sign() {
        assert!(EntryKind::Recharge.accepts(100));
        assert!(!EntryKind::Recharge.accepts(-100));
        assert!(EntryKind::Purchase.accepts(-45));
        assert!(!EntryKind::Purchase.accepts(0));
    }

    #[test]
    fn test_entry_kind_wire_name() {
        let json = serde_json::to_string(&EntryKind::Purchase).unwrap();
        assert_eq!(json, "\"purchase\"");
    }

    #[test]
    fn test_request_requires_amount_or_option() {
        let mut req = TransactionRequest::recharge(
            AccountId::new("a1"),
            100,
            TerminalId::new("t1"),
            "t1-1-abc",
        );
        assert!(req.validate().is_ok());

        req.amount = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_request_rejects_wrong_sign() {
        let mut req = TransactionRequest::purchase(
            AccountId::new("a1"),
            45,
            None,
            TerminalId::new("t1"),
            "t1-1-abc",
        );
        assert!(req.validate().is_ok());

        req.amount = Some(45);
        assert!(matches!(req.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn test_option_priced_recharge_rejected() {
        let mut req = TransactionRequest::purchase_option(
            AccountId::new("a1"),
            OptionId::new("espresso"),
            TerminalId::new("t1"),
            "t1-1-abc",
        );
        assert!(req.validate().is_ok());

        req.kind = EntryKind::Recharge;
        assert!(req.validate().is_err());
    }
}
