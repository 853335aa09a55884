//! Typed request/response envelope
//!
//! One tagged variant per operation, validated before anything reaches the
//! Ledger Engine. On the wire:
//!
//! ```json
//! {"op": "pushOfflineBatch", "terminalId": "t1", "transactions": [...]}
//! ```

use crate::protocol::{BatchItemResult, PullRequest, PullResponse, PushBatchRequest};
use crate::service::{HealthReport, SystemStatus};
use crate::{Error, Result};
use brewtab_ledger::{
    validation, Account, AccountId, AccountUpdate, CatalogueOption, HistoryPage, LedgerEntry, NewAccount,
    NewOption, OptionId, OptionUpdate, Terminal, TerminalId, TransactionRequest,
};
use brewtab_reconciliation::AuditReport;
use serde::{Deserialize, Serialize};

/// Resolve a card or account identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIdentityRequest {
    /// Card or account identifier
    pub identifier: String,
    /// Terminal doing the lookup, recorded as contact
    #[serde(default)]
    pub terminal_id: Option<TerminalId>,
}

impl VerifyIdentityRequest {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        validation::identifier("identifier", &self.identifier)?;
        if let Some(terminal_id) = &self.terminal_id {
            validation::identifier("terminalId", terminal_id.as_str())?;
        }
        Ok(())
    }
}

/// Page through an account's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    /// Account
    pub account_id: AccountId,
    /// Page size (default 20, capped at 100)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Entries to skip
    #[serde(default)]
    pub offset: usize,
}

impl HistoryRequest {
    /// Validate shape
    pub fn validate(&self) -> Result<()> {
        validation::identifier("accountId", self.account_id.as_str())?;
        if self.limit == Some(0) {
            return Err(Error::Validation("limit must be positive".to_string()));
        }
        Ok(())
    }
}

/// Card availability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCardRequest {
    /// Card identifier
    pub card_id: String,
}

/// Soft-delete an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateAccountRequest {
    /// Account
    pub account_id: AccountId,
}

/// Rename, re-card or change privileges of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    /// Account
    pub account_id: AccountId,
    /// Fields to change
    #[serde(flatten)]
    pub update: AccountUpdate,
}

/// Change a catalogue option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptionRequest {
    /// Option
    pub option_id: OptionId,
    /// Fields to change
    #[serde(flatten)]
    pub update: OptionUpdate,
}

/// Recently seen terminals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTerminalsRequest {
    /// Maximum terminals returned
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Every operation the core exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    /// Card/account lookup, read-only
    VerifyIdentity(VerifyIdentityRequest),
    /// Single online transaction
    ApplyTransaction(TransactionRequest),
    /// Incremental diff
    PullChanges(PullRequest),
    /// Offline replay
    PushOfflineBatch(PushBatchRequest),
    /// Paged history
    GetAccountHistory(HistoryRequest),
    /// Trigger an auditor pass
    RunConsistencyAudit,
    /// Create an account
    CreateAccount(NewAccount),
    /// Card availability
    CheckCard(CheckCardRequest),
    /// Soft-delete an account
    DeactivateAccount(DeactivateAccountRequest),
    /// Rename, re-card or change privileges of an account
    UpdateAccount(UpdateAccountRequest),
    /// Active accounts
    ListAccounts,
    /// Create a catalogue option
    CreateOption(NewOption),
    /// Change a catalogue option
    UpdateOption(UpdateOptionRequest),
    /// Active catalogue options
    ListOptions,
    /// Recently seen terminals
    ListTerminals(ListTerminalsRequest),
    /// Usage overview
    SystemStatus,
    /// Store and cache reachability
    Health,
}

impl Request {
    /// Validate shape before dispatch
    pub fn validate(&self, max_batch_size: usize) -> Result<()> {
        match self {
            Request::VerifyIdentity(req) => req.validate(),
            Request::ApplyTransaction(req) => Ok(req.validate()?),
            Request::PullChanges(req) => req.validate(),
            Request::PushOfflineBatch(req) => req.validate(max_batch_size),
            Request::GetAccountHistory(req) => req.validate(),
            Request::CreateAccount(req) => Ok(req.validate()?),
            Request::CheckCard(req) => Ok(validation::identifier("cardId", &req.card_id)?),
            Request::DeactivateAccount(req) => {
                Ok(validation::identifier("accountId", req.account_id.as_str())?)
            }
            Request::UpdateAccount(req) => {
                validation::identifier("accountId", req.account_id.as_str())?;
                Ok(req.update.validate()?)
            }
            Request::CreateOption(req) => Ok(req.validate()?),
            Request::UpdateOption(req) => {
                validation::identifier("optionId", req.option_id.as_str())?;
                Ok(req.update.validate()?)
            }
            Request::RunConsistencyAudit
            | Request::ListAccounts
            | Request::ListOptions
            | Request::ListTerminals(_)
            | Request::SystemStatus
            | Request::Health => Ok(()),
        }
    }

    /// Operation name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Request::VerifyIdentity(_) => "verifyIdentity",
            Request::ApplyTransaction(_) => "applyTransaction",
            Request::PullChanges(_) => "pullChanges",
            Request::PushOfflineBatch(_) => "pushOfflineBatch",
            Request::GetAccountHistory(_) => "getAccountHistory",
            Request::RunConsistencyAudit => "runConsistencyAudit",
            Request::CreateAccount(_) => "createAccount",
            Request::CheckCard(_) => "checkCard",
            Request::DeactivateAccount(_) => "deactivateAccount",
            Request::UpdateAccount(_) => "updateAccount",
            Request::ListAccounts => "listAccounts",
            Request::CreateOption(_) => "createOption",
            Request::UpdateOption(_) => "updateOption",
            Request::ListOptions => "listOptions",
            Request::ListTerminals(_) => "listTerminals",
            Request::SystemStatus => "systemStatus",
            Request::Health => "health",
        }
    }
}

/// Outcome of a single online transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    /// Committed or original entry
    pub entry: LedgerEntry,
    /// True when the key had already been applied
    pub duplicate: bool,
}

/// Auditor pass summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    /// Corrected-account count
    pub corrected: usize,
    /// Full report
    pub report: AuditReport,
}

/// Rejection body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether retrying unchanged may succeed
    pub retryable: bool,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Response to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "camelCase")]
pub enum Response {
    /// Verified account
    Account(Account),
    /// Transaction outcome
    Applied(ApplyResponse),
    /// Sync diff
    Changes(PullResponse),
    /// Per-item batch outcomes
    BatchResults(Vec<BatchItemResult>),
    /// History page
    History(HistoryPage),
    /// Audit summary
    Audit(AuditResponse),
    /// Card availability
    CardAvailable(bool),
    /// Account list
    Accounts(Vec<Account>),
    /// Created or updated option
    OptionSaved(CatalogueOption),
    /// Option list
    Options(Vec<CatalogueOption>),
    /// Terminal list
    Terminals(Vec<Terminal>),
    /// Usage overview
    Status(SystemStatus),
    /// Reachability
    Health(HealthReport),
    /// Rejected request
    Error(ErrorResponse),
}

impl Response {
    /// Whether this is a rejection
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_batch_wire_shape() {
        let request: Request = serde_json::from_value(json!({
            "op": "pushOfflineBatch",
            "terminalId": "t1",
            "transactions": [
                {
                    "accountId": "a1",
                    "kind": "purchase",
                    "amount": -45,
                    "idempotencyKey": "t1-100-abc"
                }
            ]
        }))
        .unwrap();

        let Request::PushOfflineBatch(batch) = &request else {
            panic!("wrong variant: {:?}", request);
        };
        assert_eq!(batch.transactions[0].amount, Some(-45));
        assert!(request.validate(500).is_ok());
    }

    #[test]
    fn test_unit_variants() {
        let request: Request = serde_json::from_value(json!({ "op": "runConsistencyAudit" })).unwrap();
        assert_eq!(request, Request::RunConsistencyAudit);
        assert_eq!(request.op(), "runConsistencyAudit");
    }

    #[test]
    fn test_update_option_flattened() {
        let request: Request = serde_json::from_value(json!({
            "op": "updateOption",
            "optionId": "espresso",
            "price": 50
        }))
        .unwrap();
        let Request::UpdateOption(update) = request else {
            panic!("wrong variant");
        };
        assert_eq!(update.update.price, Some(50));
        assert_eq!(update.update.name, None);
    }

    #[test]
    fn test_update_account_flattened() {
        let request: Request = serde_json::from_value(json!({
            "op": "updateAccount",
            "accountId": "a1",
            "cardId": "card-9",
            "isAdmin": true
        }))
        .unwrap();
        assert_eq!(request.op(), "updateAccount");
        assert!(request.validate(500).is_ok());

        let Request::UpdateAccount(update) = request else {
            panic!("wrong variant");
        };
        assert_eq!(update.update.card_id.as_deref(), Some("card-9"));
        assert_eq!(update.update.is_admin, Some(true));
        assert_eq!(update.update.display_name, None);

        let bad = Request::UpdateAccount(UpdateAccountRequest {
            account_id: AccountId::new("a1"),
            update: AccountUpdate {
                card_id: Some("bad card".to_string()),
                ..Default::default()
            },
        });
        assert!(matches!(bad.validate(500), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_runs_before_dispatch() {
        let empty = Request::PushOfflineBatch(PushBatchRequest {
            terminal_id: TerminalId::new("t1"),
            transactions: Vec::new(),
        });
        assert!(matches!(empty.validate(500), Err(Error::Validation(_))));

        let history = Request::GetAccountHistory(HistoryRequest {
            account_id: AccountId::new("a1"),
            limit: Some(0),
            offset: 0,
        });
        assert!(history.validate(500).is_err());

        let lookup = Request::VerifyIdentity(VerifyIdentityRequest {
            identifier: "bad id".to_string(),
            terminal_id: None,
        });
        assert!(lookup.validate(500).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let err = Error::from(brewtab_ledger::Error::InsufficientBalance { balance: 30, requested: -40 });
        let value = serde_json::to_value(Response::Error(ErrorResponse::from(&err))).unwrap();
        assert_eq!(value["op"], "error");
        assert_eq!(value["data"]["code"], "INSUFFICIENT_BALANCE");
        assert_eq!(value["data"]["retryable"], false);
    }
}
