//! End-to-end terminal scenarios through the service facade

use brewtab_ledger::{AccountId, Config, EntryKind, NewAccount, TerminalId, TransactionRequest};
use brewtab_sync::api::{HistoryRequest, VerifyIdentityRequest};
use brewtab_sync::{
    BrewtabService, ItemStatus, OfflineTransaction, PullRequest, PushBatchRequest, Request,
    Response,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_service() -> (BrewtabService, TempDir) {
    create_test_service_with(|_| {}).await
}

async fn create_test_service_with(tweak: impl FnOnce(&mut Config)) -> (BrewtabService, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.rocksdb.sync_writes = false;
    tweak(&mut config);

    (BrewtabService::open(config).await.unwrap(), temp_dir)
}

async fn create_account(service: &BrewtabService, card: &str, credit: i64) -> AccountId {
    service
        .create_account(NewAccount {
            display_name: format!("Holder {}", card),
            card_id: card.to_string(),
            initial_credit: Some(credit),
            is_admin: false,
        })
        .await
        .unwrap()
        .id
}

fn purchase(account_id: &AccountId, price: i64, key: &str) -> OfflineTransaction {
    OfflineTransaction {
        account_id: account_id.clone(),
        kind: EntryKind::Purchase,
        amount: Some(-price),
        option_id: None,
        item: Some("Espresso".to_string()),
        idempotency_key: key.to_string(),
        client_timestamp: None,
    }
}

fn recharge(account_id: &AccountId, amount: i64, key: &str) -> OfflineTransaction {
    OfflineTransaction {
        account_id: account_id.clone(),
        kind: EntryKind::Recharge,
        amount: Some(amount),
        option_id: None,
        item: None,
        idempotency_key: key.to_string(),
        client_timestamp: None,
    }
}

/// Idempotency key in the terminal format `<terminal>-<clock>-<random>`
fn offline_key(terminal_id: &TerminalId, client_clock_ms: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", terminal_id, client_clock_ms, suffix)
}

fn batch(terminal: &str, transactions: Vec<OfflineTransaction>) -> PushBatchRequest {
    PushBatchRequest {
        terminal_id: TerminalId::new(terminal),
        transactions,
    }
}

#[tokio::test]
async fn test_offline_batch_applies_in_order() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;

    let results = service
        .push_offline_batch(batch(
            "t1",
            vec![
                purchase(&account, 45, "t1-100-abc"),
                recharge(&account, 100, "t1-200-def"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == ItemStatus::Success));
    assert_eq!(results[0].entry.as_ref().unwrap().resulting_balance, 455);
    assert_eq!(results[1].entry.as_ref().unwrap().resulting_balance, 555);

    let account = service.engine().get_account(&account).await.unwrap();
    assert_eq!(account.balance, 555);
}

#[tokio::test]
async fn test_resubmitted_batch_is_skipped() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;
    let items = vec![
        purchase(&account, 45, "t1-100-abc"),
        recharge(&account, 100, "t1-200-def"),
    ];

    let first = service.push_offline_batch(batch("t1", items.clone())).await.unwrap();
    let again = service.push_offline_batch(batch("t1", items)).await.unwrap();

    assert!(again.iter().all(|r| r.status == ItemStatus::Skipped));
    // Skipped items echo the original entries
    assert_eq!(again[0].entry, first[0].entry);
    assert_eq!(again[1].entry, first[1].entry);

    assert_eq!(service.engine().get_account(&account).await.unwrap().balance, 555);
    let history = service
        .get_account_history(HistoryRequest {
            account_id: account,
            limit: None,
            offset: 0,
        })
        .await
        .unwrap();
    // Opening credit plus the two offline items
    assert_eq!(history.total, 3);
}

#[tokio::test]
async fn test_insufficient_balance_leaves_no_trace() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 30).await;

    let results = service
        .push_offline_batch(batch("t1", vec![purchase(&account, 40, "t1-300-ghi")]))
        .await
        .unwrap();

    assert_eq!(results[0].status, ItemStatus::Error);
    assert_eq!(results[0].error_code.as_deref(), Some("INSUFFICIENT_BALANCE"));
    assert!(!results[0].retryable);
    assert!(results[0].entry.is_none());

    assert_eq!(service.engine().get_account(&account).await.unwrap().balance, 30);
    assert!(service
        .engine()
        .find_entry_by_key("t1-300-ghi")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failing_item_does_not_abort_batch() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;
    let ghost = AccountId::new("no-such-account");

    let results = service
        .push_offline_batch(batch(
            "t1",
            vec![
                purchase(&account, 45, "t1-100-abc"),
                purchase(&ghost, 10, "t1-110-xyz"),
                recharge(&account, 100, "t1-200-def"),
            ],
        ))
        .await
        .unwrap();

    let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Success, ItemStatus::Error, ItemStatus::Success]
    );
    assert_eq!(results[1].error_code.as_deref(), Some("ACCOUNT_NOT_FOUND"));
    assert_eq!(service.engine().get_account(&account).await.unwrap().balance, 555);
}

#[tokio::test]
async fn test_batch_size_limits() {
    let (service, _temp) = create_test_service_with(|c| c.sync.max_batch_size = 2).await;
    let account = create_account(&service, "card-a", 500).await;

    let empty = service.push_offline_batch(batch("t1", Vec::new())).await;
    assert!(empty.is_err());

    let oversized = service
        .push_offline_batch(batch(
            "t1",
            vec![
                purchase(&account, 1, "t1-1-a"),
                purchase(&account, 1, "t1-2-b"),
                purchase(&account, 1, "t1-3-c"),
            ],
        ))
        .await;
    assert_eq!(oversized.unwrap_err().code(), "VALIDATION_ERROR");

    // Rejected whole: nothing applied
    assert_eq!(service.engine().get_account(&account).await.unwrap().balance, 500);
}

#[tokio::test]
async fn test_pull_bootstrap_then_incremental() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;
    let terminal = TerminalId::new("t1");

    let snapshot = service
        .pull_changes(PullRequest {
            terminal_id: terminal.clone(),
            since: None,
            after_sequence: None,
        })
        .await
        .unwrap();
    assert_eq!(snapshot.accounts.len(), 1);
    assert_eq!(snapshot.accounts[0].balance, 500);
    assert!(snapshot.transactions.is_empty());

    tokio::time::sleep(Duration::from_millis(5)).await;
    service
        .push_offline_batch(batch(
            "t2",
            vec![
                purchase(&account, 45, "t2-100-abc"),
                recharge(&account, 100, "t2-200-def"),
            ],
        ))
        .await
        .unwrap();

    let diff = service
        .pull_changes(PullRequest {
            terminal_id: terminal.clone(),
            since: Some(snapshot.server_time),
            after_sequence: None,
        })
        .await
        .unwrap();
    assert_eq!(diff.transactions.len(), 2);
    assert_eq!(diff.accounts.len(), 1);
    assert_eq!(diff.accounts[0].balance, 555);
    assert!(diff.server_time >= snapshot.server_time);

    // Re-pulling from the returned cursor never re-delivers
    let repeat = service
        .pull_changes(PullRequest {
            terminal_id: terminal,
            since: Some(diff.server_time),
            after_sequence: None,
        })
        .await
        .unwrap();
    assert!(repeat.transactions.is_empty());
    assert!(repeat.accounts.is_empty());
}

#[tokio::test]
async fn test_pull_by_sequence_is_gap_free() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 1_000).await;
    let terminal = TerminalId::new("t1");

    let snapshot = service
        .pull_changes(PullRequest {
            terminal_id: terminal.clone(),
            since: None,
            after_sequence: None,
        })
        .await
        .unwrap();

    for i in 0..5 {
        service
            .apply_transaction(TransactionRequest::purchase(
                account.clone(),
                10,
                None,
                TerminalId::new("t2"),
                offline_key(&TerminalId::new("t2"), 1_000 + i),
            ))
            .await
            .unwrap();
    }

    let diff = service
        .pull_changes(PullRequest {
            terminal_id: terminal.clone(),
            since: Some(snapshot.server_time),
            after_sequence: Some(snapshot.last_sequence),
        })
        .await
        .unwrap();

    let sequences: Vec<u64> = diff.transactions.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (snapshot.last_sequence + 1..=snapshot.last_sequence + 5).collect();
    assert_eq!(sequences, expected);
    assert_eq!(diff.last_sequence, snapshot.last_sequence + 5);

    let repeat = service
        .pull_changes(PullRequest {
            terminal_id: terminal,
            since: Some(diff.server_time),
            after_sequence: Some(diff.last_sequence),
        })
        .await
        .unwrap();
    assert!(repeat.transactions.is_empty());
    assert_eq!(repeat.last_sequence, diff.last_sequence);
}

#[tokio::test]
async fn test_verify_identity_records_terminal() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;

    let by_card = service
        .verify_identity(VerifyIdentityRequest {
            identifier: "card-a".to_string(),
            terminal_id: Some(TerminalId::new("t7")),
        })
        .await
        .unwrap();
    assert_eq!(by_card.id, account);

    let by_id = service
        .verify_identity(VerifyIdentityRequest {
            identifier: account.as_str().to_string(),
            terminal_id: None,
        })
        .await
        .unwrap();
    assert_eq!(by_id.card_id, "card-a");

    let terminals = service.list_terminals(None).await.unwrap();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].id, TerminalId::new("t7"));

    service.deactivate_account(&account).await.unwrap();
    let gone = service
        .verify_identity(VerifyIdentityRequest {
            identifier: "card-a".to_string(),
            terminal_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(gone.code(), "ACCOUNT_NOT_FOUND");
}

#[tokio::test]
async fn test_handle_json_envelope() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;

    let request: Request = serde_json::from_value(json!({
        "op": "pushOfflineBatch",
        "terminalId": "t1",
        "transactions": [
            { "accountId": account.as_str(), "kind": "purchase", "amount": -45, "idempotencyKey": "t1-100-abc" },
            { "accountId": account.as_str(), "kind": "purchase", "amount": -9000, "idempotencyKey": "t1-101-abc" }
        ]
    }))
    .unwrap();

    let value = serde_json::to_value(service.handle(request).await).unwrap();
    assert_eq!(value["op"], "batchResults");
    assert_eq!(value["data"][0]["status"], "success");
    assert_eq!(value["data"][0]["entry"]["resultingBalance"], 455);
    assert_eq!(value["data"][1]["status"], "error");
    assert_eq!(value["data"][1]["errorCode"], "INSUFFICIENT_BALANCE");

    let bad: Request = serde_json::from_value(json!({
        "op": "getAccountHistory",
        "accountId": account.as_str(),
        "limit": 0
    }))
    .unwrap();
    let response = service.handle(bad).await;
    assert!(response.is_error());

    let history: Request = serde_json::from_value(json!({
        "op": "getAccountHistory",
        "accountId": account.as_str(),
        "limit": 500
    }))
    .unwrap();
    let Response::History(page) = service.handle(history).await else {
        panic!("expected a history page");
    };
    assert_eq!(page.limit, 100);
    assert_eq!(page.total, 2);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_card_reassignment_reaches_terminals() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-lost", 500).await;
    create_account(&service, "card-other", 0).await;
    let terminal = TerminalId::new("t1");

    let snapshot = service
        .pull_changes(PullRequest {
            terminal_id: terminal.clone(),
            since: None,
            after_sequence: None,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let clash: Request = serde_json::from_value(json!({
        "op": "updateAccount",
        "accountId": account.as_str(),
        "cardId": "card-other"
    }))
    .unwrap();
    let value = serde_json::to_value(service.handle(clash).await).unwrap();
    assert_eq!(value["op"], "error");
    assert_eq!(value["data"]["code"], "CARD_IN_USE");

    let reassign: Request = serde_json::from_value(json!({
        "op": "updateAccount",
        "accountId": account.as_str(),
        "cardId": "card-new",
        "displayName": "Replacement card"
    }))
    .unwrap();
    let Response::Account(updated) = service.handle(reassign).await else {
        panic!("expected the updated account");
    };
    assert_eq!(updated.card_id, "card-new");
    assert_eq!(updated.balance, 500);

    let found = service
        .verify_identity(VerifyIdentityRequest {
            identifier: "card-new".to_string(),
            terminal_id: Some(terminal.clone()),
        })
        .await
        .unwrap();
    assert_eq!(found.id, account);
    assert!(service.card_available("card-lost").await.unwrap());

    let diff = service
        .pull_changes(PullRequest {
            terminal_id: terminal,
            since: Some(snapshot.server_time),
            after_sequence: None,
        })
        .await
        .unwrap();
    assert_eq!(diff.accounts.len(), 1);
    assert_eq!(diff.accounts[0].card_id, "card-new");
    assert_eq!(diff.accounts[0].display_name, "Replacement card");
    assert!(diff.transactions.is_empty());
}

#[tokio::test]
async fn test_audit_through_envelope() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;

    let mut stored = service.engine().storage().get_account(&account).unwrap().unwrap();
    stored.balance = 1;
    service.engine().storage().put_account(&stored).unwrap();

    let Response::Audit(audit) = service.handle(Request::RunConsistencyAudit).await else {
        panic!("expected an audit summary");
    };
    assert_eq!(audit.corrected, 1);
    assert_eq!(audit.report.corrections[0].corrected_balance, 500);
    assert_eq!(service.engine().get_account(&account).await.unwrap().balance, 500);
}

#[tokio::test]
async fn test_system_status_and_health() {
    let (service, _temp) = create_test_service().await;
    let account = create_account(&service, "card-a", 500).await;
    create_account(&service, "card-b", 200).await;
    service
        .push_offline_batch(batch("t1", vec![purchase(&account, 45, "t1-100-abc")]))
        .await
        .unwrap();

    let status = service.system_status().await.unwrap();
    assert_eq!(status.active_accounts, 2);
    assert_eq!(status.total_entries, 3);
    assert_eq!(status.daily_entries.len(), 7);
    assert_eq!(status.daily_entries.last().unwrap().count, status.entries_today);
    assert_eq!(status.recent_terminals.len(), 1);
    assert_eq!(status.commit_watermark, service.engine().storage().commit_watermark());

    let health = service.health().await;
    assert_eq!(health.status, "ok");
    assert!(health.storage);
    assert_eq!(health.cache, "in_memory");
    assert!(health.cache_reachable);
}
