use assert_matches::assert_matches;
use uuid::Uuid;

use transaction_cell::*;
use x12_cell::{ClaimPaymentStatus, ClaimResult};

fn claim_transaction(tenant_id: Uuid) -> Transaction {
    Transaction::new(TransactionKind::Claim, tenant_id, "BCBS01", "ENC-1")
}

fn claim_result() -> TransactionResult {
    TransactionResult::Claim(ClaimResult {
        encounter_id: "ENC-1".to_string(),
        control_number: "000000042".to_string(),
        status: ClaimPaymentStatus::Paid,
        charged_cents: 12550,
        paid_cents: 12550,
        denial_reason: None,
    })
}

#[tokio::test]
async fn update_status_is_idempotent_on_replay() {
    let store = InMemoryTransactionStore::new();
    let transaction = claim_transaction(Uuid::new_v4());
    let id = transaction.id;
    store.record_submission(transaction).await.unwrap();
    store.mark_submitted(id, "000000042").await.unwrap();

    let first = store
        .update_status(id, TransactionStatus::Accepted, Some(claim_result()), None)
        .await
        .unwrap();
    let replay = store
        .update_status(id, TransactionStatus::Accepted, Some(claim_result()), None)
        .await
        .unwrap();

    assert_eq!(first.status, TransactionStatus::Accepted);
    assert_eq!(replay.status, first.status);
    assert_eq!(replay.result, first.result);
    assert_eq!(replay.updated_at, first.updated_at);
}

#[tokio::test]
async fn terminal_transactions_reject_late_updates() {
    let store = InMemoryTransactionStore::new();
    let transaction = claim_transaction(Uuid::new_v4());
    let id = transaction.id;
    store.record_submission(transaction).await.unwrap();

    store
        .update_status(id, TransactionStatus::Cancelled, None, None)
        .await
        .unwrap();

    // A result arriving after cancellation must be discarded.
    let err = store
        .update_status(id, TransactionStatus::Accepted, Some(claim_result()), None)
        .await
        .unwrap_err();
    assert_matches!(err, TransactionError::InvalidStatusTransition { .. });

    let current = store.get(id).await.unwrap().unwrap();
    assert_eq!(current.status, TransactionStatus::Cancelled);
    assert!(current.result.is_none());
}

#[tokio::test]
async fn mark_submitted_sets_control_number_once() {
    let store = InMemoryTransactionStore::new();
    let transaction = claim_transaction(Uuid::new_v4());
    let id = transaction.id;
    store.record_submission(transaction).await.unwrap();

    let submitted = store.mark_submitted(id, "000000042").await.unwrap();
    assert_eq!(submitted.status, TransactionStatus::Submitted);
    assert_eq!(submitted.control_number.as_deref(), Some("000000042"));
    assert!(submitted.submitted_at.is_some());

    // Same control number replays cleanly.
    let replay = store.mark_submitted(id, "000000042").await.unwrap();
    assert_eq!(replay.control_number, submitted.control_number);
}

#[tokio::test]
async fn transactions_are_queryable_by_reference() {
    let store = InMemoryTransactionStore::new();
    let tenant_id = Uuid::new_v4();
    let other_tenant = Uuid::new_v4();

    store
        .record_submission(claim_transaction(tenant_id))
        .await
        .unwrap();
    store
        .record_submission(claim_transaction(tenant_id))
        .await
        .unwrap();
    store
        .record_submission(claim_transaction(other_tenant))
        .await
        .unwrap();

    let found = store.find_by_reference(tenant_id, "ENC-1").await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|t| t.tenant_id == tenant_id));

    let missing = store.find_by_reference(tenant_id, "ENC-2").await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn list_in_status_filters_pending_work() {
    let store = InMemoryTransactionStore::new();
    let tenant_id = Uuid::new_v4();

    let submitted = claim_transaction(tenant_id);
    let submitted_id = submitted.id;
    store.record_submission(submitted).await.unwrap();
    store.mark_submitted(submitted_id, "000000001").await.unwrap();

    store
        .record_submission(claim_transaction(tenant_id))
        .await
        .unwrap();

    let pending = store
        .list_in_status(TransactionStatus::Submitted)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, submitted_id);
}
