mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use uuid::Uuid;

use submission_queue_cell::{
    InMemoryQueueBackend, JobStatus, QueueBackend, SubmissionProducerService,
    SubmissionQueueError,
};
use transaction_cell::{InMemoryTransactionStore, TransactionKind, TransactionStatus, TransactionStore};

use support::{sample_claim_request, sample_eligibility_request};

fn make_producer() -> (
    Arc<InMemoryQueueBackend>,
    Arc<InMemoryTransactionStore>,
    SubmissionProducerService,
) {
    let backend = Arc::new(InMemoryQueueBackend::new());
    let store = Arc::new(InMemoryTransactionStore::new());
    let producer = SubmissionProducerService::new(backend.clone(), store.clone(), 3);
    (backend, store, producer)
}

#[tokio::test]
async fn eligibility_submission_records_transaction_and_job() {
    let (backend, store, producer) = make_producer();
    let tenant_id = Uuid::new_v4();

    let receipt = producer
        .enqueue_eligibility(tenant_id, "visit-88", sample_eligibility_request())
        .await
        .unwrap();

    assert_eq!(receipt.status, JobStatus::Queued);
    assert_eq!(receipt.max_attempts, 3);
    assert_eq!(
        receipt.tracking_url,
        format!("/payer/transactions/{}", receipt.transaction_id)
    );

    let transaction = store.get(receipt.transaction_id).await.unwrap().unwrap();
    assert_eq!(transaction.kind, TransactionKind::Eligibility);
    assert_eq!(transaction.status, TransactionStatus::Queued);
    assert_eq!(transaction.reference_id, "visit-88");
    assert_eq!(transaction.tenant_id, tenant_id);

    let job = backend.get_job(receipt.job_id).await.unwrap().unwrap();
    assert_eq!(job.transaction_id, receipt.transaction_id);
    assert_eq!(job.attempt, 0);
}

#[tokio::test]
async fn blank_trace_id_is_backfilled_from_transaction() {
    let (backend, _store, producer) = make_producer();
    let mut request = sample_eligibility_request();
    request.trace_id = String::new();

    let receipt = producer
        .enqueue_eligibility(Uuid::new_v4(), "visit-1", request)
        .await
        .unwrap();

    let job = backend.get_job(receipt.job_id).await.unwrap().unwrap();
    match job.payload {
        submission_queue_cell::JobPayload::Eligibility(r) => {
            assert_eq!(r.trace_id, receipt.transaction_id.simple().to_string());
        }
        other => panic!("unexpected payload: {:?}", other.kind()),
    }
}

#[tokio::test]
async fn eligibility_validation_rejects_missing_member_id() {
    let (backend, store, producer) = make_producer();
    let mut request = sample_eligibility_request();
    request.member_id = "  ".to_string();

    let err = producer
        .enqueue_eligibility(Uuid::new_v4(), "visit-1", request)
        .await
        .unwrap_err();
    assert_matches!(err, SubmissionQueueError::Validation(_));

    // Rejected input leaves no trace anywhere.
    let stats = backend.stats().await.unwrap();
    assert_eq!(stats.scheduled_jobs, 0);
    assert!(store
        .list_in_status(TransactionStatus::Queued)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn claim_validation_rejects_empty_service_lines() {
    let (_backend, _store, producer) = make_producer();
    let mut request = sample_claim_request();
    request.service_lines.clear();

    let err = producer
        .enqueue_claim(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert_matches!(err, SubmissionQueueError::Validation(_));
}

#[tokio::test]
async fn claim_submission_uses_encounter_id_as_reference() {
    let (_backend, store, producer) = make_producer();
    let mut request = sample_claim_request();
    request.encounter_id = "  ENC-77  ".to_string();
    let tenant_id = Uuid::new_v4();

    let receipt = producer.enqueue_claim(tenant_id, request).await.unwrap();

    let transaction = store
        .find_by_reference(tenant_id, "ENC-77")
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(transaction.id, receipt.transaction_id);
    assert_eq!(transaction.kind, TransactionKind::Claim);
}

#[tokio::test]
async fn cancel_queued_job_marks_transaction_cancelled() {
    let (backend, store, producer) = make_producer();

    let receipt = producer
        .enqueue_claim(Uuid::new_v4(), sample_claim_request())
        .await
        .unwrap();

    let dequeued = producer.cancel(receipt.job_id).await.unwrap();
    assert!(dequeued);

    let transaction = store.get(receipt.transaction_id).await.unwrap().unwrap();
    assert_eq!(transaction.status, TransactionStatus::Cancelled);

    // Cancelled job is no longer leasable.
    assert!(backend.dequeue_with_lease("w-test").await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_unknown_job_is_not_found() {
    let (_backend, _store, producer) = make_producer();
    let err = producer.cancel(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, SubmissionQueueError::JobNotFound(_));
}
