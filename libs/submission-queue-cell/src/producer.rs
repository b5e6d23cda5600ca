use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use transaction_cell::{Transaction, TransactionError, TransactionStatus, TransactionStore};
use x12_cell::{ClaimRequest, EligibilityRequest};

use crate::backend::QueueBackend;
use crate::error::SubmissionQueueError;
use crate::models::{JobPayload, SubmissionJob, SubmissionReceipt};

/// Accepts submission requests: validates caller input, records the
/// Transaction audit row, and enqueues the job. Validation failures are
/// surfaced immediately and nothing is recorded or enqueued.
pub struct SubmissionProducerService {
    backend: Arc<dyn QueueBackend>,
    store: Arc<dyn TransactionStore>,
    max_attempts: u32,
}

impl SubmissionProducerService {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        store: Arc<dyn TransactionStore>,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            store,
            max_attempts,
        }
    }

    pub async fn enqueue_eligibility(
        &self,
        tenant_id: Uuid,
        reference_id: &str,
        mut request: EligibilityRequest,
    ) -> Result<SubmissionReceipt, SubmissionQueueError> {
        validate_eligibility(&request)?;
        if reference_id.is_empty() {
            return Err(SubmissionQueueError::Validation(
                "reference id is required".to_string(),
            ));
        }

        let transaction = Transaction::new(
            transaction_cell::TransactionKind::Eligibility,
            tenant_id,
            &request.payer_code,
            reference_id,
        );
        if request.trace_id.is_empty() {
            request.trace_id = transaction.id.simple().to_string();
        }

        self.submit(transaction, JobPayload::Eligibility(request))
            .await
    }

    pub async fn enqueue_claim(
        &self,
        tenant_id: Uuid,
        mut request: ClaimRequest,
    ) -> Result<SubmissionReceipt, SubmissionQueueError> {
        validate_claim(&request)?;
        request.encounter_id = request.encounter_id.trim().to_string();

        let transaction = Transaction::new(
            transaction_cell::TransactionKind::Claim,
            tenant_id,
            &request.payer_code,
            &request.encounter_id,
        );

        self.submit(transaction, JobPayload::Claim(request)).await
    }

    async fn submit(
        &self,
        transaction: Transaction,
        payload: JobPayload,
    ) -> Result<SubmissionReceipt, SubmissionQueueError> {
        let transaction_id = transaction.id;
        let tenant_id = transaction.tenant_id;
        self.store.record_submission(transaction).await?;

        let job = SubmissionJob::new(transaction_id, tenant_id, payload, self.max_attempts);
        self.backend.enqueue(&job).await?;

        info!(
            "Queued {:?} submission for tenant {} (job {}, transaction {})",
            job.payload.kind(),
            tenant_id,
            job.job_id,
            transaction_id
        );

        Ok(SubmissionReceipt {
            job_id: job.job_id,
            transaction_id,
            status: job.status,
            max_attempts: job.max_attempts,
            tracking_url: format!("/payer/transactions/{}", transaction_id),
        })
    }

    pub async fn get_job(
        &self,
        job_id: Uuid,
    ) -> Result<Option<crate::models::SubmissionJob>, SubmissionQueueError> {
        self.backend.get_job(job_id).await
    }

    /// Cancels a job still waiting in the queue and marks its Transaction
    /// `Cancelled`. A job already leased keeps running; its late result
    /// is discarded by the worker once the Transaction is terminal.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, SubmissionQueueError> {
        let Some(job) = self.backend.get_job(job_id).await? else {
            return Err(SubmissionQueueError::JobNotFound(job_id.to_string()));
        };

        let cancelled = self.backend.cancel(job_id).await?;
        match self
            .store
            .update_status(
                job.transaction_id,
                TransactionStatus::Cancelled,
                None,
                Some("cancelled by caller".to_string()),
            )
            .await
        {
            Ok(_) => {}
            Err(TransactionError::InvalidStatusTransition { from, .. }) => {
                warn!(
                    "Transaction {} already {} when cancellation arrived",
                    job.transaction_id, from
                );
            }
            Err(e) => return Err(e.into()),
        }

        if cancelled {
            info!("Job {} cancelled before dispatch", job_id);
        } else {
            info!(
                "Job {} already in flight, cancellation downgraded to late-result discard",
                job_id
            );
        }
        Ok(cancelled)
    }
}

fn validate_eligibility(request: &EligibilityRequest) -> Result<(), SubmissionQueueError> {
    if request.member_id.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "member id is required".to_string(),
        ));
    }
    if request.payer_code.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "payer code is required".to_string(),
        ));
    }
    if request.provider_npi.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "provider npi is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_claim(request: &ClaimRequest) -> Result<(), SubmissionQueueError> {
    if request.encounter_id.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "encounter id is required".to_string(),
        ));
    }
    if request.member_id.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "member id is required".to_string(),
        ));
    }
    if request.payer_code.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "payer code is required".to_string(),
        ));
    }
    if request.provider_npi.trim().is_empty() {
        return Err(SubmissionQueueError::Validation(
            "provider npi is required".to_string(),
        ));
    }
    if request.diagnosis_codes.is_empty() {
        return Err(SubmissionQueueError::Validation(
            "at least one diagnosis code is required".to_string(),
        ));
    }
    if request.service_lines.is_empty() {
        return Err(SubmissionQueueError::Validation(
            "at least one service line is required".to_string(),
        ));
    }
    if request.service_lines.iter().any(|l| l.charge_cents <= 0) {
        return Err(SubmissionQueueError::Validation(
            "service line charges must be positive".to_string(),
        ));
    }
    Ok(())
}
