use std::sync::Arc;

use chrono::Utc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use gateway_cell::{ErrorClass, GatewayError, PayerGateway};
use transaction_cell::{
    TransactionError, TransactionResult, TransactionStatus, TransactionStore,
};
use x12_cell::{ClaimAck, EligibilityResult};

use crate::backend::QueueBackend;
use crate::error::SubmissionQueueError;
use crate::models::{JobPayload, JobStatus, SubmissionJob, WorkerConfig};

enum DispatchOutcome {
    Eligibility(EligibilityResult),
    ClaimAcknowledged(ClaimAck),
}

/// Dispatch loop: leases due jobs, exchanges them with the clearinghouse,
/// and applies the outcome to the Transaction record. Transient failures
/// are rescheduled with exponential backoff; permanent failures fail the
/// job on first occurrence.
pub struct SubmissionWorkerService {
    config: WorkerConfig,
    backend: Arc<dyn QueueBackend>,
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PayerGateway>,
    is_shutdown: Arc<tokio::sync::RwLock<bool>>,
}

impl SubmissionWorkerService {
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn QueueBackend>,
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PayerGateway>,
    ) -> Self {
        Self {
            config,
            backend,
            store,
            gateway,
            is_shutdown: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SubmissionQueueError> {
        info!("Starting submission worker {}", self.config.worker_id);

        let mut handles = Vec::new();
        for i in 0..self.config.max_concurrent_jobs {
            let worker_clone = self.clone_for_worker();
            let worker_name = format!("{}-{}", self.config.worker_id, i);

            handles.push(tokio::spawn(async move {
                worker_clone.worker_loop(worker_name).await
            }));
        }

        tokio::select! {
            _ = self.wait_for_shutdown() => {
                info!("Shutdown signal received, stopping worker {}", self.config.worker_id);
            }
            _ = futures::future::try_join_all(handles) => {
                warn!("All worker loops completed unexpectedly");
            }
        }

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for worker {}", self.config.worker_id);
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    async fn worker_loop(&self, worker_name: String) -> Result<(), SubmissionQueueError> {
        debug!("Worker loop started: {}", worker_name);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Worker {} received shutdown signal", worker_name);
                break;
            }

            match self.process_next(&worker_name).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::time::sleep(self.config.idle_sleep).await;
                }
                Err(e) => {
                    error!("Worker {} failed to process job: {}", worker_name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
        Ok(())
    }

    /// Leases and processes one due job. Returns `false` when nothing
    /// was due. Public so callers driving their own scheduling (and
    /// tests) can single-step the queue.
    pub async fn process_next(&self, worker_name: &str) -> Result<bool, SubmissionQueueError> {
        match self.backend.dequeue_with_lease(worker_name).await? {
            Some(job) => {
                self.process_job(job, worker_name).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, transaction_id = %job.transaction_id))]
    async fn process_job(
        &self,
        mut job: SubmissionJob,
        worker_name: &str,
    ) -> Result<(), SubmissionQueueError> {
        info!("Processing job {} with worker {}", job.job_id, worker_name);

        let Some(transaction) = self.store.get(job.transaction_id).await? else {
            error!(
                "Job {} references missing transaction {}",
                job.job_id, job.transaction_id
            );
            job.status = JobStatus::Failed;
            job.error_message = Some("transaction record missing".to_string());
            job.updated_at = Utc::now();
            return self.backend.ack(&job).await;
        };

        // Cancelled (or otherwise settled) while waiting in the queue.
        if transaction.status.is_terminal() {
            info!(
                "Transaction {} already {:?}, discarding job {}",
                transaction.id, transaction.status, job.job_id
            );
            job.status = JobStatus::Cancelled;
            job.updated_at = Utc::now();
            return self.backend.ack(&job).await;
        }

        // Exhaustion is detected at lease time, after the last backoff
        // delay has been served; the gateway is never called more than
        // max_attempts times for one job.
        if !job.can_retry() {
            let last_error = job
                .error_message
                .clone()
                .unwrap_or_else(|| "transient failure".to_string());
            error!(
                "Job {} exhausted {} attempts: {}",
                job.job_id, job.max_attempts, last_error
            );
            job.status = JobStatus::Failed;
            job.updated_at = Utc::now();
            self.fail_transaction(
                &job,
                format!(
                    "retries exhausted after {} attempts: {}",
                    job.max_attempts, last_error
                ),
            )
            .await?;
            return self.backend.ack(&job).await;
        }

        let outcome = match timeout(self.config.job_timeout, self.dispatch(&job)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };

        match outcome {
            Ok(outcome) => self.apply_outcome(job, outcome).await,
            Err(e) => match e.class() {
                ErrorClass::Transient => self.handle_transient_failure(job, e).await,
                ErrorClass::Permanent => self.handle_permanent_failure(job, e).await,
            },
        }
    }

    async fn dispatch(&self, job: &SubmissionJob) -> Result<DispatchOutcome, GatewayError> {
        match &job.payload {
            JobPayload::Eligibility(request) => self
                .gateway
                .submit_eligibility(request)
                .await
                .map(DispatchOutcome::Eligibility),
            JobPayload::Claim(request) => self
                .gateway
                .submit_claim(request)
                .await
                .map(DispatchOutcome::ClaimAcknowledged),
        }
    }

    async fn apply_outcome(
        &self,
        mut job: SubmissionJob,
        outcome: DispatchOutcome,
    ) -> Result<(), SubmissionQueueError> {
        let applied = match outcome {
            DispatchOutcome::Eligibility(result) => self.apply_eligibility(&job, result).await,
            DispatchOutcome::ClaimAcknowledged(ack) => self.apply_claim_ack(&job, ack).await,
        };

        match applied {
            Ok(()) => {
                job.status = JobStatus::Done;
                job.error_class = None;
                job.error_message = None;
            }
            // The transaction settled (typically: cancelled) while the
            // call was in flight; the late result is discarded.
            Err(TransactionError::InvalidStatusTransition { from, .. }) => {
                warn!(
                    "Transaction {} already {} - discarding late result of job {}",
                    job.transaction_id, from, job.job_id
                );
                job.status = JobStatus::Cancelled;
            }
            Err(e) => return Err(e.into()),
        }

        job.updated_at = Utc::now();
        self.backend.ack(&job).await?;
        info!("Job {} finished as {:?}", job.job_id, job.status);
        Ok(())
    }

    /// A 271 is synchronous: the eligibility transaction settles in one
    /// exchange, control number and result included.
    async fn apply_eligibility(
        &self,
        job: &SubmissionJob,
        result: EligibilityResult,
    ) -> Result<(), TransactionError> {
        self.store
            .mark_submitted(job.transaction_id, &result.control_number)
            .await?;

        let (status, reason) = match &result.rejection {
            Some(rejection) => (
                TransactionStatus::Rejected,
                Some(format!("payer rejection {}: {}", rejection.code, rejection.reason)),
            ),
            None => (TransactionStatus::Accepted, None),
        };

        self.store
            .update_status(
                job.transaction_id,
                status,
                Some(TransactionResult::Eligibility(result)),
                reason,
            )
            .await?;
        Ok(())
    }

    /// An 837 is acknowledged, not settled; an accepted claim stays
    /// `Submitted` until the status poller sees the 835.
    async fn apply_claim_ack(
        &self,
        job: &SubmissionJob,
        ack: ClaimAck,
    ) -> Result<(), TransactionError> {
        self.store
            .mark_submitted(job.transaction_id, &ack.control_number)
            .await?;

        if !ack.accepted {
            self.store
                .update_status(
                    job.transaction_id,
                    TransactionStatus::Rejected,
                    None,
                    Some("claim rejected in clearinghouse acknowledgment".to_string()),
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_transient_failure(
        &self,
        mut job: SubmissionJob,
        error: GatewayError,
    ) -> Result<(), SubmissionQueueError> {
        job.attempt += 1;
        job.error_class = Some(ErrorClass::Transient);
        job.error_message = Some(error.to_string());
        job.updated_at = Utc::now();

        let delay = job.backoff_delay(self.config.base_delay);
        warn!(
            "Job {} transient failure (attempt {}/{}, backoff {:?}): {}",
            job.job_id, job.attempt, job.max_attempts, delay, error
        );
        self.backend.nack_with_delay(&job, delay).await
    }

    async fn handle_permanent_failure(
        &self,
        mut job: SubmissionJob,
        error: GatewayError,
    ) -> Result<(), SubmissionQueueError> {
        error!("Job {} permanent failure, not retrying: {}", job.job_id, error);

        job.status = JobStatus::Failed;
        job.error_class = Some(ErrorClass::Permanent);
        job.error_message = Some(error.to_string());
        job.updated_at = Utc::now();

        self.fail_transaction(&job, error.to_string()).await?;
        self.backend.ack(&job).await
    }

    async fn fail_transaction(
        &self,
        job: &SubmissionJob,
        reason: String,
    ) -> Result<(), SubmissionQueueError> {
        match self
            .store
            .update_status(job.transaction_id, TransactionStatus::Failed, None, Some(reason))
            .await
        {
            Ok(_) => Ok(()),
            Err(TransactionError::InvalidStatusTransition { from, .. }) => {
                warn!(
                    "Transaction {} already {}, failure not recorded",
                    job.transaction_id, from
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for_shutdown(&self) {
        loop {
            if *self.is_shutdown.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
            is_shutdown: Arc::clone(&self.is_shutdown),
        }
    }
}
