use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SubmissionQueueError;
use crate::models::{QueueStats, SubmissionJob};

/// The durable job store collaborator. The pipeline requires exactly the
/// lease-based primitives below; anything speaking them can back the
/// queue (Redis in production, the in-memory backend in tests and
/// embedded deployments).
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Schedules a job for dispatch at its `next_run_at`.
    async fn enqueue(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError>;

    /// Leases the next due job to `worker_id`, marking it `Dispatching`.
    /// Returns `None` when nothing is due. A leased job is owned
    /// exclusively by its worker until acked or nacked.
    async fn dequeue_with_lease(
        &self,
        worker_id: &str,
    ) -> Result<Option<SubmissionJob>, SubmissionQueueError>;

    /// Persists the job's terminal state and releases the lease.
    async fn ack(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError>;

    /// Releases the lease and re-schedules the job `delay` from now.
    async fn nack_with_delay(
        &self,
        job: &SubmissionJob,
        delay: Duration,
    ) -> Result<(), SubmissionQueueError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<SubmissionJob>, SubmissionQueueError>;

    /// Cancels a job that is still queued. Returns `false` when the job
    /// is already leased or terminal; in-flight cancellation is
    /// best-effort and resolved by the worker's late-result guard.
    async fn cancel(&self, job_id: Uuid) -> Result<bool, SubmissionQueueError>;

    async fn stats(&self) -> Result<QueueStats, SubmissionQueueError>;
}
