use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::backend::QueueBackend;
use crate::error::SubmissionQueueError;
use crate::models::{JobStatus, QueueStats, SubmissionJob};

/// Non-durable backend for tests and single-process embedding.
pub struct InMemoryQueueBackend {
    jobs: Mutex<HashMap<Uuid, SubmissionJob>>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn enqueue(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError> {
        let mut jobs = self.jobs.lock().await;
        debug!("Job {} enqueued", job.job_id);
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn dequeue_with_lease(
        &self,
        worker_id: &str,
    ) -> Result<Option<SubmissionJob>, SubmissionQueueError> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();

        let due = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.next_run_at <= now)
            .min_by_key(|j| j.next_run_at)
            .map(|j| j.job_id);

        if let Some(job_id) = due {
            let job = jobs
                .get_mut(&job_id)
                .ok_or_else(|| SubmissionQueueError::JobNotFound(job_id.to_string()))?;
            job.status = JobStatus::Dispatching;
            job.worker_id = Some(worker_id.to_string());
            job.updated_at = now;
            debug!("Job {} leased by {}", job_id, worker_id);
            return Ok(Some(job.clone()));
        }

        Ok(None)
    }

    async fn ack(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError> {
        let mut jobs = self.jobs.lock().await;
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn nack_with_delay(
        &self,
        job: &SubmissionJob,
        delay: Duration,
    ) -> Result<(), SubmissionQueueError> {
        let mut jobs = self.jobs.lock().await;
        let mut rescheduled = job.clone();
        rescheduled.status = JobStatus::Queued;
        rescheduled.worker_id = None;
        rescheduled.next_run_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| SubmissionQueueError::Queue(e.to_string()))?;
        rescheduled.updated_at = Utc::now();
        debug!(
            "Job {} rescheduled for {} (attempt {}/{})",
            job.job_id, rescheduled.next_run_at, job.attempt, job.max_attempts
        );
        jobs.insert(job.job_id, rescheduled);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<SubmissionJob>, SubmissionQueueError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool, SubmissionQueueError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| SubmissionQueueError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn stats(&self) -> Result<QueueStats, SubmissionQueueError> {
        let jobs = self.jobs.lock().await;
        Ok(QueueStats {
            scheduled_jobs: jobs
                .values()
                .filter(|j| j.status == JobStatus::Queued)
                .count() as u64,
            processing_jobs: jobs
                .values()
                .filter(|j| j.status == JobStatus::Dispatching)
                .count() as u64,
        })
    }
}
