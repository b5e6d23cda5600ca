use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::QueueBackend;
use crate::error::SubmissionQueueError;
use crate::models::{JobStatus, QueueStats, SubmissionJob};

const JOB_KEY_PREFIX: &str = "payer_job:";
const SCHEDULED_KEY: &str = "payer_queue:scheduled";
const PROCESSING_KEY: &str = "payer_queue:processing";

/// Jobs are audit-adjacent but not the audit record; keep them a week.
const JOB_EXPIRY_SECONDS: i64 = 604_800;

/// Redis-backed queue: one hash per job, a scheduled zset scored by
/// `next_run_at`, and a processing list holding leased job ids.
pub struct RedisQueueBackend {
    pool: Pool,
}

impl RedisQueueBackend {
    pub async fn new(redis_url: &str) -> Result<Self, SubmissionQueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            SubmissionQueueError::Queue(format!("failed to create Redis pool: {}", e))
        })?;

        // Test connection
        let mut conn = pool.get().await.map_err(|e| {
            SubmissionQueueError::Queue(format!("failed to connect to Redis: {}", e))
        })?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis queue backend initialized successfully");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, SubmissionQueueError> {
        self.pool.get().await.map_err(|e| {
            SubmissionQueueError::Queue(format!("failed to get Redis connection: {}", e))
        })
    }

    async fn write_job(
        &self,
        conn: &mut Connection,
        job: &SubmissionJob,
    ) -> Result<(), SubmissionQueueError> {
        let job_key = format!("{}{}", JOB_KEY_PREFIX, job.job_id);
        let job_data = serde_json::to_string(job)?;

        let _: () = conn
            .hset_multiple(
                &job_key,
                &[
                    ("data", job_data.as_str()),
                    ("status", &serde_json::to_string(&job.status)?),
                    ("tenant_id", &job.tenant_id.to_string()),
                    ("updated_at", &job.updated_at.to_rfc3339()),
                ],
            )
            .await?;
        let _: () = conn.expire(&job_key, JOB_EXPIRY_SECONDS).await?;
        Ok(())
    }

    async fn read_job(
        &self,
        conn: &mut Connection,
        job_id: &str,
    ) -> Result<Option<SubmissionJob>, SubmissionQueueError> {
        let job_key = format!("{}{}", JOB_KEY_PREFIX, job_id);
        let job_data: Option<String> = conn.hget(&job_key, "data").await?;
        match job_data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn enqueue(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError> {
        let mut conn = self.get_connection().await?;

        self.write_job(&mut conn, job).await?;
        let _: () = conn
            .zadd(
                SCHEDULED_KEY,
                job.job_id.to_string(),
                job.next_run_at.timestamp_millis(),
            )
            .await?;

        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue_with_lease(
        &self,
        worker_id: &str,
    ) -> Result<Option<SubmissionJob>, SubmissionQueueError> {
        let mut conn = self.get_connection().await?;
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULED_KEY, "-inf", now_ms, 0, 1)
            .await?;
        let Some(job_id) = due.into_iter().next() else {
            return Ok(None);
        };

        // Another worker may have claimed the job between the range read
        // and this removal; zrem tells us who won.
        let removed: i64 = conn.zrem(SCHEDULED_KEY, &job_id).await?;
        if removed == 0 {
            return Ok(None);
        }
        let _: () = conn.lpush(PROCESSING_KEY, &job_id).await?;

        let Some(mut job) = self.read_job(&mut conn, &job_id).await? else {
            let _: () = conn.lrem(PROCESSING_KEY, 1, &job_id).await?;
            return Err(SubmissionQueueError::JobNotFound(job_id));
        };

        job.status = JobStatus::Dispatching;
        job.worker_id = Some(worker_id.to_string());
        job.updated_at = Utc::now();
        self.write_job(&mut conn, &job).await?;

        debug!("Job {} leased by {}", job.job_id, worker_id);
        Ok(Some(job))
    }

    async fn ack(&self, job: &SubmissionJob) -> Result<(), SubmissionQueueError> {
        let mut conn = self.get_connection().await?;
        self.write_job(&mut conn, job).await?;
        let _: () = conn
            .lrem(PROCESSING_KEY, 1, job.job_id.to_string())
            .await?;
        Ok(())
    }

    async fn nack_with_delay(
        &self,
        job: &SubmissionJob,
        delay: Duration,
    ) -> Result<(), SubmissionQueueError> {
        let mut conn = self.get_connection().await?;

        let mut rescheduled = job.clone();
        rescheduled.status = JobStatus::Queued;
        rescheduled.worker_id = None;
        rescheduled.next_run_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| SubmissionQueueError::Queue(e.to_string()))?;
        rescheduled.updated_at = Utc::now();

        self.write_job(&mut conn, &rescheduled).await?;
        let _: () = conn
            .lrem(PROCESSING_KEY, 1, job.job_id.to_string())
            .await?;
        let _: () = conn
            .zadd(
                SCHEDULED_KEY,
                job.job_id.to_string(),
                rescheduled.next_run_at.timestamp_millis(),
            )
            .await?;

        debug!(
            "Job {} rescheduled for {} (attempt {}/{})",
            job.job_id, rescheduled.next_run_at, job.attempt, job.max_attempts
        );
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<SubmissionJob>, SubmissionQueueError> {
        let mut conn = self.get_connection().await?;
        self.read_job(&mut conn, &job_id.to_string()).await
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool, SubmissionQueueError> {
        let mut conn = self.get_connection().await?;

        let removed: i64 = conn.zrem(SCHEDULED_KEY, job_id.to_string()).await?;
        if removed == 0 {
            return Ok(false);
        }

        let Some(mut job) = self.read_job(&mut conn, &job_id.to_string()).await? else {
            return Err(SubmissionQueueError::JobNotFound(job_id.to_string()));
        };
        job.status = JobStatus::Cancelled;
        job.updated_at = Utc::now();
        self.write_job(&mut conn, &job).await?;
        Ok(true)
    }

    async fn stats(&self) -> Result<QueueStats, SubmissionQueueError> {
        let mut conn = self.get_connection().await?;
        let scheduled: u64 = conn.zcard(SCHEDULED_KEY).await?;
        let processing: u64 = conn.llen(PROCESSING_KEY).await?;
        Ok(QueueStats {
            scheduled_jobs: scheduled,
            processing_jobs: processing,
        })
    }
}
