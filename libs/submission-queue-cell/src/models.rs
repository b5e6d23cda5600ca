use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gateway_cell::ErrorClass;
use transaction_cell::TransactionKind;
use x12_cell::{ClaimRequest, EligibilityRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobPayload {
    Eligibility(EligibilityRequest),
    Claim(ClaimRequest),
}

impl JobPayload {
    pub fn kind(&self) -> TransactionKind {
        match self {
            JobPayload::Eligibility(_) => TransactionKind::Eligibility,
            JobPayload::Claim(_) => TransactionKind::Claim,
        }
    }

    pub fn payer_code(&self) -> &str {
        match self {
            JobPayload::Eligibility(request) => &request.payer_code,
            JobPayload::Claim(request) => &request.payer_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Dispatching,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A queued unit of work wrapping one Transaction submission. The job is
/// owned exclusively by the queue while leased; `attempt` increments only
/// on transient failures, so permanent failures keep their count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub job_id: Uuid,
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_class: Option<ErrorClass>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl SubmissionJob {
    pub fn new(
        transaction_id: Uuid,
        tenant_id: Uuid,
        payload: JobPayload,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            transaction_id,
            tenant_id,
            payload,
            status: JobStatus::Queued,
            attempt: 0,
            max_attempts,
            next_run_at: now,
            created_at: now,
            updated_at: now,
            error_class: None,
            error_message: None,
            worker_id: None,
        }
    }

    /// Whether another dispatch is permitted. `attempt` counts gateway
    /// executions performed, so a job whose count reached `max_attempts`
    /// fails at its next lease without being dispatched again.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Exponential backoff before retry number `attempt`:
    /// `base, base*2, base*4, ...`
    pub fn backoff_delay(&self, base: Duration) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(16);
        base * 2u32.pow(exponent)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub max_concurrent_jobs: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub job_timeout: Duration,
    pub idle_sleep: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("payer-worker-{}", Uuid::new_v4()),
            max_concurrent_jobs: 5,
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            job_timeout: Duration::from_secs(60),
            idle_sleep: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_poll_duration: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_poll_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Returned to the caller on enqueue; progress is observed through the
/// Transaction record, never through raised errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub job_id: Uuid,
    pub transaction_id: Uuid,
    pub status: JobStatus,
    pub max_attempts: u32,
    pub tracking_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub scheduled_jobs: u64,
    pub processing_jobs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let mut job = SubmissionJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            JobPayload::Claim(sample_claim()),
            3,
        );
        let base = Duration::from_secs(2);

        job.attempt = 1;
        assert_eq!(job.backoff_delay(base), Duration::from_secs(2));
        job.attempt = 2;
        assert_eq!(job.backoff_delay(base), Duration::from_secs(4));
        job.attempt = 3;
        assert_eq!(job.backoff_delay(base), Duration::from_secs(8));
    }

    fn sample_claim() -> ClaimRequest {
        ClaimRequest {
            encounter_id: "ENC-1".to_string(),
            member_id: "M123".to_string(),
            payer_code: "BCBS01".to_string(),
            provider_npi: "1234567890".to_string(),
            subscriber_last_name: "DOE".to_string(),
            subscriber_first_name: "JANE".to_string(),
            diagnosis_codes: vec!["Z0000".to_string()],
            service_lines: vec![x12_cell::ServiceLine {
                procedure_code: "99213".to_string(),
                charge_cents: 5000,
                units: 1,
                service_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            }],
        }
    }
}
