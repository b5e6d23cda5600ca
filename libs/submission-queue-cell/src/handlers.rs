use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use shared_models::error::AppError;
use transaction_cell::TransactionStore;
use x12_cell::{ClaimRequest, EligibilityRequest};

use crate::backend::QueueBackend;
use crate::error::SubmissionQueueError;
use crate::producer::SubmissionProducerService;

/// Shared handler state for the payer pipeline routes.
pub struct PipelineState {
    pub producer: Arc<SubmissionProducerService>,
    pub store: Arc<dyn TransactionStore>,
    pub backend: Arc<dyn QueueBackend>,
}

#[derive(Debug, Deserialize)]
pub struct EligibilitySubmission {
    pub tenant_id: Uuid,
    pub reference_id: String,
    pub request: EligibilityRequest,
}

#[derive(Debug, Deserialize)]
pub struct ClaimSubmission {
    pub tenant_id: Uuid,
    pub request: ClaimRequest,
}

fn map_queue_error(e: SubmissionQueueError) -> AppError {
    match e {
        SubmissionQueueError::Validation(_) => AppError::BadRequest(e.to_string()),
        SubmissionQueueError::JobNotFound(_) => AppError::NotFound(e.to_string()),
        _ => AppError::Internal("Operation failed".to_string()),
    }
}

/// Enqueue an eligibility check (270)
pub async fn submit_eligibility(
    State(state): State<Arc<PipelineState>>,
    Json(submission): Json<EligibilitySubmission>,
) -> Result<Json<Value>, AppError> {
    info!(
        "Eligibility submission for tenant {} reference {}",
        submission.tenant_id, submission.reference_id
    );

    let receipt = state
        .producer
        .enqueue_eligibility(
            submission.tenant_id,
            &submission.reference_id,
            submission.request,
        )
        .await
        .map_err(|e| {
            error!("Failed to enqueue eligibility check: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "job_id": receipt.job_id,
        "transaction_id": receipt.transaction_id,
        "status": receipt.status,
        "max_attempts": receipt.max_attempts,
        "tracking_url": receipt.tracking_url
    })))
}

/// Enqueue a claim submission (837)
pub async fn submit_claim(
    State(state): State<Arc<PipelineState>>,
    Json(submission): Json<ClaimSubmission>,
) -> Result<Json<Value>, AppError> {
    info!(
        "Claim submission for tenant {} encounter {}",
        submission.tenant_id, submission.request.encounter_id
    );

    let receipt = state
        .producer
        .enqueue_claim(submission.tenant_id, submission.request)
        .await
        .map_err(|e| {
            error!("Failed to enqueue claim: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "job_id": receipt.job_id,
        "transaction_id": receipt.transaction_id,
        "status": receipt.status,
        "max_attempts": receipt.max_attempts,
        "tracking_url": receipt.tracking_url
    })))
}

/// Get a transaction record
pub async fn get_transaction(
    State(state): State<Arc<PipelineState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let transaction = state.store.get(transaction_id).await.map_err(|e| {
        error!("Failed to load transaction {}: {}", transaction_id, e);
        AppError::Internal("Operation failed".to_string())
    })?;

    match transaction {
        Some(t) => Ok(Json(json!(t))),
        None => Err(AppError::NotFound("Transaction not found".to_string())),
    }
}

/// Get a submission job
pub async fn get_job(
    State(state): State<Arc<PipelineState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let job = state.producer.get_job(job_id).await.map_err(|e| {
        error!("Failed to load job {}: {}", job_id, e);
        AppError::Internal("Operation failed".to_string())
    })?;

    match job {
        Some(job) => Ok(Json(json!({
            "job_id": job.job_id,
            "transaction_id": job.transaction_id,
            "tenant_id": job.tenant_id,
            "status": job.status,
            "attempt": job.attempt,
            "max_attempts": job.max_attempts,
            "next_run_at": job.next_run_at,
            "created_at": job.created_at,
            "updated_at": job.updated_at,
            "error_class": job.error_class,
            "error_message": job.error_message
        }))),
        None => Err(AppError::NotFound("Job not found".to_string())),
    }
}

/// Cancel a queued job
pub async fn cancel_job(
    State(state): State<Arc<PipelineState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    info!("Cancel request for job {}", job_id);

    let cancelled = state.producer.cancel(job_id).await.map_err(|e| {
        error!("Failed to cancel job {}: {}", job_id, e);
        map_queue_error(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "dequeued": cancelled,
        "message": if cancelled {
            "Job cancelled before dispatch"
        } else {
            "Job already dispatched, result will be discarded"
        }
    })))
}

/// Get queue statistics
pub async fn get_queue_stats(
    State(state): State<Arc<PipelineState>>,
) -> Result<Json<Value>, AppError> {
    let stats = state.backend.stats().await.map_err(|e| {
        error!("Failed to read queue stats: {}", e);
        AppError::Internal("Operation failed".to_string())
    })?;

    Ok(Json(json!({
        "scheduled_jobs": stats.scheduled_jobs,
        "processing_jobs": stats.processing_jobs
    })))
}
