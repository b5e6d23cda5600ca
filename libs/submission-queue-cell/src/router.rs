use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{
    cancel_job, get_job, get_queue_stats, get_transaction, submit_claim, submit_eligibility,
    PipelineState,
};

pub fn create_payer_router(state: Arc<PipelineState>) -> Router {
    Router::new()
        .route("/eligibility", post(submit_eligibility))
        .route("/claims", post(submit_claim))
        .route("/transactions/{transaction_id}", get(get_transaction))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/stats", get(get_queue_stats))
        .with_state(state)
}
