use std::sync::Arc;

use axum::{routing::get, Router};

use submission_queue_cell::{create_payer_router, PipelineState};

pub fn create_router(state: Arc<PipelineState>) -> Router {
    Router::new()
        .route("/", get(|| async { "PayerFlow API is running!" }))
        .nest("/payer", create_payer_router(state))
}
