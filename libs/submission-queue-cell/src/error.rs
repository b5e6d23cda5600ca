use thiserror::Error;

use transaction_cell::TransactionError;

#[derive(Error, Debug)]
pub enum SubmissionQueueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Queue operation failed: {0}")]
    Queue(String),

    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transaction store error: {0}")]
    Transaction(#[from] TransactionError),
}
