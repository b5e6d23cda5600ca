pub mod backend;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod poller;
pub mod producer;
pub mod redis_backend;
pub mod router;
pub mod worker;

pub use backend::QueueBackend;
pub use error::SubmissionQueueError;
pub use handlers::PipelineState;
pub use memory::InMemoryQueueBackend;
pub use models::*;
pub use poller::StatusPollerService;
pub use producer::SubmissionProducerService;
pub use redis_backend::RedisQueueBackend;
pub use router::create_payer_router;
pub use worker::SubmissionWorkerService;
