use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use gateway_cell::ClearinghouseClient;
use shared_config::AppConfig;
use submission_queue_cell::{
    InMemoryQueueBackend, PipelineState, PollerConfig, QueueBackend, RedisQueueBackend,
    StatusPollerService, SubmissionProducerService, SubmissionWorkerService, WorkerConfig,
};
use transaction_cell::InMemoryTransactionStore;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PayerFlow API server");

    // Load configuration
    let config = AppConfig::from_env();

    let gateway = match ClearinghouseClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Cannot build clearinghouse client: {}", e);
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn QueueBackend> = match &config.redis_url {
        Some(redis_url) => match RedisQueueBackend::new(redis_url).await {
            Ok(backend) => {
                info!("Using Redis-backed submission queue");
                Arc::new(backend)
            }
            Err(e) => {
                error!("Cannot connect to Redis at configured URL: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("REDIS_URL not set, queued jobs will not survive a restart");
            Arc::new(InMemoryQueueBackend::new())
        }
    };

    let store = Arc::new(InMemoryTransactionStore::new());

    let worker_config = WorkerConfig::default();
    let max_attempts = worker_config.max_attempts;
    let worker = Arc::new(SubmissionWorkerService::new(
        worker_config,
        backend.clone(),
        store.clone(),
        gateway.clone(),
    ));
    let poller = Arc::new(StatusPollerService::new(
        PollerConfig::default(),
        store.clone(),
        gateway.clone(),
    ));

    {
        let worker = worker.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.start().await {
                error!("Submission worker stopped: {}", e);
            }
        });
    }
    {
        let poller = poller.clone();
        tokio::spawn(async move {
            if let Err(e) = poller.start().await {
                error!("Status poller stopped: {}", e);
            }
        });
    }

    let producer = Arc::new(SubmissionProducerService::new(
        backend.clone(),
        store.clone(),
        max_attempts,
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(PipelineState {
        producer,
        store,
        backend,
    });

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
