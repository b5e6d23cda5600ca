use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub clearinghouse_base_url: String,
    pub clearinghouse_client_id: String,
    pub clearinghouse_client_secret: String,
    pub submitter_id: String,
    pub receiver_id: String,
    pub redis_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            clearinghouse_base_url: env::var("CLEARINGHOUSE_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("CLEARINGHOUSE_BASE_URL not set, using empty value");
                    String::new()
                }),
            clearinghouse_client_id: env::var("CLEARINGHOUSE_CLIENT_ID")
                .unwrap_or_else(|_| {
                    warn!("CLEARINGHOUSE_CLIENT_ID not set, using empty value");
                    String::new()
                }),
            clearinghouse_client_secret: env::var("CLEARINGHOUSE_CLIENT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("CLEARINGHOUSE_CLIENT_SECRET not set, using empty value");
                    String::new()
                }),
            submitter_id: env::var("X12_SUBMITTER_ID")
                .unwrap_or_else(|_| {
                    warn!("X12_SUBMITTER_ID not set, using default");
                    "FLOWIQ".to_string()
                }),
            receiver_id: env::var("X12_RECEIVER_ID")
                .unwrap_or_else(|_| {
                    warn!("X12_RECEIVER_ID not set, using default");
                    "CLEARINGHOUSE".to_string()
                }),
            redis_url: env::var("REDIS_URL").ok(),
        };

        if !config.is_configured() {
            warn!("Payer pipeline not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.clearinghouse_base_url.is_empty()
            && !self.clearinghouse_client_id.is_empty()
            && !self.clearinghouse_client_secret.is_empty()
    }

    pub fn is_queue_durable(&self) -> bool {
        self.redis_url.is_some()
    }
}
