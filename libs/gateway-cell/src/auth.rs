use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// Refresh slightly before the payer-reported expiry.
const EXPIRY_SKEW_SECONDS: i64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Client-credentials token cache. The mutex is held across the refresh
/// call, so concurrent dispatchers queue behind one token request
/// instead of issuing redundant ones.
pub struct TokenCache {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(client: Client, base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            client,
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a bearer token, fetching or refreshing as needed.
    /// `force_refresh` discards the cached token first; the gateway uses
    /// it after a 401 before its single retry.
    pub async fn bearer(&self, force_refresh: bool) -> Result<String, GatewayError> {
        let mut cached = self.cached.lock().await;

        if !force_refresh {
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() {
                    return Ok(token.token.clone());
                }
                debug!("Cached clearinghouse token expired");
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            warn!("Clearinghouse rejected credentials: {}", body);
            return Err(GatewayError::Auth(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TokenEndpoint(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::TokenEndpoint(format!("invalid token response: {}", e)))?;

        let expires_at =
            Utc::now() + Duration::seconds((token.expires_in - EXPIRY_SKEW_SECONDS).max(1));
        info!("Acquired clearinghouse token, valid until {}", expires_at);

        let bearer = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            expires_at,
        });
        Ok(bearer)
    }
}
