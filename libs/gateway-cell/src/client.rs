use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;
use x12_cell::{
    decode_claim_ack, decode_claim_remittance, decode_eligibility_response, encode_claim_request,
    encode_eligibility_request, ClaimAck, ClaimRequest, ClaimResult, EligibilityRequest,
    EligibilityResult, EnvelopeOptions,
};

use crate::auth::TokenCache;
use crate::error::GatewayError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one status check against the clearinghouse.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusCheck {
    Pending,
    Settled(ClaimResult),
}

/// The clearinghouse exchange, trait-seamed so the queue and poller can
/// run against scripted gateways in tests.
#[async_trait]
pub trait PayerGateway: Send + Sync {
    async fn submit_eligibility(
        &self,
        request: &EligibilityRequest,
    ) -> Result<EligibilityResult, GatewayError>;

    async fn submit_claim(&self, request: &ClaimRequest) -> Result<ClaimAck, GatewayError>;

    async fn check_claim_status(&self, control_number: &str)
        -> Result<StatusCheck, GatewayError>;
}

/// HTTP client for the clearinghouse X12 API: bearer-token
/// authenticated, raw X12 text bodies.
pub struct ClearinghouseClient {
    client: Client,
    base_url: String,
    submitter_id: String,
    receiver_id: String,
    tokens: TokenCache,
    control_counter: AtomicU32,
}

impl ClearinghouseClient {
    pub fn new(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: &AppConfig, timeout: Duration) -> Result<Self, GatewayError> {
        if !config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Connect(e.to_string()))?;

        let tokens = TokenCache::new(
            client.clone(),
            &config.clearinghouse_base_url,
            &config.clearinghouse_client_id,
            &config.clearinghouse_client_secret,
        );

        Ok(Self {
            client,
            base_url: config.clearinghouse_base_url.trim_end_matches('/').to_string(),
            submitter_id: config.submitter_id.clone(),
            receiver_id: config.receiver_id.clone(),
            tokens,
            control_counter: AtomicU32::new(1),
        })
    }

    fn next_envelope(&self) -> EnvelopeOptions {
        EnvelopeOptions::new(
            &self.submitter_id,
            &self.receiver_id,
            self.control_counter.fetch_add(1, Ordering::Relaxed),
        )
    }

    /// POSTs an X12 payload. On a 401 the token is refreshed under the
    /// cache's single-flight guard and the call is retried exactly once;
    /// a second 401 means the credentials themselves are bad.
    async fn post_x12(&self, path: &str, payload: &str) -> Result<String, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut force_refresh = false;

        loop {
            let token = self.tokens.bearer(force_refresh).await?;

            debug!("Submitting X12 payload to {}", url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .header("Content-Type", "text/plain")
                .body(payload.to_string())
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;

            if status == StatusCode::UNAUTHORIZED {
                if !force_refresh {
                    warn!("Clearinghouse rejected token, forcing refresh");
                    force_refresh = true;
                    continue;
                }
                error!("Clearinghouse rejected a freshly issued token");
                return Err(GatewayError::Auth(format!("HTTP {}: {}", status, body)));
            }

            if !status.is_success() {
                return Err(GatewayError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(body);
        }
    }
}

#[async_trait]
impl PayerGateway for ClearinghouseClient {
    #[instrument(skip(self, request), fields(member_id = %request.member_id, payer = %request.payer_code))]
    async fn submit_eligibility(
        &self,
        request: &EligibilityRequest,
    ) -> Result<EligibilityResult, GatewayError> {
        let payload = encode_eligibility_request(request, &self.next_envelope())?;
        let body = self.post_x12("/x12/eligibility", &payload).await?;
        let result = decode_eligibility_response(&body)?;

        info!(
            "Eligibility response for member {}: plan_active={}, coverages={}",
            result.member_id,
            result.plan_active,
            result.coverages.len()
        );
        Ok(result)
    }

    #[instrument(skip(self, request), fields(encounter = %request.encounter_id, payer = %request.payer_code))]
    async fn submit_claim(&self, request: &ClaimRequest) -> Result<ClaimAck, GatewayError> {
        let payload = encode_claim_request(request, &self.next_envelope())?;
        let body = self.post_x12("/x12/claims", &payload).await?;
        let ack = decode_claim_ack(&body)?;

        info!(
            "Claim {} acknowledged under control number {} (accepted={})",
            request.encounter_id, ack.control_number, ack.accepted
        );
        Ok(ack)
    }

    #[instrument(skip(self))]
    async fn check_claim_status(
        &self,
        control_number: &str,
    ) -> Result<StatusCheck, GatewayError> {
        let url = format!("{}/x12/claims/{}/status", self.base_url, control_number);
        let mut force_refresh = false;

        loop {
            let token = self.tokens.bearer(force_refresh).await?;
            let response = self.client.get(&url).bearer_auth(token).send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if !force_refresh {
                    force_refresh = true;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Auth(format!("HTTP {}: {}", status, body)));
            }

            if status == StatusCode::NO_CONTENT {
                debug!("Claim {} still pending at clearinghouse", control_number);
                return Ok(StatusCheck::Pending);
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(GatewayError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let result = decode_claim_remittance(&body)?;
            info!(
                "Claim {} settled: {:?}, paid {} of {}",
                control_number, result.status, result.paid_cents, result.charged_cents
            );
            return Ok(StatusCheck::Settled(result));
        }
    }
}
