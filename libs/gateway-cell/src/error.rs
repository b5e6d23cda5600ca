use serde::{Deserialize, Serialize};
use thiserror::Error;

use x12_cell::X12Error;

/// Retry classification, decided once at the gateway/codec boundary.
/// Downstream code branches on this tag, never on error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Clearinghouse credentials not configured")]
    NotConfigured,

    #[error("Clearinghouse request timed out")]
    Timeout,

    #[error("Connection to clearinghouse failed: {0}")]
    Connect(String),

    #[error("Clearinghouse returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Authentication rejected by clearinghouse: {0}")]
    Auth(String),

    #[error("Token endpoint failure: {0}")]
    TokenEndpoint(String),

    #[error(transparent)]
    X12(#[from] X12Error),
}

impl GatewayError {
    /// Transient errors are retried with backoff; permanent errors fail
    /// the job on first occurrence. Resubmitting data the codec cannot
    /// parse changes nothing, so every `X12` failure is permanent.
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Timeout | GatewayError::Connect(_) | GatewayError::TokenEndpoint(_) => {
                ErrorClass::Transient
            }
            GatewayError::HttpStatus { status, .. } => {
                if *status >= 500 || *status == 429 {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            GatewayError::NotConfigured | GatewayError::Auth(_) | GatewayError::X12(_) => {
                ErrorClass::Permanent
            }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Connect(error.to_string())
        }
    }
}
