// src/error.rs

use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Failures talking to the payment provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure, safe to retry next cycle.
    #[error("payment gateway unreachable: {0}")]
    Unreachable(String),

    #[error("payment gateway timed out after {0:?}")]
    Timeout(Duration),

    /// Provider answered with a non-success HTTP status.
    #[error("payment gateway rejected request status={status} body={body}")]
    Rejected { status: u16, body: String },

    /// Provider answered 2xx but the body could not be understood.
    #[error("invalid gateway response: {0}")]
    Protocol(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }

    /// Classifies a client error. reqwest does not carry the configured
    /// limit on the error, so the caller passes it in.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        Self::Unreachable(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted column holds a value outside its enum domain.
    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("charge declined by provider payment_id={external_id} status={status}")]
    ChargeDeclined { external_id: String, status: String },

    /// A conditional update matched zero rows: the state already moved.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ResponseError for BillingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gateway(_) | Self::ChargeDeclined { .. } => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Storage(e) => {
                log::error!("storage error: {e}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
