// src/gateway.rs
//
// Client for the YooKassa payments API (https://api.yookassa.ru/v3).
// Auth: HTTP Basic with shop id and secret key; every POST carries an
// Idempotency-Key so a retried charge is deduplicated by the provider.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub const YOOKASSA_API_BASE: &str = "https://api.yookassa.ru/v3";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub shop_id: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// One charge attempt as the billing engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub payer_id: i32,
    pub plan_id: i32,
    pub subscription_id: Option<i32>,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub return_url: String,
    pub idempotency_key: String,
}

/// Provider-side payment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
    Other(String),
}

impl GatewayPaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "waiting_for_capture" => Self::WaitingForCapture,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::WaitingForCapture => "waiting_for_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }

    /// Whether the provider took the charge (possibly still settling).
    /// Unknown statuses count as declined.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Pending | Self::WaitingForCapture | Self::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentHandle {
    pub external_id: String,
    pub status: GatewayPaymentStatus,
    pub confirmation_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &str;

    async fn create_payment(&self, req: &ChargeRequest) -> Result<PaymentHandle, GatewayError>;
}

/// Key for renewing `subscription_id` past the period ending at `period_end`.
/// Stable across retries until the period actually moves.
pub fn renewal_idempotency_key(
    subscription_id: i32,
    plan_id: i32,
    period_end: DateTime<Utc>,
) -> String {
    format!(
        "sub-{subscription_id}-plan-{plan_id}-{}",
        period_end.timestamp()
    )
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentMetadata {
    pub user_id: i32,
    pub plan_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct Confirmation {
    #[serde(rename = "type")]
    pub kind: String,
    pub return_url: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentRequest {
    pub amount: Amount,
    pub description: String,
    pub return_url: String,
    pub metadata: PaymentMetadata,
    pub confirmation: Confirmation,
}

impl From<&ChargeRequest> for CreatePaymentRequest {
    fn from(req: &ChargeRequest) -> Self {
        Self {
            amount: Amount {
                value: format!("{:.2}", req.amount),
                currency: req.currency.clone(),
            },
            description: req.description.clone(),
            return_url: req.return_url.clone(),
            metadata: PaymentMetadata {
                user_id: req.payer_id,
                plan_id: req.plan_id,
                subscription_id: req.subscription_id,
            },
            confirmation: Confirmation {
                kind: "redirect".to_string(),
                return_url: req.return_url.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub return_url: Option<String>,
    pub confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentResponse {
    pub id: String,
    pub status: String,
    pub amount: Option<Amount>,
    pub confirmation: Option<ConfirmationResponse>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<PaymentResponse> for PaymentHandle {
    fn from(resp: PaymentResponse) -> Self {
        let confirmation_url = resp
            .confirmation
            .and_then(|c| c.confirmation_url.or(c.return_url));
        Self {
            external_id: resp.id,
            status: GatewayPaymentStatus::parse(&resp.status),
            confirmation_url,
            created_at: resp.created_at,
        }
    }
}

pub struct YooKassaClient {
    http: reqwest::Client,
    api_base: String,
    shop_id: String,
    api_key: String,
    timeout: Duration,
}

impl YooKassaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::from_transport(e, config.timeout))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            shop_id: config.shop_id.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl PaymentGateway for YooKassaClient {
    fn provider(&self) -> &str {
        crate::models::PROVIDER_YOOKASSA
    }

    async fn create_payment(&self, req: &ChargeRequest) -> Result<PaymentHandle, GatewayError> {
        let body = CreatePaymentRequest::from(req);

        let resp = self
            .http
            .post(format!("{}/payments", self.api_base))
            .basic_auth(&self.shop_id, Some(&self.api_key))
            .header("Idempotency-Key", &req.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(e, self.timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::from_transport(e, self.timeout))?;

        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<PaymentResponse>(&body)
            .map(PaymentHandle::from)
            .map_err(|e| GatewayError::Protocol(format!("{e}; body={body}")))
    }
}
