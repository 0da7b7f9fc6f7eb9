// src/webhook.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::BillingStore;
use crate::error::BillingError;
use crate::models::{PaymentStatus, PaymentTransition, SubscriptionStatus, PROVIDER_YOOKASSA};
use crate::signature::WebhookVerifier;

/// YooKassa notification body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub event: String,
    pub object: WebhookPaymentObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl WebhookEvent {
    /// Terminal status this event drives the payment to, if any.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self.event.as_str() {
            "payment.succeeded" => Some(PaymentStatus::Paid),
            "payment.canceled" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        payment_id: i32,
        status: PaymentStatus,
    },
    /// Redelivery for a payment that already reached a terminal state.
    AlreadyProcessed {
        payment_id: i32,
        status: PaymentStatus,
    },
    /// Event type that does not finalise a payment.
    Ignored { event: String },
}

pub fn parse_webhook_body(raw_body: &[u8]) -> Result<WebhookEvent, BillingError> {
    serde_json::from_slice(raw_body).map_err(|e| BillingError::InvalidPayload(e.to_string()))
}

#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn BillingStore>,
    verifier: WebhookVerifier,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn BillingStore>, verifier: WebhookVerifier) -> Self {
        Self { store, verifier }
    }

    pub fn verify_signature(&self, raw_body: &[u8], supplied: &str) -> bool {
        self.verifier.verify(raw_body, supplied)
    }

    /// Verify, then parse, then apply. The body is not parsed unless the
    /// signature matches.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        supplied_signature: Option<&str>,
    ) -> Result<WebhookOutcome, BillingError> {
        let Some(signature) = supplied_signature else {
            return Err(BillingError::InvalidSignature);
        };
        if !self.verify_signature(raw_body, signature) {
            log::warn!("webhook signature mismatch body_len={}", raw_body.len());
            return Err(BillingError::InvalidSignature);
        }

        let event = parse_webhook_body(raw_body)?;
        self.process(&event).await
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, BillingError> {
        let Some(target) = event.target_status() else {
            log::info!(
                "webhook ignored event={} external_id={}",
                event.event,
                event.object.id
            );
            return Ok(WebhookOutcome::Ignored {
                event: event.event.clone(),
            });
        };

        let external_id = event.object.id.as_str();
        let payment = self
            .store
            .find_payment_by_external_id(PROVIDER_YOOKASSA, external_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("payment external_id={external_id}")))?;

        if payment.status.is_terminal() {
            if payment.status != target {
                log::warn!(
                    "webhook conflicts with terminal payment payment_id={} stored={} event={}",
                    payment.id,
                    payment.status,
                    event.event
                );
            } else {
                log::info!(
                    "webhook redelivery payment_id={} status={}",
                    payment.id,
                    payment.status
                );
            }
            return Ok(WebhookOutcome::AlreadyProcessed {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        let applied = self
            .store
            .transition_payment(payment.id, &PaymentTransition::new(payment.status, target))
            .await?;

        if !applied {
            // lost a race with a concurrent delivery; report what won
            let current = self
                .store
                .get_payment(payment.id)
                .await?
                .ok_or_else(|| BillingError::NotFound(format!("payment id={}", payment.id)))?;
            if current.status.is_terminal() {
                return Ok(WebhookOutcome::AlreadyProcessed {
                    payment_id: current.id,
                    status: current.status,
                });
            }
            return Err(BillingError::Conflict(format!(
                "payment id={} is {}",
                current.id, current.status
            )));
        }

        log::info!(
            "webhook applied payment_id={} external_id={} status={}",
            payment.id,
            external_id,
            target
        );

        if target == PaymentStatus::Failed {
            if let Some(subscription_id) = payment.subscription_id {
                let moved = self
                    .store
                    .transition_subscription(
                        subscription_id,
                        SubscriptionStatus::Active,
                        SubscriptionStatus::PastDue,
                    )
                    .await?;
                if moved {
                    log::warn!(
                        "renewal payment failed, subscription past_due subscription_id={} payment_id={}",
                        subscription_id,
                        payment.id
                    );
                }
            }
        }

        Ok(WebhookOutcome::Applied {
            payment_id: payment.id,
            status: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_provider_events_to_terminal_statuses() {
        let event = parse_webhook_body(
            br#"{"type":"notification","event":"payment.succeeded","object":{"id":"p-1","status":"succeeded"}}"#,
        )
        .unwrap();
        assert_eq!(event.target_status(), Some(PaymentStatus::Paid));

        let event = parse_webhook_body(
            br#"{"event":"payment.canceled","object":{"id":"p-1"}}"#,
        )
        .unwrap();
        assert_eq!(event.target_status(), Some(PaymentStatus::Failed));

        let event = parse_webhook_body(
            br#"{"event":"payment.waiting_for_capture","object":{"id":"p-1"}}"#,
        )
        .unwrap();
        assert_eq!(event.target_status(), None);
    }

    #[test]
    fn malformed_body_is_invalid_payload() {
        assert!(matches!(
            parse_webhook_body(b"contractId=abc"),
            Err(BillingError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_webhook_body(br#"{"event":"payment.succeeded"}"#),
            Err(BillingError::InvalidPayload(_))
        ));
    }
}
