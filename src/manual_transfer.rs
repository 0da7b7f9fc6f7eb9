// src/manual_transfer.rs
//
// Self-reported bank transfers. Payer creates a `pending_verification`
// record, an administrator confirms or rejects it exactly once.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::BillingStore;
use crate::error::BillingError;
use crate::models::{NewPayment, Payment, PaymentStatus, PaymentTransition, PROVIDER_MANUAL_TRANSFER};

#[derive(Debug, Clone)]
pub struct ManualTransferConfig {
    pub min_amount: Decimal,
    pub currency: String,
}

impl Default for ManualTransferConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(100, 0),
            currency: "RUB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualPaymentRequest {
    pub org_id: i32,
    #[schema(value_type = String, example = "250.00")]
    pub amount: Decimal,
    /// Last four digits of the payer's card or account.
    pub last4_digits: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManualPaymentResponse {
    pub payment_id: i32,
    pub status: String,
    pub message: String,
}

#[derive(Clone)]
pub struct ManualTransferService {
    store: Arc<dyn BillingStore>,
    config: ManualTransferConfig,
}

impl ManualTransferService {
    pub fn new(store: Arc<dyn BillingStore>, config: ManualTransferConfig) -> Self {
        Self { store, config }
    }

    fn validate(&self, req: &ManualPaymentRequest) -> Result<(), BillingError> {
        if req.amount < self.config.min_amount {
            return Err(BillingError::Validation(format!(
                "amount {} is below the minimum of {} {}",
                req.amount, self.config.min_amount, self.config.currency
            )));
        }
        if req.last4_digits.chars().count() != 4 {
            return Err(BillingError::Validation(
                "last4_digits must be exactly 4 characters".to_string(),
            ));
        }
        if !req.last4_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(BillingError::Validation(
                "last4_digits must contain only digits".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_manual_payment(
        &self,
        req: &ManualPaymentRequest,
    ) -> Result<ManualPaymentResponse, BillingError> {
        self.validate(req)?;

        let payment = self
            .store
            .insert_payment(&NewPayment {
                org_id: Some(req.org_id),
                user_id: None,
                subscription_id: None,
                plan_id: None,
                amount: req.amount,
                currency: self.config.currency.clone(),
                provider: PROVIDER_MANUAL_TRANSFER.to_string(),
                status: PaymentStatus::PendingVerification,
                external_id: None,
                idempotency_key: None,
                payer_last4: Some(req.last4_digits.clone()),
            })
            .await?;

        log::info!(
            "manual payment created payment_id={} org_id={} amount={}",
            payment.id,
            req.org_id,
            req.amount
        );

        Ok(ManualPaymentResponse {
            payment_id: payment.id,
            status: payment.status.to_string(),
            message: format!(
                "Payment of {:.2} {} is awaiting administrator verification.",
                req.amount, self.config.currency
            ),
        })
    }

    pub async fn confirm_payment(&self, payment_id: i32, admin_id: i32) -> Result<(), BillingError> {
        let transition = PaymentTransition {
            confirmed_by: Some(admin_id),
            ..PaymentTransition::new(PaymentStatus::PendingVerification, PaymentStatus::Paid)
        };
        self.adjudicate(payment_id, &transition).await?;
        log::info!("manual payment confirmed payment_id={payment_id} admin_id={admin_id}");
        Ok(())
    }

    /// `reason` is kept for audit only.
    pub async fn reject_payment(&self, payment_id: i32, reason: &str) -> Result<(), BillingError> {
        let transition = PaymentTransition {
            rejection_reason: Some(reason.to_string()),
            ..PaymentTransition::new(PaymentStatus::PendingVerification, PaymentStatus::Failed)
        };
        self.adjudicate(payment_id, &transition).await?;
        log::info!("manual payment rejected payment_id={payment_id} reason={reason}");
        Ok(())
    }

    async fn adjudicate(
        &self,
        payment_id: i32,
        transition: &PaymentTransition,
    ) -> Result<(), BillingError> {
        if self.store.transition_payment(payment_id, transition).await? {
            return Ok(());
        }

        match self.store.get_payment(payment_id).await? {
            None => Err(BillingError::NotFound(format!("payment id={payment_id}"))),
            Some(p) => Err(BillingError::Conflict(format!(
                "payment id={} is already {}",
                p.id, p.status
            ))),
        }
    }

    pub async fn get_pending_payments(&self) -> Result<Vec<Payment>, BillingError> {
        Ok(self.store.list_pending_verification().await?)
    }
}
