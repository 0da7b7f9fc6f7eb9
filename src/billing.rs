// src/billing.rs

use std::sync::Arc;

use crate::db::BillingStore;
use crate::error::BillingError;
use crate::models::{Subscription, SubscriptionStatus};

/// Subscription lifecycle operations driven from outside the sweep.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn get_subscription(&self, id: i32) -> Result<Subscription, BillingError> {
        self.store
            .get_subscription(id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("subscription id={id}")))
    }

    /// Moves a subscription to `canceled`. Already canceled is a no-op.
    ///
    /// Conditional on the status just read, so a concurrent webhook moving
    /// the row to `past_due` surfaces as a conflict instead of being lost.
    pub async fn cancel_subscription(&self, id: i32) -> Result<Subscription, BillingError> {
        let sub = self.get_subscription(id).await?;
        if sub.status == SubscriptionStatus::Canceled {
            return Ok(sub);
        }

        let moved = self
            .store
            .transition_subscription(id, sub.status, SubscriptionStatus::Canceled)
            .await?;
        if !moved {
            return Err(BillingError::Conflict(format!(
                "subscription id={id} changed status concurrently"
            )));
        }

        log::info!("subscription canceled subscription_id={id} previous_status={}", sub.status);
        self.get_subscription(id).await
    }
}
