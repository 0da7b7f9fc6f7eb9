// src/memory.rs
//
// In-process BillingStore. Every operation takes the single state lock, so
// the conditional updates behave like the row-level ones in Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::db::BillingStore;
use crate::error::StoreError;
use crate::models::{
    BillingCycle, NewPayment, Payment, PaymentStatus, PaymentTransition, PeriodAdvance, Plan,
    Subscription, SubscriptionStatus,
};

#[derive(Default)]
struct State {
    plans: HashMap<i32, Plan>,
    subscriptions: HashMap<i32, Subscription>,
    payments: HashMap<i32, Payment>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn find_external(&self, provider: &str, external_id: &str) -> Option<&Payment> {
        self.payments.values().find(|p| {
            p.provider == provider && p.external_id.as_deref() == Some(external_id)
        })
    }

    fn insert_payment(&mut self, payment: &NewPayment) -> Payment {
        if let Some(external_id) = payment.external_id.as_deref() {
            if let Some(existing) = self.find_external(&payment.provider, external_id) {
                return existing.clone();
            }
        }

        let now = Utc::now();
        let stored = Payment {
            id: self.next_id(),
            org_id: payment.org_id,
            user_id: payment.user_id,
            subscription_id: payment.subscription_id,
            plan_id: payment.plan_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            provider: payment.provider.clone(),
            status: payment.status,
            external_id: payment.external_id.clone(),
            idempotency_key: payment.idempotency_key.clone(),
            payer_last4: payment.payer_last4.clone(),
            confirmed_by: None,
            rejection_reason: None,
            created_at: now,
            resolved_at: payment.status.is_terminal().then_some(now),
        };
        self.payments.insert(stored.id, stored.clone());
        stored
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_plan(
        &self,
        slug: &str,
        name: &str,
        price: Decimal,
        currency: &str,
        billing_cycle: BillingCycle,
    ) -> Plan {
        let mut state = self.state.lock().await;
        let plan = Plan {
            id: state.next_id(),
            slug: slug.to_string(),
            name: name.to_string(),
            price,
            currency: currency.to_string(),
            billing_cycle,
            is_active: true,
        };
        state.plans.insert(plan.id, plan.clone());
        plan
    }

    pub async fn add_subscription(
        &self,
        org_id: i32,
        plan_id: i32,
        status: SubscriptionStatus,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        if current_period_end <= current_period_start {
            return Err(StoreError::InvalidData(
                "current_period_end must be after current_period_start".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if !state.plans.contains_key(&plan_id) {
            return Err(StoreError::InvalidData(format!("unknown plan {plan_id}")));
        }
        let now = Utc::now();
        let sub = Subscription {
            id: state.next_id(),
            org_id,
            plan_id,
            status,
            current_period_start,
            current_period_end,
            created_at: now,
            updated_at: now,
            canceled_at: None,
        };
        state.subscriptions.insert(sub.id, sub.clone());
        Ok(sub)
    }

    /// All payments, oldest first.
    pub async fn payments(&self) -> Vec<Payment> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.id);
        payments
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.lock().await;
        let mut subs: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .cloned()
            .collect();
        subs.sort_by_key(|s| (s.current_period_end, s.id));
        Ok(subs)
    }

    async fn get_subscription(&self, id: i32) -> Result<Option<Subscription>, StoreError> {
        Ok(self.state.lock().await.subscriptions.get(&id).cloned())
    }

    async fn get_plan(&self, id: i32) -> Result<Option<Plan>, StoreError> {
        Ok(self.state.lock().await.plans.get(&id).cloned())
    }

    async fn renew_subscription(
        &self,
        advance: &PeriodAdvance,
        payment: &NewPayment,
    ) -> Result<Option<Payment>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(sub) = state.subscriptions.get_mut(&advance.subscription_id) else {
            return Ok(None);
        };
        if sub.status != SubscriptionStatus::Active
            || sub.current_period_end != advance.expected_period_end
        {
            return Ok(None);
        }

        sub.current_period_start = advance.new_period_start;
        sub.current_period_end = advance.new_period_end;
        sub.updated_at = Utc::now();

        Ok(Some(state.insert_payment(payment)))
    }

    async fn transition_subscription(
        &self,
        id: i32,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(sub) = state.subscriptions.get_mut(&id) else {
            return Ok(false);
        };
        if sub.status != from {
            return Ok(false);
        }

        let now = Utc::now();
        sub.status = to;
        sub.updated_at = now;
        if to == SubscriptionStatus::Canceled {
            sub.canceled_at = Some(now);
        }
        Ok(true)
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, StoreError> {
        Ok(self.state.lock().await.insert_payment(payment))
    }

    async fn get_payment(&self, id: i32) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .find_external(provider, external_id)
            .cloned())
    }

    async fn transition_payment(
        &self,
        id: i32,
        transition: &PaymentTransition,
    ) -> Result<bool, StoreError> {
        if !transition.from.can_transition_to(transition.to) {
            return Ok(false);
        }

        let mut state = self.state.lock().await;
        let Some(payment) = state.payments.get_mut(&id) else {
            return Ok(false);
        };
        if payment.status != transition.from {
            return Ok(false);
        }

        payment.status = transition.to;
        if transition.confirmed_by.is_some() {
            payment.confirmed_by = transition.confirmed_by;
        }
        if transition.rejection_reason.is_some() {
            payment.rejection_reason = transition.rejection_reason.clone();
        }
        payment.resolved_at = Some(Utc::now());
        Ok(true)
    }

    async fn list_pending_verification(&self) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        let mut pending: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::PendingVerification)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pending)
    }
}
