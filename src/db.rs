// src/db.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::StoreError;
use crate::models::{
    NewPayment, Payment, PaymentTransition, PeriodAdvance, Plan, Subscription, SubscriptionStatus,
};

/// Durable state for subscriptions, plans and payments.
///
/// Every mutation that can race with another execution path is a
/// conditional update: it reports whether a row matched instead of
/// overwriting blindly.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    async fn get_subscription(&self, id: i32) -> Result<Option<Subscription>, StoreError>;

    async fn get_plan(&self, id: i32) -> Result<Option<Plan>, StoreError>;

    /// Moves the period and records the renewal payment in one atomic step.
    ///
    /// Returns `None` when the subscription is no longer `active` or its
    /// period end no longer equals `expected_period_end`; nothing is written
    /// in that case.
    async fn renew_subscription(
        &self,
        advance: &PeriodAdvance,
        payment: &NewPayment,
    ) -> Result<Option<Payment>, StoreError>;

    /// Sets `to` only while the current status is `from`.
    async fn transition_subscription(
        &self,
        id: i32,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool, StoreError>;

    /// Inserts a payment. A second insert with the same provider and
    /// external id returns the record already stored.
    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, StoreError>;

    async fn get_payment(&self, id: i32) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Applies `transition` only while the payment is in `transition.from`.
    async fn transition_payment(
        &self,
        id: i32,
        transition: &PaymentTransition,
    ) -> Result<bool, StoreError>;

    /// `pending_verification` payments, newest first.
    async fn list_pending_verification(&self) -> Result<Vec<Payment>, StoreError>;
}

const SUBSCRIPTION_COLUMNS: &str = r#"id, org_id, plan_id, status, current_period_start, current_period_end,
       created_at, updated_at, canceled_at"#;

const PAYMENT_COLUMNS: &str = r#"id, org_id, user_id, subscription_id, plan_id, amount, currency, provider,
       status, external_id, idempotency_key, payer_last4, confirmed_by, rejection_reason,
       created_at, resolved_at"#;

fn subscription_from_row(r: &PgRow) -> Result<Subscription, StoreError> {
    let status: String = r.try_get("status")?;
    Ok(Subscription {
        id: r.try_get("id")?,
        org_id: r.try_get("org_id")?,
        plan_id: r.try_get("plan_id")?,
        status: status.parse()?,
        current_period_start: r.try_get("current_period_start")?,
        current_period_end: r.try_get("current_period_end")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        canceled_at: r.try_get("canceled_at")?,
    })
}

fn plan_from_row(r: &PgRow) -> Result<Plan, StoreError> {
    let billing_cycle: String = r.try_get("billing_cycle")?;
    Ok(Plan {
        id: r.try_get("id")?,
        slug: r.try_get("slug")?,
        name: r.try_get("name")?,
        price: r.try_get("price")?,
        currency: r.try_get("currency")?,
        billing_cycle: billing_cycle.parse()?,
        is_active: r.try_get("is_active")?,
    })
}

fn payment_from_row(r: &PgRow) -> Result<Payment, StoreError> {
    let status: String = r.try_get("status")?;
    Ok(Payment {
        id: r.try_get("id")?,
        org_id: r.try_get("org_id")?,
        user_id: r.try_get("user_id")?,
        subscription_id: r.try_get("subscription_id")?,
        plan_id: r.try_get("plan_id")?,
        amount: r.try_get("amount")?,
        currency: r.try_get("currency")?,
        provider: r.try_get("provider")?,
        status: status.parse()?,
        external_id: r.try_get("external_id")?,
        idempotency_key: r.try_get("idempotency_key")?,
        payer_last4: r.try_get("payer_last4")?,
        confirmed_by: r.try_get("confirmed_by")?,
        rejection_reason: r.try_get("rejection_reason")?,
        created_at: r.try_get("created_at")?,
        resolved_at: r.try_get("resolved_at")?,
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert-or-fetch keyed on `(provider, external_id)`.
async fn insert_payment_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment,
) -> Result<Payment, StoreError> {
    let inserted = sqlx::query(&format!(
        r#"INSERT INTO payments
               (org_id, user_id, subscription_id, plan_id, amount, currency, provider, status,
                external_id, idempotency_key, payer_last4, resolved_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                   CASE WHEN $8 IN ('paid', 'failed') THEN NOW() END)
           ON CONFLICT (provider, external_id) DO NOTHING
           RETURNING {PAYMENT_COLUMNS}"#
    ))
    .bind(payment.org_id)
    .bind(payment.user_id)
    .bind(payment.subscription_id)
    .bind(payment.plan_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.status.as_str())
    .bind(payment.external_id.as_deref())
    .bind(payment.idempotency_key.as_deref())
    .bind(payment.payer_last4.as_deref())
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = inserted {
        return payment_from_row(&row);
    }

    // only reachable when external_id is set: NULLs never conflict
    let row = sqlx::query(&format!(
        r#"SELECT {PAYMENT_COLUMNS}
           FROM payments
           WHERE provider = $1 AND external_id = $2"#
    ))
    .bind(&payment.provider)
    .bind(payment.external_id.as_deref())
    .fetch_one(&mut **tx)
    .await?;

    payment_from_row(&row)
}

#[async_trait]
impl BillingStore for PgStore {
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {SUBSCRIPTION_COLUMNS}
               FROM subscriptions
               WHERE status = 'active'
               ORDER BY current_period_end ASC, id ASC"#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn get_subscription(&self, id: i32) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(&format!(
            r#"SELECT {SUBSCRIPTION_COLUMNS}
               FROM subscriptions
               WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn get_plan(&self, id: i32) -> Result<Option<Plan>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, slug, name, price, currency, billing_cycle, is_active
               FROM plans
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(plan_from_row).transpose()
    }

    async fn renew_subscription(
        &self,
        advance: &PeriodAdvance,
        payment: &NewPayment,
    ) -> Result<Option<Payment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE subscriptions
               SET current_period_start = $1, current_period_end = $2, updated_at = NOW()
               WHERE id = $3 AND status = 'active' AND current_period_end = $4"#,
        )
        .bind(advance.new_period_start)
        .bind(advance.new_period_end)
        .bind(advance.subscription_id)
        .bind(advance.expected_period_end)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stored = insert_payment_tx(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn transition_subscription(
        &self,
        id: i32,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool, StoreError> {
        let canceled_at: Option<DateTime<Utc>> = (to == SubscriptionStatus::Canceled).then(Utc::now);
        let updated = sqlx::query(
            r#"UPDATE subscriptions
               SET status = $1, canceled_at = COALESCE($2, canceled_at), updated_at = NOW()
               WHERE id = $3 AND status = $4"#,
        )
        .bind(to.as_str())
        .bind(canceled_at)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_payment_tx(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_payment(&self, id: i32) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!(
            r#"SELECT {PAYMENT_COLUMNS}
               FROM payments
               WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_payment_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!(
            r#"SELECT {PAYMENT_COLUMNS}
               FROM payments
               WHERE provider = $1 AND external_id = $2"#
        ))
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn transition_payment(
        &self,
        id: i32,
        transition: &PaymentTransition,
    ) -> Result<bool, StoreError> {
        if !transition.from.can_transition_to(transition.to) {
            return Ok(false);
        }

        let updated = sqlx::query(
            r#"UPDATE payments
               SET status = $1,
                   confirmed_by = COALESCE($2, confirmed_by),
                   rejection_reason = COALESCE($3, rejection_reason),
                   resolved_at = NOW()
               WHERE id = $4 AND status = $5"#,
        )
        .bind(transition.to.as_str())
        .bind(transition.confirmed_by)
        .bind(transition.rejection_reason.as_deref())
        .bind(id)
        .bind(transition.from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn list_pending_verification(&self) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {PAYMENT_COLUMNS}
               FROM payments
               WHERE status = 'pending_verification'
               ORDER BY created_at DESC, id DESC"#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}
