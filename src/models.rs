// src/models.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const PROVIDER_YOOKASSA: &str = "yookassa";
pub const PROVIDER_MANUAL_TRANSFER: &str = "manual_transfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Grace,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Grace => "grace",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "grace" => Ok(Self::Grace),
            other => Err(StoreError::InvalidData(format!(
                "unknown subscription status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment record status.
///
/// `Pending` belongs to gateway charges awaiting the provider's webhook,
/// `PendingVerification` to self-reported bank transfers awaiting an admin.
/// `Paid` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PendingVerification,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingVerification => "pending_verification",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl FromStr for PaymentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_verification" => Ok(Self::PendingVerification),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidData(format!(
                "unknown payment status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }

    /// Calendar-month step; Jan 31 + 1 month lands on the last day of February.
    pub fn advance(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        from.checked_add_months(Months::new(self.months()))
    }
}

impl FromStr for BillingCycle {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            other => Err(StoreError::InvalidData(format!(
                "unknown billing cycle {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: i32,
    pub org_id: i32,
    pub plan_id: i32,
    pub status: SubscriptionStatus,
    /// Inclusive start of the paid period.
    pub current_period_start: DateTime<Utc>,
    /// Exclusive end of the paid period.
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// The period is half-open, so it has lapsed once `now` reaches its end.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now >= self.current_period_end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: i32,
    pub org_id: Option<i32>,
    pub user_id: Option<i32>,
    pub subscription_id: Option<i32>,
    pub plan_id: Option<i32>,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub external_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub payer_last4: Option<String>,
    pub confirmed_by: Option<i32>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub org_id: Option<i32>,
    pub user_id: Option<i32>,
    pub subscription_id: Option<i32>,
    pub plan_id: Option<i32>,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub external_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub payer_last4: Option<String>,
}

/// Conditional period move: applies only while the row is still `active`
/// and still ends at `expected_period_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodAdvance {
    pub subscription_id: i32,
    pub expected_period_end: DateTime<Utc>,
    pub new_period_start: DateTime<Utc>,
    pub new_period_end: DateTime<Utc>,
}

/// Conditional payment status move from `from` to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub confirmed_by: Option<i32>,
    pub rejection_reason: Option<String>,
}

impl PaymentTransition {
    pub fn new(from: PaymentStatus, to: PaymentStatus) -> Self {
        Self {
            from,
            to,
            confirmed_by: None,
            rejection_reason: None,
        }
    }
}
