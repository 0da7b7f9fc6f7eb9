#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use nemaxks_billing::config::BillingConfig;
use nemaxks_billing::error::GatewayError;
use nemaxks_billing::gateway::{ChargeRequest, GatewayPaymentStatus, PaymentGateway, PaymentHandle};
use nemaxks_billing::manual_transfer::ManualTransferConfig;
use nemaxks_billing::memory::InMemoryStore;
use nemaxks_billing::models::{BillingCycle, Plan, Subscription, SubscriptionStatus};
use nemaxks_billing::scheduler::SchedulerConfig;
use nemaxks_billing::AppState;

pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Status(&'static str),
    Unreachable,
    Rejected(u16),
    Hang,
}

/// Gateway double that dedupes by idempotency key the way the provider does:
/// the same key always yields the same external payment id.
pub struct FakeGateway {
    calls: Mutex<Vec<ChargeRequest>>,
    default_outcome: FakeOutcome,
    per_payer: Mutex<HashMap<i32, FakeOutcome>>,
    delay: Duration,
}

impl FakeGateway {
    pub fn new(default_outcome: FakeOutcome) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            default_outcome,
            per_payer: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeOutcome::Status("succeeded"))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn set_outcome(&self, payer_id: i32, outcome: FakeOutcome) {
        self.per_payer.lock().await.insert(payer_id, outcome);
    }

    pub async fn calls(&self) -> Vec<ChargeRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> &str {
        "yookassa"
    }

    async fn create_payment(&self, req: &ChargeRequest) -> Result<PaymentHandle, GatewayError> {
        self.calls.lock().await.push(req.clone());
        let outcome = self
            .per_payer
            .lock()
            .await
            .get(&req.payer_id)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match outcome {
            FakeOutcome::Status(status) => Ok(PaymentHandle {
                external_id: format!("pay-{}", req.idempotency_key),
                status: GatewayPaymentStatus::parse(status),
                confirmation_url: Some("https://yoomoney.ru/checkout/test".to_string()),
                created_at: Some(Utc::now()),
            }),
            FakeOutcome::Unreachable => Err(GatewayError::Unreachable("connection refused".into())),
            FakeOutcome::Rejected(status) => Err(GatewayError::Rejected {
                status,
                body: r#"{"type":"error","code":"invalid_request"}"#.to_string(),
            }),
            FakeOutcome::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn billing_config() -> BillingConfig {
    BillingConfig {
        scheduler: SchedulerConfig {
            enabled: true,
            interval: Duration::from_secs(3600),
            max_concurrency: 4,
            charge_timeout: Duration::from_millis(200),
            return_url: "https://example.com/billing/success".to_string(),
        },
        manual_transfer: ManualTransferConfig::default(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    }
}

pub fn build_state(store: &InMemoryStore, gateway: Arc<FakeGateway>) -> AppState {
    AppState::new(Arc::new(store.clone()), gateway, &billing_config())
}

pub async fn plan(store: &InMemoryStore, price: Decimal) -> Plan {
    store
        .add_plan("edu_pro", "Edu Pro", price, "RUB", BillingCycle::Monthly)
        .await
}

pub async fn subscription_ending(
    store: &InMemoryStore,
    org_id: i32,
    plan_id: i32,
    period_end: DateTime<Utc>,
) -> Subscription {
    store
        .add_subscription(
            org_id,
            plan_id,
            SubscriptionStatus::Active,
            period_end - chrono::Duration::days(30),
            period_end,
        )
        .await
        .expect("seed subscription")
}

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Fresh database from `TEST_DATABASE_URL`, or `None` when it is not set.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let Ok(test_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping postgres test");
        return None;
    };
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let quoted_name = quote_identifier(&db_name);
    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)"))
        .execute(&admin_pool)
        .await;
    sqlx::query(&format!("CREATE DATABASE {quoted_name}"))
        .execute(&admin_pool)
        .await
        .expect("create test db");
    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb { pool, _guard: guard })
}
