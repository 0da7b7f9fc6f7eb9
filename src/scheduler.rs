// src/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::BillingStore;
use crate::error::{BillingError, GatewayError};
use crate::gateway::{
    renewal_idempotency_key, ChargeRequest, GatewayPaymentStatus, PaymentGateway,
};
use crate::models::{
    BillingCycle, NewPayment, PaymentStatus, PeriodAdvance, Subscription, SubscriptionStatus,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Upper bound on gateway calls in flight during one sweep.
    pub max_concurrency: usize,
    pub charge_timeout: Duration,
    pub return_url: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(24 * 60 * 60),
            max_concurrency: 8,
            charge_timeout: Duration::from_secs(30),
            return_url: "https://example.com/billing/success".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub due: usize,
    pub renewed: usize,
    /// Another sweep moved the period first.
    pub already_renewed: usize,
    /// Provider accepted the charge but the subscription left `active`
    /// before the period could move. The payment is stored, the period is not.
    pub charged_not_renewed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    Renewed { payment_id: i32 },
    AlreadyRenewed,
    ChargedNotRenewed { payment_id: i32 },
}

/// Charges lapsed subscriptions and moves their billing periods.
pub struct BillingSweeper {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: SchedulerConfig,
}

impl BillingSweeper {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// One pass over all active subscriptions. A failure for one
    /// subscription is logged and counted, never propagated.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, BillingError> {
        log::info!("billing sweep started at={now}");

        let subs = self.store.list_active_subscriptions().await?;
        let mut report = SweepReport {
            scanned: subs.len(),
            ..SweepReport::default()
        };

        let due: Vec<Subscription> = subs.into_iter().filter(|s| s.is_due(now)).collect();
        report.due = due.len();

        let results: Vec<(i32, Result<RenewalOutcome, BillingError>)> = stream::iter(due)
            .map(|sub| async move {
                let id = sub.id;
                (id, self.renew(&sub).await)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for (subscription_id, result) in results {
            match result {
                Ok(RenewalOutcome::Renewed { .. }) => report.renewed += 1,
                Ok(RenewalOutcome::AlreadyRenewed) => report.already_renewed += 1,
                Ok(RenewalOutcome::ChargedNotRenewed { .. }) => report.charged_not_renewed += 1,
                Err(e) => {
                    report.failed += 1;
                    log::error!("renewal failed subscription_id={subscription_id} error={e}");
                }
            }
        }

        log::info!(
            "billing sweep finished scanned={} due={} renewed={} already_renewed={} charged_not_renewed={} failed={}",
            report.scanned,
            report.due,
            report.renewed,
            report.already_renewed,
            report.charged_not_renewed,
            report.failed
        );
        Ok(report)
    }

    /// Charges one lapsed subscription and, if the provider accepted the
    /// charge, moves its period forward by one billing cycle.
    pub async fn renew(&self, sub: &Subscription) -> Result<RenewalOutcome, BillingError> {
        let plan = self
            .store
            .get_plan(sub.plan_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("plan id={}", sub.plan_id)))?;

        let new_period_end = plan
            .billing_cycle
            .advance(sub.current_period_end)
            .ok_or_else(|| {
                BillingError::Validation(format!(
                    "period end overflow subscription_id={}",
                    sub.id
                ))
            })?;

        let idempotency_key = renewal_idempotency_key(sub.id, plan.id, sub.current_period_end);
        let charge = ChargeRequest {
            payer_id: sub.org_id,
            plan_id: plan.id,
            subscription_id: Some(sub.id),
            amount: plan.price,
            currency: plan.currency.clone(),
            description: format!(
                "{} subscription renewal - {}",
                cycle_label(&plan.billing_cycle),
                plan.name
            ),
            return_url: self.config.return_url.clone(),
            idempotency_key: idempotency_key.clone(),
        };

        let handle = tokio::time::timeout(
            self.config.charge_timeout,
            self.gateway.create_payment(&charge),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.config.charge_timeout))??;

        let mut payment = NewPayment {
            org_id: Some(sub.org_id),
            user_id: None,
            subscription_id: Some(sub.id),
            plan_id: Some(plan.id),
            amount: plan.price,
            currency: plan.currency.clone(),
            provider: self.gateway.provider().to_string(),
            status: PaymentStatus::Pending,
            external_id: Some(handle.external_id.clone()),
            idempotency_key: Some(idempotency_key),
            payer_last4: None,
        };

        if !handle.status.is_accepted() {
            payment.status = PaymentStatus::Failed;
            self.store.insert_payment(&payment).await?;
            return Err(BillingError::ChargeDeclined {
                external_id: handle.external_id,
                status: handle.status.as_str().to_string(),
            });
        }

        if handle.status == GatewayPaymentStatus::Succeeded {
            payment.status = PaymentStatus::Paid;
        }

        let advance = PeriodAdvance {
            subscription_id: sub.id,
            expected_period_end: sub.current_period_end,
            new_period_start: sub.current_period_end,
            new_period_end,
        };

        match self.store.renew_subscription(&advance, &payment).await? {
            Some(stored) => {
                log::info!(
                    "renewal charged subscription_id={} payment_id={} external_id={} status={} period_end={}",
                    sub.id,
                    stored.id,
                    handle.external_id,
                    stored.status,
                    new_period_end
                );
                Ok(RenewalOutcome::Renewed {
                    payment_id: stored.id,
                })
            }
            None => self.settle_unapplied_charge(sub, payment).await,
        }
    }

    /// The period advance lost its condition after the provider took the
    /// charge. Either a concurrent sweep already renewed (and stored this
    /// same external id), or the subscription left `active` mid-flight and
    /// the charge still has to be recorded.
    async fn settle_unapplied_charge(
        &self,
        sub: &Subscription,
        mut payment: NewPayment,
    ) -> Result<RenewalOutcome, BillingError> {
        let external_id = payment.external_id.clone().unwrap_or_default();

        if let Some(existing) = self
            .store
            .find_payment_by_external_id(&payment.provider, &external_id)
            .await?
        {
            log::warn!(
                "renewal skipped, period already moved subscription_id={} payment_id={} external_id={}",
                sub.id,
                existing.id,
                external_id
            );
            return Ok(RenewalOutcome::AlreadyRenewed);
        }

        let current = self.store.get_subscription(sub.id).await?;
        if let Some(current) = &current {
            if current.status == SubscriptionStatus::Active
                && current.current_period_end != sub.current_period_end
            {
                log::warn!(
                    "renewal skipped, period already moved subscription_id={} external_id={}",
                    sub.id,
                    external_id
                );
                return Ok(RenewalOutcome::AlreadyRenewed);
            }
        } else {
            payment.subscription_id = None;
        }

        let stored = self.store.insert_payment(&payment).await?;
        log::error!(
            "charge accepted but subscription not renewed subscription_id={} status={} payment_id={} external_id={} payment_status={}",
            sub.id,
            current.map_or("missing".to_string(), |s| s.status.to_string()),
            stored.id,
            external_id,
            stored.status
        );
        Ok(RenewalOutcome::ChargedNotRenewed {
            payment_id: stored.id,
        })
    }
}

fn cycle_label(cycle: &BillingCycle) -> &'static str {
    match cycle {
        BillingCycle::Monthly => "Monthly",
        BillingCycle::Quarterly => "Quarterly",
        BillingCycle::Yearly => "Yearly",
    }
}

struct RunningTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic driver for [`BillingSweeper`]. Owned by whoever composes the
/// service; holds at most one background task.
pub struct BillingScheduler {
    sweeper: Arc<BillingSweeper>,
    interval: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl BillingScheduler {
    pub fn new(sweeper: Arc<BillingSweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn sweeper(&self) -> &Arc<BillingSweeper> {
        &self.sweeper
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Starts the periodic task. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            log::debug!("billing scheduler already running");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweeper = self.sweeper.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // the sweep is not raced against shutdown: an
                        // in-flight pass always completes
                        if let Err(e) = sweeper.run_sweep(Utc::now()).await {
                            log::error!("billing sweep aborted: {e}");
                        }
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("billing scheduler loop exited");
        });

        *task = Some(RunningTask {
            shutdown_tx,
            handle,
        });
        log::info!("billing scheduler started interval={:?}", period);
        true
    }

    /// Stops future sweeps and waits for an in-flight one to finish.
    /// Returns `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.task.lock().await.take() else {
            return false;
        };
        if running.handle.is_finished() {
            return false;
        }

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            log::error!("billing scheduler task failed: {e}");
        }
        log::info!("billing scheduler stopped");
        true
    }
}
