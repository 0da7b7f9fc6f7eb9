pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod gateway;
pub mod manual_transfer;
pub mod memory;
pub mod models;
pub mod scheduler;
pub mod signature;
pub mod webhook;

use std::sync::Arc;

use billing::SubscriptionService;
use config::BillingConfig;
use db::BillingStore;
use gateway::PaymentGateway;
use manual_transfer::ManualTransferService;
use scheduler::{BillingScheduler, BillingSweeper};
use signature::WebhookVerifier;
use webhook::WebhookProcessor;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub scheduler: Arc<BillingScheduler>,
    pub subscriptions: SubscriptionService,
    pub manual_transfers: ManualTransferService,
    pub webhooks: WebhookProcessor,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: &BillingConfig,
    ) -> Self {
        let sweeper = Arc::new(BillingSweeper::new(
            store.clone(),
            gateway,
            config.scheduler.clone(),
        ));

        Self {
            scheduler: Arc::new(BillingScheduler::new(sweeper, config.scheduler.interval)),
            subscriptions: SubscriptionService::new(store.clone()),
            manual_transfers: ManualTransferService::new(
                store.clone(),
                config.manual_transfer.clone(),
            ),
            webhooks: WebhookProcessor::new(
                store.clone(),
                WebhookVerifier::new(config.webhook_secret.as_bytes()),
            ),
            store,
        }
    }
}
