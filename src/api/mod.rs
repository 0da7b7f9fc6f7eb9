pub mod billing;
pub mod manual_payments;
pub mod subscriptions;
pub mod webhooks;
