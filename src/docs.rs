use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::webhooks::yookassa_webhook,
        crate::api::manual_payments::create_manual_payment,
        crate::api::manual_payments::list_pending_payments,
        crate::api::manual_payments::confirm_payment,
        crate::api::manual_payments::reject_payment,
        crate::api::subscriptions::get_subscription,
        crate::api::subscriptions::cancel_subscription,
        crate::api::billing::run_sweep
    ),
    components(
        schemas(
            crate::manual_transfer::ManualPaymentRequest,
            crate::manual_transfer::ManualPaymentResponse,
            crate::api::manual_payments::ConfirmPaymentRequest,
            crate::api::manual_payments::RejectPaymentRequest
        )
    ),
    tags(
        (name = "webhooks", description = "Payment provider notifications"),
        (name = "manual_payments", description = "Bank transfer verification"),
        (name = "subscriptions", description = "Subscription lifecycle"),
        (name = "billing", description = "Renewal sweep")
    )
)]
pub struct ApiDoc;
