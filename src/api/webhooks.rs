// src/api/webhooks.rs

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::BillingError;
use crate::signature::SIGNATURE_HEADER;
use crate::AppState;

/// The body is taken as raw bytes: the signature covers the exact bytes
/// sent, so it is checked before any JSON parsing.
#[utoipa::path(
    post,
    path = "/webhook/yookassa",
    tag = "webhooks",
    request_body(content = String, description = "Raw notification body", content_type = "application/json"),
    responses(
        (status = 200, description = "Notification processed, duplicate, or ignored"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
#[post("/webhook/yookassa")]
pub async fn yookassa_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, BillingError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.webhooks.handle(&body, signature).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({"ok": true, "outcome": outcome}))),
        Err(BillingError::NotFound(what)) => {
            // unknown payment: acknowledge so the provider stops redelivering
            log::warn!("webhook for unknown {what}, ignored");
            Ok(HttpResponse::Ok().json(json!({"ok": true, "ignored": true})))
        }
        Err(e) => Err(e),
    }
}
