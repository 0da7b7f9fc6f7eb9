// src/api/manual_payments.rs

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::BillingError;
use crate::manual_transfer::ManualPaymentRequest;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub admin_id: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectPaymentRequest {
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/payments/manual",
    tag = "manual_payments",
    request_body = ManualPaymentRequest,
    responses(
        (status = 200, description = "Payment awaiting verification", body = crate::manual_transfer::ManualPaymentResponse),
        (status = 400, description = "Amount below minimum or malformed last4_digits")
    )
)]
#[post("/payments/manual")]
pub async fn create_manual_payment(
    state: web::Data<AppState>,
    payload: web::Json<ManualPaymentRequest>,
) -> Result<HttpResponse, BillingError> {
    let resp = state
        .manual_transfers
        .create_manual_payment(&payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(resp))
}

#[utoipa::path(
    get,
    path = "/admin/payments/pending",
    tag = "manual_payments",
    responses((status = 200, description = "Payments awaiting verification, newest first"))
)]
#[get("/admin/payments/pending")]
pub async fn list_pending_payments(
    state: web::Data<AppState>,
) -> Result<HttpResponse, BillingError> {
    let payments = state.manual_transfers.get_pending_payments().await?;
    Ok(HttpResponse::Ok().json(payments))
}

#[utoipa::path(
    post,
    path = "/admin/payments/{id}/confirm",
    tag = "manual_payments",
    params(("id" = i32, Path, description = "Payment id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment marked paid"),
        (status = 404, description = "Unknown payment"),
        (status = 409, description = "Payment already processed")
    )
)]
#[post("/admin/payments/{id}/confirm")]
pub async fn confirm_payment(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    payload: web::Json<ConfirmPaymentRequest>,
) -> Result<HttpResponse, BillingError> {
    let payment_id = path.into_inner();
    state
        .manual_transfers
        .confirm_payment(payment_id, payload.admin_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"payment_id": payment_id, "status": "paid"})))
}

#[utoipa::path(
    post,
    path = "/admin/payments/{id}/reject",
    tag = "manual_payments",
    params(("id" = i32, Path, description = "Payment id")),
    request_body = RejectPaymentRequest,
    responses(
        (status = 200, description = "Payment marked failed"),
        (status = 404, description = "Unknown payment"),
        (status = 409, description = "Payment already processed")
    )
)]
#[post("/admin/payments/{id}/reject")]
pub async fn reject_payment(
    state: web::Data<AppState>,
    path: web::Path<i32>,
    payload: web::Json<RejectPaymentRequest>,
) -> Result<HttpResponse, BillingError> {
    let payment_id = path.into_inner();
    state
        .manual_transfers
        .reject_payment(payment_id, &payload.reason)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"payment_id": payment_id, "status": "failed"})))
}
