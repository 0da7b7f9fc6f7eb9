// src/api/subscriptions.rs

use actix_web::{get, post, web, HttpResponse};

use crate::error::BillingError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "Subscription id")),
    responses(
        (status = 200, description = "Subscription"),
        (status = 404, description = "Unknown subscription")
    )
)]
#[get("/subscriptions/{id}")]
pub async fn get_subscription(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, BillingError> {
    let sub = state.subscriptions.get_subscription(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(sub))
}

#[utoipa::path(
    post,
    path = "/subscriptions/{id}/cancel",
    tag = "subscriptions",
    params(("id" = i32, Path, description = "Subscription id")),
    responses(
        (status = 200, description = "Subscription canceled"),
        (status = 404, description = "Unknown subscription"),
        (status = 409, description = "Status changed concurrently")
    )
)]
#[post("/subscriptions/{id}/cancel")]
pub async fn cancel_subscription(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, BillingError> {
    let sub = state.subscriptions.cancel_subscription(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(sub))
}
