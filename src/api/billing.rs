// src/api/billing.rs

use actix_web::{post, web, HttpResponse};
use chrono::Utc;

use crate::error::BillingError;
use crate::AppState;

/// Runs one billing sweep now, independent of the periodic schedule.
#[utoipa::path(
    post,
    path = "/admin/billing/sweep",
    tag = "billing",
    responses(
        (status = 200, description = "Sweep report"),
        (status = 500, description = "Active subscriptions could not be read")
    )
)]
#[post("/admin/billing/sweep")]
pub async fn run_sweep(state: web::Data<AppState>) -> Result<HttpResponse, BillingError> {
    let report = state.scheduler.sweeper().run_sweep(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(report))
}
