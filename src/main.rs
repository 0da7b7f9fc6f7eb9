// src/main.rs
use std::io;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use nemaxks_billing::config::Config;
use nemaxks_billing::db::PgStore;
use nemaxks_billing::gateway::YooKassaClient;
use nemaxks_billing::{api, docs, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Billing service ready!")
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        log::error!("configuration error: {e}");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let pool = PgPool::connect(&config.database_url)
        .await
        .map_err(io::Error::other)?;

    sqlx::migrate!().run(&pool).await.map_err(io::Error::other)?;

    let gateway = YooKassaClient::new(&config.gateway).map_err(io::Error::other)?;
    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(gateway),
        &config.billing,
    );

    if config.billing.scheduler.enabled {
        state.scheduler.start().await;
    } else {
        log::warn!("billing scheduler disabled by DISABLE_BILLING_SCHEDULER");
    }

    let scheduler = state.scheduler.clone();
    let data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Provider notifications (public, signature-checked)
            .service(api::webhooks::yookassa_webhook)
            .service(api::manual_payments::create_manual_payment)
            .service(api::subscriptions::get_subscription)
            .service(api::subscriptions::cancel_subscription)
            // Administrator actions
            .service(api::manual_payments::list_pending_payments)
            .service(api::manual_payments::confirm_payment)
            .service(api::manual_payments::reject_payment)
            .service(api::billing::run_sweep)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    scheduler.stop().await;
    Ok(())
}
