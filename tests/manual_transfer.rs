use std::sync::Arc;

use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use nemaxks_billing::api::manual_payments::{
    confirm_payment, create_manual_payment, list_pending_payments, reject_payment,
};
use nemaxks_billing::db::BillingStore;
use nemaxks_billing::error::BillingError;
use nemaxks_billing::manual_transfer::{
    ManualPaymentRequest, ManualTransferConfig, ManualTransferService,
};
use nemaxks_billing::memory::InMemoryStore;
use nemaxks_billing::models::{PaymentStatus, PROVIDER_MANUAL_TRANSFER};

mod support;

fn service(store: &InMemoryStore) -> ManualTransferService {
    ManualTransferService::new(Arc::new(store.clone()), ManualTransferConfig::default())
}

fn request(amount: Decimal, last4: &str) -> ManualPaymentRequest {
    ManualPaymentRequest {
        org_id: 7,
        amount,
        last4_digits: last4.to_string(),
    }
}

#[tokio::test]
async fn minimum_amount_is_inclusive() {
    let store = InMemoryStore::new();
    let svc = service(&store);

    assert!(matches!(
        svc.create_manual_payment(&request(Decimal::new(9999, 2), "1234")).await,
        Err(BillingError::Validation(_))
    ));
    assert!(store.payments().await.is_empty());

    let resp = svc
        .create_manual_payment(&request(Decimal::new(10000, 2), "1234"))
        .await
        .unwrap();
    assert_eq!(resp.status, "pending_verification");
}

#[tokio::test]
async fn last4_must_be_exactly_four_digits() {
    let store = InMemoryStore::new();
    let svc = service(&store);
    let amount = Decimal::new(250, 0);

    for bad in ["123", "12345", "12a4", ""] {
        assert!(
            matches!(
                svc.create_manual_payment(&request(amount, bad)).await,
                Err(BillingError::Validation(_))
            ),
            "{bad:?} should be rejected"
        );
    }
    assert!(svc.create_manual_payment(&request(amount, "0042")).await.is_ok());
}

#[tokio::test]
async fn confirm_once_then_conflict() {
    let store = InMemoryStore::new();
    let svc = service(&store);

    let resp = svc
        .create_manual_payment(&request(Decimal::new(25000, 2), "1234"))
        .await
        .unwrap();
    assert_eq!(
        resp.message,
        "Payment of 250.00 RUB is awaiting administrator verification."
    );

    let created = store.get_payment(resp.payment_id).await.unwrap().unwrap();
    assert_eq!(created.provider, PROVIDER_MANUAL_TRANSFER);
    assert_eq!(created.org_id, Some(7));
    assert_eq!(created.payer_last4.as_deref(), Some("1234"));
    assert!(created.resolved_at.is_none());

    svc.confirm_payment(resp.payment_id, 1).await.unwrap();
    let paid = store.get_payment(resp.payment_id).await.unwrap().unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.confirmed_by, Some(1));
    assert!(paid.resolved_at.is_some());

    assert!(matches!(
        svc.confirm_payment(resp.payment_id, 2).await,
        Err(BillingError::Conflict(_))
    ));
    assert!(matches!(
        svc.reject_payment(resp.payment_id, "late").await,
        Err(BillingError::Conflict(_))
    ));
    let still = store.get_payment(resp.payment_id).await.unwrap().unwrap();
    assert_eq!(still.confirmed_by, Some(1));
    assert_eq!(still.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let svc = service(&InMemoryStore::new());
    assert!(matches!(
        svc.confirm_payment(999, 1).await,
        Err(BillingError::NotFound(_))
    ));
    assert!(matches!(
        svc.reject_payment(999, "no such transfer").await,
        Err(BillingError::NotFound(_))
    ));
}

#[tokio::test]
async fn racing_confirm_and_reject_resolve_once() {
    let store = InMemoryStore::new();
    let svc = service(&store);
    let resp = svc
        .create_manual_payment(&request(Decimal::new(500, 0), "9876"))
        .await
        .unwrap();

    let (confirmed, rejected) = tokio::join!(
        svc.confirm_payment(resp.payment_id, 1),
        svc.reject_payment(resp.payment_id, "no transfer received"),
    );
    assert_eq!(
        confirmed.is_ok() as u8 + rejected.is_ok() as u8,
        1,
        "exactly one resolution must win"
    );

    let payment = store.get_payment(resp.payment_id).await.unwrap().unwrap();
    if confirmed.is_ok() {
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(payment.rejection_reason.is_none());
    } else {
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.rejection_reason.as_deref(), Some("no transfer received"));
    }
}

#[tokio::test]
async fn pending_list_is_newest_first_and_drops_resolved() {
    let store = InMemoryStore::new();
    let svc = service(&store);
    let mut ids = Vec::new();
    for last4 in ["1111", "2222", "3333"] {
        let resp = svc
            .create_manual_payment(&request(Decimal::new(150, 0), last4))
            .await
            .unwrap();
        ids.push(resp.payment_id);
    }

    svc.reject_payment(ids[1], "duplicate").await.unwrap();

    let pending: Vec<i32> = svc
        .get_pending_payments()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(pending, vec![ids[2], ids[0]]);
}

#[actix_web::test]
async fn http_flow_create_list_confirm() {
    let store = InMemoryStore::new();
    let state = web::Data::new(support::build_state(
        &store,
        Arc::new(support::FakeGateway::succeeding()),
    ));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(create_manual_payment)
            .service(list_pending_payments)
            .service(confirm_payment)
            .service(reject_payment),
    )
    .await;

    let req = TestRequest::post()
        .uri("/payments/manual")
        .set_json(json!({"org_id": 7, "amount": "99.99", "last4_digits": "1234"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("minimum"));

    let req = TestRequest::post()
        .uri("/payments/manual")
        .set_json(json!({"org_id": 7, "amount": "250.00", "last4_digits": "1234"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "pending_verification");
    let payment_id = body["payment_id"].as_i64().unwrap();

    let req = TestRequest::get().uri("/admin/payments/pending").to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["id"].as_i64(), Some(payment_id));

    let req = TestRequest::post()
        .uri(&format!("/admin/payments/{payment_id}/confirm"))
        .set_json(json!({"admin_id": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = TestRequest::post()
        .uri(&format!("/admin/payments/{payment_id}/confirm"))
        .set_json(json!({"admin_id": 2}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    let req = TestRequest::post()
        .uri("/admin/payments/4242/reject")
        .set_json(json!({"reason": "unknown"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
