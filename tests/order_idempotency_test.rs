//! Order creation from both paths must produce exactly one order per payment.

mod common;

use blackbird_backend::error::ErrorCode;
use blackbird_backend::models::order::{CreateOrderRequest, OrderSource, OrderStatus, PaymentStatus};
use blackbird_backend::services::order_materializer::{order_number_for, validate_client_order};
use common::*;
use http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::atomic::Ordering;

const PAYMENT_ID: &str = "pi_3NclientOrderABCDEFGH1234";

#[tokio::test]
async fn test_webhook_creates_order_when_client_call_never_arrives() {
    let app = build_app();
    let (payment_intent_id, metadata) = checkout_scenario_cart(&app).await;

    let event = payment_event("payment_intent.succeeded", &payment_intent_id, 1113, &metadata);
    let response = send(&app.router, signed_webhook(&event)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "received": true }));

    let orders = app.orders.orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.order_number, order_number_for(&payment_intent_id));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.source, OrderSource::Webhook);
    assert_eq!(order.customer_email, "jo@example.com");
    assert_eq!(order.total, dec!(11.13));

    let items = app.orders.items_for(order.id);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Latte");
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price, dec!(5.25));

    // The late client call must not create a second order.
    let late = send(
        &app.router,
        post_json("/api/orders", &client_order_body(&payment_intent_id)),
    )
    .await;
    assert_eq!(late.status, StatusCode::OK);
    assert_eq!(late.body["duplicate"], true);
    assert_eq!(late.body["orderId"], json!(order.id));
    assert_eq!(app.orders.order_inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_order_then_webhook_is_one_order() {
    let app = build_app();
    let (payment_intent_id, metadata) = checkout_scenario_cart(&app).await;

    let created = send(
        &app.router,
        post_json("/api/orders", &client_order_body(&payment_intent_id)),
    )
    .await;
    assert_eq!(created.status, StatusCode::OK, "{}", created.body);
    assert_eq!(created.body["success"], true);
    assert!(created.body.get("duplicate").is_none());
    assert_eq!(
        created.body["orderNumber"],
        order_number_for(&payment_intent_id)
    );

    let event = payment_event("payment_intent.succeeded", &payment_intent_id, 1113, &metadata);
    let webhook = send(&app.router, signed_webhook(&event)).await;
    assert_eq!(webhook.status, StatusCode::OK);

    assert_eq!(app.orders.order_count(), 1);
    assert_eq!(app.orders.orders()[0].source, OrderSource::Client);
}

#[tokio::test]
async fn test_resubmitted_order_returns_existing() {
    let app = build_app();
    let body = client_order_body(PAYMENT_ID);

    let first = send(&app.router, post_json("/api/orders", &body)).await;
    let second = send(&app.router, post_json("/api/orders", &body)).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["duplicate"], true);
    assert_eq!(first.body["orderId"], second.body["orderId"]);
    assert_eq!(first.body["orderNumber"], "BB-EFGH1234");
    assert_eq!(app.orders.order_inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lost_insert_race_returns_winner() {
    let app = build_app();
    let body = client_order_body(PAYMENT_ID);

    let winner = send(&app.router, post_json("/api/orders", &body)).await;
    assert_eq!(winner.status, StatusCode::OK);

    // The loser's lookup runs before the winner commits.
    app.orders.stale_lookups.store(1, Ordering::SeqCst);
    let loser = send(&app.router, post_json("/api/orders", &body)).await;

    assert_eq!(loser.status, StatusCode::OK);
    assert_eq!(loser.body["duplicate"], true);
    assert_eq!(loser.body["orderId"], winner.body["orderId"]);
    assert_eq!(app.orders.order_count(), 1);
}

#[tokio::test]
async fn test_concurrent_materialization_creates_one_order() {
    let app = build_app();
    let request: CreateOrderRequest =
        serde_json::from_value(client_order_body(PAYMENT_ID)).unwrap();
    let draft = validate_client_order(&request).unwrap();

    let (a, b) = tokio::join!(
        app.materializer.materialize(draft.clone()),
        app.materializer.materialize(draft)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.order_id, b.order_id);
    assert!(a.duplicate != b.duplicate);
    assert_eq!(app.orders.order_count(), 1);
}

#[tokio::test]
async fn test_item_insert_failure_keeps_order() {
    let app = build_app();
    app.orders.fail_items.store(true, Ordering::SeqCst);

    let response = send(
        &app.router,
        post_json("/api/orders", &client_order_body(PAYMENT_ID)),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    let orders = app.orders.orders();
    assert_eq!(orders.len(), 1);
    assert!(app.orders.items_for(orders[0].id).is_empty());
}

#[tokio::test]
async fn test_client_order_validation() {
    let app = build_app();
    let cases = [
        (json!({ "paymentIntentId": "pi_short" }), "Invalid payment intent format"),
        (json!({ "paymentIntentId": "ch_3NclientOrderABCDEFGH1234" }), "Invalid payment intent format"),
        ({
            let mut body = client_order_body(PAYMENT_ID);
            body["items"] = json!([]);
            body
        }, "Order must contain items"),
        ({
            let mut body = client_order_body(PAYMENT_ID);
            body["items"] = json!((0..51).map(|_| json!({ "productName": "Latte" })).collect::<Vec<_>>());
            body
        }, "Too many items in order"),
        ({
            let mut body = client_order_body(PAYMENT_ID);
            body["total"] = json!(-1);
            body
        }, "Invalid order amounts"),
    ];

    for (body, message) in cases {
        let response = send(&app.router, post_json("/api/orders", &body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", message);
        assert_eq!(response.body["error"], message);
    }

    assert_eq!(app.orders.order_count(), 0);
}

#[tokio::test]
async fn test_order_lookup_hides_customer_details() {
    let app = build_app();
    send(
        &app.router,
        post_json("/api/orders", &client_order_body(PAYMENT_ID)),
    )
    .await;

    let response = send(&app.router, get("/api/orders/bb-efgh1234")).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["orderNumber"], "BB-EFGH1234");
    assert_eq!(response.body["customerFirstName"], "Jo");
    assert_eq!(response.body["status"], "pending");
    assert_eq!(response.body["paymentStatus"], "paid");
    assert_eq!(response.body["total"].as_f64(), Some(11.13));
    assert_eq!(response.body["items"].as_array().unwrap().len(), 1);
    assert!(!response.body.to_string().contains("example.com"));

    let missing = send(&app.router, get("/api/orders/BB-00000000")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_status_transitions_follow_fulfilment_order() {
    let app = build_app();
    let request: CreateOrderRequest =
        serde_json::from_value(client_order_body(PAYMENT_ID)).unwrap();
    let receipt = app
        .materializer
        .materialize(validate_client_order(&request).unwrap())
        .await
        .unwrap();

    let skip = app
        .materializer
        .update_status(receipt.order_id, OrderStatus::Ready)
        .await
        .unwrap_err();
    assert_eq!(skip.error_code(), ErrorCode::InvalidTransition);
    assert_eq!(skip.status_code(), 409);

    for next in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
        let order = app
            .materializer
            .update_status(receipt.order_id, next)
            .await
            .unwrap();
        assert_eq!(order.status, next);
    }

    let reopen = app
        .materializer
        .update_status(receipt.order_id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_eq!(reopen.error_code(), ErrorCode::InvalidTransition);
}
