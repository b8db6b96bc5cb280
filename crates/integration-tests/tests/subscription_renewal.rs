//! Subscription renewal: the payment-succeeded webhook rolls the live
//! order forward and chains a successor.

use axum::http::StatusCode;
use serde_json::{Value, json};

use coralbay_integration_tests::{TestContext, WEBHOOK_SECRET};
use coralbay_reactors::store::DocumentStore;
use coralbay_reactors::store::collections;

fn subscription_order(subscription_id: &str, shipment_status: &str) -> Value {
    json!({
        "items": [{
            "id": "cart-1",
            "product": "p-1",
            "quantity": 1,
            "user": "user-1",
            "item": {
                "id": "p-1",
                "title": "Field Watch",
                "price": "19.99",
                "imageUrl": "https://img.example/w.png"
            }
        }],
        "amount": "19.99",
        "totalQuantity": 1,
        "shippingAddress": {
            "fullname": "Jo Doe",
            "address1": "1 Pier Rd",
            "city": "Portside",
            "zipCode": "04101",
            "phone": "555-0100"
        },
        "user": { "id": "user-1", "name": "Jo Doe", "email": "jo@example.com" },
        "paymentStatus": "Processing",
        "paymentType": "SUBSCRIPTION",
        "subscriptionId": subscription_id,
        "shipmentStatus": shipment_status
    })
}

fn payment_succeeded(subscription_id: &str, intent_id: &str) -> Value {
    json!({
        "type": "invoice.payment_succeeded",
        "data": { "object": {
            "subscription": subscription_id,
            "payment_intent": intent_id
        }}
    })
}

#[tokio::test]
async fn renewal_updates_live_order_and_creates_successor() {
    let ctx = TestContext::new();
    ctx.payments.seed_intent("pi_1", Some("pm_1"), 2499);
    ctx.put_json(
        collections::ORDERS,
        "o-sub",
        subscription_order("sub_1", "New"),
    )
    .await;

    let status = ctx.payment_webhook(&payment_succeeded("sub_1", "pi_1")).await;
    assert_eq!(status, StatusCode::OK);

    // The remote subscription got its default payment method
    let updated = ctx.payments.updated_subscriptions.lock().expect("mutex");
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0.as_str(), "sub_1");
    assert_eq!(updated[0].1.as_str(), "pm_1");
    drop(updated);

    // (a) the live order is marked paid and preparing, with the actually
    // charged amount and the period start
    let renewed = ctx
        .get_json(collections::ORDERS, "o-sub")
        .await
        .expect("order present");
    assert_eq!(renewed["paymentStatus"], "Success");
    assert_eq!(renewed["shipmentStatus"], "Preparing");
    assert_eq!(renewed["amount"], "24.99");
    assert_eq!(renewed["subscriptionStartDate"], 1_700_000_000_i64);

    // (b) exactly one successor order waits in New/Processing with the
    // next period's anchor and the original estimate
    let matching = ctx
        .store
        .find_by_field(collections::ORDERS, "subscriptionId", "sub_1")
        .await
        .expect("query");
    let successors: Vec<_> = matching.iter().filter(|doc| doc.id != "o-sub").collect();
    assert_eq!(successors.len(), 1);

    let successor = &successors[0].body;
    assert_eq!(successor["paymentStatus"], "Processing");
    assert_eq!(successor["shipmentStatus"], "New");
    assert_eq!(successor["subscriptionId"], "sub_1");
    assert_eq!(successor["amount"], "19.99");
    assert_eq!(successor["subscriptionStartDate"], 1_702_592_000_i64);
}

#[tokio::test]
async fn already_fulfilled_orders_are_left_alone() {
    let ctx = TestContext::new();
    ctx.payments.seed_intent("pi_1", Some("pm_1"), 2499);
    ctx.put_json(
        collections::ORDERS,
        "o-done",
        subscription_order("sub_1", "Shipped"),
    )
    .await;

    let status = ctx.payment_webhook(&payment_succeeded("sub_1", "pi_1")).await;
    assert_eq!(status, StatusCode::OK);

    // No status flip, no successor
    let order = ctx
        .get_json(collections::ORDERS, "o-done")
        .await
        .expect("order present");
    assert_eq!(order["shipmentStatus"], "Shipped");

    let matching = ctx
        .store
        .find_by_field(collections::ORDERS, "subscriptionId", "sub_1")
        .await
        .expect("query");
    assert_eq!(matching.len(), 1);
}

#[tokio::test]
async fn invalid_signature_mutates_nothing() {
    let ctx = TestContext::new();
    ctx.payments.seed_intent("pi_1", Some("pm_1"), 2499);
    ctx.put_json(
        collections::ORDERS,
        "o-sub",
        subscription_order("sub_1", "New"),
    )
    .await;

    let payload = payment_succeeded("sub_1", "pi_1").to_string().into_bytes();

    // Missing header
    let status = ctx.payment_webhook_raw(payload.clone(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Signature computed over a different body
    let foreign = coralbay_reactors::payments::webhook::sign(
        b"something else entirely",
        &secrecy::SecretString::from(WEBHOOK_SECRET),
        chrono::Utc::now().timestamp(),
    );
    let status = ctx.payment_webhook_raw(payload, Some(&foreign)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing moved
    let order = ctx
        .get_json(collections::ORDERS, "o-sub")
        .await
        .expect("order present");
    assert_eq!(order["paymentStatus"], "Processing");
    assert_eq!(order["shipmentStatus"], "New");
    assert!(
        ctx.payments
            .updated_subscriptions
            .lock()
            .expect("mutex")
            .is_empty()
    );
}

#[tokio::test]
async fn intent_without_payment_method_fails_before_any_write() {
    let ctx = TestContext::new();
    ctx.payments.seed_intent("pi_1", None, 2499);
    ctx.put_json(
        collections::ORDERS,
        "o-sub",
        subscription_order("sub_1", "New"),
    )
    .await;

    let status = ctx.payment_webhook(&payment_succeeded("sub_1", "pi_1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = ctx
        .get_json(collections::ORDERS, "o-sub")
        .await
        .expect("order present");
    assert_eq!(order["paymentStatus"], "Processing");
    assert!(
        ctx.payments
            .updated_subscriptions
            .lock()
            .expect("mutex")
            .is_empty()
    );
}

#[tokio::test]
async fn unrelated_event_types_are_acknowledged_and_ignored() {
    let ctx = TestContext::new();

    let status = ctx
        .payment_webhook(&json!({
            "type": "invoice.created",
            "data": { "object": {} }
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
}
