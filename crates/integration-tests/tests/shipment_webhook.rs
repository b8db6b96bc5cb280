//! Shipment webhook and change-event intake hardening.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tower::util::ServiceExt;

use coralbay_integration_tests::TestContext;
use coralbay_reactors::store::collections;

#[tokio::test]
async fn ship_notify_marks_a_known_order_shipped() {
    let ctx = TestContext::new();
    ctx.put_json(
        collections::ORDERS,
        "o-9",
        json!({ "shipmentStatus": "Preparing", "subscriptionId": "sub_9" }),
    )
    .await;
    ctx.shipping.set_detail("o-9");

    let status = ctx
        .shipment_webhook(&json!({
            "resource_type": "SHIP_NOTIFY",
            "resource_url": "http://shipping.test/shipments/123"
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = ctx
        .get_json(collections::ORDERS, "o-9")
        .await
        .expect("order present");
    assert_eq!(order["shipmentStatus"], "Shipped");
}

#[tokio::test]
async fn ship_notify_for_an_unknown_order_is_a_noop() {
    let ctx = TestContext::new();
    ctx.shipping.set_detail("o-gone");

    let status = ctx
        .shipment_webhook(&json!({
            "resource_type": "SHIP_NOTIFY",
            "resource_url": "http://shipping.test/shipments/123"
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert!(ctx.get_json(collections::ORDERS, "o-gone").await.is_none());
}

#[tokio::test]
async fn other_notification_kinds_are_acknowledged_without_a_fetch() {
    let ctx = TestContext::new();

    let status = ctx
        .shipment_webhook(&json!({
            "resource_type": "ITEM_ORDER_NOTIFY",
            "resource_url": "http://shipping.test/shipments/123"
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // No detail was configured, so a fetch would have failed with 400
}

#[tokio::test]
async fn change_events_require_the_push_secret() {
    let ctx = TestContext::new();

    let body = json!({
        "type": "created",
        "id": "u-1",
        "after": { "username": "jo" }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/events/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");

    let response = ctx
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The reaction never ran
    assert!(
        ctx.get_json(collections::USER_COUNTS, collections::COUNTS_DOC)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn events_for_unknown_collections_are_rejected() {
    let ctx = TestContext::new();

    let status = ctx
        .push_event("carts", "created", "c-1", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_events_maintain_counts_and_mirror() {
    let ctx = TestContext::new();
    let user = json!({ "username": "jo", "email": "jo@example.com", "role": "CLIENT" });

    ctx.put_json(collections::USERS, "u-1", user.clone()).await;
    ctx.push_event(collections::USERS, "created", "u-1", None, Some(user.clone()))
        .await;
    ctx.push_event(collections::USERS, "updated", "u-1", Some(user.clone()), Some(user))
        .await;

    let counts = ctx
        .get_json(collections::USER_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts");
    assert_eq!(counts, json!({ "userCounts": 1 }));

    ctx.drain_outbox().await;
    assert!(ctx.search.upserted("users", "u-1"));

    ctx.push_event(collections::USERS, "deleted", "u-1", None, None).await;
    let counts = ctx
        .get_json(collections::USER_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts");
    assert_eq!(counts, json!({ "userCounts": 0 }));

    ctx.drain_outbox().await;
    assert!(ctx.search.removed("users", "u-1"));
}
