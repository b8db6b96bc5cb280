//! Product provisioning saga: remote product + per-interval prices,
//! pending marker, idempotent reconciliation.

use axum::http::StatusCode;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

use coralbay_core::BillingInterval;
use coralbay_integration_tests::TestContext;
use coralbay_reactors::reactors::products;
use coralbay_reactors::store::collections;

fn product_body() -> Value {
    json!({
        "title": "Canvas Sneaker",
        "description": "Low top",
        "price": "59.99",
        "category": "Shoes",
        "inventory": 10,
        "imageUrl": "https://img.example/p1.png",
        "imageRef": "images/p1.png",
        "imageFileName": "p1.png",
        "creator": "user-9",
        "createdAt": "2026-01-02T03:04:05Z"
    })
}

#[tokio::test]
async fn creation_provisions_one_price_per_interval() {
    let ctx = TestContext::new();
    ctx.put_json(collections::PRODUCTS, "p-1", product_body())
        .await;

    let status = ctx
        .push_event(
            collections::PRODUCTS,
            "created",
            "p-1",
            None,
            Some(product_body()),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // One remote product, one recurring price per interval at price * 100
    assert_eq!(
        *ctx.payments.created_products.lock().expect("mutex"),
        vec!["Canvas Sneaker".to_owned()]
    );
    let prices = ctx.payments.created_prices.lock().expect("mutex").clone();
    assert_eq!(prices.len(), BillingInterval::ALL.len());
    assert!(prices.iter().all(|(amount, _)| *amount == 5999));

    // Every interval's price id landed on the document and the saga closed
    let product = ctx
        .get_json(collections::PRODUCTS, "p-1")
        .await
        .expect("product present");
    for interval in BillingInterval::ALL {
        assert!(
            product["subscription"][interval.as_str()].is_string(),
            "missing price for {interval}"
        );
    }
    assert_eq!(product["provisioning"], "complete");
    assert!(product["remoteProductId"].is_string());

    ctx.drain_outbox().await;
    assert!(ctx.search.upserted("products", "p-1"));
}

#[tokio::test]
async fn failed_provisioning_stays_pending_and_reconciles_later() {
    let ctx = TestContext::new();
    ctx.put_json(collections::PRODUCTS, "p-1", product_body())
        .await;

    // Price backend down: the reaction fails after counting and mirroring
    ctx.payments.fail_prices.store(true, Ordering::SeqCst);
    let status = ctx
        .push_event(
            collections::PRODUCTS,
            "created",
            "p-1",
            None,
            Some(product_body()),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let product = ctx
        .get_json(collections::PRODUCTS, "p-1")
        .await
        .expect("product present");
    assert_ne!(product["provisioning"], "complete");
    // The remote product was created and recorded before the failure
    assert!(product["remoteProductId"].is_string());

    // Gateway recovers; reconciliation completes the saga without creating
    // a duplicate remote product
    ctx.payments.fail_prices.store(false, Ordering::SeqCst);
    let completed = products::reconcile(&ctx.state).await.expect("reconcile");
    assert_eq!(completed, 1);

    let product = ctx
        .get_json(collections::PRODUCTS, "p-1")
        .await
        .expect("product present");
    assert_eq!(product["provisioning"], "complete");
    for interval in BillingInterval::ALL {
        assert!(product["subscription"][interval.as_str()].is_string());
    }
    assert_eq!(ctx.payments.created_products.lock().expect("mutex").len(), 1);
    assert_eq!(
        ctx.payments.created_prices.lock().expect("mutex").len(),
        BillingInterval::ALL.len()
    );
}

#[tokio::test]
async fn reconcile_ignores_completed_products() {
    let ctx = TestContext::new();
    ctx.put_json(collections::PRODUCTS, "p-1", product_body())
        .await;
    ctx.push_event(
        collections::PRODUCTS,
        "created",
        "p-1",
        None,
        Some(product_body()),
    )
    .await;

    let before = ctx.payments.created_prices.lock().expect("mutex").len();
    let completed = products::reconcile(&ctx.state).await.expect("reconcile");
    assert_eq!(completed, 0);
    assert_eq!(
        ctx.payments.created_prices.lock().expect("mutex").len(),
        before
    );
}
