//! Aggregate counter behavior driven through the change-event surface.

use axum::http::StatusCode;
use serde_json::json;

use coralbay_integration_tests::TestContext;
use coralbay_reactors::store::collections;

fn product_body(category: &str) -> serde_json::Value {
    json!({
        "title": "Field Watch",
        "description": "36mm, sapphire crystal",
        "price": "180.00",
        "category": category,
        "inventory": 5,
        "imageUrl": "https://img.example/w.png",
        "imageRef": "images/w.png",
        "imageFileName": "w.png",
        "creator": "user-9",
        "createdAt": "2026-01-02T03:04:05Z"
    })
}

#[tokio::test]
async fn first_product_bootstraps_full_counts_document() {
    let ctx = TestContext::new();

    ctx.put_json(collections::PRODUCTS, "p-1", product_body("Shoes"))
        .await;
    let status = ctx
        .push_event(
            collections::PRODUCTS,
            "created",
            "p-1",
            None,
            Some(product_body("Shoes")),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let counts = ctx
        .get_json(collections::PRODUCT_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts document created");
    assert_eq!(
        counts,
        json!({ "All": 1, "Clothing": 0, "Shoes": 1, "Watches": 0, "Accessories": 0 })
    );
}

#[tokio::test]
async fn creates_minus_deletes_floor_at_zero() {
    let ctx = TestContext::new();

    for i in 0..3 {
        let id = format!("p-{i}");
        ctx.put_json(collections::PRODUCTS, &id, product_body("Clothing"))
            .await;
        ctx.push_event(
            collections::PRODUCTS,
            "created",
            &id,
            None,
            Some(product_body("Clothing")),
        )
        .await;
    }
    // Five deletes against three creates: replays and stale events push the
    // counter to its floor, not below it
    for i in 0..5 {
        let id = format!("p-{i}");
        ctx.push_event(
            collections::PRODUCTS,
            "deleted",
            &id,
            Some(product_body("Clothing")),
            None,
        )
        .await;
    }

    let counts = ctx
        .get_json(collections::PRODUCT_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts document");
    assert_eq!(counts["All"], 0);
    assert_eq!(counts["Clothing"], 0);
}

#[tokio::test]
async fn category_reassignment_moves_count_and_preserves_all() {
    let ctx = TestContext::new();

    for id in ["p-1", "p-2"] {
        ctx.put_json(collections::PRODUCTS, id, product_body("Shoes"))
            .await;
        ctx.push_event(
            collections::PRODUCTS,
            "created",
            id,
            None,
            Some(product_body("Shoes")),
        )
        .await;
    }

    let status = ctx
        .push_event(
            collections::PRODUCTS,
            "updated",
            "p-1",
            Some(product_body("Shoes")),
            Some(product_body("Clothing")),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let counts = ctx
        .get_json(collections::PRODUCT_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts document");
    assert_eq!(counts["All"], 2);
    assert_eq!(counts["Shoes"], 1);
    assert_eq!(counts["Clothing"], 1);
    // sum(categories) == All holds after a single-threaded reassignment
    let sum = ["Clothing", "Shoes", "Watches", "Accessories"]
        .iter()
        .map(|c| counts[*c].as_u64().expect("count"))
        .sum::<u64>();
    assert_eq!(counts["All"].as_u64(), Some(sum));
}

#[tokio::test]
async fn deletion_before_any_creation_is_skipped() {
    let ctx = TestContext::new();

    let status = ctx
        .push_event(
            collections::USERS,
            "deleted",
            "u-ghost",
            Some(json!({"username": "ghost"})),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // No counts document materializes for a decrement
    assert!(
        ctx.get_json(collections::USER_COUNTS, collections::COUNTS_DOC)
            .await
            .is_none()
    );

    ctx.push_event(
        collections::USERS,
        "created",
        "u-1",
        None,
        Some(json!({"username": "jo", "email": "jo@example.com", "role": "CLIENT"})),
    )
    .await;

    let counts = ctx
        .get_json(collections::USER_COUNTS, collections::COUNTS_DOC)
        .await
        .expect("counts document");
    assert_eq!(counts, json!({ "userCounts": 1 }));
}
