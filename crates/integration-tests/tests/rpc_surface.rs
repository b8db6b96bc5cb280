//! Callable RPC surface: authentication, signup, role management,
//! payment passthroughs.

use axum::http::StatusCode;
use serde_json::json;

use coralbay_core::{Role, UserId};
use coralbay_integration_tests::{SUPER_ADMIN_EMAIL, TestContext};
use coralbay_reactors::store::collections;

#[tokio::test]
async fn rpcs_require_an_identity() {
    let ctx = TestContext::new();

    for name in [
        "onSignup",
        "updateUserRole",
        "createPaymentIntents",
        "createStripeCustomer",
        "setDefaultCard",
        "listPaymentMethods",
        "detachPaymentMethod",
        "createSubscription",
        "cancelSubscription",
        "pauseSubscription",
    ] {
        let (status, _) = ctx.rpc(name, None, json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "rpc {name}");
    }
}

#[tokio::test]
async fn signup_writes_claim_and_user_document() {
    let ctx = TestContext::new();
    let token = ctx.token("u-1", "jo@example.com", None);

    let (status, body) = ctx
        .rpc("onSignup", Some(&token), json!({ "username": "jo" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let user = ctx
        .get_json(collections::USERS, "u-1")
        .await
        .expect("user document");
    assert_eq!(user["username"], "jo");
    assert_eq!(user["email"], "jo@example.com");
    assert_eq!(user["role"], "CLIENT");

    let claims = ctx.identity.claims.lock().expect("mutex");
    assert_eq!(
        claims.get(&UserId::new("u-1")).copied(),
        Some(Role::Client)
    );
}

#[tokio::test]
async fn signup_with_the_super_admin_email_grants_super_admin() {
    let ctx = TestContext::new();
    let token = ctx.token("u-root", SUPER_ADMIN_EMAIL, None);

    ctx.rpc("onSignup", Some(&token), json!({ "username": "root" }))
        .await;

    let user = ctx
        .get_json(collections::USERS, "u-root")
        .await
        .expect("user document");
    assert_eq!(user["role"], "SUPER_ADMIN");
}

#[tokio::test]
async fn role_updates_require_a_current_super_admin() {
    let ctx = TestContext::new();
    ctx.put_json(
        collections::USERS,
        "u-2",
        json!({ "username": "mel", "email": "mel@example.com", "role": "CLIENT" }),
    )
    .await;

    // Caller whose provider-side role is only CLIENT: denied, even though
    // the token claims more
    ctx.identity.grant("u-sneak", Role::Client);
    let sneak = ctx.token("u-sneak", "sneak@example.com", Some(Role::SuperAdmin));
    let (status, _) = ctx
        .rpc(
            "updateUserRole",
            Some(&sneak),
            json!({ "userId": "u-2", "newRole": "ADMIN" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A real SUPER_ADMIN succeeds
    ctx.identity.grant("u-root", Role::SuperAdmin);
    let root = ctx.token("u-root", SUPER_ADMIN_EMAIL, Some(Role::SuperAdmin));
    let (status, _) = ctx
        .rpc(
            "updateUserRole",
            Some(&root),
            json!({ "userId": "u-2", "newRole": "ADMIN" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let user = ctx
        .get_json(collections::USERS, "u-2")
        .await
        .expect("user document");
    assert_eq!(user["role"], "ADMIN");

    let claims = ctx.identity.claims.lock().expect("mutex");
    assert_eq!(
        claims.get(&UserId::new("u-2")).copied(),
        Some(Role::Admin)
    );
}

#[tokio::test]
async fn payment_intents_return_a_client_secret() {
    let ctx = TestContext::new();
    let token = ctx.token("u-1", "jo@example.com", Some(Role::Client));

    let (status, body) = ctx
        .rpc(
            "createPaymentIntents",
            Some(&token),
            json!({ "amount": "24.99" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["clientSecret"]
            .as_str()
            .is_some_and(|secret| secret.ends_with("_secret"))
    );
}

#[tokio::test]
async fn creating_a_customer_records_it_on_the_user() {
    let ctx = TestContext::new();
    ctx.put_json(
        collections::USERS,
        "u-1",
        json!({ "username": "jo", "email": "jo@example.com", "role": "CLIENT" }),
    )
    .await;
    let token = ctx.token("u-1", "jo@example.com", Some(Role::Client));

    let (status, body) = ctx
        .rpc("createStripeCustomer", Some(&token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let customer_id = body["customerId"].as_str().expect("customer id").to_owned();

    let user = ctx
        .get_json(collections::USERS, "u-1")
        .await
        .expect("user document");
    assert_eq!(user["stripeCustomerId"], customer_id.as_str());
}

#[tokio::test]
async fn subscription_lifecycle_rpcs_pass_through() {
    let ctx = TestContext::new();
    let token = ctx.token("u-1", "jo@example.com", Some(Role::Client));

    let (status, body) = ctx
        .rpc(
            "createSubscription",
            Some(&token),
            json!({
                "stripeId": "cus_1",
                "priceId": "price_month_1",
                "couponId": null,
                "quantity": 2
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let subscription_id = body["subscriptionId"].as_str().expect("id").to_owned();
    assert!(body["clientSecret"].is_string());

    let (status, body) = ctx
        .rpc(
            "pauseSubscription",
            Some(&token),
            json!({ "subscriptionId": subscription_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["subscription"].is_object());

    let (status, body) = ctx
        .rpc(
            "cancelSubscription",
            Some(&token),
            json!({ "subscriptionId": subscription_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["status"], "canceled");
}
