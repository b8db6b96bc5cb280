//! Callable RPC surface.
//!
//! Caller-authenticated operations invoked directly by the UI. Every
//! endpoint requires a valid identity token (the [`Identity`] extractor
//! rejects anything else); `updateUserRole` additionally re-fetches the
//! caller's role from the identity provider rather than trusting the
//! token's claim. Errors propagate to the caller verbatim, unlike the
//! reaction surfaces.
//!
//! Paths keep the callable names the UI already uses.

use axum::extract::State;
use axum::{Json, Router, routing::post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use coralbay_core::{
    CouponId, CustomerId, PaymentMethodId, PriceId, Role, SubscriptionId, User, UserId,
    to_minor_units,
};

use crate::error::{AppError, Result};
use crate::identity::Identity;
use crate::state::AppState;
use crate::store::collections;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/onSignup", post(on_signup))
        .route("/updateUserRole", post(update_user_role))
        .route("/createPaymentIntents", post(create_payment_intents))
        .route("/createStripeCustomer", post(create_stripe_customer))
        .route("/setDefaultCard", post(set_default_card))
        .route("/listPaymentMethods", post(list_payment_methods))
        .route("/detachPaymentMethod", post(detach_payment_method))
        .route("/createSubscription", post(create_subscription))
        .route("/cancelSubscription", post(cancel_subscription))
        .route("/pauseSubscription", post(pause_subscription))
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    username: String,
}

/// Finish a signup: write the role claim onto the auth user, then create
/// the user document. The two writes are not atomic - a failure between
/// them leaves a claimed identity with no document, which the next signup
/// attempt overwrites.
#[instrument(skip(state, identity), fields(uid = %identity.uid))]
async fn on_signup(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<SignupRequest>,
) -> Result<Json<Value>> {
    let role = if identity.email == state.config().super_admin_email {
        Role::SuperAdmin
    } else {
        Role::Client
    };

    state
        .identity()
        .set_role_claim(&identity.uid, role)
        .await?;

    let user = User {
        username: request.username,
        email: identity.email.clone(),
        role,
        stripe_customer_id: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    state
        .store()
        .put(
            collections::USERS,
            identity.uid.as_str(),
            serde_json::to_value(&user).map_err(|e| AppError::BadRequest(e.to_string()))?,
        )
        .await?;

    Ok(Json(json!({ "message": "User has been created." })))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRoleRequest {
    #[serde(rename = "userId")]
    user_id: UserId,
    #[serde(rename = "newRole")]
    new_role: Role,
}

/// Change another user's role. Caller must currently hold SUPER_ADMIN
/// according to the identity provider, not just the token.
#[instrument(skip(state, identity), fields(caller = %identity.uid, target = %request.user_id))]
async fn update_user_role(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<UpdateUserRoleRequest>,
) -> Result<Json<Value>> {
    let caller_role = state.identity().fetch_role(&identity.uid).await?;
    if caller_role != Some(Role::SuperAdmin) {
        return Err(AppError::AuthorizationDenied);
    }

    state
        .identity()
        .set_role_claim(&request.user_id, request.new_role)
        .await?;

    state
        .store()
        .merge(
            collections::USERS,
            request.user_id.as_str(),
            json!({
                "role": request.new_role,
                "updatedAt": Utc::now(),
            }),
        )
        .await?;

    Ok(Json(json!({ "message": "Role updated." })))
}

#[derive(Debug, Deserialize)]
struct CreatePaymentIntentsRequest {
    amount: Decimal,
    customer: Option<CustomerId>,
    payment_method: Option<PaymentMethodId>,
}

/// Create a one-off payment intent and hand its client secret to the UI.
#[instrument(skip(state, _identity, request))]
async fn create_payment_intents(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<CreatePaymentIntentsRequest>,
) -> Result<Json<Value>> {
    let amount = to_minor_units(request.amount)
        .ok_or_else(|| AppError::BadRequest("amount out of range".to_owned()))?;

    let intent = state
        .payments()
        .create_payment_intent(
            amount,
            request.customer.as_ref(),
            request.payment_method.as_ref(),
        )
        .await?;

    Ok(Json(json!({ "clientSecret": intent.client_secret })))
}

/// Create a gateway customer for the caller and record it on their user
/// document.
#[instrument(skip(state, identity), fields(uid = %identity.uid))]
async fn create_stripe_customer(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Value>> {
    let customer = state.payments().create_customer(&identity.email).await?;

    state
        .store()
        .merge(
            collections::USERS,
            identity.uid.as_str(),
            json!({ "stripeCustomerId": customer }),
        )
        .await?;

    Ok(Json(json!({ "customerId": customer })))
}

#[derive(Debug, Deserialize)]
struct SetDefaultCardRequest {
    #[serde(rename = "customerId")]
    customer_id: CustomerId,
    payment_method: PaymentMethodId,
}

#[instrument(skip(state, _identity, request))]
async fn set_default_card(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<SetDefaultCardRequest>,
) -> Result<Json<Value>> {
    let customer = state
        .payments()
        .set_default_card(&request.customer_id, &request.payment_method)
        .await?;
    Ok(Json(customer))
}

#[derive(Debug, Deserialize)]
struct ListPaymentMethodsRequest {
    #[serde(rename = "customerId")]
    customer_id: CustomerId,
}

#[instrument(skip(state, _identity, request))]
async fn list_payment_methods(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<ListPaymentMethodsRequest>,
) -> Result<Json<Value>> {
    let methods = state
        .payments()
        .list_payment_methods(&request.customer_id)
        .await?;
    Ok(Json(methods))
}

#[derive(Debug, Deserialize)]
struct DetachPaymentMethodRequest {
    payment_method: PaymentMethodId,
}

#[instrument(skip(state, _identity, request))]
async fn detach_payment_method(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<DetachPaymentMethodRequest>,
) -> Result<Json<Value>> {
    let detached = state
        .payments()
        .detach_payment_method(&request.payment_method)
        .await?;
    Ok(Json(detached))
}

#[derive(Debug, Deserialize)]
struct CreateSubscriptionRequest {
    #[serde(rename = "stripeId")]
    stripe_id: CustomerId,
    #[serde(rename = "priceId")]
    price_id: PriceId,
    #[serde(rename = "couponId")]
    coupon_id: Option<CouponId>,
    quantity: u32,
}

/// Create a subscription; the UI confirms the first invoice with the
/// returned client secret.
#[instrument(skip(state, _identity, request))]
async fn create_subscription(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<Json<Value>> {
    let checkout = state
        .payments()
        .create_subscription(
            &request.stripe_id,
            &request.price_id,
            request.coupon_id.as_ref(),
            request.quantity,
        )
        .await?;

    Ok(Json(json!({
        "subscription": checkout.subscription,
        "subscriptionId": checkout.subscription_id,
        "clientSecret": checkout.client_secret,
    })))
}

#[derive(Debug, Deserialize)]
struct SubscriptionIdRequest {
    #[serde(rename = "subscriptionId")]
    subscription_id: SubscriptionId,
}

#[instrument(skip(state, _identity, request))]
async fn cancel_subscription(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<SubscriptionIdRequest>,
) -> Result<Json<Value>> {
    let subscription = state
        .payments()
        .cancel_subscription(&request.subscription_id)
        .await?;
    Ok(Json(json!({ "subscription": subscription })))
}

#[instrument(skip(state, _identity, request))]
async fn pause_subscription(
    State(state): State<AppState>,
    _identity: Identity,
    Json(request): Json<SubscriptionIdRequest>,
) -> Result<Json<Value>> {
    let subscription = state
        .payments()
        .pause_subscription(&request.subscription_id)
        .await?;
    Ok(Json(json!({ "subscription": subscription })))
}
