//! Payment gateway adapter.
//!
//! Creates and updates remote payment objects (products, prices, payment
//! intents, customers, subscriptions) and verifies inbound signed webhook
//! events. The gateway holds only foreign copies keyed by our document ids;
//! the primary store stays canonical.

pub mod client;
pub mod webhook;

pub use client::PaymentClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use coralbay_core::{
    BillingInterval, CouponId, CustomerId, PaymentIntentId, PaymentMethodId, PriceId,
    RemoteProductId, SubscriptionId,
};

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Gateway response was missing a field this system relies on.
    #[error("gateway response missing {0}")]
    MissingField(&'static str),

    /// Failed to construct the client.
    #[error("Client error: {0}")]
    Client(String),
}

/// A payment intent, normalized to the fields this system reads.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Present on freshly created intents; handed to the UI for confirmation.
    pub client_secret: Option<String>,
    /// The payment method that settled the intent, once one has.
    pub payment_method: Option<PaymentMethodId>,
    /// Actually captured amount in minor units.
    pub amount_received: i64,
}

/// Result of creating a subscription: the id plus the first invoice's
/// payment-intent client secret for the UI to confirm.
#[derive(Debug, Clone)]
pub struct SubscriptionCheckout {
    pub subscription_id: SubscriptionId,
    pub client_secret: Option<String>,
    /// The raw subscription object, passed through to the caller.
    pub subscription: Value,
}

/// Billing-period anchors of a subscription, as gateway epoch seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionPeriod {
    pub current_period_start: i64,
    pub current_period_end: i64,
}

/// Remote payment operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create the remote product object backing a store product.
    async fn create_product(
        &self,
        title: &str,
        image_url: &str,
    ) -> Result<RemoteProductId, PaymentError>;

    /// Create one recurring price on a remote product.
    /// `unit_amount` is in minor units.
    async fn create_recurring_price(
        &self,
        product: &RemoteProductId,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<PriceId, PaymentError>;

    /// Create a one-off payment intent. `amount` is in minor units.
    async fn create_payment_intent(
        &self,
        amount: i64,
        customer: Option<&CustomerId>,
        payment_method: Option<&PaymentMethodId>,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Create a gateway customer for a signed-up user.
    async fn create_customer(&self, email: &str) -> Result<CustomerId, PaymentError>;

    /// Retrieve a payment intent by id.
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Create a subscription on a recurring price, allowing the first
    /// invoice to start incomplete.
    async fn create_subscription(
        &self,
        customer: &CustomerId,
        price: &PriceId,
        coupon: Option<&CouponId>,
        quantity: u32,
    ) -> Result<SubscriptionCheckout, PaymentError>;

    /// Set a subscription's default payment method and clear any coupon;
    /// returns the subscription's current billing period.
    async fn set_subscription_payment_method(
        &self,
        subscription: &SubscriptionId,
        payment_method: &PaymentMethodId,
    ) -> Result<SubscriptionPeriod, PaymentError>;

    /// Cancel a subscription outright.
    async fn cancel_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError>;

    /// Pause collection, resuming one second past the current period end.
    async fn pause_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError>;

    /// Set a customer's default card for future invoices.
    async fn set_default_card(
        &self,
        customer: &CustomerId,
        payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError>;

    /// List a customer's card payment methods alongside the customer object.
    async fn list_payment_methods(&self, customer: &CustomerId) -> Result<Value, PaymentError>;

    /// Detach a payment method from its customer.
    async fn detach_payment_method(
        &self,
        payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError>;
}
