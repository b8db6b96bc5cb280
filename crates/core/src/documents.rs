//! Entity documents as stored in the primary document store.
//!
//! Field names follow the store's JSON contract: the storefront UI writes
//! these documents and reads them (and the counts projections) back, so the
//! serde renames here are load-bearing. The document id is the store key and
//! is not repeated inside the body.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    CartItemId, CustomerId, PaymentStatus, PaymentType, PriceId, ProductCategory, ProductId,
    ProvisioningStatus, RemoteProductId, Role, ShipmentStatus, SubscriptionId, UserId,
};

/// A user document in the `users` collection.
///
/// The document id equals the caller's identity-provider uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "stripeCustomerId", skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<CustomerId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A product document in the `products` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub category: ProductCategory,
    pub inventory: u32,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "imageFileName")]
    pub image_file_name: String,
    pub creator: UserId,
    /// Billing-interval name to remote price id, filled in as provisioning
    /// lands (eventually consistent with the gateway).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subscription: BTreeMap<String, PriceId>,
    /// The payment gateway product backing this one, recorded so a re-run
    /// of provisioning reuses it instead of creating a duplicate.
    #[serde(rename = "remoteProductId", skip_serializing_if = "Option::is_none")]
    pub remote_product_id: Option<RemoteProductId>,
    #[serde(default)]
    pub provisioning: ProvisioningStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A cart line item, embedded in an order at checkout.
///
/// `item` is the full product snapshot taken at add-to-cart time; inventory
/// decrements re-read the live product, not this snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product: ProductId,
    pub quantity: u32,
    pub user: UserId,
    pub item: ProductSnapshot,
}

/// The denormalized product copy carried inside a [`CartItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub title: String,
    pub price: Decimal,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// A shipping address, embedded in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub fullname: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "zipCode")]
    pub zip_code: String,
    pub phone: String,
}

/// The denormalized user block carried on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// An order document in the `orders` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub items: Vec<CartItem>,
    /// Charged total in major units. For subscription orders this is the
    /// estimate until the renewal reactor records the actual charge.
    pub amount: Decimal,
    #[serde(rename = "totalQuantity")]
    pub total_quantity: u32,
    #[serde(rename = "shippingAddress")]
    pub shipping_address: Address,
    pub user: OrderUser,
    #[serde(rename = "paymentStatus", skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(rename = "paymentType", skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<PaymentType>,
    #[serde(rename = "subscriptionId", skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(rename = "shipmentStatus", skip_serializing_if = "Option::is_none")]
    pub shipment_status: Option<ShipmentStatus>,
    /// Billing-period anchor, as gateway epoch seconds.
    #[serde(
        rename = "subscriptionStartDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_start_date: Option<i64>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether this order is waiting on its own payment-succeeded event.
    #[must_use]
    pub fn is_live_subscription_order(&self) -> bool {
        self.shipment_status == Some(ShipmentStatus::New)
    }
}
