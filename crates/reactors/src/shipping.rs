//! Shipping gateway adapter.
//!
//! Creates and cancels remote shipment orders and fetches shipment detail
//! for inbound ship-notify webhooks. Authentication is a static basic-auth
//! token derived from the configured credentials; the gateway does not sign
//! its webhooks, so detail fetches only follow resource URLs pointing at
//! the configured gateway host.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use coralbay_core::{Order, OrderId};

use crate::config::ShippingConfig;

/// The webhook `resource_type` that announces a shipped order.
pub const SHIP_NOTIFY: &str = "SHIP_NOTIFY";

/// Errors that can occur when talking to the shipping gateway.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A webhook resource URL pointed somewhere other than the gateway.
    #[error("resource URL rejected: {0}")]
    ForeignResourceUrl(String),

    /// Failed to construct the client.
    #[error("Client error: {0}")]
    Client(String),
}

/// Detail payload fetched from a webhook's `resource_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentDetail {
    /// The store order id the shipment was created under.
    #[serde(rename = "orderKey")]
    pub order_key: OrderId,
}

/// Remote shipment operations.
#[async_trait]
pub trait ShippingGateway: Send + Sync {
    /// Create a remote shipment order for a paid store order.
    async fn create_shipment(&self, order_id: &OrderId, order: &Order)
    -> Result<(), ShippingError>;

    /// Cancel the remote shipment order for a deleted store order.
    async fn cancel_shipment(&self, order_id: &OrderId) -> Result<(), ShippingError>;

    /// Follow a webhook `resource_url` to the shipment detail.
    async fn fetch_shipment_detail(&self, resource_url: &str)
    -> Result<ShipmentDetail, ShippingError>;
}

/// REST client for the shipping gateway.
#[derive(Clone)]
pub struct ShippingClient {
    client: reqwest::Client,
    api_base: String,
    allowed_host: Option<String>,
}

impl ShippingClient {
    /// Create a new shipping gateway client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ShippingConfig) -> Result<Self, ShippingError> {
        let token = BASE64.encode(format!(
            "{}:{}",
            config.api_key,
            config.api_secret.expose_secret()
        ));

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Basic {token}"))
            .map_err(|e| ShippingError::Client(format!("invalid credentials: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let api_base = config.api_base.trim_end_matches('/').to_owned();
        let allowed_host = Url::parse(&api_base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned));

        Ok(Self {
            client,
            api_base,
            allowed_host,
        })
    }

    /// Map a store order into the gateway's order-creation payload.
    fn shipment_payload(order_id: &OrderId, order: &Order) -> serde_json::Value {
        let now = Utc::now().to_rfc3339();
        let address = &order.shipping_address;

        serde_json::json!({
            "orderNumber": order_id,
            "orderKey": order_id,
            "orderDate": now,
            "paymentDate": now,
            "orderStatus": "awaiting_shipment",
            "customerUsername": order.user.name,
            "customerEmail": order.user.email,
            "billTo": {
                "name": order.shipping_address.fullname,
            },
            "shipTo": {
                "name": address.fullname,
                "street1": address.address1,
                "street2": address.address2,
                "street3": null,
                "city": address.city,
                "state": address.state,
                "postalCode": address.zip_code,
                "country": "US",
                "phone": address.phone,
                "residential": true,
            },
            "items": order
                .items
                .iter()
                .map(|line| {
                    serde_json::json!({
                        "sku": line.item.id,
                        "name": line.item.title,
                        "imageUrl": line.item.image_url,
                        "quantity": line.quantity,
                        "unitPrice": line.item.price,
                    })
                })
                .collect::<Vec<_>>(),
            "amountPaid": order.amount,
        })
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ShippingError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ShippingError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ShippingGateway for ShippingClient {
    async fn create_shipment(
        &self,
        order_id: &OrderId,
        order: &Order,
    ) -> Result<(), ShippingError> {
        let response = self
            .client
            .post(format!("{}/orders/createorder", self.api_base))
            .json(&Self::shipment_payload(order_id, order))
            .send()
            .await?;

        Self::check_response(response).await.map(|_| ())
    }

    async fn cancel_shipment(&self, order_id: &OrderId) -> Result<(), ShippingError> {
        let response = self
            .client
            .delete(format!("{}/orders/{order_id}", self.api_base))
            .send()
            .await?;

        Self::check_response(response).await.map(|_| ())
    }

    async fn fetch_shipment_detail(
        &self,
        resource_url: &str,
    ) -> Result<ShipmentDetail, ShippingError> {
        // The webhook body is unauthenticated, so the URL inside it is
        // attacker-controlled; only follow it back to the gateway itself.
        let url = Url::parse(resource_url)
            .map_err(|_| ShippingError::ForeignResourceUrl(resource_url.to_owned()))?;
        if url.host_str() != self.allowed_host.as_deref() {
            return Err(ShippingError::ForeignResourceUrl(resource_url.to_owned()));
        }

        let response = self.client.get(url).send().await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }
}
