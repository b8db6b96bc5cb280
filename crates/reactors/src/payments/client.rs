//! REST client for the payment gateway.
//!
//! The gateway speaks form-encoded requests authenticated with a bearer
//! secret key. Responses are normalized into the handful of fields the
//! reactors and RPCs actually read; passthrough operations return the raw
//! JSON body.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;

use coralbay_core::{
    BillingInterval, CouponId, CustomerId, PaymentIntentId, PaymentMethodId, PriceId,
    RemoteProductId, SubscriptionId,
};

use super::{
    PaymentError, PaymentGateway, PaymentIntent, SubscriptionCheckout, SubscriptionPeriod,
};
use crate::config::PaymentConfig;

/// REST client for the payment gateway.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
}

impl PaymentClient {
    /// Create a new payment gateway client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        let mut auth =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| PaymentError::Client(format!("invalid secret key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Value, PaymentError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .form(form)
            .send()
            .await?;
        Self::check_json(response).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, PaymentError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_base))
            .send()
            .await?;
        Self::check_json(response).await
    }

    async fn check_json(response: reqwest::Response) -> Result<Value, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    fn string_field(value: &Value, field: &'static str) -> Result<String, PaymentError> {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(PaymentError::MissingField(field))
    }

    fn intent_from(value: &Value) -> Result<PaymentIntent, PaymentError> {
        Ok(PaymentIntent {
            id: PaymentIntentId::new(Self::string_field(value, "id")?),
            client_secret: value
                .get("client_secret")
                .and_then(Value::as_str)
                .map(str::to_owned),
            payment_method: value
                .get("payment_method")
                .and_then(Value::as_str)
                .map(PaymentMethodId::new),
            amount_received: value
                .get("amount_received")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaymentClient {
    async fn create_product(
        &self,
        title: &str,
        image_url: &str,
    ) -> Result<RemoteProductId, PaymentError> {
        let body = self
            .post_form(
                "/products",
                &[
                    ("name", title.to_owned()),
                    ("url", image_url.to_owned()),
                ],
            )
            .await?;
        Ok(RemoteProductId::new(Self::string_field(&body, "id")?))
    }

    async fn create_recurring_price(
        &self,
        product: &RemoteProductId,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<PriceId, PaymentError> {
        let body = self
            .post_form(
                "/prices",
                &[
                    ("currency", "usd".to_owned()),
                    ("product", product.to_string()),
                    ("unit_amount", unit_amount.to_string()),
                    ("recurring[interval]", interval.to_string()),
                    ("recurring[interval_count]", "1".to_owned()),
                    ("recurring[usage_type]", "licensed".to_owned()),
                ],
            )
            .await?;
        Ok(PriceId::new(Self::string_field(&body, "id")?))
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        customer: Option<&CustomerId>,
        payment_method: Option<&PaymentMethodId>,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut form = vec![
            ("amount", amount.to_string()),
            ("currency", "usd".to_owned()),
        ];
        if let Some(customer) = customer {
            form.push(("customer", customer.to_string()));
        }
        if let Some(payment_method) = payment_method {
            form.push(("payment_method", payment_method.to_string()));
        }

        let body = self.post_form("/payment_intents", &form).await?;
        Self::intent_from(&body)
    }

    async fn create_customer(&self, email: &str) -> Result<CustomerId, PaymentError> {
        let body = self
            .post_form("/customers", &[("email", email.to_owned())])
            .await?;
        Ok(CustomerId::new(Self::string_field(&body, "id")?))
    }

    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError> {
        let body = self.get_json(&format!("/payment_intents/{id}")).await?;
        Self::intent_from(&body)
    }

    async fn create_subscription(
        &self,
        customer: &CustomerId,
        price: &PriceId,
        coupon: Option<&CouponId>,
        quantity: u32,
    ) -> Result<SubscriptionCheckout, PaymentError> {
        let mut form = vec![
            ("customer", customer.to_string()),
            ("items[0][price]", price.to_string()),
            ("items[0][quantity]", quantity.to_string()),
            ("payment_behavior", "allow_incomplete".to_owned()),
            ("expand[0]", "latest_invoice.payment_intent".to_owned()),
        ];
        if let Some(coupon) = coupon {
            form.push(("coupon", coupon.to_string()));
        }

        let body = self.post_form("/subscriptions", &form).await?;

        let subscription_id = SubscriptionId::new(Self::string_field(&body, "id")?);
        let client_secret = body
            .pointer("/latest_invoice/payment_intent/client_secret")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(SubscriptionCheckout {
            subscription_id,
            client_secret,
            subscription: body,
        })
    }

    async fn set_subscription_payment_method(
        &self,
        subscription: &SubscriptionId,
        payment_method: &PaymentMethodId,
    ) -> Result<SubscriptionPeriod, PaymentError> {
        let body = self
            .post_form(
                &format!("/subscriptions/{subscription}"),
                &[
                    ("default_payment_method", payment_method.to_string()),
                    // Clearing the coupon: the renewal charges full price
                    ("coupon", String::new()),
                ],
            )
            .await?;

        Ok(SubscriptionPeriod {
            current_period_start: body
                .get("current_period_start")
                .and_then(Value::as_i64)
                .ok_or(PaymentError::MissingField("current_period_start"))?,
            current_period_end: body
                .get("current_period_end")
                .and_then(Value::as_i64)
                .ok_or(PaymentError::MissingField("current_period_end"))?,
        })
    }

    async fn cancel_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{subscription}", self.api_base))
            .send()
            .await?;
        Self::check_json(response).await
    }

    async fn pause_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError> {
        // Resume one unit past the current period end, so the paused period
        // finishes before collection restarts.
        let current = self
            .get_json(&format!("/subscriptions/{subscription}"))
            .await?;
        let period_end = current
            .get("current_period_end")
            .and_then(Value::as_i64)
            .ok_or(PaymentError::MissingField("current_period_end"))?;

        self.post_form(
            &format!("/subscriptions/{subscription}"),
            &[
                (
                    "pause_collection[behavior]",
                    "keep_as_draft".to_owned(),
                ),
                (
                    "pause_collection[resumes_at]",
                    (period_end + 1).to_string(),
                ),
            ],
        )
        .await
    }

    async fn set_default_card(
        &self,
        customer: &CustomerId,
        payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError> {
        self.post_form(
            &format!("/customers/{customer}"),
            &[(
                "invoice_settings[default_payment_method]",
                payment_method.to_string(),
            )],
        )
        .await
    }

    async fn list_payment_methods(&self, customer: &CustomerId) -> Result<Value, PaymentError> {
        let payment_methods = self
            .get_json(&format!("/payment_methods?customer={customer}&type=card"))
            .await?;
        let customer = self.get_json(&format!("/customers/{customer}")).await?;

        Ok(serde_json::json!({
            "paymentMethods": payment_methods,
            "customer": customer,
        }))
    }

    async fn detach_payment_method(
        &self,
        payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError> {
        let body = self
            .post_form(&format!("/payment_methods/{payment_method}/detach"), &[])
            .await?;
        Ok(serde_json::json!({ "paymentMethod": body }))
    }
}
