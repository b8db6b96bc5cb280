//! End-to-end test harness for the Coral Bay reactor service.
//!
//! Wires the in-memory document store and recording gateway fakes into the
//! production router, so tests drive the exact routing, extractors, and
//! reactors that ship - only the network edges are substituted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::Value;
use tower::util::ServiceExt;

use coralbay_core::{
    BillingInterval, CouponId, CustomerId, Order, OrderId, PaymentIntentId, PaymentMethodId,
    PriceId, RemoteProductId, Role, SubscriptionId, UserId,
};
use coralbay_reactors::config::{
    IdentityConfig, PaymentConfig, ReactorConfig, SearchConfig, ShippingConfig,
};
use coralbay_reactors::identity::{Identity, IdentityError, IdentityProvider, mint_token};
use coralbay_reactors::payments::{
    PaymentError, PaymentGateway, PaymentIntent, SubscriptionCheckout, SubscriptionPeriod,
};
use coralbay_reactors::routes::events::EVENTS_TOKEN_HEADER;
use coralbay_reactors::routes::webhooks::PAYMENT_SIGNATURE_HEADER;
use coralbay_reactors::search::{SearchError, SearchIndex};
use coralbay_reactors::shipping::{ShipmentDetail, ShippingError, ShippingGateway};
use coralbay_reactors::state::AppState;
use coralbay_reactors::store::memory::MemoryStore;
use coralbay_reactors::store::DocumentStore;
use coralbay_reactors::{build_router, payments::webhook};

pub const EVENTS_TOKEN: &str = "3v3nts-t0k3n-f0r-t3sts-0nly!";
pub const WEBHOOK_SECRET: &str = "whs3c-t3st-k3y-w1th-3ntr0py!";
pub const IDENTITY_SECRET: &str = "1d3nt1ty-k3y-th4t-1s-l0ng-3n0ugh";
pub const SUPER_ADMIN_EMAIL: &str = "root@coralbay.dev";

/// A configuration wired for tests: local URLs, known secrets.
#[must_use]
pub fn test_config() -> ReactorConfig {
    ReactorConfig {
        database_url: SecretString::from("postgres://unused/test"),
        host: "127.0.0.1".parse().expect("ip"),
        port: 0,
        events_token: SecretString::from(EVENTS_TOKEN),
        super_admin_email: SUPER_ADMIN_EMAIL.to_string(),
        identity: IdentityConfig {
            token_secret: SecretString::from(IDENTITY_SECRET),
            admin_endpoint: "http://identity.test".to_string(),
            admin_key: SecretString::from("1d-4dm1n-k3y-w1th-3ntr0py"),
        },
        payment: PaymentConfig {
            secret_key: SecretString::from("sk-t3st-k3y-w1th-3ntr0py"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            api_base: "http://payment.test".to_string(),
        },
        search: SearchConfig {
            app_id: "TESTAPP".to_string(),
            admin_api_key: SecretString::from("s3-4dm1n-k3y-w1th-3ntr0py"),
            endpoint: "http://search.test".to_string(),
        },
        shipping: ShippingConfig {
            api_key: "ship-key".to_string(),
            api_secret: SecretString::from("sh1p-s3cr3t-w1th-3ntr0py"),
            api_base: "http://shipping.test".to_string(),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

// =============================================================================
// Gateway fakes
// =============================================================================

/// Recording payment gateway fake.
#[derive(Default)]
pub struct FakePaymentGateway {
    seq: AtomicU64,
    /// Titles of remote products created.
    pub created_products: Mutex<Vec<String>>,
    /// `(unit_amount, interval)` of every price created.
    pub created_prices: Mutex<Vec<(i64, BillingInterval)>>,
    /// When set, price creation fails (for saga/reconcile tests).
    pub fail_prices: AtomicBool,
    /// Retrievable payment intents, keyed by id.
    pub intents: Mutex<HashMap<PaymentIntentId, PaymentIntent>>,
    /// Billing period reported for subscription updates.
    pub period: Mutex<SubscriptionPeriod>,
    /// `(subscription, payment method)` of every default-method update.
    pub updated_subscriptions: Mutex<Vec<(SubscriptionId, PaymentMethodId)>>,
}

impl FakePaymentGateway {
    #[must_use]
    pub fn new() -> Self {
        let fake = Self::default();
        *fake.period.lock().expect("mutex") = SubscriptionPeriod {
            current_period_start: 1_700_000_000,
            current_period_end: 1_702_592_000,
        };
        fake
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Seed a retrievable payment intent.
    pub fn seed_intent(
        &self,
        id: &str,
        payment_method: Option<&str>,
        amount_received: i64,
    ) {
        self.intents.lock().expect("mutex").insert(
            PaymentIntentId::new(id),
            PaymentIntent {
                id: PaymentIntentId::new(id),
                client_secret: None,
                payment_method: payment_method.map(PaymentMethodId::new),
                amount_received,
            },
        );
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_product(
        &self,
        title: &str,
        _image_url: &str,
    ) -> Result<RemoteProductId, PaymentError> {
        self.created_products
            .lock()
            .expect("mutex")
            .push(title.to_owned());
        Ok(RemoteProductId::new(self.next("rp")))
    }

    async fn create_recurring_price(
        &self,
        _product: &RemoteProductId,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<PriceId, PaymentError> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 503,
                message: "price backend down".to_owned(),
            });
        }
        self.created_prices
            .lock()
            .expect("mutex")
            .push((unit_amount, interval));
        Ok(PriceId::new(format!("price_{interval}_{}", self.next("n"))))
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        _customer: Option<&CustomerId>,
        _payment_method: Option<&PaymentMethodId>,
    ) -> Result<PaymentIntent, PaymentError> {
        let id = PaymentIntentId::new(self.next("pi"));
        Ok(PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            payment_method: None,
            amount_received: amount,
        })
    }

    async fn create_customer(&self, _email: &str) -> Result<CustomerId, PaymentError> {
        Ok(CustomerId::new(self.next("cus")))
    }

    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError> {
        self.intents
            .lock()
            .expect("mutex")
            .get(id)
            .cloned()
            .ok_or(PaymentError::Api {
                status: 404,
                message: "no such payment intent".to_owned(),
            })
    }

    async fn create_subscription(
        &self,
        _customer: &CustomerId,
        _price: &PriceId,
        _coupon: Option<&CouponId>,
        _quantity: u32,
    ) -> Result<SubscriptionCheckout, PaymentError> {
        let id = SubscriptionId::new(self.next("sub"));
        let subscription = serde_json::json!({ "id": id.as_str(), "status": "incomplete" });
        Ok(SubscriptionCheckout {
            client_secret: Some(format!("{id}_secret")),
            subscription,
            subscription_id: id,
        })
    }

    async fn set_subscription_payment_method(
        &self,
        subscription: &SubscriptionId,
        payment_method: &PaymentMethodId,
    ) -> Result<SubscriptionPeriod, PaymentError> {
        self.updated_subscriptions
            .lock()
            .expect("mutex")
            .push((subscription.clone(), payment_method.clone()));
        Ok(*self.period.lock().expect("mutex"))
    }

    async fn cancel_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError> {
        Ok(serde_json::json!({ "id": subscription, "status": "canceled" }))
    }

    async fn pause_subscription(
        &self,
        subscription: &SubscriptionId,
    ) -> Result<Value, PaymentError> {
        Ok(serde_json::json!({ "id": subscription, "pause_collection": {} }))
    }

    async fn set_default_card(
        &self,
        customer: &CustomerId,
        _payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError> {
        Ok(serde_json::json!({ "id": customer }))
    }

    async fn list_payment_methods(&self, customer: &CustomerId) -> Result<Value, PaymentError> {
        Ok(serde_json::json!({
            "paymentMethods": { "data": [] },
            "customer": { "id": customer },
        }))
    }

    async fn detach_payment_method(
        &self,
        payment_method: &PaymentMethodId,
    ) -> Result<Value, PaymentError> {
        Ok(serde_json::json!({ "paymentMethod": { "id": payment_method } }))
    }
}

/// Recording search index fake.
#[derive(Default)]
pub struct FakeSearchIndex {
    pub upserts: Mutex<Vec<(String, String, Value)>>,
    pub removes: Mutex<Vec<(String, String)>>,
}

impl FakeSearchIndex {
    /// Whether an object was ever upserted into an index.
    #[must_use]
    pub fn upserted(&self, index: &str, object_id: &str) -> bool {
        self.upserts
            .lock()
            .expect("mutex")
            .iter()
            .any(|(i, o, _)| i == index && o == object_id)
    }

    /// Whether an object was ever removed from an index.
    #[must_use]
    pub fn removed(&self, index: &str, object_id: &str) -> bool {
        self.removes
            .lock()
            .expect("mutex")
            .iter()
            .any(|(i, o)| i == index && o == object_id)
    }
}

#[async_trait]
impl SearchIndex for FakeSearchIndex {
    async fn upsert(&self, index: &str, object_id: &str, body: &Value) -> Result<(), SearchError> {
        self.upserts.lock().expect("mutex").push((
            index.to_owned(),
            object_id.to_owned(),
            body.clone(),
        ));
        Ok(())
    }

    async fn remove(&self, index: &str, object_id: &str) -> Result<(), SearchError> {
        self.removes
            .lock()
            .expect("mutex")
            .push((index.to_owned(), object_id.to_owned()));
        Ok(())
    }
}

/// Recording shipping gateway fake.
#[derive(Default)]
pub struct FakeShippingGateway {
    pub created: Mutex<Vec<(OrderId, Order)>>,
    pub cancelled: Mutex<Vec<OrderId>>,
    /// Detail returned for any `fetch_shipment_detail` call.
    pub detail: Mutex<Option<ShipmentDetail>>,
}

impl FakeShippingGateway {
    pub fn set_detail(&self, order_key: &str) {
        *self.detail.lock().expect("mutex") = Some(ShipmentDetail {
            order_key: OrderId::new(order_key),
        });
    }
}

#[async_trait]
impl ShippingGateway for FakeShippingGateway {
    async fn create_shipment(
        &self,
        order_id: &OrderId,
        order: &Order,
    ) -> Result<(), ShippingError> {
        self.created
            .lock()
            .expect("mutex")
            .push((order_id.clone(), order.clone()));
        Ok(())
    }

    async fn cancel_shipment(&self, order_id: &OrderId) -> Result<(), ShippingError> {
        self.cancelled.lock().expect("mutex").push(order_id.clone());
        Ok(())
    }

    async fn fetch_shipment_detail(
        &self,
        resource_url: &str,
    ) -> Result<ShipmentDetail, ShippingError> {
        self.detail
            .lock()
            .expect("mutex")
            .clone()
            .ok_or_else(|| ShippingError::ForeignResourceUrl(resource_url.to_owned()))
    }
}

/// Identity provider fake backed by a claims map.
#[derive(Default)]
pub struct FakeIdentityProvider {
    pub claims: Mutex<HashMap<UserId, Role>>,
}

impl FakeIdentityProvider {
    pub fn grant(&self, uid: &str, role: Role) {
        self.claims
            .lock()
            .expect("mutex")
            .insert(UserId::new(uid), role);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn set_role_claim(&self, uid: &UserId, role: Role) -> Result<(), IdentityError> {
        self.claims.lock().expect("mutex").insert(uid.clone(), role);
        Ok(())
    }

    async fn fetch_role(&self, uid: &UserId) -> Result<Option<Role>, IdentityError> {
        Ok(self.claims.lock().expect("mutex").get(uid).copied())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// Everything a test needs: the production router over fakes, plus
/// handles to the fakes for assertions.
pub struct TestContext {
    pub state: AppState,
    pub router: Router,
    pub store: MemoryStore,
    pub payments: Arc<FakePaymentGateway>,
    pub search: Arc<FakeSearchIndex>,
    pub shipping: Arc<FakeShippingGateway>,
    pub identity: Arc<FakeIdentityProvider>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let payments = Arc::new(FakePaymentGateway::new());
        let search = Arc::new(FakeSearchIndex::default());
        let shipping = Arc::new(FakeShippingGateway::default());
        let identity = Arc::new(FakeIdentityProvider::default());

        let state = AppState::new(
            test_config(),
            Arc::new(store.clone()),
            payments.clone(),
            search.clone(),
            shipping.clone(),
            identity.clone(),
        );
        let router = build_router(state.clone());

        Self {
            state,
            router,
            store,
            payments,
            search,
            shipping,
            identity,
        }
    }

    /// Mint an identity token the router accepts.
    #[must_use]
    pub fn token(&self, uid: &str, email: &str, role: Option<Role>) -> String {
        mint_token(
            &Identity {
                uid: UserId::new(uid),
                email: email.to_owned(),
                role,
                exp: chrono::Utc::now().timestamp() + 3600,
            },
            &SecretString::from(IDENTITY_SECRET),
        )
    }

    /// Push one change event through `/events/{collection}`.
    pub async fn push_event(
        &self,
        collection: &str,
        kind: &str,
        id: &str,
        before: Option<Value>,
        after: Option<Value>,
    ) -> StatusCode {
        let body = serde_json::json!({
            "type": kind,
            "id": id,
            "before": before,
            "after": after,
        });
        let request = Request::builder()
            .method("POST")
            .uri(format!("/events/{collection}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(EVENTS_TOKEN_HEADER, EVENTS_TOKEN)
            .body(Body::from(body.to_string()))
            .expect("request");

        self.send(request).await.0
    }

    /// Call one RPC with an optional bearer token.
    pub async fn rpc(
        &self,
        name: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/rpc/{name}"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).expect("request");

        self.send(request).await
    }

    /// Deliver a signed payment webhook.
    pub async fn payment_webhook(&self, event: &Value) -> StatusCode {
        let payload = event.to_string().into_bytes();
        let header_value = webhook::sign(
            &payload,
            &SecretString::from(WEBHOOK_SECRET),
            chrono::Utc::now().timestamp(),
        );
        self.payment_webhook_raw(payload, Some(&header_value)).await
    }

    /// Deliver a payment webhook with full control of the signature.
    pub async fn payment_webhook_raw(
        &self,
        payload: Vec<u8>,
        signature: Option<&str>,
    ) -> StatusCode {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payment")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(PAYMENT_SIGNATURE_HEADER, signature);
        }
        let request = builder.body(Body::from(payload)).expect("request");

        self.send(request).await.0
    }

    /// Deliver a shipment webhook.
    pub async fn shipment_webhook(&self, body: &Value) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/shipment")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");

        self.send(request).await.0
    }

    /// Run the outbox worker's due entries once (the background loop is
    /// not running in tests).
    pub async fn drain_outbox(&self) -> usize {
        self.state
            .outbox_worker()
            .drain_due()
            .await
            .expect("outbox drain")
    }

    /// Read a document body straight from the store.
    pub async fn get_json(&self, collection: &str, id: &str) -> Option<Value> {
        self.store
            .get(collection, id)
            .await
            .expect("store get")
            .map(|doc| doc.body)
    }

    /// Write a document body straight into the store (as the UI would).
    pub async fn put_json(&self, collection: &str, id: &str, body: Value) {
        self.store.put(collection, id, body).await.expect("store put");
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
