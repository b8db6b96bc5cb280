//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ReactorConfig;
use crate::identity::{IdentityClient, IdentityError, IdentityProvider};
use crate::outbox::OutboxWorker;
use crate::payments::{PaymentClient, PaymentError, PaymentGateway};
use crate::search::{SearchClient, SearchError, SearchIndex};
use crate::shipping::{ShippingClient, ShippingError, ShippingGateway};
use crate::store::DocumentStore;
use crate::store::postgres::PgDocumentStore;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("search client: {0}")]
    Search(#[from] SearchError),
    #[error("shipping client: {0}")]
    Shipping(#[from] ShippingError),
    #[error("identity client: {0}")]
    Identity(#[from] IdentityError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// document store, the gateway adapters, and configuration. Gateways are
/// held as trait objects so tests can substitute recording fakes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ReactorConfig,
    store: Arc<dyn DocumentStore>,
    payments: Arc<dyn PaymentGateway>,
    search: Arc<dyn SearchIndex>,
    shipping: Arc<dyn ShippingGateway>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Assemble state from explicit components.
    #[must_use]
    pub fn new(
        config: ReactorConfig,
        store: Arc<dyn DocumentStore>,
        payments: Arc<dyn PaymentGateway>,
        search: Arc<dyn SearchIndex>,
        shipping: Arc<dyn ShippingGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                payments,
                search,
                shipping,
                identity,
            }),
        }
    }

    /// Assemble state with the production clients over a database pool.
    ///
    /// # Errors
    ///
    /// Returns an error if any gateway client fails to build.
    pub fn from_config(config: ReactorConfig, pool: sqlx::PgPool) -> Result<Self, StateError> {
        let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
        let payments: Arc<dyn PaymentGateway> = Arc::new(PaymentClient::new(&config.payment)?);
        let search: Arc<dyn SearchIndex> = Arc::new(SearchClient::new(&config.search)?);
        let shipping: Arc<dyn ShippingGateway> = Arc::new(ShippingClient::new(&config.shipping)?);
        let identity: Arc<dyn IdentityProvider> = Arc::new(IdentityClient::new(&config.identity)?);

        Ok(Self::new(config, store, payments, search, shipping, identity))
    }

    /// Build the outbox worker over this state's store and gateways.
    #[must_use]
    pub fn outbox_worker(&self) -> OutboxWorker {
        OutboxWorker::new(
            self.inner.store.clone(),
            self.inner.search.clone(),
            self.inner.shipping.clone(),
        )
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &ReactorConfig {
        &self.inner.config
    }

    /// Get the primary document store.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    /// Get the payment gateway adapter.
    #[must_use]
    pub fn payments(&self) -> &dyn PaymentGateway {
        self.inner.payments.as_ref()
    }

    /// Get the shipping gateway adapter.
    #[must_use]
    pub fn shipping(&self) -> &dyn ShippingGateway {
        self.inner.shipping.as_ref()
    }

    /// Get the identity provider adapter.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }
}
