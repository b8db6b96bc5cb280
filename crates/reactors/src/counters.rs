//! Aggregate counter engine.
//!
//! Maintains the singleton counts documents (`product-counts`,
//! `order-counts`, `user-counts`) under concurrent create/update/delete
//! reactions. Every update is a read-compute-conditional-write loop on the
//! document revision, retried a bounded number of times, so concurrent
//! reactions of the same kind converge instead of losing updates.
//!
//! Observable semantics, regardless of contention:
//! - a missing counts document bootstraps to all-zero plus the delta on
//!   the first creation of its kind
//! - decrements clamp at zero and are skipped entirely while the counts
//!   document does not exist yet
//! - a product category change touches the two category fields only;
//!   `All` moves only on create/delete

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use coralbay_core::{OrderCounts, ProductCategory, ProductCounts, UserCounts, clamped_sub};

use crate::store::{DocumentStore, StoreError, collections};

const MAX_ATTEMPTS: u32 = 5;

/// Errors from counter maintenance.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Every conditional write lost its race. The caller treats this as a
    /// reaction failure; the event's at-least-once redelivery tries again.
    #[error("counter update on {collection} exhausted {attempts} attempts")]
    ContentionExhausted { collection: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("counter encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Counter maintenance over a document store.
pub struct CounterEngine<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> CounterEngine<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Record a product creation in `product-counts`.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn product_created(&self, category: ProductCategory) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::PRODUCT_COUNTS,
            || Some(ProductCounts::bootstrap(category)),
            |counts: ProductCounts| counts.created(category),
        )
        .await
    }

    /// Record a product deletion. Skipped while no counts document exists.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn product_deleted(&self, category: ProductCategory) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::PRODUCT_COUNTS,
            || None,
            |counts: ProductCounts| counts.deleted(category),
        )
        .await
    }

    /// Record a category reassignment. Skipped while no counts document
    /// exists; `All` is untouched.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn product_category_changed(
        &self,
        from: ProductCategory,
        to: ProductCategory,
    ) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::PRODUCT_COUNTS,
            || None,
            |counts: ProductCounts| counts.category_changed(from, to),
        )
        .await
    }

    /// Record an order creation in `order-counts`.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn order_created(&self) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::ORDER_COUNTS,
            || Some(OrderCounts { order_counts: 1 }),
            |counts: OrderCounts| OrderCounts {
                order_counts: counts.order_counts + 1,
            },
        )
        .await
    }

    /// Record an order deletion. Skipped while no counts document exists.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn order_deleted(&self) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::ORDER_COUNTS,
            || None,
            |counts: OrderCounts| OrderCounts {
                order_counts: clamped_sub(counts.order_counts, 1),
            },
        )
        .await
    }

    /// Record a user creation in `user-counts`.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn user_created(&self) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::USER_COUNTS,
            || Some(UserCounts { user_counts: 1 }),
            |counts: UserCounts| UserCounts {
                user_counts: counts.user_counts + 1,
            },
        )
        .await
    }

    /// Record a user deletion. Skipped while no counts document exists.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the store fails or contention persists.
    pub async fn user_deleted(&self) -> Result<(), CounterError> {
        self.read_modify_write(
            collections::USER_COUNTS,
            || None,
            |counts: UserCounts| UserCounts {
                user_counts: clamped_sub(counts.user_counts, 1),
            },
        )
        .await
    }

    /// The optimistic-concurrency loop shared by every counter.
    ///
    /// `on_absent` produces the bootstrap document for increments, or
    /// `None` for decrements, which are skipped while the document does
    /// not exist (guards the startup race where a delete reaction lands
    /// before the first create's bootstrap).
    async fn read_modify_write<T>(
        &self,
        collection: &str,
        on_absent: impl Fn() -> Option<T> + Send + Sync,
        apply: impl Fn(T) -> T + Send + Sync,
    ) -> Result<(), CounterError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.store.get(collection, collections::COUNTS_DOC).await?;

            let (body, expected) = match &current {
                Some(doc) => {
                    let counts: T = doc.parse(collection)?;
                    (serde_json::to_value(apply(counts))?, Some(doc.revision))
                }
                None => match on_absent() {
                    Some(bootstrap) => (serde_json::to_value(bootstrap)?, None),
                    None => return Ok(()),
                },
            };

            match self
                .store
                .put_if_revision(collection, collections::COUNTS_DOC, body, expected)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StoreError::RevisionConflict { .. }) => {
                    debug!(collection, attempt, "counter write lost race, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CounterError::ContentionExhausted {
            collection: collection.to_owned(),
            attempts: MAX_ATTEMPTS,
        })
    }
}
