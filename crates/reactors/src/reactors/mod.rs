//! Document-change reactors.
//!
//! One module per reacting surface: `users`, `products`, and `orders`
//! handle their collection's create/update/delete events; `subscription`
//! reacts to verified payment-succeeded webhooks. Each invocation is
//! stateless and runs fully in parallel with every other; an error aborts
//! that invocation's remaining steps and leaves already-committed writes
//! in place, relying on the change stream's at-least-once redelivery.

pub mod orders;
pub mod products;
pub mod subscription;
pub mod users;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::counters::CounterError;
use crate::payments::PaymentError;
use crate::store::{DocumentStore, StoreError};

const OCC_ATTEMPTS: u32 = 5;

/// Errors from a document-change reaction.
#[derive(Debug, Error)]
pub enum ReactionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The change event carried a body that does not match its collection.
    #[error("event payload malformed: {0}")]
    MalformedEvent(String),

    /// A payment-succeeded event whose intent has no payment method.
    #[error("payment intent has no payment method")]
    MissingPaymentMethod,

    /// A document update lost every conditional-write race.
    #[error("update on {collection}/{id} exhausted its attempts")]
    Contention { collection: String, id: String },

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read-modify-conditional-write one document, retrying on conflicts.
///
/// Returns `Ok(false)` without calling `apply` when the document is
/// absent - reactions treat missing referenced documents as silent
/// no-ops. `apply` mutates the JSON body in place.
pub(crate) async fn occ_update(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    apply: impl Fn(&mut Value) + Send + Sync,
) -> Result<bool, ReactionError> {
    for attempt in 1..=OCC_ATTEMPTS {
        let Some(doc) = store.get(collection, id).await? else {
            return Ok(false);
        };

        let mut body = doc.body;
        apply(&mut body);

        match store
            .put_if_revision(collection, id, body, Some(doc.revision))
            .await
        {
            Ok(_) => return Ok(true),
            Err(StoreError::RevisionConflict { .. }) => {
                debug!(collection, id, attempt, "document write lost race, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ReactionError::Contention {
        collection: collection.to_owned(),
        id: id.to_owned(),
    })
}
