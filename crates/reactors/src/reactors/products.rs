//! Product collection reactions and remote provisioning.
//!
//! Creation maintains the category counts, mirrors the product, and
//! provisions the payment gateway: one remote product object plus one
//! recurring price per supported billing interval, each price id merged
//! back onto the product document as it lands. The product is visible
//! before its prices are attached; the `provisioning` marker stays
//! `pending` until every interval has one, and [`reconcile`] can be
//! re-run safely to finish a partially provisioned product.

use futures::stream::{self, TryStreamExt};
use serde_json::Value;
use tracing::{info, instrument, warn};

use coralbay_core::{BillingInterval, PriceId, Product, ProvisioningStatus, to_minor_units};

use crate::counters::CounterEngine;
use crate::outbox::{self, SideEffect};
use crate::search::indexes;
use crate::state::AppState;
use crate::store::collections;

use super::{ReactionError, occ_update};

/// How many gateway price creations run at once per product.
const PROVISION_CONCURRENCY: usize = 3;

/// React to a product document creation.
#[instrument(skip(state, body), fields(product_id = %id))]
pub async fn on_product_created(
    state: &AppState,
    id: &str,
    body: &Value,
) -> Result<(), ReactionError> {
    let product: Product = serde_json::from_value(body.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("product: {e}")))?;

    CounterEngine::new(state.store())
        .product_created(product.category)
        .await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::PRODUCTS.to_owned(),
            object_id: id.to_owned(),
            body: body.clone(),
        },
    )
    .await?;

    provision(state, id, &product).await
}

/// React to a product document update.
///
/// A category change moves one count between the two category fields;
/// `All` is untouched. The post-update document is always re-mirrored.
#[instrument(skip(state, before, after), fields(product_id = %id))]
pub async fn on_product_updated(
    state: &AppState,
    id: &str,
    before: &Value,
    after: &Value,
) -> Result<(), ReactionError> {
    let old: Product = serde_json::from_value(before.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("product before: {e}")))?;
    let new: Product = serde_json::from_value(after.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("product after: {e}")))?;

    if old.category != new.category {
        CounterEngine::new(state.store())
            .product_category_changed(old.category, new.category)
            .await?;
    }

    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::PRODUCTS.to_owned(),
            object_id: id.to_owned(),
            body: after.clone(),
        },
    )
    .await?;

    Ok(())
}

/// React to a product document deletion.
///
/// Remote gateway objects are left in place; prices for deleted products
/// simply stop being referenced.
#[instrument(skip(state, before), fields(product_id = %id))]
pub async fn on_product_deleted(
    state: &AppState,
    id: &str,
    before: &Value,
) -> Result<(), ReactionError> {
    let product: Product = serde_json::from_value(before.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("product: {e}")))?;

    CounterEngine::new(state.store())
        .product_deleted(product.category)
        .await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexRemove {
            index: indexes::PRODUCTS.to_owned(),
            object_id: id.to_owned(),
        },
    )
    .await?;

    Ok(())
}

/// Provision the remote product and recurring prices for a store product.
///
/// Idempotent: intervals that already carry a price id are skipped, and
/// the remote product object is reused once its id has been recorded.
/// Completing every interval marks the product `provisioning: complete`.
pub async fn provision(
    state: &AppState,
    id: &str,
    product: &Product,
) -> Result<(), ReactionError> {
    let missing: Vec<BillingInterval> = BillingInterval::ALL
        .into_iter()
        .filter(|interval| !product.subscription.contains_key(interval.as_str()))
        .collect();

    if missing.is_empty() {
        mark_complete(state, id).await?;
        return Ok(());
    }

    // Materialize the saga marker before any gateway call: a crash from
    // here on leaves a document the reconciler can find by field.
    state
        .store()
        .merge(
            collections::PRODUCTS,
            id,
            serde_json::json!({ "provisioning": ProvisioningStatus::Pending }),
        )
        .await?;

    let unit_amount = to_minor_units(product.price)
        .ok_or_else(|| ReactionError::MalformedEvent("price out of range".to_owned()))?;

    // Reuse the recorded remote product on reconcile runs; create and
    // record it on the first.
    let remote = match &product.remote_product_id {
        Some(remote) => remote.clone(),
        None => {
            let remote = state
                .payments()
                .create_product(&product.title, &product.image_url)
                .await?;
            state
                .store()
                .merge(
                    collections::PRODUCTS,
                    id,
                    serde_json::json!({ "remoteProductId": remote }),
                )
                .await?;
            remote
        }
    };

    stream::iter(missing.into_iter().map(Ok::<_, ReactionError>))
        .try_for_each_concurrent(PROVISION_CONCURRENCY, |interval| {
            let remote = remote.clone();
            async move {
                let price = state
                    .payments()
                    .create_recurring_price(&remote, unit_amount, interval)
                    .await?;
                attach_price(state, id, interval, &price).await
            }
        })
        .await?;

    mark_complete(state, id).await?;
    info!(product_id = %id, "product provisioning complete");
    Ok(())
}

/// Run [`provision`] over every still-pending product. Returns how many
/// products were completed.
///
/// # Errors
///
/// Returns the store error if the pending-product scan fails; per-product
/// failures are logged and skipped so one broken product cannot wedge the
/// rest.
pub async fn reconcile(state: &AppState) -> Result<usize, ReactionError> {
    let pending = state
        .store()
        .find_by_field(
            collections::PRODUCTS,
            "provisioning",
            ProvisioningStatus::Pending.as_str(),
        )
        .await?;

    let mut completed = 0;
    for doc in pending {
        let product: Product = match doc.parse(collections::PRODUCTS) {
            Ok(product) => product,
            Err(err) => {
                warn!(product_id = %doc.id, error = %err, "unreadable product, skipping");
                continue;
            }
        };
        match provision(state, &doc.id, &product).await {
            Ok(()) => completed += 1,
            Err(err) => {
                warn!(product_id = %doc.id, error = %err, "provisioning still incomplete");
            }
        }
    }

    Ok(completed)
}

/// Merge one interval's price id into the product's `subscription` map.
async fn attach_price(
    state: &AppState,
    id: &str,
    interval: BillingInterval,
    price: &PriceId,
) -> Result<(), ReactionError> {
    let updated = occ_update(state.store(), collections::PRODUCTS, id, |body| {
        if !body.get("subscription").is_some_and(Value::is_object) {
            body["subscription"] = serde_json::json!({});
        }
        body["subscription"][interval.as_str()] = serde_json::json!(price);
    })
    .await?;

    if !updated {
        // Product deleted mid-provisioning; nothing left to attach to.
        warn!(product_id = %id, %interval, "product vanished before price attached");
    }
    Ok(())
}

async fn mark_complete(state: &AppState, id: &str) -> Result<(), ReactionError> {
    state
        .store()
        .merge(
            collections::PRODUCTS,
            id,
            serde_json::json!({
                "provisioning": ProvisioningStatus::Complete,
                "updatedAt": chrono::Utc::now(),
            }),
        )
        .await?;
    Ok(())
}
