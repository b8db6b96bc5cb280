//! Order lifecycle reactions.
//!
//! The state machine over `paymentStatus` x `shipmentStatus`:
//!
//! - creation with `paymentStatus: Success` (or the update transition
//!   Processing -> Success) decrements inventory per line item and records
//!   a shipment creation
//! - every create/update re-mirrors the order into the search index
//! - deletion decrements the order counter, records a shipment
//!   cancellation, and removes the mirror entry
//!
//! Inventory is decremented only here, clamped at zero, and never restored
//! on deletion. Each line item's decrement is keyed by
//! `{order id}:{product id}` so an at-least-once redelivery of the same
//! event cannot decrement twice.

use futures::stream::{self, TryStreamExt};
use serde_json::Value;
use tracing::{instrument, warn};

use coralbay_core::{CartItem, Order, OrderId, PaymentStatus};

use crate::counters::CounterEngine;
use crate::outbox::{self, SideEffect};
use crate::search::indexes;
use crate::state::AppState;
use crate::store::{StoreError, collections};

use super::{ReactionError, occ_update};

/// How many line-item inventory writes run at once per order.
const INVENTORY_CONCURRENCY: usize = 4;

/// React to an order document creation.
#[instrument(skip(state, body), fields(order_id = %id))]
pub async fn on_order_created(
    state: &AppState,
    id: &str,
    body: &Value,
) -> Result<(), ReactionError> {
    let order: Order = serde_json::from_value(body.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("order: {e}")))?;

    if order.payment_status == Some(PaymentStatus::Success) {
        fulfill(state, id, &order).await?;
    }

    CounterEngine::new(state.store()).order_created().await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::ORDERS.to_owned(),
            object_id: id.to_owned(),
            body: body.clone(),
        },
    )
    .await?;

    Ok(())
}

/// React to an order document update.
///
/// Only the Processing -> Success transition triggers fulfillment; every
/// other field change (including Success -> Success no-ops) just
/// re-mirrors the updated order.
#[instrument(skip(state, before, after), fields(order_id = %id))]
pub async fn on_order_updated(
    state: &AppState,
    id: &str,
    before: &Value,
    after: &Value,
) -> Result<(), ReactionError> {
    let old: Order = serde_json::from_value(before.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("order before: {e}")))?;
    let new: Order = serde_json::from_value(after.clone())
        .map_err(|e| ReactionError::MalformedEvent(format!("order after: {e}")))?;

    if old.payment_status == Some(PaymentStatus::Processing)
        && new.payment_status == Some(PaymentStatus::Success)
    {
        // Fulfillment keys on the updated item list, not the original.
        fulfill(state, id, &new).await?;
    }

    outbox::enqueue(
        state.store(),
        SideEffect::IndexUpsert {
            index: indexes::ORDERS.to_owned(),
            object_id: id.to_owned(),
            body: after.clone(),
        },
    )
    .await?;

    Ok(())
}

/// React to an order document deletion.
///
/// Inventory is not restored; the asymmetry is intended.
#[instrument(skip(state), fields(order_id = %id))]
pub async fn on_order_deleted(state: &AppState, id: &str) -> Result<(), ReactionError> {
    CounterEngine::new(state.store()).order_deleted().await?;

    outbox::enqueue(
        state.store(),
        SideEffect::ShipmentCancel {
            order_id: OrderId::new(id),
        },
    )
    .await?;

    outbox::enqueue(
        state.store(),
        SideEffect::IndexRemove {
            index: indexes::ORDERS.to_owned(),
            object_id: id.to_owned(),
        },
    )
    .await?;

    Ok(())
}

/// Decrement inventory for every line item and record the shipment.
async fn fulfill(state: &AppState, id: &str, order: &Order) -> Result<(), ReactionError> {
    stream::iter(order.items.iter().map(Ok::<_, ReactionError>))
        .try_for_each_concurrent(INVENTORY_CONCURRENCY, |item| {
            decrement_line_item(state, id, item)
        })
        .await?;

    outbox::enqueue(
        state.store(),
        SideEffect::ShipmentCreate {
            order_id: OrderId::new(id),
            order: order.clone(),
        },
    )
    .await?;

    Ok(())
}

/// Clamp-decrement one product's inventory, at most once per
/// `{order, product}` pair.
async fn decrement_line_item(
    state: &AppState,
    order_id: &str,
    item: &CartItem,
) -> Result<(), ReactionError> {
    let product_id = item.item.id.as_str();
    let marker_id = format!("{order_id}:{product_id}");

    // Claim the dedup marker first: a replayed event finds it and skips.
    let marker = serde_json::json!({
        "orderId": order_id,
        "productId": product_id,
        "quantity": item.quantity,
        "appliedAt": chrono::Utc::now(),
    });
    match state
        .store()
        .put_if_revision(collections::INVENTORY_DECREMENTS, &marker_id, marker, None)
        .await
    {
        Ok(_) => {}
        Err(StoreError::RevisionConflict { .. }) => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    let quantity = u64::from(item.quantity);
    let updated = occ_update(state.store(), collections::PRODUCTS, product_id, |body| {
        let current = body.get("inventory").and_then(Value::as_u64).unwrap_or(0);
        // Oversold orders floor at zero rather than going negative
        body["inventory"] = serde_json::json!(current.saturating_sub(quantity));
    })
    .await?;

    if !updated {
        // Referenced product no longer exists; the order stands as placed.
        warn!(order_id, product_id, "line item references missing product");
    }

    Ok(())
}
