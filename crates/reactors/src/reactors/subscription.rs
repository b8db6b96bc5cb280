//! Subscription renewal reactor.
//!
//! Reacts to verified `invoice.payment_succeeded` events. Each matching
//! order still in `shipmentStatus: New` is marked paid-and-preparing with
//! the actually charged amount, and a successor order for the next billing
//! period is created in `New`/`Processing` - the chain always leaves one
//! live order waiting on its own future payment event. The per-order
//! update and the successor creation are two separate writes, not one
//! atomic commit.

use chrono::Utc;
use futures::stream::{self, TryStreamExt};
use tracing::{info, instrument};

use coralbay_core::{Order, PaymentStatus, ShipmentStatus, from_minor_units};

use crate::payments::webhook::WebhookEvent;
use crate::payments::{PaymentIntent, SubscriptionPeriod};
use crate::state::AppState;
use crate::store::{StoredDocument, collections};

use super::ReactionError;

/// How many matching orders renew at once.
const RENEWAL_CONCURRENCY: usize = 4;

/// Roll every matching order forward for a paid invoice.
#[instrument(skip(state, event))]
pub async fn on_invoice_payment_succeeded(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), ReactionError> {
    let subscription = event
        .subscription_id()
        .ok_or_else(|| ReactionError::MalformedEvent("invoice without subscription".to_owned()))?;
    let intent_id = event.payment_intent_id().ok_or_else(|| {
        ReactionError::MalformedEvent("invoice without payment intent".to_owned())
    })?;

    // The payment method that settled the first invoice becomes the
    // subscription's default; an intent without one is a hard failure
    // before any state is touched.
    let intent = state.payments().retrieve_payment_intent(&intent_id).await?;
    let payment_method = intent
        .payment_method
        .clone()
        .ok_or(ReactionError::MissingPaymentMethod)?;

    let period = state
        .payments()
        .set_subscription_payment_method(&subscription, &payment_method)
        .await?;

    let matching = state
        .store()
        .find_by_field(
            collections::ORDERS,
            "subscriptionId",
            subscription.as_str(),
        )
        .await?;

    stream::iter(matching.into_iter().map(Ok::<_, ReactionError>))
        .try_for_each_concurrent(RENEWAL_CONCURRENCY, |doc| {
            renew_order(state, doc, &intent, period)
        })
        .await
}

/// Mark one order paid and create its successor for the next period.
async fn renew_order(
    state: &AppState,
    doc: StoredDocument,
    intent: &PaymentIntent,
    period: SubscriptionPeriod,
) -> Result<(), ReactionError> {
    let order: Order = doc.parse(collections::ORDERS)?;

    // Only the live order of the chain renews; already-fulfilled orders
    // from earlier periods match the query too and are left alone.
    if order.shipment_status != Some(ShipmentStatus::New) {
        return Ok(());
    }

    state
        .store()
        .merge(
            collections::ORDERS,
            &doc.id,
            serde_json::json!({
                // The actually charged amount, not the stored estimate
                "amount": from_minor_units(intent.amount_received),
                "paymentStatus": PaymentStatus::Success,
                "shipmentStatus": ShipmentStatus::Preparing,
                "subscriptionStartDate": period.current_period_start,
                "updatedAt": Utc::now(),
            }),
        )
        .await?;

    let successor = Order {
        items: order.items.clone(),
        amount: order.amount,
        total_quantity: order.total_quantity,
        shipping_address: order.shipping_address.clone(),
        user: order.user.clone(),
        payment_status: Some(PaymentStatus::Processing),
        payment_type: order.payment_type,
        subscription_id: order.subscription_id.clone(),
        shipment_status: Some(ShipmentStatus::New),
        subscription_start_date: Some(period.current_period_end),
        created_at: Some(Utc::now()),
        updated_at: None,
    };

    let successor_id = state
        .store()
        .add(collections::ORDERS, serde_json::to_value(&successor)?)
        .await?;

    info!(
        renewed = %doc.id,
        successor = %successor_id,
        "subscription order rolled into next period"
    );
    Ok(())
}
