//! Inbound webhook endpoints.
//!
//! Both webhooks collapse every failure into a bodyless 400: the senders
//! retry on non-2xx and nothing else, so there is no point distinguishing
//! causes on the wire. Causes land in logs instead.
//!
//! The payment webhook is signature-verified before anything is read or
//! written. The shipping gateway offers no signatures; that endpoint's
//! only guards are the `resource_type` gate and the detail-fetch host
//! allowlist in the shipping client.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Json, Router, routing::post};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use coralbay_core::ShipmentStatus;

use crate::error::AppError;
use crate::payments::webhook::{self, INVOICE_PAYMENT_SUCCEEDED};
use crate::reactors::subscription;
use crate::shipping::SHIP_NOTIFY;
use crate::state::AppState;
use crate::store::collections;

/// Header carrying the payment webhook signature.
pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payment", post(payment_webhook))
        .route("/shipment", post(shipment_webhook))
}

/// Payment gateway webhook: signature required.
#[instrument(skip_all)]
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match handle_payment_event(&state, &headers, &body).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "payment webhook rejected");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn handle_payment_event(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), AppError> {
    let signature = headers
        .get(PAYMENT_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    // Verification is the sole authentication for this endpoint; nothing
    // below runs for a delivery that fails it.
    let event = webhook::verify_and_parse(body, signature, &state.config().payment.webhook_secret)?;

    if event.event_type == INVOICE_PAYMENT_SUCCEEDED {
        subscription::on_invoice_payment_succeeded(state, &event).await?;
    } else {
        info!(event_type = %event.event_type, "ignoring payment event");
    }

    Ok(())
}

/// Shipping gateway webhook: unauthenticated ship-notify deliveries.
#[instrument(skip_all)]
async fn shipment_webhook(State(state): State<AppState>, Json(body): Json<Value>) -> StatusCode {
    match handle_shipment_notify(&state, &body).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "shipment webhook rejected");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn handle_shipment_notify(state: &AppState, body: &Value) -> Result<(), AppError> {
    if body.get("resource_type").and_then(Value::as_str) != Some(SHIP_NOTIFY) {
        // Other notification kinds are acknowledged and ignored.
        return Ok(());
    }

    let resource_url = body
        .get("resource_url")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("ship notify without resource_url".to_owned()))?;

    let detail = state.shipping().fetch_shipment_detail(resource_url).await?;
    let order_id = detail.order_key;

    // Unknown order ids are a no-op, not an error: the shipment may belong
    // to an order deleted since.
    if state
        .store()
        .get(collections::ORDERS, order_id.as_str())
        .await?
        .is_some()
    {
        state
            .store()
            .merge(
                collections::ORDERS,
                order_id.as_str(),
                serde_json::json!({
                    "shipmentStatus": ShipmentStatus::Shipped,
                    "updatedAt": Utc::now(),
                }),
            )
            .await?;
        info!(order_id = %order_id, "order marked shipped");
    }

    Ok(())
}
