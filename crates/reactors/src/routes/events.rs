//! Change-stream event intake.
//!
//! The primary store's change-notification mechanism pushes one event per
//! document change: the collection, the document id, and before/after
//! snapshots. Delivery is at-least-once with no ordering guarantee, so
//! every reaction downstream is written to tolerate replays. Pushes carry
//! a shared-secret header; anything else is rejected before dispatch.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Router, routing::post};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::reactors::{orders, products, users};
use crate::state::AppState;
use crate::store::collections;

/// Header carrying the change-stream push secret.
pub const EVENTS_TOKEN_HEADER: &str = "x-events-token";

/// What happened to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One document-change event.
#[derive(Debug, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// The changed document's id.
    pub id: String,
    /// Snapshot before the change (absent on creation).
    pub before: Option<Value>,
    /// Snapshot after the change (absent on deletion).
    pub after: Option<Value>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/{collection}", post(handle_event))
}

/// Dispatch one change event to its collection's reactor.
#[instrument(skip(state, headers, event), fields(collection = %collection, kind = ?event.kind, id = %event.id))]
async fn handle_event(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(event): Json<ChangeEvent>,
) -> Result<StatusCode> {
    let presented = headers
        .get(EVENTS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::AuthenticationRequired)?;
    if presented != state.config().events_token.expose_secret() {
        return Err(AppError::AuthenticationRequired);
    }

    match (collection.as_str(), event.kind) {
        (collections::USERS, ChangeKind::Created) => {
            users::on_user_created(&state, &event.id, after(&event)?).await?;
        }
        (collections::USERS, ChangeKind::Updated) => {
            users::on_user_updated(&state, &event.id, after(&event)?).await?;
        }
        (collections::USERS, ChangeKind::Deleted) => {
            users::on_user_deleted(&state, &event.id).await?;
        }
        (collections::PRODUCTS, ChangeKind::Created) => {
            products::on_product_created(&state, &event.id, after(&event)?).await?;
        }
        (collections::PRODUCTS, ChangeKind::Updated) => {
            products::on_product_updated(&state, &event.id, before(&event)?, after(&event)?)
                .await?;
        }
        (collections::PRODUCTS, ChangeKind::Deleted) => {
            products::on_product_deleted(&state, &event.id, before(&event)?).await?;
        }
        (collections::ORDERS, ChangeKind::Created) => {
            orders::on_order_created(&state, &event.id, after(&event)?).await?;
        }
        (collections::ORDERS, ChangeKind::Updated) => {
            orders::on_order_updated(&state, &event.id, before(&event)?, after(&event)?).await?;
        }
        (collections::ORDERS, ChangeKind::Deleted) => {
            orders::on_order_deleted(&state, &event.id).await?;
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "no reactor for collection {collection}"
            )));
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

fn after(event: &ChangeEvent) -> Result<&Value> {
    event
        .after
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("event missing after snapshot".to_owned()))
}

fn before(event: &ChangeEvent) -> Result<&Value> {
    event
        .before
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("event missing before snapshot".to_owned()))
}
