//! Durable side-effect outbox.
//!
//! Reactors do not call the search provider or shipping gateway inline.
//! They record the intended side effect as an `outbox` document next to
//! their primary writes, and the [`worker::OutboxWorker`] performs the
//! calls with retry and backoff, decoupled from the triggering event's
//! lifetime. A gateway outage delays mirroring and shipment creation; it
//! no longer loses them.

pub mod worker;

pub use worker::OutboxWorker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use coralbay_core::{Order, OrderId};

use crate::store::{DocumentStore, StoreResult, collections};

/// One recorded side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SideEffect {
    /// Mirror a document into a search index.
    IndexUpsert {
        index: String,
        object_id: String,
        body: Value,
    },
    /// Remove a document from a search index.
    IndexRemove { index: String, object_id: String },
    /// Create the remote shipment order for a paid order.
    ShipmentCreate { order_id: OrderId, order: Order },
    /// Cancel the remote shipment order for a deleted order.
    ShipmentCancel { order_id: OrderId },
}

/// Processing state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Awaiting execution (or re-execution after a failure).
    Pending,
    /// Exhausted its attempts; kept for operator inspection.
    Dead,
}

impl OutboxStatus {
    /// The store-level string value, usable in field queries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

/// An outbox document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    #[serde(flatten)]
    pub effect: SideEffect,
    pub status: OutboxStatus,
    pub attempts: u32,
    /// Earliest execution time, as unix seconds.
    #[serde(rename = "nextAttemptAt")]
    pub next_attempt_at: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// A fresh entry, due immediately.
    #[must_use]
    pub fn new(effect: SideEffect) -> Self {
        let now = Utc::now();
        Self {
            effect,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: now.timestamp(),
            created_at: now,
        }
    }
}

/// Record a side effect for the worker to perform.
///
/// # Errors
///
/// Returns the store error if the outbox write fails; callers treat that
/// like any other reaction failure (abort, rely on event redelivery).
pub async fn enqueue(store: &dyn DocumentStore, effect: SideEffect) -> StoreResult<String> {
    let entry = OutboxEntry::new(effect);
    let body = serde_json::to_value(&entry).map_err(|source| {
        crate::store::StoreError::Corrupt {
            collection: collections::OUTBOX.to_owned(),
            id: String::new(),
            source,
        }
    })?;
    store.add(collections::OUTBOX, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_enqueue_writes_pending_entry() {
        let store = MemoryStore::new();
        let id = enqueue(
            &store,
            SideEffect::IndexRemove {
                index: "orders".to_owned(),
                object_id: "o-1".to_owned(),
            },
        )
        .await
        .expect("enqueue");

        let entry: OutboxEntry = store
            .get(collections::OUTBOX, &id)
            .await
            .expect("get")
            .expect("present")
            .parse(collections::OUTBOX)
            .expect("parse");
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempts, 0);
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = OutboxEntry::new(SideEffect::ShipmentCancel {
            order_id: OrderId::new("o-9"),
        });
        let json = serde_json::to_value(&entry).expect("serialize");

        assert_eq!(json["kind"], "ShipmentCancel");
        assert_eq!(json["payload"]["order_id"], "o-9");
        assert_eq!(json["status"], "pending");

        let back: OutboxEntry = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, entry);
    }
}
