//! Background outbox processor.
//!
//! Claims due entries with a conditional write (so concurrent workers
//! cannot double-run one), executes the side effect, and either deletes
//! the entry or reschedules it with exponential backoff plus jitter.
//! After the attempt budget is spent the entry is parked as `dead` for
//! operator inspection rather than looping forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{OutboxEntry, OutboxStatus, SideEffect};
use crate::search::{SearchError, SearchIndex};
use crate::shipping::{ShippingError, ShippingGateway};
use crate::store::{DocumentStore, StoreError, StoreResult, StoredDocument, collections};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_CONCURRENCY: usize = 4;
const MAX_ATTEMPTS: u32 = 8;
const MAX_BACKOFF_SECS: i64 = 3600;

/// A side effect that failed to execute.
#[derive(Debug, Error)]
enum EffectError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Shipping(#[from] ShippingError),
}

/// Executes recorded side effects against the external providers.
pub struct OutboxWorker {
    store: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchIndex>,
    shipping: Arc<dyn ShippingGateway>,
}

impl OutboxWorker {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndex>,
        shipping: Arc<dyn ShippingGateway>,
    ) -> Self {
        Self {
            store,
            search,
            shipping,
        }
    }

    /// Spawn the polling loop as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        info!("Spawning outbox worker");
        tokio::spawn(async move {
            loop {
                match self.drain_due().await {
                    Ok(0) => {}
                    Ok(processed) => debug!(processed, "outbox entries executed"),
                    Err(err) => error!(error = %err, "outbox scan failed"),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
    }

    /// Execute every due entry once. Returns how many succeeded.
    ///
    /// # Errors
    ///
    /// Returns the store error if the due-entry scan itself fails;
    /// per-entry failures are rescheduled, not surfaced.
    pub async fn drain_due(&self) -> StoreResult<usize> {
        let now = Utc::now().timestamp();
        let due: Vec<StoredDocument> = self
            .store
            .find_by_field(
                collections::OUTBOX,
                "status",
                OutboxStatus::Pending.as_str(),
            )
            .await?
            .into_iter()
            .filter(|doc| {
                doc.body
                    .get("nextAttemptAt")
                    .and_then(serde_json::Value::as_i64)
                    .is_some_and(|at| at <= now)
            })
            .collect();

        let results = stream::iter(due)
            .map(|doc| self.process(doc))
            .buffer_unordered(MAX_CONCURRENCY)
            .collect::<Vec<bool>>()
            .await;

        Ok(results.into_iter().filter(|done| *done).count())
    }

    /// Claim and execute one entry. Returns whether the effect completed.
    async fn process(&self, doc: StoredDocument) -> bool {
        let entry: Result<OutboxEntry, _> = doc.parse(collections::OUTBOX);
        let Ok(mut entry) = entry else {
            warn!(id = %doc.id, "unreadable outbox entry, parking as dead");
            let _ = self
                .store
                .merge(
                    collections::OUTBOX,
                    &doc.id,
                    serde_json::json!({ "status": OutboxStatus::Dead }),
                )
                .await;
            return false;
        };

        // Claim by bumping the attempt count against the read revision; a
        // conflict means another worker already has this entry.
        entry.attempts += 1;
        let Ok(claimed) = serde_json::to_value(&entry) else {
            return false;
        };
        match self
            .store
            .put_if_revision(collections::OUTBOX, &doc.id, claimed, Some(doc.revision))
            .await
        {
            Ok(_) => {}
            Err(StoreError::RevisionConflict { .. }) => return false,
            Err(err) => {
                warn!(id = %doc.id, error = %err, "outbox claim failed");
                return false;
            }
        }

        match self.execute(&entry.effect).await {
            Ok(()) => {
                if let Err(err) = self.store.delete(collections::OUTBOX, &doc.id).await {
                    // The effect ran; a redelivery here re-runs an idempotent
                    // upsert/remove or re-submits a keyed shipment order.
                    warn!(id = %doc.id, error = %err, "completed outbox entry not deleted");
                }
                true
            }
            Err(err) => {
                let dead = entry.attempts >= MAX_ATTEMPTS;
                warn!(
                    id = %doc.id,
                    attempts = entry.attempts,
                    dead,
                    error = %err,
                    "outbox side effect failed"
                );
                let status = if dead {
                    OutboxStatus::Dead
                } else {
                    OutboxStatus::Pending
                };
                let _ = self
                    .store
                    .merge(
                        collections::OUTBOX,
                        &doc.id,
                        serde_json::json!({
                            "status": status,
                            "nextAttemptAt":
                                Utc::now().timestamp() + backoff_secs(entry.attempts),
                        }),
                    )
                    .await;
                false
            }
        }
    }

    async fn execute(&self, effect: &SideEffect) -> Result<(), EffectError> {
        match effect {
            SideEffect::IndexUpsert {
                index,
                object_id,
                body,
            } => self.search.upsert(index, object_id, body).await?,
            SideEffect::IndexRemove { index, object_id } => {
                self.search.remove(index, object_id).await?;
            }
            SideEffect::ShipmentCreate { order_id, order } => {
                self.shipping.create_shipment(order_id, order).await?;
            }
            SideEffect::ShipmentCancel { order_id } => {
                self.shipping.cancel_shipment(order_id).await?;
            }
        }
        Ok(())
    }
}

/// Exponential backoff with up to 25% jitter.
fn backoff_secs(attempts: u32) -> i64 {
    let base = 2_i64
        .saturating_pow(attempts.min(11))
        .min(MAX_BACKOFF_SECS);
    let jitter = rand::rng().random_range(0..=(base / 4).max(1));
    base + jitter
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::store::memory::MemoryStore;
    use coralbay_core::{Order, OrderId};

    /// Search fake that records upserts and can be made to fail.
    #[derive(Default)]
    struct RecordingSearch {
        fail: bool,
        upserts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SearchIndex for RecordingSearch {
        async fn upsert(
            &self,
            index: &str,
            object_id: &str,
            _body: &Value,
        ) -> Result<(), SearchError> {
            if self.fail {
                return Err(SearchError::Api {
                    status: 503,
                    message: "down".to_owned(),
                });
            }
            self.upserts
                .lock()
                .expect("mutex")
                .push((index.to_owned(), object_id.to_owned()));
            Ok(())
        }

        async fn remove(&self, _index: &str, _object_id: &str) -> Result<(), SearchError> {
            Ok(())
        }
    }

    struct NoopShipping;

    #[async_trait]
    impl ShippingGateway for NoopShipping {
        async fn create_shipment(
            &self,
            _order_id: &OrderId,
            _order: &Order,
        ) -> Result<(), ShippingError> {
            Ok(())
        }

        async fn cancel_shipment(&self, _order_id: &OrderId) -> Result<(), ShippingError> {
            Ok(())
        }

        async fn fetch_shipment_detail(
            &self,
            _resource_url: &str,
        ) -> Result<crate::shipping::ShipmentDetail, ShippingError> {
            Err(ShippingError::ForeignResourceUrl("unused".to_owned()))
        }
    }

    fn worker(store: &MemoryStore, search: Arc<RecordingSearch>) -> OutboxWorker {
        OutboxWorker::new(Arc::new(store.clone()), search, Arc::new(NoopShipping))
    }

    async fn enqueue_upsert(store: &MemoryStore) -> String {
        super::super::enqueue(
            store,
            SideEffect::IndexUpsert {
                index: "products".to_owned(),
                object_id: "p-1".to_owned(),
                body: serde_json::json!({"title": "Belt"}),
            },
        )
        .await
        .expect("enqueue")
    }

    #[tokio::test]
    async fn test_successful_effect_is_executed_and_deleted() {
        let store = MemoryStore::new();
        let search = Arc::new(RecordingSearch::default());
        let id = enqueue_upsert(&store).await;

        let processed = worker(&store, search.clone())
            .drain_due()
            .await
            .expect("drain");

        assert_eq!(processed, 1);
        assert_eq!(
            *search.upserts.lock().expect("mutex"),
            vec![("products".to_owned(), "p-1".to_owned())]
        );
        assert!(
            store
                .get(collections::OUTBOX, &id)
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_effect_is_rescheduled_with_backoff() {
        let store = MemoryStore::new();
        let search = Arc::new(RecordingSearch {
            fail: true,
            ..Default::default()
        });
        let id = enqueue_upsert(&store).await;

        let before = Utc::now().timestamp();
        let processed = worker(&store, search).drain_due().await.expect("drain");
        assert_eq!(processed, 0);

        let entry: OutboxEntry = store
            .get(collections::OUTBOX, &id)
            .await
            .expect("get")
            .expect("still present")
            .parse(collections::OUTBOX)
            .expect("parse");
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempts, 1);
        assert!(entry.next_attempt_at > before);
    }

    #[tokio::test]
    async fn test_exhausted_entry_parks_as_dead() {
        let store = MemoryStore::new();
        let search = Arc::new(RecordingSearch {
            fail: true,
            ..Default::default()
        });
        let id = enqueue_upsert(&store).await;

        // Force the entry to its final attempt
        store
            .merge(
                collections::OUTBOX,
                &id,
                serde_json::json!({ "attempts": MAX_ATTEMPTS - 1 }),
            )
            .await
            .expect("merge");

        worker(&store, search).drain_due().await.expect("drain");

        let entry: OutboxEntry = store
            .get(collections::OUTBOX, &id)
            .await
            .expect("get")
            .expect("present")
            .parse(collections::OUTBOX)
            .expect("parse");
        assert_eq!(entry.status, OutboxStatus::Dead);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert!(backoff_secs(1) >= 2);
        assert!(backoff_secs(5) >= 32);
        assert!(backoff_secs(30) <= MAX_BACKOFF_SECS + MAX_BACKOFF_SECS / 4);
    }
}
