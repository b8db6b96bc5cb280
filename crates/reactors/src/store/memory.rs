//! In-memory document store.
//!
//! Implements [`DocumentStore`] over a `HashMap`, useful for tests and
//! local development where persistence is not required. Revision numbers
//! behave exactly like the Postgres backend's, so optimistic-concurrency
//! paths can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    DocumentStore, Revision, StoreError, StoreResult, StoredDocument, merge_objects,
};

type Key = (String, String);

/// Thread-safe in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<HashMap<Key, (Value, Revision)>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(collection: &str, id: &str) -> Key {
        (collection.to_owned(), id.to_owned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let documents = self.documents.read().expect("RwLock poisoned");
        Ok(documents
            .get(&Self::key(collection, id))
            .map(|(body, revision)| StoredDocument {
                id: id.to_owned(),
                body: body.clone(),
                revision: *revision,
            }))
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<Revision> {
        let mut documents = self.documents.write().expect("RwLock poisoned");
        let entry = documents
            .entry(Self::key(collection, id))
            .or_insert((Value::Null, 0));
        entry.0 = body;
        entry.1 += 1;
        Ok(entry.1)
    }

    async fn put_if_revision(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision> {
        let mut documents = self.documents.write().expect("RwLock poisoned");
        let key = Self::key(collection, id);
        let current = documents.get(&key).map(|(_, revision)| *revision);

        if current != expected {
            return Err(StoreError::RevisionConflict {
                collection: collection.to_owned(),
                id: id.to_owned(),
            });
        }

        let next = current.unwrap_or(0) + 1;
        documents.insert(key, (body, next));
        Ok(next)
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> StoreResult<Revision> {
        let mut documents = self.documents.write().expect("RwLock poisoned");
        let entry = documents
            .entry(Self::key(collection, id))
            .or_insert((Value::Object(serde_json::Map::new()), 0));

        if !merge_objects(&mut entry.0, &fields) {
            return Err(StoreError::InvalidMerge {
                collection: collection.to_owned(),
                id: id.to_owned(),
            });
        }
        entry.1 += 1;
        Ok(entry.1)
    }

    async fn add(&self, collection: &str, body: Value) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.put(collection, &id, body).await?;
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut documents = self.documents.write().expect("RwLock poisoned");
        documents.remove(&Self::key(collection, id));
        Ok(())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<StoredDocument>> {
        let documents = self.documents.read().expect("RwLock poisoned");
        Ok(documents
            .iter()
            .filter(|((coll, _), _)| coll == collection)
            .filter(|(_, (body, _))| {
                body.get(field).and_then(Value::as_str) == Some(value)
            })
            .map(|((_, id), (body, revision))| StoredDocument {
                id: id.clone(),
                body: body.clone(),
                revision: *revision,
            })
            .collect())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<StoredDocument>> {
        let documents = self.documents.read().expect("RwLock poisoned");
        Ok(documents
            .iter()
            .filter(|((coll, _), _)| coll == collection)
            .map(|((_, id), (body, revision))| StoredDocument {
                id: id.clone(),
                body: body.clone(),
                revision: *revision,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collections;

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let store = MemoryStore::new();
        let body = serde_json::json!({"title": "Canvas Sneaker"});

        let revision = store
            .put(collections::PRODUCTS, "p1", body.clone())
            .await
            .expect("put");
        assert_eq!(revision, 1);

        let doc = store
            .get(collections::PRODUCTS, "p1")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(doc.body, body);
        assert_eq!(doc.revision, 1);
    }

    #[tokio::test]
    async fn test_put_if_revision_detects_conflicts() {
        let store = MemoryStore::new();

        // Create-if-absent succeeds once
        store
            .put_if_revision(collections::PRODUCT_COUNTS, "counts", serde_json::json!({}), None)
            .await
            .expect("first create");
        let err = store
            .put_if_revision(collections::PRODUCT_COUNTS, "counts", serde_json::json!({}), None)
            .await
            .expect_err("second create must conflict");
        assert!(matches!(err, StoreError::RevisionConflict { .. }));

        // Stale revision loses
        let err = store
            .put_if_revision(
                collections::PRODUCT_COUNTS,
                "counts",
                serde_json::json!({}),
                Some(99),
            )
            .await
            .expect_err("stale revision must conflict");
        assert!(matches!(err, StoreError::RevisionConflict { .. }));

        // Matching revision wins and bumps
        let revision = store
            .put_if_revision(
                collections::PRODUCT_COUNTS,
                "counts",
                serde_json::json!({"All": 1}),
                Some(1),
            )
            .await
            .expect("matching revision");
        assert_eq!(revision, 2);
    }

    #[tokio::test]
    async fn test_merge_creates_and_overlays() {
        let store = MemoryStore::new();
        store
            .merge(collections::PRODUCTS, "p1", serde_json::json!({"inventory": 5}))
            .await
            .expect("merge-create");
        store
            .merge(
                collections::PRODUCTS,
                "p1",
                serde_json::json!({"inventory": 3, "title": "Belt"}),
            )
            .await
            .expect("merge-update");

        let doc = store
            .get(collections::PRODUCTS, "p1")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(doc.body, serde_json::json!({"inventory": 3, "title": "Belt"}));
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let store = MemoryStore::new();
        store
            .put(
                collections::ORDERS,
                "o1",
                serde_json::json!({"subscriptionId": "sub_1"}),
            )
            .await
            .expect("put o1");
        store
            .put(
                collections::ORDERS,
                "o2",
                serde_json::json!({"subscriptionId": "sub_2"}),
            )
            .await
            .expect("put o2");

        let hits = store
            .find_by_field(collections::ORDERS, "subscriptionId", "sub_1")
            .await
            .expect("find");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.first().map(|d| d.id.as_str()), Some("o1"));
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = MemoryStore::new();
        store
            .delete(collections::ORDERS, "missing")
            .await
            .expect("delete absent");
    }
}
