//! Primary document store access.
//!
//! The store is a set of named collections of JSON documents keyed by
//! opaque string ids. Writes are either full replacements, shallow merges,
//! or revision-conditional replacements; the conditional form is what the
//! counter engine and outbox worker build their optimistic concurrency on.
//!
//! Two backends implement the [`DocumentStore`] trait:
//! - [`postgres::PgDocumentStore`] - production, one JSONB `documents` table
//! - [`memory::MemoryStore`] - tests and local development

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Well-known collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PRODUCTS: &str = "products";
    pub const ORDERS: &str = "orders";
    pub const PRODUCT_COUNTS: &str = "product-counts";
    pub const ORDER_COUNTS: &str = "order-counts";
    pub const USER_COUNTS: &str = "user-counts";
    pub const OUTBOX: &str = "outbox";
    pub const INVENTORY_DECREMENTS: &str = "inventory-decrements";

    /// The singleton document id used by every counts collection.
    pub const COUNTS_DOC: &str = "counts";
}

/// Monotonic per-document revision, bumped on every write.
pub type Revision = i64;

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub body: Value,
    pub revision: Revision,
}

impl StoredDocument {
    /// Deserialize the body into a typed document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the body does not match the type.
    pub fn parse<T: DeserializeOwned>(&self, collection: &str) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|source| StoreError::Corrupt {
            collection: collection.to_owned(),
            id: self.id.clone(),
            source,
        })
    }
}

/// Errors that can occur talking to the primary store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost the race.
    #[error("revision conflict on {collection}/{id}")]
    RevisionConflict { collection: String, id: String },

    /// A document body did not deserialize into its expected shape.
    #[error("corrupt document {collection}/{id}: {source}")]
    Corrupt {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A merge was attempted with a non-object fields value.
    #[error("merge into {collection}/{id} requires a JSON object")]
    InvalidMerge { collection: String, id: String },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Backend-independent access to the primary document store.
///
/// All operations address a `(collection, id)` pair. Reads of absent
/// documents return `Ok(None)` rather than an error - the reactors treat
/// missing documents as silent no-ops throughout.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>>;

    /// Create or fully replace a document unconditionally.
    async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<Revision>;

    /// Create or replace only when the current revision matches
    /// `expected`; `None` means the document must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RevisionConflict`] when another writer got
    /// there first.
    async fn put_if_revision(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision>;

    /// Shallow-merge `fields` into a document, creating it when absent.
    /// Top-level keys overwrite; nested objects are replaced wholesale.
    async fn merge(&self, collection: &str, id: &str, fields: Value) -> StoreResult<Revision>;

    /// Insert a new document under a generated id; returns the id.
    async fn add(&self, collection: &str, body: Value) -> StoreResult<String>;

    /// Delete a document. Deleting an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Documents whose `field` (a top-level string field) equals `value`.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<StoredDocument>>;

    /// Every document in a collection, unordered.
    async fn list(&self, collection: &str) -> StoreResult<Vec<StoredDocument>>;
}

/// Shallow-merge `fields` into `body` in place (top-level keys overwrite).
///
/// Shared by both backends so merge semantics cannot drift between them.
pub(crate) fn merge_objects(body: &mut Value, fields: &Value) -> bool {
    let (Some(target), Some(incoming)) = (body.as_object_mut(), fields.as_object()) else {
        return false;
    };
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_objects_overwrites_top_level() {
        let mut body = serde_json::json!({"a": 1, "b": {"x": 1}});
        let ok = merge_objects(&mut body, &serde_json::json!({"b": {"y": 2}, "c": 3}));
        assert!(ok);
        // Nested objects are replaced, not deep-merged
        assert_eq!(body, serde_json::json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn test_merge_objects_rejects_non_objects() {
        let mut body = serde_json::json!({"a": 1});
        assert!(!merge_objects(&mut body, &serde_json::json!(42)));
        assert_eq!(body, serde_json::json!({"a": 1}));
    }
}
