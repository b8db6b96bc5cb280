//! PostgreSQL document store backend.
//!
//! Collections live in a single `documents` table: `(collection, id)`
//! primary key, JSONB body, and a `revision` counter bumped on every write.
//! Conditional writes compare-and-swap on `revision`, which is what the
//! counter engine's optimistic concurrency rides on.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{DocumentStore, Revision, StoreError, StoreResult, StoredDocument};

/// Schema for the document store, applied by `coralbay-cli migrate`.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT   NOT NULL,
    id         TEXT   NOT NULL,
    body       JSONB  NOT NULL,
    revision   BIGINT NOT NULL DEFAULT 1,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_body ON documents USING GIN (body jsonb_path_ops);
";

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Document store backed by a `PostgreSQL` JSONB table.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (health checks).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<StoredDocument, sqlx::Error> {
    Ok(StoredDocument {
        id: row.try_get("id")?,
        body: row.try_get("body")?,
        revision: row.try_get("revision")?,
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, body, revision FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose().map_err(Into::into)
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<Revision> {
        let row = sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)
             ON CONFLICT (collection, id)
             DO UPDATE SET body = EXCLUDED.body, revision = documents.revision + 1
             RETURNING revision",
        )
        .bind(collection)
        .bind(id)
        .bind(&body)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("revision")?)
    }

    async fn put_if_revision(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision> {
        let row = match expected {
            Some(revision) => {
                sqlx::query(
                    "UPDATE documents
                     SET body = $3, revision = revision + 1
                     WHERE collection = $1 AND id = $2 AND revision = $4
                     RETURNING revision",
                )
                .bind(collection)
                .bind(id)
                .bind(&body)
                .bind(revision)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)
                     ON CONFLICT (collection, id) DO NOTHING
                     RETURNING revision",
                )
                .bind(collection)
                .bind(id)
                .bind(&body)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => Ok(row.try_get("revision")?),
            None => Err(StoreError::RevisionConflict {
                collection: collection.to_owned(),
                id: id.to_owned(),
            }),
        }
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> StoreResult<Revision> {
        if !fields.is_object() {
            return Err(StoreError::InvalidMerge {
                collection: collection.to_owned(),
                id: id.to_owned(),
            });
        }

        // JSONB || is a shallow merge, matching the in-memory backend.
        let row = sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)
             ON CONFLICT (collection, id)
             DO UPDATE SET body = documents.body || EXCLUDED.body,
                           revision = documents.revision + 1
             RETURNING revision",
        )
        .bind(collection)
        .bind(id)
        .bind(&fields)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("revision")?)
    }

    async fn add(&self, collection: &str, body: Value) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.put(collection, &id, body).await?;
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, body, revision FROM documents
             WHERE collection = $1 AND body ->> $2 = $3",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(row_to_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<StoredDocument>> {
        let rows =
            sqlx::query("SELECT id, body, revision FROM documents WHERE collection = $1")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(row_to_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
