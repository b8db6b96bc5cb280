//! Document-store schema migration.
//!
//! The store is one JSONB `documents` table; applying the schema is
//! idempotent (`CREATE TABLE IF NOT EXISTS`), so re-running `migrate` on
//! an existing database is safe.
//!
//! # Environment Variables
//!
//! - `CORALBAY_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL`
//!   connection string

use secrecy::SecretString;
use thiserror::Error;

use coralbay_reactors::store::postgres::{self, SCHEMA};

/// Errors from the migrate command.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Apply the document-store schema.
///
/// # Errors
///
/// Returns `MigrateError` if the database URL is absent or the schema
/// statements fail.
pub async fn run() -> Result<(), MigrateError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("CORALBAY_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrateError::MissingEnvVar("CORALBAY_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = postgres::create_pool(&SecretString::from(database_url)).await?;

    tracing::info!("Applying document-store schema...");
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    tracing::info!("Schema applied");
    Ok(())
}
