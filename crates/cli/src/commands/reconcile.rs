//! Saga reconciliation commands.
//!
//! Product provisioning is a multi-step saga with no atomic commit: the
//! store document exists before its remote gateway product and per-interval
//! prices do. A crash partway leaves the product marked
//! `provisioning: pending`. This command re-runs provisioning for every
//! such product; the operation is idempotent, creating only whatever is
//! still missing.

use thiserror::Error;

use coralbay_reactors::config::{ConfigError, ReactorConfig};
use coralbay_reactors::reactors::ReactionError;
use coralbay_reactors::reactors::products as product_reactions;
use coralbay_reactors::state::{AppState, StateError};
use coralbay_reactors::store::postgres;

/// Errors from reconciliation commands.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Reconciliation failed: {0}")]
    Reaction(#[from] ReactionError),
}

/// Complete remote provisioning for every pending product.
///
/// # Errors
///
/// Returns `ReconcileError` if configuration, the database, or the
/// pending-product scan fails. Individual products that still cannot be
/// provisioned are logged and left pending.
pub async fn products() -> Result<(), ReconcileError> {
    let config = ReactorConfig::from_env()?;
    let pool = postgres::create_pool(&config.database_url).await?;
    let state = AppState::from_config(config, pool)?;

    tracing::info!("Scanning for partially provisioned products...");
    let completed = product_reactions::reconcile(&state).await?;

    tracing::info!(completed, "reconciliation pass finished");
    Ok(())
}
