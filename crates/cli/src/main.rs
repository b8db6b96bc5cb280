//! Coral Bay CLI - Document-store schema and reconciliation tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply the document-store schema
//! coralbay-cli migrate
//!
//! # Finish provisioning for partially provisioned products
//! coralbay-cli reconcile products
//! ```
//!
//! # Commands
//!
//! - `migrate` - Apply the document-store schema
//! - `reconcile products` - Re-run remote provisioning for every product
//!   still marked `provisioning: pending`

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "coralbay-cli")]
#[command(author, version, about = "Coral Bay CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the document-store schema
    Migrate,
    /// Re-run incomplete cross-service sagas
    Reconcile {
        #[command(subcommand)]
        target: ReconcileTarget,
    },
}

#[derive(Subcommand)]
enum ReconcileTarget {
    /// Complete remote provisioning for pending products
    Products,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coralbay_cli=info,coralbay_reactors=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Migrate => commands::migrate::run().await.map_err(Into::into),
        Commands::Reconcile {
            target: ReconcileTarget::Products,
        } => commands::reconcile::products().await.map_err(Into::into),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            std::process::ExitCode::FAILURE
        }
    }
}
