//! CLI subcommands and the wiring they share.

pub mod migrate;
pub mod purge;
pub mod sync;
pub mod unlock;
pub mod update_stores;

use std::sync::Arc;

use shopsync_engine::config::{ConfigError, LockBackend};
use shopsync_engine::db::{self, PgLockStore};
use shopsync_engine::shopify::{ShopifyClient, ShopifyError};
use shopsync_engine::sync::{LockError, LockStore, LogEvents, MemoryLockStore};
use shopsync_engine::{EngineConfig, Repositories, SyncContext, SyncError};
use sqlx::PgPool;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Shopify client error: {0}")]
    Remote(#[from] ShopifyError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Could not encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Connect to the database.
async fn connect(config: &EngineConfig) -> Result<PgPool, CliError> {
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok(pool)
}

/// Lock store for the configured backend.
fn lock_store(config: &EngineConfig, pool: &PgPool) -> Arc<dyn LockStore> {
    match config.lock_backend {
        LockBackend::Postgres => Arc::new(PgLockStore::new(pool.clone())),
        LockBackend::Memory => Arc::new(MemoryLockStore::new()),
    }
}

/// Build the sync context used by every sync-related command.
fn context(config: &EngineConfig, pool: &PgPool) -> Result<SyncContext, CliError> {
    let api = ShopifyClient::new(&config.shopify)?;
    Ok(SyncContext::new(
        config.sync.clone(),
        Arc::new(api),
        Repositories::postgres(pool),
        lock_store(config, pool),
        Arc::new(LogEvents),
    ))
}

/// Print a command result as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{out}");
    }
    Ok(())
}
