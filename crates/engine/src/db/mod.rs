//! `PostgreSQL` persistence for imported entities.
//!
//! # Schema: `sync`
//!
//! ## Tables
//!
//! - `stores` - Installed shops and their per-family watermarks
//! - `products` / `variants` - Catalog, soft-deleted rather than removed
//! - `customers` - Derived from order payloads
//! - `orders` / `order_items` - Orders with refund-adjusted line items
//! - `sync_locks` - Expiring per-store, per-family locks
//!
//! Every imported table is unique on `(store, remote id)`; a duplicate insert
//! surfaces as [`RepositoryError::Conflict`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/engine/migrations/` and run via:
//! ```bash
//! cargo run -p shopsync-cli -- migrate
//! ```

pub mod locks;
pub mod orders;
pub mod products;
pub mod stores;

use std::time::Duration;

use secrecy::ExposeSecret;
use shopsync_core::{StoreId, StoreOwner, StoreType};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use locks::PgLockStore;
pub use orders::PgOrderRepository;
pub use products::PgProductRepository;
pub use stores::PgStoreRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Unique-key violation (the row was already imported).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error
            && db.is_unique_violation()
        {
            return Self::Conflict(db.constraint().unwrap_or_else(|| db.message()).to_string());
        }
        Self::Database(error)
    }
}

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

/// Apply the engine's migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

fn owner_from_row(store_type: &str, store_id: StoreId) -> Result<StoreOwner, RepositoryError> {
    let store_type: StoreType = store_type
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid store type: {e}")))?;
    Ok(StoreOwner::new(store_type, store_id))
}
