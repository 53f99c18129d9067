//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! shopsync migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPSYNC_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! Migrations live in `crates/engine/migrations/` and create the `sync`
//! schema: stores, products, variants, customers, orders, order items and
//! the lock table.

use shopsync_engine::EngineConfig;
use shopsync_engine::db;

use super::{CliError, connect};

/// Run the engine's database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run(config: &EngineConfig) -> Result<(), CliError> {
    let pool = connect(config).await?;

    tracing::info!("Running sync migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Sync migrations complete!");
    Ok(())
}
