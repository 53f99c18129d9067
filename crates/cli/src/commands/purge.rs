//! Purge command.
//!
//! # Usage
//!
//! ```bash
//! # Drop a store's orders and customers, keeping its catalog
//! shopsync purge --store-id 3 --entities orders,customers
//!
//! # Drop everything, including the store row
//! shopsync purge --store-id 3
//! ```

use shopsync_core::StoreId;
use shopsync_engine::EngineConfig;
use shopsync_engine::models::PurgeTarget;
use shopsync_engine::sync::purge_store;

use super::{CliError, connect, context, print_json};

/// Purge the chosen entity groups of one store.
///
/// An empty `targets` list purges everything.
///
/// # Errors
///
/// Returns an error if the store does not exist or the purge fails.
pub async fn run(
    config: &EngineConfig,
    store_id: StoreId,
    targets: &[PurgeTarget],
) -> Result<(), CliError> {
    let targets = if targets.is_empty() {
        PurgeTarget::ALL.as_slice()
    } else {
        targets
    };

    let pool = connect(config).await?;
    let ctx = context(config, &pool)?;

    tracing::info!(%store_id, ?targets, "Purging store...");
    let report = purge_store(&ctx, store_id, targets).await?;

    tracing::info!(%store_id, "Purge complete!");
    print_json(&report)
}
