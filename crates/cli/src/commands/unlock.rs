//! Release a stuck store lock.
//!
//! Locks left behind by a failed walk expire on their own after
//! `SYNC_LOCK_TTL_SECONDS`; this clears one early.
//!
//! # Usage
//!
//! ```bash
//! shopsync unlock --store-id 3 --family orders
//! ```

use shopsync_core::{StoreId, SyncFamily};
use shopsync_engine::EngineConfig;
use shopsync_engine::config::LockBackend;
use shopsync_engine::sync::lock_key;

use super::{CliError, connect, lock_store};

/// Release the lock for one store and family.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn run(
    config: &EngineConfig,
    store_id: StoreId,
    family: SyncFamily,
) -> Result<(), CliError> {
    if config.lock_backend == LockBackend::Memory {
        tracing::warn!("Memory locks live inside the sync process; nothing to release here");
        return Ok(());
    }

    let pool = connect(config).await?;
    let key = lock_key(family, store_id);
    let locks = lock_store(config, &pool);

    if locks.is_held(&key).await? {
        locks.release(&key).await?;
        tracing::info!(%key, "Lock released!");
    } else {
        tracing::info!(%key, "Lock was not held");
    }
    Ok(())
}
