//! Remove a store's imported data.

use serde_json::json;
use shopsync_core::{StoreId, SyncFamily};
use tracing::instrument;

use super::SyncContext;
use super::lock::lock_key;
use super::log::SyncLog;
use crate::error::SyncError;
use crate::models::{PurgeReport, PurgeTarget};

/// Force-delete the chosen entity groups of one store and reset the matching
/// watermarks, so the next walk starts over from the store's creation.
///
/// Both family locks are released afterwards; a walk still running against
/// purged rows would only recreate them.
///
/// # Errors
///
/// Returns `SyncError::StoreNotFound` if the store does not exist, or a
/// repository error if the purge transaction fails.
#[instrument(skip(ctx, targets), fields(store_id = %store_id))]
pub async fn purge_store(
    ctx: &SyncContext,
    store_id: StoreId,
    targets: &[PurgeTarget],
) -> Result<PurgeReport, SyncError> {
    let store = ctx
        .repos
        .stores
        .get(store_id)
        .await?
        .ok_or(SyncError::StoreNotFound(store_id))?;

    let report = ctx.repos.stores.purge(store_id, targets).await?;

    for family in SyncFamily::ALL {
        ctx.locks.release(&lock_key(family, store_id)).await?;
    }

    let names: Vec<&str> = targets.iter().map(|target| target.as_str()).collect();
    SyncLog::new(SyncFamily::Orders, &store).info(
        "purged",
        &json!({ "targets": names, "report": report }),
    );
    Ok(report)
}
