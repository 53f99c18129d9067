//! Sync passes over every installed store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shopsync_core::{ExecutionMode, StoreId, SyncFamily};
use tracing::{error, info, instrument};

use super::SyncContext;
use super::log::SyncLog;
use super::walker::{PageWalker, RunReport, StartRequest};
use crate::error::SyncError;

const STORE_CHUNK: u32 = 100;

/// One sync pass for a family.
#[derive(Debug, Clone)]
pub struct SyncPass {
    pub family: SyncFamily,
    /// Restrict the pass to these stores.
    pub store_ids: Option<Vec<StoreId>>,
    pub created_at_min: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub dry_run: bool,
    pub mode: ExecutionMode,
}

impl SyncPass {
    #[must_use]
    pub const fn new(family: SyncFamily) -> Self {
        Self {
            family,
            store_ids: None,
            created_at_min: None,
            limit: None,
            dry_run: false,
            mode: ExecutionMode::Immediate,
        }
    }

    fn request(&self, store_id: StoreId) -> StartRequest {
        StartRequest {
            store_id,
            family: self.family,
            limit: self.limit,
            created_at_min: self.created_at_min,
            mode: self.mode,
            dry_run: self.dry_run,
        }
    }
}

/// What a pass did per store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub reports: Vec<RunReport>,
    /// Stores left out, e.g. orders before any product import.
    pub skipped: Vec<StoreId>,
    /// Stores whose walk returned an error.
    pub failed: Vec<StoreId>,
}

/// Start a walk for every installed store, in id order.
///
/// One store's failure never stops the pass.
///
/// # Errors
///
/// Returns `SyncError::Disabled` when sync is switched off, or an error if
/// the store listing fails.
#[instrument(skip(ctx, pass), fields(family = %pass.family, mode = %pass.mode, dry_run = pass.dry_run))]
pub async fn run_pass(ctx: &SyncContext, pass: &SyncPass) -> Result<PassSummary, SyncError> {
    if !ctx.config.enabled {
        return Err(SyncError::Disabled);
    }

    let walker = PageWalker::new(ctx.clone());
    let mut summary = PassSummary::default();
    let mut after = None;

    loop {
        let stores = ctx
            .repos
            .stores
            .list_installed(after, STORE_CHUNK, pass.store_ids.as_deref())
            .await?;
        let Some(last) = stores.last() else {
            break;
        };
        after = Some(last.id);

        for store in &stores {
            if pass.family == SyncFamily::Orders && store.last_product_import_at.is_none() {
                SyncLog::new(pass.family, store).info("product_import_required", &Value::Null);
                summary.skipped.push(store.id);
                continue;
            }

            match walker.run(pass.request(store.id)).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(store_id = %store.id, error = %e, "Store sync failed");
                    summary.failed.push(store.id);
                }
            }
        }

        if stores.len() < STORE_CHUNK as usize {
            break;
        }
    }

    info!(
        stores = summary.reports.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Sync pass finished"
    );
    Ok(summary)
}
