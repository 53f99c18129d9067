//! Sync pass command.
//!
//! # Usage
//!
//! ```bash
//! # Import products for every installed store
//! shopsync sync products
//!
//! # Re-import two stores' orders from a fixed date without writing anything
//! shopsync sync orders --store-ids 3,7 --created-at-min 2024-01-01T00:00:00Z --dry-run
//!
//! # Run pages and records on four queue workers
//! shopsync sync orders --mode deferred --workers 4
//! ```

use chrono::{DateTime, Utc};
use shopsync_core::{ExecutionMode, StoreId, SyncFamily};
use shopsync_engine::EngineConfig;
use shopsync_engine::sync::{JobQueue, SyncPass, run_pass, spawn_workers};

use super::{CliError, connect, context, print_json};

/// Options for one sync pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub family: SyncFamily,
    pub store_ids: Vec<StoreId>,
    pub created_at_min: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub dry_run: bool,
    pub mode: ExecutionMode,
    pub workers: usize,
}

impl SyncOptions {
    fn pass(&self) -> SyncPass {
        SyncPass {
            family: self.family,
            store_ids: (!self.store_ids.is_empty()).then(|| self.store_ids.clone()),
            created_at_min: self.created_at_min,
            limit: self.limit,
            dry_run: self.dry_run,
            mode: self.mode,
        }
    }
}

/// Run a sync pass and print its summary.
///
/// In deferred mode the command waits for the queue to drain before it
/// returns, so every page and record job has run.
///
/// # Errors
///
/// Returns an error if sync is disabled, the database is unreachable or the
/// store listing fails.
pub async fn run(config: &EngineConfig, options: SyncOptions) -> Result<(), CliError> {
    let pool = connect(config).await?;
    let ctx = context(config, &pool)?;
    let pass = options.pass();

    let summary = match options.mode {
        ExecutionMode::Immediate => run_pass(&ctx, &pass).await?,
        ExecutionMode::Deferred => {
            let (queue, receiver) = JobQueue::channel();
            let ctx = ctx.with_queue(queue.clone());
            let workers = spawn_workers(&ctx, receiver, options.workers);

            let summary = run_pass(&ctx, &pass).await;
            tracing::info!(pending = queue.pending(), "Waiting for queued jobs...");
            queue.wait_idle().await;
            workers.shutdown().await;
            summary?
        }
    };

    tracing::info!(
        family = %options.family,
        stores = summary.reports.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Sync complete!"
    );
    print_json(&summary)
}
