//! Transactional per-record import.
//!
//! Each record is planned into a fully resolved write (`OrderWrite`,
//! `ProductWrite`) and handed to its repository, which applies it in one
//! transaction. Failures never abort the page: duplicates are dropped, other
//! errors are logged at emergency level and only re-raised when
//! `throw_processing_exceptions` is set.

mod order;
mod product;
pub mod refund;

use serde::Serialize;
use serde_json::json;
use shopsync_core::{RemoteId, SyncFamily};

pub use order::OrderImporter;
pub use product::ProductImporter;

use super::SyncContext;
use super::log::SyncLog;
use crate::error::SyncError;
use crate::models::Store;
use crate::shopify::RemoteRecord;

/// Why an import did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The local row was created too recently to be updated.
    UpdateLocked,
    /// No line item resolved to a local variant.
    NoImportableItems,
}

/// Result of importing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ImportOutcome {
    Created(RemoteId),
    Updated(RemoteId),
    Skipped(SkipReason),
    /// A unique key said the record already exists.
    Duplicate,
    /// Logged and swallowed.
    Failed,
}

/// Import one record of the given family.
///
/// # Errors
///
/// Returns the processing error only when `throw_processing_exceptions` is
/// set.
pub async fn import_record(
    ctx: &SyncContext,
    store: &Store,
    family: SyncFamily,
    record: &RemoteRecord,
) -> Result<ImportOutcome, SyncError> {
    match family {
        SyncFamily::Orders => OrderImporter::new(ctx).import(store, record).await,
        SyncFamily::Products => ProductImporter::new(ctx).import(store, record).await,
    }
}

/// Turn an import result into an outcome, applying the duplicate and
/// swallow-or-raise policy.
fn settle(
    result: Result<ImportOutcome, SyncError>,
    log: &SyncLog,
    label: &str,
    throw: bool,
) -> Result<ImportOutcome, SyncError> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_duplicate() => {
            log.warn(&format!("{label}:duplicate"), &json!({ "error": e.to_string() }));
            Ok(ImportOutcome::Duplicate)
        }
        Err(e) => {
            log.emergency(&format!("{label}:failed"), &json!({ "error": e.to_string() }));
            if throw { Err(e) } else { Ok(ImportOutcome::Failed) }
        }
    }
}

fn record_label(entity: &str, record: &RemoteRecord) -> String {
    record
        .id()
        .map_or_else(|| format!("{entity}:unknown"), |id| format!("{entity}:{id}"))
}
