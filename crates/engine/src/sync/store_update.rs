//! Store refreshes.
//!
//! A refresh re-reads the shop settings record and, on request, the remote
//! customer/order/product totals, then writes them onto the store row.
//! Refreshes never take the walk lock; they only touch store columns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shopsync_core::StoreId;
use tracing::{error, info, instrument};

use super::SyncContext;
use super::events::SyncEvent;
use super::fields::STORE_MAP;
use super::log::SyncLog;
use super::rate_limit::RateLimitedRequest;
use crate::error::SyncError;
use crate::models::{Store, StoreCount, StoreCounts, StoreDetails};
use crate::shopify::ShopifyError;

const STORE_CHUNK: u32 = 100;

/// Which stores to refresh and which totals to fetch.
#[derive(Debug, Clone, Default)]
pub struct StoreRefresh {
    pub store_ids: Option<Vec<StoreId>>,
    /// Only stores last updated before this instant.
    pub updated_at_max: Option<DateTime<Utc>>,
    pub counts: Vec<StoreCount>,
}

impl StoreRefresh {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            store_ids: None,
            updated_at_max: None,
            counts: Vec::new(),
        }
    }

    fn wants(&self, store: &Store) -> bool {
        self.updated_at_max.is_none_or(|max| store.updated_at < max)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub updated: Vec<StoreId>,
    /// Stores left alone by `updated_at_max`.
    pub skipped: Vec<StoreId>,
    pub failed: Vec<StoreId>,
}

/// Refresh every installed store, in id order.
///
/// A remote failure only fails that store. Local failures stop the pass when
/// `throw_processing_exceptions` is set.
///
/// # Errors
///
/// Returns `SyncError::Disabled` when sync is switched off, or an error if
/// the store listing fails.
#[instrument(skip(ctx, refresh), fields(counts = ?refresh.counts))]
pub async fn refresh_stores(
    ctx: &SyncContext,
    refresh: &StoreRefresh,
) -> Result<RefreshSummary, SyncError> {
    if !ctx.config.enabled {
        return Err(SyncError::Disabled);
    }

    let mut summary = RefreshSummary::default();
    let mut after = None;

    loop {
        let stores = ctx
            .repos
            .stores
            .list_installed(after, STORE_CHUNK, refresh.store_ids.as_deref())
            .await?;
        let Some(last) = stores.last() else {
            break;
        };
        after = Some(last.id);

        for store in &stores {
            if !refresh.wants(store) {
                summary.skipped.push(store.id);
                continue;
            }

            match refresh_store(ctx, store, &refresh.counts).await {
                Ok(_) => summary.updated.push(store.id),
                Err(e) if is_local(&e) && ctx.config.throw_processing_exceptions => return Err(e),
                Err(e) => {
                    error!(store_id = %store.id, error = %e, "Store refresh failed");
                    summary.failed.push(store.id);
                }
            }
        }

        if stores.len() < STORE_CHUNK as usize {
            break;
        }
    }

    info!(
        updated = summary.updated.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Store refresh finished"
    );
    Ok(summary)
}

const fn is_local(error: &SyncError) -> bool {
    matches!(error, SyncError::Mapping(_) | SyncError::Repository(_))
}

/// Fetch the requested totals and the shop record, then write both.
///
/// Totals fetched before a failed shop call are still written.
///
/// # Errors
///
/// Returns the remote error of the first failed call, a mapping error when
/// the shop record lacks a required field, or the repository error of the
/// write.
pub async fn refresh_store(
    ctx: &SyncContext,
    store: &Store,
    counts: &[StoreCount],
) -> Result<Store, SyncError> {
    let log = SyncLog::stores(store);
    let limiter = RateLimitedRequest::from_config(&ctx.config);
    let api = &ctx.api;

    let mut totals = StoreCounts::default();
    for &count in counts {
        let fetched = limiter
            .execute(&format!("{count}_count"), || api.resource_count(store, count))
            .await;
        match fetched {
            Ok(total) => totals.set(count, total),
            Err(e) => return Err(api_failure(ctx, store, &log, totals, e).await),
        }
    }

    let shop = match limiter.execute("shop", || api.shop(store)).await {
        Ok(shop) => shop,
        Err(e) => return Err(api_failure(ctx, store, &log, totals, e).await),
    };

    let mapped = STORE_MAP.map(shop.as_value()).inspect_err(|e| {
        log.emergency("mapping_failed", &json!({ "error": e.to_string() }));
    })?;

    let details = StoreDetails {
        name: mapped.string("name"),
        store_created_at: mapped.timestamp("store_created_at"),
        details: Some(mapped.to_value()),
        counts: totals,
    };
    let updated = ctx
        .repos
        .stores
        .update_details(store.id, &details)
        .await
        .inspect_err(|e| {
            log.emergency("update_failed", &json!({ "error": e.to_string() }));
        })?;

    log.info("updated", &json!({ "counts": totals }));
    ctx.events.publish(SyncEvent::StoreUpdated { store_id: store.id });
    Ok(updated)
}

/// Log a rejected remote call and keep whatever totals were already fetched.
async fn api_failure(
    ctx: &SyncContext,
    store: &Store,
    log: &SyncLog,
    totals: StoreCounts,
    error: ShopifyError,
) -> SyncError {
    let status = error
        .status()
        .map_or_else(|| "none".to_string(), |status| status.to_string());
    log.error(
        &format!("api_failure:{status}"),
        &json!({ "error": error.to_string() }),
    );

    if totals != StoreCounts::default() {
        let partial = StoreDetails {
            counts: totals,
            ..StoreDetails::default()
        };
        if let Err(e) = ctx.repos.stores.update_details(store.id, &partial).await {
            log.emergency("update_failed", &json!({ "error": e.to_string() }));
        }
    }
    SyncError::Remote(error)
}
