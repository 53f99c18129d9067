//! Store refresh command.
//!
//! # Usage
//!
//! ```bash
//! # Re-read shop settings for every installed store
//! shopsync update-stores
//!
//! # Also record order and product totals for stores not touched since May
//! shopsync update-stores --order-count --product-count --updated-at-max 2024-05-01T00:00:00Z
//! ```

use chrono::{DateTime, Utc};
use shopsync_core::StoreId;
use shopsync_engine::EngineConfig;
use shopsync_engine::models::StoreCount;
use shopsync_engine::sync::{StoreRefresh, refresh_stores};

use super::{CliError, connect, context, print_json};

/// Options for one store refresh.
#[derive(Debug, Clone, Default)]
pub struct UpdateStoresOptions {
    pub store_ids: Vec<StoreId>,
    pub updated_at_max: Option<DateTime<Utc>>,
    pub customer_count: bool,
    pub order_count: bool,
    pub product_count: bool,
}

impl UpdateStoresOptions {
    fn refresh(&self) -> StoreRefresh {
        let requested = [self.customer_count, self.order_count, self.product_count];
        StoreRefresh {
            store_ids: (!self.store_ids.is_empty()).then(|| self.store_ids.clone()),
            updated_at_max: self.updated_at_max,
            counts: StoreCount::ALL
                .into_iter()
                .zip(requested)
                .filter_map(|(count, wanted)| wanted.then_some(count))
                .collect(),
        }
    }
}

/// Refresh installed stores and print the summary.
///
/// # Errors
///
/// Returns an error if sync is disabled, the database is unreachable or the
/// store listing fails.
pub async fn run(config: &EngineConfig, options: &UpdateStoresOptions) -> Result<(), CliError> {
    let pool = connect(config).await?;
    let ctx = context(config, &pool)?;
    let refresh = options.refresh();

    tracing::info!(counts = ?refresh.counts, "Refreshing stores...");
    let summary = refresh_stores(&ctx, &refresh).await?;

    tracing::info!(
        updated = summary.updated.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Store refresh complete!"
    );
    print_json(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_counts_follow_flags() {
        let options = UpdateStoresOptions {
            order_count: true,
            product_count: true,
            ..UpdateStoresOptions::default()
        };
        let refresh = options.refresh();
        assert_eq!(refresh.counts, vec![StoreCount::Orders, StoreCount::Products]);
        assert!(refresh.store_ids.is_none());
    }

    #[test]
    fn test_refresh_keeps_store_filter() {
        let options = UpdateStoresOptions {
            store_ids: vec![StoreId::new(3)],
            ..UpdateStoresOptions::default()
        };
        let refresh = options.refresh();
        assert_eq!(refresh.store_ids, Some(vec![StoreId::new(3)]));
        assert!(refresh.counts.is_empty());
    }
}
