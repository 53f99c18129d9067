//! Product import: the product row and its variants in one write.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Value, json};
use shopsync_core::{RemoteId, SyncFamily};
use tracing::instrument;

use super::{ImportOutcome, record_label, settle};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{ProductAggregate, ProductWrite, Store, VariantWrite};
use crate::repository::ProductRepository;
use crate::shopify::RemoteRecord;
use crate::sync::SyncContext;
use crate::sync::events::{EventSink, ImportedEntity, SyncEvent};
use crate::sync::fields::{PRODUCT_MAP, VARIANT_MAP};
use crate::sync::log::SyncLog;

/// Creates or updates one product with its variants.
pub struct ProductImporter {
    config: Arc<SyncConfig>,
    products: Arc<dyn ProductRepository>,
    events: Arc<dyn EventSink>,
}

impl ProductImporter {
    #[must_use]
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            config: Arc::clone(&ctx.config),
            products: Arc::clone(&ctx.repos.products),
            events: Arc::clone(&ctx.events),
        }
    }

    /// Import a product payload.
    ///
    /// Variants present in the payload are upserted (restoring soft-deleted
    /// ones); local variants missing from it are soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns the processing error only when `throw_processing_exceptions` is
    /// set.
    #[instrument(skip(self, store, record), fields(store_id = %store.id, product_id = ?record.id()))]
    pub async fn import(
        &self,
        store: &Store,
        record: &RemoteRecord,
    ) -> Result<ImportOutcome, SyncError> {
        let log = SyncLog::new(SyncFamily::Products, store);
        let label = record_label("product", record);
        let result = self.try_import(store, record, &log, &label).await;
        settle(result, &log, &label, self.config.throw_processing_exceptions)
    }

    async fn try_import(
        &self,
        store: &Store,
        record: &RemoteRecord,
        log: &SyncLog,
        label: &str,
    ) -> Result<ImportOutcome, SyncError> {
        let remote_id = record
            .id()
            .ok_or_else(|| SyncError::InvalidRecord("product has no id".to_string()))?;
        let owner = store.owner();

        let existing = self.products.find(owner, remote_id).await?;
        let mapped = PRODUCT_MAP.map(record.as_value())?;

        let variants = plan_variants(record, remote_id, existing.as_ref(), log, label)?;
        let kept: HashSet<RemoteId> = variants.iter().map(|v| v.remote_id).collect();
        let retire_variants = existing
            .as_ref()
            .map(|aggregate| {
                aggregate
                    .active_variants()
                    .filter(|v| !kept.contains(&v.remote_id))
                    .map(|v| v.id)
                    .collect()
            })
            .unwrap_or_default();

        let write = ProductWrite {
            existing: existing.as_ref().map(|aggregate| aggregate.product.id),
            owner,
            remote_id,
            title: mapped.string("title").unwrap_or_default(),
            handle: mapped.string("handle"),
            vendor: mapped.string("vendor"),
            product_type: mapped.string("product_type"),
            attributes: mapped.to_value(),
            store_created_at: mapped.timestamp("store_created_at"),
            store_updated_at: mapped.timestamp("store_updated_at"),
            variants,
            retire_variants,
        };
        if !write.retire_variants.is_empty() {
            log.info(
                &format!("{label}:variants_retired"),
                &json!({ "count": write.retire_variants.len() }),
            );
        }

        let created = existing.is_none();
        let aggregate = self.products.save(write).await?;
        let entity = ImportedEntity::Product(Box::new(aggregate));

        if created {
            log.info(&format!("{label}:created"), &json!({}));
            self.events.publish(SyncEvent::EntityCreated {
                store_id: store.id,
                entity,
            });
            Ok(ImportOutcome::Created(remote_id))
        } else {
            log.info(&format!("{label}:updated"), &json!({}));
            self.events.publish(SyncEvent::EntityUpdated {
                store_id: store.id,
                entity,
            });
            Ok(ImportOutcome::Updated(remote_id))
        }
    }
}

/// Variant writes for the payload's `variants` that belong to this product.
fn plan_variants(
    record: &RemoteRecord,
    product_id: RemoteId,
    existing: Option<&ProductAggregate>,
    log: &SyncLog,
    label: &str,
) -> Result<Vec<VariantWrite>, SyncError> {
    let mut writes = Vec::new();
    for variant in record.array("variants") {
        let owner_product = variant.get("product_id").and_then(RemoteId::from_json);
        if owner_product.is_some_and(|id| id != product_id) {
            continue;
        }

        let mapped = VARIANT_MAP.map(variant)?;
        let Some(variant_id) = mapped.remote_id("store_variant_id") else {
            continue;
        };

        let current = existing.and_then(|aggregate| aggregate.variant_by_remote_id(variant_id));
        if current.is_some_and(|v| v.is_deleted()) {
            log.info(&format!("{label}:variant:{variant_id}:restored"), &Value::Null);
        }

        writes.push(VariantWrite {
            existing: current.map(|v| v.id),
            remote_id: variant_id,
            remote_product_id: Some(product_id),
            title: mapped.string("title").unwrap_or_default(),
            sku: mapped.string("sku"),
            price: mapped.decimal("price"),
            position: mapped.i32("position"),
            inventory_quantity: mapped.i32("inventory_quantity"),
            attributes: mapped.to_value(),
        });
    }
    Ok(writes)
}
