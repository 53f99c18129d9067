//! Order import: customer, header and refund-adjusted line items in one write.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use shopsync_core::{Email, FinancialStatus, FulfillmentStatus, RemoteId, StoreOwner, SyncFamily};
use tracing::instrument;

use super::refund::{apply_refund, refunded_quantity};
use super::{ImportOutcome, SkipReason, record_label, settle};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{CustomerWrite, OrderAggregate, OrderItemWrite, OrderWrite, Store};
use crate::repository::{OrderRepository, ProductRepository};
use crate::shopify::RemoteRecord;
use crate::sync::SyncContext;
use crate::sync::events::{EventSink, ImportedEntity, SyncEvent};
use crate::sync::fields::{CUSTOMER_MAP, LINE_ITEM_MAP, ORDER_MAP};
use crate::sync::log::SyncLog;
use crate::sync::qualifier::line_item_refs;

/// Creates or updates one order.
pub struct OrderImporter {
    config: Arc<SyncConfig>,
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    events: Arc<dyn EventSink>,
}

impl OrderImporter {
    #[must_use]
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            config: Arc::clone(&ctx.config),
            orders: Arc::clone(&ctx.repos.orders),
            products: Arc::clone(&ctx.repos.products),
            events: Arc::clone(&ctx.events),
        }
    }

    /// Import an order payload.
    ///
    /// An existing local order is updated only once it is older than the
    /// configured update lock. Orders without a single importable line item
    /// are skipped entirely.
    ///
    /// # Errors
    ///
    /// Returns the processing error only when `throw_processing_exceptions` is
    /// set; duplicates and other failures are otherwise reported as outcomes.
    #[instrument(skip(self, store, record), fields(store_id = %store.id, order_id = ?record.id()))]
    pub async fn import(
        &self,
        store: &Store,
        record: &RemoteRecord,
    ) -> Result<ImportOutcome, SyncError> {
        let log = SyncLog::new(SyncFamily::Orders, store);
        let label = record_label("order", record);
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
            .ok_or_else(|| SyncError::InvalidRecord("order has no id".to_string()))?;
        let owner = store.owner();

        let existing = self.orders.find(owner, remote_id).await?;
        if let Some(existing) = &existing {
            let unlocks_at = existing.order.created_at + self.config.update_lock_delta();
            if Utc::now() < unlocks_at {
                log.warn(
                    &format!("{label}:update_locked"),
                    &json!({ "created_at": existing.order.created_at, "unlocks_at": unlocks_at }),
                );
                return Ok(ImportOutcome::Skipped(SkipReason::UpdateLocked));
            }
        }

        let Some(write) = self.plan(owner, record, existing.as_ref(), log, label).await? else {
            log.info(&format!("{label}:no_importable_items"), &json!({}));
            return Ok(ImportOutcome::Skipped(SkipReason::NoImportableItems));
        };

        let created = write.existing.is_none();
        if created && write.test && self.config.log_test_orders {
            log.info(&format!("{label}:test_order"), record.as_value());
        }

        let aggregate = self.orders.save(write).await?;
        let entity = ImportedEntity::Order(Box::new(aggregate));

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

    /// Resolve the customer, map the header and build the item writes.
    ///
    /// Returns `None` when no line item can be imported.
    async fn plan(
        &self,
        owner: StoreOwner,
        record: &RemoteRecord,
        existing: Option<&OrderAggregate>,
        log: &SyncLog,
        label: &str,
    ) -> Result<Option<OrderWrite>, SyncError> {
        let data = record.as_value();
        let mapped = ORDER_MAP.map(data)?;
        let remote_id = mapped
            .remote_id("store_order_id")
            .ok_or_else(|| SyncError::InvalidRecord("order has no id".to_string()))?;

        let line_items = record.array("line_items");
        let variant_ids: Vec<RemoteId> = line_items
            .iter()
            .filter_map(|item| line_item_refs(item).map(|(_, variant_id)| variant_id))
            .collect();
        let variants = self.products.variants_by_remote_ids(owner, &variant_ids).await?;

        let mut items = Vec::with_capacity(line_items.len());
        for line_item in line_items {
            let Some((remote_product_id, remote_variant_id)) = line_item_refs(line_item) else {
                log.debug(&format!("{label}:line_item:no_variant"), line_item);
                continue;
            };

            let mapped_item = LINE_ITEM_MAP.map(line_item)?;
            let line_item_id = mapped_item.remote_id("store_line_item_id").ok_or_else(|| {
                SyncError::InvalidRecord(format!("{label}: line item has no id"))
            })?;
            let title = mapped_item.string("title").unwrap_or_default();
            let ordered = mapped_item.i32("quantity").unwrap_or(0).max(0);
            let (quantity, title) =
                apply_refund(ordered, &title, refunded_quantity(data, line_item_id));

            let existing_item = existing.and_then(|order| order.item_by_remote_id(line_item_id));
            let item = match existing_item {
                // Refunds only ever lower a stored quantity.
                Some(current) => OrderItemWrite {
                    existing: Some(current.id),
                    remote_line_item_id: line_item_id,
                    product_id: current.product_id,
                    variant_id: current.variant_id,
                    remote_product_id: current.remote_product_id,
                    remote_variant_id: current.remote_variant_id,
                    title,
                    sku: mapped_item.string("sku"),
                    quantity: quantity.min(current.quantity),
                    price: mapped_item.decimal("price"),
                    attributes: mapped_item.to_value(),
                },
                None => {
                    let Some(variant) = variants.get(&remote_variant_id) else {
                        log.debug(
                            &format!("{label}:line_item:{line_item_id}:unresolved_variant"),
                            &json!({ "variant_id": remote_variant_id }),
                        );
                        continue;
                    };
                    OrderItemWrite {
                        existing: None,
                        remote_line_item_id: line_item_id,
                        product_id: variant.product_id,
                        variant_id: variant.id,
                        remote_product_id: variant.remote_product_id.unwrap_or(remote_product_id),
                        remote_variant_id,
                        title,
                        sku: mapped_item.string("sku"),
                        quantity,
                        price: mapped_item.decimal("price"),
                        attributes: mapped_item.to_value(),
                    }
                }
            };
            items.push(item);
        }

        if items.is_empty() {
            return Ok(None);
        }

        let customer = self.resolve_customer(owner, record, existing).await?;

        Ok(Some(OrderWrite {
            existing: existing.map(|order| order.order.id),
            owner,
            remote_id,
            customer,
            name: mapped.string("name"),
            number: mapped.i64("number"),
            email: order_email(record),
            financial_status: FinancialStatus::from_remote(
                mapped.string("financial_status").as_deref().unwrap_or_default(),
            ),
            fulfillment_status: FulfillmentStatus::from_remote(
                mapped.string("fulfillment_status").as_deref(),
            ),
            currency: mapped.string("currency"),
            total_price: mapped.decimal("total_price"),
            test: mapped.bool("test").unwrap_or(false),
            attributes: mapped.to_value(),
            processed_at: mapped.timestamp("processed_at"),
            store_created_at: mapped.timestamp("store_created_at"),
            store_updated_at: mapped.timestamp("store_updated_at"),
            items,
        }))
    }

    /// Match the order's customer by remote id, then by email, else create
    /// one. Guest orders with neither get no customer.
    async fn resolve_customer(
        &self,
        owner: StoreOwner,
        record: &RemoteRecord,
        existing: Option<&OrderAggregate>,
    ) -> Result<Option<CustomerWrite>, SyncError> {
        let mapped = CUSTOMER_MAP.map(record.as_value())?;
        let remote_id = mapped.remote_id("store_customer_id");
        let email = order_email(record);

        let matched = match existing.and_then(|order| order.customer.clone()) {
            Some(customer) => Some(customer),
            None => match remote_id {
                Some(id) => self.orders.find_customer_by_remote_id(owner, id).await?,
                None => None,
            },
        };
        let matched = match (matched, &email) {
            (Some(customer), _) => Some(customer),
            (None, Some(email)) => self.orders.find_customer_by_email(owner, email).await?,
            (None, None) => None,
        };

        if matched.is_none() && remote_id.is_none() && email.is_none() {
            return Ok(None);
        }

        Ok(Some(CustomerWrite {
            existing: matched.map(|customer| customer.id),
            remote_id,
            email,
            first_name: mapped.string("first_name"),
            last_name: mapped.string("last_name"),
            attributes: mapped.to_value(),
        }))
    }
}

/// `email`, falling back to `customer.email`.
fn order_email(record: &RemoteRecord) -> Option<Email> {
    ["email", "customer.email"].iter().find_map(|path| {
        Email::parse_lenient(record.get(path).and_then(Value::as_str))
    })
}
