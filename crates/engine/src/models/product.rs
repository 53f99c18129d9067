//! Product and variant models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use shopsync_core::{ProductId, RemoteId, StoreOwner, VariantId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub owner: StoreOwner,
    pub remote_id: RemoteId,
    pub title: String,
    pub handle: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    /// Full mapped record.
    pub attributes: Value,
    pub store_created_at: Option<DateTime<Utc>>,
    pub store_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub remote_id: RemoteId,
    pub remote_product_id: Option<RemoteId>,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub position: Option<i32>,
    pub inventory_quantity: Option<i32>,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Variant {
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A product with every variant, soft-deleted ones included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAggregate {
    pub product: Product,
    pub variants: Vec<Variant>,
}

impl ProductAggregate {
    #[must_use]
    pub fn variant_by_remote_id(&self, remote_id: RemoteId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.remote_id == remote_id)
    }

    /// Variants that are not soft-deleted.
    pub fn active_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| !v.is_deleted())
    }
}

/// Resolved product upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductWrite {
    /// Local row to update; `None` inserts.
    pub existing: Option<ProductId>,
    pub owner: StoreOwner,
    pub remote_id: RemoteId,
    pub title: String,
    pub handle: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub attributes: Value,
    pub store_created_at: Option<DateTime<Utc>>,
    pub store_updated_at: Option<DateTime<Utc>>,
    /// Variants to insert or update (and restore if soft-deleted).
    pub variants: Vec<VariantWrite>,
    /// Local variants absent from the payload, to be soft-deleted.
    pub retire_variants: Vec<VariantId>,
}

/// Resolved variant upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantWrite {
    pub existing: Option<VariantId>,
    pub remote_id: RemoteId,
    pub remote_product_id: Option<RemoteId>,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub position: Option<i32>,
    pub inventory_quantity: Option<i32>,
    pub attributes: Value,
}
