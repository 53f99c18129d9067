//! Product and variant repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use shopsync_core::{ProductId, RemoteId, StoreId, StoreOwner, VariantId};
use sqlx::{PgConnection, PgPool};

use super::{RepositoryError, owner_from_row};
use crate::models::{Product, ProductAggregate, ProductWrite, Variant, VariantWrite};
use crate::repository::ProductRepository;

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, store_type, store_id, store_product_id, title, handle, vendor, \
     product_type, attributes, store_created_at, store_updated_at, created_at, updated_at, \
     deleted_at";

const VARIANT_COLUMNS: &str = "v.id, v.product_id, v.store_variant_id, v.store_product_id, \
     v.title, v.sku, v.price, v.position, v.inventory_quantity, v.attributes, v.created_at, \
     v.updated_at, v.deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    store_type: String,
    store_id: StoreId,
    store_product_id: RemoteId,
    title: String,
    handle: Option<String>,
    vendor: Option<String>,
    product_type: Option<String>,
    attributes: Value,
    store_created_at: Option<DateTime<Utc>>,
    store_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner: owner_from_row(&row.store_type, row.store_id)?,
            remote_id: row.store_product_id,
            title: row.title,
            handle: row.handle,
            vendor: row.vendor,
            product_type: row.product_type,
            attributes: row.attributes,
            store_created_at: row.store_created_at,
            store_updated_at: row.store_updated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    store_variant_id: RemoteId,
    store_product_id: Option<RemoteId>,
    title: String,
    sku: Option<String>,
    price: Option<Decimal>,
    position: Option<i32>,
    inventory_quantity: Option<i32>,
    attributes: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            remote_id: row.store_variant_id,
            remote_product_id: row.store_product_id,
            title: row.title,
            sku: row.sku,
            price: row.price,
            position: row.position,
            inventory_quantity: row.inventory_quantity,
            attributes: row.attributes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

fn remote_ids_param(remote_ids: &[RemoteId]) -> Vec<i64> {
    remote_ids.iter().map(RemoteId::as_i64).collect()
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` product repository.
#[derive(Debug, Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: ProductId) -> Result<Option<ProductAggregate>, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM sync.products WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variants: Vec<VariantRow> = sqlx::query_as(&format!(
            "SELECT {VARIANT_COLUMNS} FROM sync.variants v WHERE v.product_id = $1 ORDER BY v.id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ProductAggregate {
            product: row.try_into()?,
            variants: variants.into_iter().map(Into::into).collect(),
        }))
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, ProductId>, RepositoryError> {
        if remote_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(RemoteId, ProductId)> = sqlx::query_as(
            "SELECT store_product_id, id FROM sync.products
             WHERE store_type = $1 AND store_id = $2 AND store_product_id = ANY($3)",
        )
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(remote_ids_param(remote_ids))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<ProductAggregate>, RepositoryError> {
        let id: Option<ProductId> = sqlx::query_scalar(
            "SELECT id FROM sync.products
             WHERE store_type = $1 AND store_id = $2 AND store_product_id = $3",
        )
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    async fn variants_by_remote_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, Variant>, RepositoryError> {
        if remote_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<VariantRow> = sqlx::query_as(&format!(
            "SELECT {VARIANT_COLUMNS} FROM sync.variants v
             JOIN sync.products p ON p.id = v.product_id
             WHERE p.store_type = $1 AND p.store_id = $2 AND v.store_variant_id = ANY($3)
               AND v.deleted_at IS NULL AND p.deleted_at IS NULL
             ORDER BY v.id"
        ))
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(remote_ids_param(remote_ids))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.store_variant_id, Variant::from(row)))
            .collect())
    }

    async fn save(&self, write: ProductWrite) -> Result<ProductAggregate, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product_id = match write.existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE sync.products
                     SET title = $2, handle = $3, vendor = $4, product_type = $5,
                         attributes = $6, store_created_at = $7, store_updated_at = $8,
                         deleted_at = NULL, updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(&write.title)
                .bind(&write.handle)
                .bind(&write.vendor)
                .bind(&write.product_type)
                .bind(&write.attributes)
                .bind(write.store_created_at)
                .bind(write.store_updated_at)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                sqlx::query_scalar(
                    "INSERT INTO sync.products
                         (store_type, store_id, store_product_id, title, handle, vendor,
                          product_type, attributes, store_created_at, store_updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     RETURNING id",
                )
                .bind(write.owner.owner_type.as_str())
                .bind(write.owner.owner_id)
                .bind(write.remote_id)
                .bind(&write.title)
                .bind(&write.handle)
                .bind(&write.vendor)
                .bind(&write.product_type)
                .bind(&write.attributes)
                .bind(write.store_created_at)
                .bind(write.store_updated_at)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        for variant in &write.variants {
            save_variant(&mut tx, product_id, variant).await?;
        }

        if !write.retire_variants.is_empty() {
            let ids: Vec<i32> = write.retire_variants.iter().map(VariantId::as_i32).collect();
            sqlx::query(
                "UPDATE sync.variants SET deleted_at = now(), updated_at = now()
                 WHERE product_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(product_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.load(product_id).await?.ok_or(RepositoryError::NotFound)
    }
}

/// Insert or update one variant; an update also restores a soft-deleted row.
async fn save_variant(
    conn: &mut PgConnection,
    product_id: ProductId,
    variant: &VariantWrite,
) -> Result<(), RepositoryError> {
    match variant.existing {
        Some(id) => {
            sqlx::query(
                "UPDATE sync.variants
                 SET store_product_id = $3, title = $4, sku = $5, price = $6, position = $7,
                     inventory_quantity = $8, attributes = $9, deleted_at = NULL,
                     updated_at = now()
                 WHERE id = $1 AND product_id = $2",
            )
            .bind(id)
            .bind(product_id)
            .bind(variant.remote_product_id)
            .bind(&variant.title)
            .bind(&variant.sku)
            .bind(variant.price)
            .bind(variant.position)
            .bind(variant.inventory_quantity)
            .bind(&variant.attributes)
            .execute(conn)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO sync.variants
                     (product_id, store_variant_id, store_product_id, title, sku, price,
                      position, inventory_quantity, attributes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(product_id)
            .bind(variant.remote_id)
            .bind(variant.remote_product_id)
            .bind(&variant.title)
            .bind(&variant.sku)
            .bind(variant.price)
            .bind(variant.position)
            .bind(variant.inventory_quantity)
            .bind(&variant.attributes)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}
