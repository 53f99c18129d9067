//! Store repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use shopsync_core::{StoreId, StoreType, SyncFamily};
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::{NewStore, PurgeReport, PurgeTarget, Store, StoreDetails};
use crate::repository::StoreRepository;

// =============================================================================
// Internal Row Types
// =============================================================================

const STORE_COLUMNS: &str = "id, store_type, shop_domain, name, access_token, store_created_at, \
     installed_at, uninstalled_at, deleted_at, last_product_import_at, last_order_import_at, \
     last_customer_import_at, details, customer_count, order_count, product_count, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    store_type: String,
    shop_domain: String,
    name: Option<String>,
    access_token: String,
    store_created_at: DateTime<Utc>,
    installed_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    last_product_import_at: Option<DateTime<Utc>>,
    last_order_import_at: Option<DateTime<Utc>>,
    last_customer_import_at: Option<DateTime<Utc>>,
    details: Value,
    customer_count: Option<i64>,
    order_count: Option<i64>,
    product_count: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let store_type: StoreType = row
            .store_type
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid store type: {e}")))?;

        Ok(Self {
            id: row.id,
            store_type,
            shop_domain: row.shop_domain,
            name: row.name,
            access_token: SecretString::from(row.access_token),
            store_created_at: row.store_created_at,
            installed_at: row.installed_at,
            uninstalled_at: row.uninstalled_at,
            deleted_at: row.deleted_at,
            last_product_import_at: row.last_product_import_at,
            last_order_import_at: row.last_order_import_at,
            last_customer_import_at: row.last_customer_import_at,
            details: row.details,
            customer_count: row.customer_count,
            order_count: row.order_count,
            product_count: row.product_count,
            updated_at: row.updated_at,
        })
    }
}

const fn watermark_column(family: SyncFamily) -> &'static str {
    match family {
        SyncFamily::Orders => "last_order_import_at",
        SyncFamily::Products => "last_product_import_at",
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` store repository.
#[derive(Debug, Clone)]
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn insert(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let row: StoreRow = sqlx::query_as(&format!(
            "INSERT INTO sync.stores (store_type, shop_domain, name, access_token, store_created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(StoreType::Shopify.as_str())
        .bind(&store.shop_domain)
        .bind(&store.name)
        .bind(store.access_token.expose_secret())
        .bind(store.store_created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row: Option<StoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM sync.stores WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_installed(
        &self,
        after: Option<StoreId>,
        limit: u32,
        only: Option<&[StoreId]>,
    ) -> Result<Vec<Store>, RepositoryError> {
        let only: Option<Vec<i32>> = only.map(|ids| ids.iter().map(StoreId::as_i32).collect());

        let rows: Vec<StoreRow> = sqlx::query_as(&format!(
            "SELECT {STORE_COLUMNS} FROM sync.stores
             WHERE uninstalled_at IS NULL
               AND deleted_at IS NULL
               AND id > $1
               AND ($2::INTEGER[] IS NULL OR id = ANY($2))
             ORDER BY id
             LIMIT $3"
        ))
        .bind(after.map_or(0, |id| id.as_i32()))
        .bind(only)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_details(
        &self,
        id: StoreId,
        details: &StoreDetails,
    ) -> Result<Store, RepositoryError> {
        let row: Option<StoreRow> = sqlx::query_as(&format!(
            "UPDATE sync.stores
             SET name = COALESCE($2, name),
                 store_created_at = COALESCE($3, store_created_at),
                 details = COALESCE($4, details),
                 customer_count = COALESCE($5, customer_count),
                 order_count = COALESCE($6, order_count),
                 product_count = COALESCE($7, product_count),
                 updated_at = now()
             WHERE id = $1
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(id)
        .bind(&details.name)
        .bind(details.store_created_at)
        .bind(&details.details)
        .bind(details.counts.customers)
        .bind(details.counts.orders)
        .bind(details.counts.products)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn advance_watermark(
        &self,
        id: StoreId,
        family: SyncFamily,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let column = watermark_column(family);
        let stored: Option<DateTime<Utc>> = sqlx::query_scalar(&format!(
            "UPDATE sync.stores
             SET {column} = GREATEST(COALESCE({column}, $2), $2), updated_at = now()
             WHERE id = $1
             RETURNING {column}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        stored.ok_or(RepositoryError::NotFound)
    }

    async fn purge(
        &self,
        id: StoreId,
        targets: &[PurgeTarget],
    ) -> Result<PurgeReport, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut report = PurgeReport::default();

        // Orders go first so their customer references are gone before customers are.
        for target in PurgeTarget::ALL.into_iter().filter(|t| targets.contains(t)) {
            match target {
                PurgeTarget::Orders => {
                    report.orders = sqlx::query("DELETE FROM sync.orders WHERE store_id = $1")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    reset_watermark(&mut tx, id, "last_order_import_at").await?;
                }
                PurgeTarget::Customers => {
                    report.customers =
                        sqlx::query("DELETE FROM sync.customers WHERE store_id = $1")
                            .bind(id)
                            .execute(&mut *tx)
                            .await?
                            .rows_affected();
                    reset_watermark(&mut tx, id, "last_customer_import_at").await?;
                }
                PurgeTarget::Products => {
                    report.products = sqlx::query("DELETE FROM sync.products WHERE store_id = $1")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    reset_watermark(&mut tx, id, "last_product_import_at").await?;
                }
                PurgeTarget::Store => {
                    report.store_deleted = sqlx::query(
                        "UPDATE sync.stores SET deleted_at = now(), updated_at = now()
                         WHERE id = $1 AND deleted_at IS NULL",
                    )
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
                        > 0;
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

async fn reset_watermark(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: StoreId,
    column: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        "UPDATE sync.stores SET {column} = NULL, updated_at = now() WHERE id = $1"
    ))
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
