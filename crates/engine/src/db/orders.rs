//! Order, order item and customer repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use shopsync_core::{
    CustomerId, Email, FinancialStatus, FulfillmentStatus, OrderId, OrderItemId, ProductId,
    RemoteId, StoreId, StoreOwner, VariantId,
};
use sqlx::{PgConnection, PgPool};

use super::{RepositoryError, owner_from_row};
use crate::models::{
    Customer, CustomerWrite, Order, OrderAggregate, OrderItem, OrderItemWrite, OrderWrite,
};
use crate::repository::OrderRepository;

// =============================================================================
// Internal Row Types
// =============================================================================

const ORDER_COLUMNS: &str = "id, store_type, store_id, store_order_id, customer_id, name, number, \
     email, financial_status, fulfillment_status, currency, total_price, test, attributes, \
     processed_at, store_created_at, store_updated_at, created_at, updated_at, deleted_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, store_line_item_id, \
     store_product_id, store_variant_id, title, sku, quantity, price, attributes, created_at, \
     updated_at";

const CUSTOMER_COLUMNS: &str = "id, store_type, store_id, store_customer_id, email, first_name, \
     last_name, attributes, created_at, updated_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    store_type: String,
    store_id: StoreId,
    store_order_id: RemoteId,
    customer_id: Option<CustomerId>,
    name: Option<String>,
    number: Option<i64>,
    email: Option<String>,
    financial_status: String,
    fulfillment_status: String,
    currency: Option<String>,
    total_price: Option<Decimal>,
    test: bool,
    attributes: Value,
    processed_at: Option<DateTime<Utc>>,
    store_created_at: Option<DateTime<Utc>>,
    store_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner: owner_from_row(&row.store_type, row.store_id)?,
            remote_id: row.store_order_id,
            customer_id: row.customer_id,
            name: row.name,
            number: row.number,
            email: Email::parse_lenient(row.email.as_deref()),
            financial_status: FinancialStatus::from_remote(&row.financial_status),
            fulfillment_status: FulfillmentStatus::from_remote(Some(&row.fulfillment_status)),
            currency: row.currency,
            total_price: row.total_price,
            test: row.test,
            attributes: row.attributes,
            processed_at: row.processed_at,
            store_created_at: row.store_created_at,
            store_updated_at: row.store_updated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    variant_id: VariantId,
    store_line_item_id: RemoteId,
    store_product_id: RemoteId,
    store_variant_id: RemoteId,
    title: String,
    sku: Option<String>,
    quantity: i32,
    price: Option<Decimal>,
    attributes: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            remote_line_item_id: row.store_line_item_id,
            remote_product_id: row.store_product_id,
            remote_variant_id: row.store_variant_id,
            title: row.title,
            sku: row.sku,
            quantity: row.quantity,
            price: row.price,
            attributes: row.attributes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: CustomerId,
    store_type: String,
    store_id: StoreId,
    store_customer_id: Option<RemoteId>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    attributes: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner: owner_from_row(&row.store_type, row.store_id)?,
            remote_id: row.store_customer_id,
            email: Email::parse_lenient(row.email.as_deref()),
            first_name: row.first_name,
            last_name: row.last_name,
            attributes: row.attributes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` order repository.
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: OrderId) -> Result<Option<OrderAggregate>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM sync.orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM sync.order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let customer = match row.customer_id {
            Some(customer_id) => {
                let customer: Option<CustomerRow> = sqlx::query_as(&format!(
                    "SELECT {CUSTOMER_COLUMNS} FROM sync.customers WHERE id = $1"
                ))
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;
                customer.map(TryInto::try_into).transpose()?
            }
            None => None,
        };

        Ok(Some(OrderAggregate {
            order: row.try_into()?,
            items: items.into_iter().map(Into::into).collect(),
            customer,
        }))
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, OrderId>, RepositoryError> {
        if remote_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<i64> = remote_ids.iter().map(RemoteId::as_i64).collect();
        let rows: Vec<(RemoteId, OrderId)> = sqlx::query_as(
            "SELECT store_order_id, id FROM sync.orders
             WHERE store_type = $1 AND store_id = $2 AND store_order_id = ANY($3)",
        )
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<OrderAggregate>, RepositoryError> {
        let id: Option<OrderId> = sqlx::query_scalar(
            "SELECT id FROM sync.orders
             WHERE store_type = $1 AND store_id = $2 AND store_order_id = $3",
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

    async fn find_customer_by_remote_id(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM sync.customers
             WHERE store_type = $1 AND store_id = $2 AND store_customer_id = $3"
        ))
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_customer_by_email(
        &self,
        owner: StoreOwner,
        email: &Email,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM sync.customers
             WHERE store_type = $1 AND store_id = $2 AND lower(email) = $3
               AND deleted_at IS NULL
             ORDER BY id
             LIMIT 1"
        ))
        .bind(owner.owner_type.as_str())
        .bind(owner.owner_id)
        .bind(email.normalized())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save(&self, write: OrderWrite) -> Result<OrderAggregate, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let customer_id = match &write.customer {
            Some(customer) => Some(save_customer(&mut tx, write.owner, customer).await?),
            None => None,
        };

        let order_id: OrderId = match write.existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE sync.orders
                     SET customer_id = COALESCE($2, customer_id), name = $3, number = $4,
                         email = $5, financial_status = $6, fulfillment_status = $7,
                         currency = $8, total_price = $9, test = $10, attributes = $11,
                         processed_at = $12, store_created_at = $13, store_updated_at = $14,
                         deleted_at = NULL, updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(customer_id)
                .bind(&write.name)
                .bind(write.number)
                .bind(write.email.as_ref().map(ToString::to_string))
                .bind(write.financial_status.as_str())
                .bind(write.fulfillment_status.as_str())
                .bind(&write.currency)
                .bind(write.total_price)
                .bind(write.test)
                .bind(&write.attributes)
                .bind(write.processed_at)
                .bind(write.store_created_at)
                .bind(write.store_updated_at)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                sqlx::query_scalar(
                    "INSERT INTO sync.orders
                         (store_type, store_id, store_order_id, customer_id, name, number, email,
                          financial_status, fulfillment_status, currency, total_price, test,
                          attributes, processed_at, store_created_at, store_updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                     RETURNING id",
                )
                .bind(write.owner.owner_type.as_str())
                .bind(write.owner.owner_id)
                .bind(write.remote_id)
                .bind(customer_id)
                .bind(&write.name)
                .bind(write.number)
                .bind(write.email.as_ref().map(ToString::to_string))
                .bind(write.financial_status.as_str())
                .bind(write.fulfillment_status.as_str())
                .bind(&write.currency)
                .bind(write.total_price)
                .bind(write.test)
                .bind(&write.attributes)
                .bind(write.processed_at)
                .bind(write.store_created_at)
                .bind(write.store_updated_at)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        for item in &write.items {
            save_item(&mut tx, order_id, item).await?;
        }

        tx.commit().await?;

        self.load(order_id).await?.ok_or(RepositoryError::NotFound)
    }
}

async fn save_customer(
    conn: &mut PgConnection,
    owner: StoreOwner,
    customer: &CustomerWrite,
) -> Result<CustomerId, RepositoryError> {
    let email = customer.email.as_ref().map(ToString::to_string);

    let id = match customer.existing {
        Some(id) => {
            sqlx::query(
                "UPDATE sync.customers
                 SET store_customer_id = COALESCE($2, store_customer_id),
                     email = COALESCE($3, email), first_name = $4, last_name = $5,
                     attributes = $6, updated_at = now()
                 WHERE id = $1",
            )
            .bind(id)
            .bind(customer.remote_id)
            .bind(email)
            .bind(&customer.first_name)
            .bind(&customer.last_name)
            .bind(&customer.attributes)
            .execute(conn)
            .await?;
            id
        }
        None => {
            sqlx::query_scalar(
                "INSERT INTO sync.customers
                     (store_type, store_id, store_customer_id, email, first_name, last_name,
                      attributes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING id",
            )
            .bind(owner.owner_type.as_str())
            .bind(owner.owner_id)
            .bind(customer.remote_id)
            .bind(email)
            .bind(&customer.first_name)
            .bind(&customer.last_name)
            .bind(&customer.attributes)
            .fetch_one(conn)
            .await?
        }
    };
    Ok(id)
}

async fn save_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &OrderItemWrite,
) -> Result<(), RepositoryError> {
    match item.existing {
        Some(id) => {
            sqlx::query(
                "UPDATE sync.order_items
                 SET title = $3, sku = $4, quantity = $5, price = $6, attributes = $7,
                     updated_at = now()
                 WHERE id = $1 AND order_id = $2",
            )
            .bind(id)
            .bind(order_id)
            .bind(&item.title)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.price)
            .bind(&item.attributes)
            .execute(conn)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO sync.order_items
                     (order_id, product_id, variant_id, store_line_item_id, store_product_id,
                      store_variant_id, title, sku, quantity, price, attributes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.remote_line_item_id)
            .bind(item.remote_product_id)
            .bind(item.remote_variant_id)
            .bind(&item.title)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.price)
            .bind(&item.attributes)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}
