//! Order and order item models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use shopsync_core::{
    CustomerId, Email, FinancialStatus, FulfillmentStatus, OrderId, OrderItemId, ProductId,
    RemoteId, StoreOwner, VariantId,
};

use super::Customer;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: StoreOwner,
    pub remote_id: RemoteId,
    pub customer_id: Option<CustomerId>,
    pub name: Option<String>,
    pub number: Option<i64>,
    pub email: Option<Email>,
    pub financial_status: FinancialStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub currency: Option<String>,
    pub total_price: Option<Decimal>,
    pub test: bool,
    pub attributes: Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub store_created_at: Option<DateTime<Utc>>,
    pub store_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub remote_line_item_id: RemoteId,
    pub remote_product_id: RemoteId,
    pub remote_variant_id: RemoteId,
    /// Display title, carrying a refund suffix once refunded.
    pub title: String,
    pub sku: Option<String>,
    /// Refund-adjusted quantity.
    pub quantity: i32,
    pub price: Option<Decimal>,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order with its items and customer, as reloaded after a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAggregate {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub customer: Option<Customer>,
}

impl OrderAggregate {
    #[must_use]
    pub fn item_by_remote_id(&self, remote_id: RemoteId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.remote_line_item_id == remote_id)
    }
}

/// Resolved order upsert, applied atomically with its customer and items.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderWrite {
    /// Local row to update; `None` inserts.
    pub existing: Option<OrderId>,
    pub owner: StoreOwner,
    pub remote_id: RemoteId,
    pub customer: Option<super::CustomerWrite>,
    pub name: Option<String>,
    pub number: Option<i64>,
    pub email: Option<Email>,
    pub financial_status: FinancialStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub currency: Option<String>,
    pub total_price: Option<Decimal>,
    pub test: bool,
    pub attributes: Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub store_created_at: Option<DateTime<Utc>>,
    pub store_updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemWrite>,
}

/// Resolved order item upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemWrite {
    /// Local row to update in place; `None` inserts.
    pub existing: Option<OrderItemId>,
    pub remote_line_item_id: RemoteId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub remote_product_id: RemoteId,
    pub remote_variant_id: RemoteId,
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub price: Option<Decimal>,
    pub attributes: Value,
}
