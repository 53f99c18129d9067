//! Payload builders shaped like REST Admin API responses.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use shopsync_engine::SyncConfig;

/// Defaults with the waits taken out.
#[must_use]
pub fn test_config() -> SyncConfig {
    SyncConfig {
        inter_page_sleep: Duration::ZERO,
        rate_limit_backoff: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

/// `2024-05-01T00:00:00Z` plus `minutes`.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn ts(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

#[must_use]
pub fn product(id: i64, created_at: DateTime<Utc>, variant_ids: &[i64]) -> Value {
    let variants: Vec<Value> = variant_ids
        .iter()
        .enumerate()
        .map(|(position, variant_id)| {
            json!({
                "id": variant_id,
                "product_id": id,
                "title": format!("Size {}", position + 1),
                "sku": format!("SKU-{variant_id}"),
                "price": "19.90",
                "position": position + 1,
                "inventory_quantity": 10,
            })
        })
        .collect();
    json!({
        "id": id,
        "title": format!("Product {id}"),
        "handle": format!("product-{id}"),
        "vendor": "Acme",
        "product_type": "Apparel",
        "created_at": created_at.to_rfc3339(),
        "updated_at": created_at.to_rfc3339(),
        "variants": variants,
    })
}

#[must_use]
pub fn line_item(id: i64, product_id: i64, variant_id: i64, quantity: i64) -> Value {
    json!({
        "id": id,
        "product_id": product_id,
        "variant_id": variant_id,
        "title": "Tee",
        "name": "Tee - M",
        "quantity": quantity,
        "price": "19.90",
        "sku": format!("SKU-{variant_id}"),
    })
}

/// A paid order from a registered customer.
#[must_use]
pub fn order(id: i64, created_at: DateTime<Utc>, line_items: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": format!("#{id}"),
        "number": id,
        "email": "jane@example.com",
        "currency": "EUR",
        "total_price": "39.80",
        "financial_status": "paid",
        "fulfillment_status": null,
        "test": false,
        "created_at": created_at.to_rfc3339(),
        "updated_at": created_at.to_rfc3339(),
        "processed_at": created_at.to_rfc3339(),
        "customer": {
            "id": 700,
            "email": "jane@example.com",
            "first_name": "Jane",
            "last_name": "Doe",
        },
        "line_items": line_items,
        "refunds": [],
    })
}

/// `order` with a different customer block (or none with `Value::Null`).
#[must_use]
pub fn with_customer(mut order: Value, customer: Value) -> Value {
    order["customer"] = customer;
    order
}

/// `order` with one refund covering `quantity` of `line_item_id`.
#[must_use]
pub fn with_refund(mut order: Value, line_item_id: i64, quantity: i64) -> Value {
    order["refunds"] = json!([{
        "id": line_item_id * 10,
        "refund_line_items": [{ "line_item_id": line_item_id, "quantity": quantity }],
    }]);
    order
}

/// A `GET /shop.json` record for `domain`.
#[must_use]
pub fn shop_settings(domain: &str, name: &str) -> Value {
    json!({
        "id": 548_380_009,
        "primary_location_id": 655_441_491,
        "name": name,
        "shop_owner": "Jane Doe",
        "email": "owner@example.com",
        "customer_email": "support@example.com",
        "domain": "shop.example.com",
        "myshopify_domain": domain,
        "country_code": "US",
        "primary_locale": "en",
        "timezone": "(GMT-05:00) Eastern Time (US & Canada)",
        "iana_timezone": "America/New_York",
        "currency": "USD",
        "plan_name": "shopify_plus",
        "plan_display_name": "Shopify Plus",
        "multi_location_enabled": true,
        "taxes_included": false,
        "created_at": "2019-03-04T10:11:12-05:00",
        "updated_at": "2024-04-30T08:00:00-04:00",
    })
}
