//! Mapping tables from REST Admin API payloads to local rows.
//!
//! Typed columns are pulled out of the mapped record by the import services;
//! the whole mapped record is kept in the row's `attributes` JSON.

use serde_json::{Value, json};

use super::mapper::{FieldMap, FieldSpec};

/// Order header fields.
pub const ORDER_MAP: FieldMap = FieldMap::new(
    "orders",
    &[
        FieldSpec::copy("id", "store_order_id").required(),
        FieldSpec::copy("customer.id", "store_customer_id"),
        FieldSpec::copy("location_id", "store_location_id"),
        FieldSpec::copy("number", "number"),
        FieldSpec::copy("name", "name"),
        FieldSpec::copy("test", "test"),
        FieldSpec::copy("email", "email"),
        FieldSpec::copy("contact_email", "contact_email"),
        FieldSpec::copy("phone", "phone"),
        FieldSpec::copy("currency", "currency"),
        FieldSpec::copy("presentment_currency", "presentment_currency"),
        FieldSpec::copy("total_price", "total_price"),
        FieldSpec::copy("subtotal_price", "subtotal_price"),
        FieldSpec::copy("total_tax", "total_tax"),
        FieldSpec::copy("total_discounts", "total_discounts"),
        FieldSpec::copy("total_line_items_price", "total_line_items_price"),
        FieldSpec::copy("total_weight", "total_weight"),
        FieldSpec::copy("discount_codes", "discount_codes"),
        FieldSpec::copy("tax_lines", "tax_lines"),
        FieldSpec::copy("tax_included", "tax_included"),
        FieldSpec::truncate("gateway", "gateway", 64),
        FieldSpec::copy("payment_gateway_names", "payment_gateway_names"),
        FieldSpec::copy("processing_method", "processing_method"),
        FieldSpec::copy("financial_status", "financial_status"),
        FieldSpec::copy("fulfillment_status", "fulfillment_status"),
        FieldSpec::copy("cancel_reason", "cancel_reason"),
        FieldSpec::copy("source_name", "source_name"),
        FieldSpec::copy("tags", "tags"),
        FieldSpec::copy("note", "note"),
        FieldSpec::copy("note_attributes", "note_attributes"),
        FieldSpec::copy("shipping_address.first_name", "shipping_first_name"),
        FieldSpec::copy("shipping_address.last_name", "shipping_last_name"),
        FieldSpec::truncate("shipping_address.phone", "shipping_phone", 32),
        FieldSpec::copy("shipping_address.company", "shipping_company"),
        FieldSpec::truncate("shipping_address.address1", "shipping_address1", 128),
        FieldSpec::truncate("shipping_address.address2", "shipping_address2", 128),
        FieldSpec::copy("shipping_address.city", "shipping_city"),
        FieldSpec::copy("shipping_address.province_code", "shipping_province_code"),
        FieldSpec::copy("shipping_address.zip", "shipping_zip"),
        FieldSpec::copy("shipping_address.country_code", "shipping_country_code"),
        FieldSpec::copy("billing_address.first_name", "billing_first_name"),
        FieldSpec::copy("billing_address.last_name", "billing_last_name"),
        FieldSpec::truncate("billing_address.phone", "billing_phone", 32),
        FieldSpec::copy("billing_address.city", "billing_city"),
        FieldSpec::copy("billing_address.zip", "billing_zip"),
        FieldSpec::copy("billing_address.country_code", "billing_country_code"),
        FieldSpec::truncate("client_details.browser_ip", "client_details_browser_ip", 32),
        FieldSpec::copy("client_details.user_agent", "client_details_user_agent"),
        FieldSpec::copy("landing_site", "landing_site"),
        FieldSpec::copy("referring_site", "referring_site"),
        FieldSpec::timestamp("closed_at", "closed_at"),
        FieldSpec::timestamp("cancelled_at", "cancelled_at"),
        FieldSpec::timestamp("processed_at", "processed_at"),
        FieldSpec::timestamp("created_at", "store_created_at").required(),
        FieldSpec::timestamp("updated_at", "store_updated_at"),
        FieldSpec::computed("line_item_count", line_item_count),
    ],
);

/// Order line-item fields.
pub const LINE_ITEM_MAP: FieldMap = FieldMap::new(
    "order_items",
    &[
        FieldSpec::copy("id", "store_line_item_id").required(),
        FieldSpec::copy("product_id", "store_product_id").required(),
        FieldSpec::copy("variant_id", "store_variant_id").required(),
        FieldSpec::copy("name", "name"),
        FieldSpec::copy("title", "title").required(),
        FieldSpec::copy("variant_title", "variant_title"),
        FieldSpec::copy("quantity", "quantity").required(),
        FieldSpec::copy("price", "price"),
        FieldSpec::copy("total_discount", "total_discount"),
        FieldSpec::copy("sku", "sku"),
        FieldSpec::copy("vendor", "vendor"),
        FieldSpec::copy("grams", "grams"),
        FieldSpec::copy("gift_card", "gift_card"),
        FieldSpec::copy("taxable", "taxable"),
        FieldSpec::copy("requires_shipping", "requires_shipping"),
        FieldSpec::copy("properties", "properties"),
        FieldSpec::copy("fulfillment_service", "fulfillment_service"),
        FieldSpec::copy("fulfillment_status", "fulfillment_status"),
        FieldSpec::copy("fulfillable_quantity", "fulfillable_quantity"),
    ],
);

/// Customer fields, read out of an order payload.
pub const CUSTOMER_MAP: FieldMap = FieldMap::new(
    "customers",
    &[
        FieldSpec::copy("customer.id", "store_customer_id"),
        FieldSpec::copy("customer.last_order_id", "store_last_order_id"),
        FieldSpec::copy("customer.email", "email"),
        FieldSpec::copy("customer.first_name", "first_name"),
        FieldSpec::copy("customer.last_name", "last_name"),
        FieldSpec::computed("full_name", customer_full_name),
        FieldSpec::copy("customer.phone", "phone"),
        FieldSpec::copy("customer.default_address.company", "company"),
        FieldSpec::copy("customer.default_address.city", "city"),
        FieldSpec::copy("customer.default_address.zip", "zip"),
        FieldSpec::copy("customer.default_address.country_code", "country_code"),
        FieldSpec::copy("customer.accepts_marketing", "accepts_marketing"),
        FieldSpec::copy("customer.tags", "tags"),
        FieldSpec::copy("customer.currency", "currency"),
        FieldSpec::copy("customer.orders_count", "orders_count"),
        FieldSpec::copy("customer.total_spent", "total_spent"),
        FieldSpec::copy("customer.verified_email", "verified_email"),
        FieldSpec::timestamp("customer.created_at", "store_created_at"),
        FieldSpec::timestamp("customer.updated_at", "store_updated_at"),
    ],
);

/// Product fields.
pub const PRODUCT_MAP: FieldMap = FieldMap::new(
    "products",
    &[
        FieldSpec::copy("id", "store_product_id").required(),
        FieldSpec::copy("title", "title").required(),
        FieldSpec::copy("body_html", "body_html"),
        FieldSpec::copy("vendor", "vendor"),
        FieldSpec::copy("product_type", "product_type"),
        FieldSpec::copy("handle", "handle"),
        FieldSpec::copy("status", "status"),
        FieldSpec::copy("template_suffix", "template_suffix"),
        FieldSpec::copy("published_scope", "published_scope"),
        FieldSpec::copy("tags", "tags"),
        FieldSpec::copy("options", "options"),
        FieldSpec::copy("image", "image"),
        FieldSpec::timestamp("published_at", "published_at"),
        FieldSpec::timestamp("created_at", "store_created_at").required(),
        FieldSpec::timestamp("updated_at", "store_updated_at"),
    ],
);

/// Variant fields, read out of a product payload's `variants` array.
pub const VARIANT_MAP: FieldMap = FieldMap::new(
    "variants",
    &[
        FieldSpec::copy("id", "store_variant_id").required(),
        FieldSpec::copy("product_id", "store_product_id"),
        FieldSpec::copy("image_id", "store_image_id"),
        FieldSpec::copy("title", "title").required(),
        FieldSpec::copy("sku", "sku"),
        FieldSpec::copy("barcode", "barcode"),
        FieldSpec::copy("price", "price"),
        FieldSpec::copy("compare_at_price", "compare_at_price"),
        FieldSpec::copy("position", "position"),
        FieldSpec::copy("option1", "option1"),
        FieldSpec::copy("option2", "option2"),
        FieldSpec::copy("option3", "option3"),
        FieldSpec::copy("grams", "grams"),
        FieldSpec::copy("weight", "weight"),
        FieldSpec::copy("weight_unit", "weight_unit"),
        FieldSpec::copy("taxable", "taxable"),
        FieldSpec::copy("requires_shipping", "requires_shipping"),
        FieldSpec::copy("inventory_item_id", "inventory_item_id"),
        FieldSpec::copy("inventory_quantity", "inventory_quantity"),
        FieldSpec::copy("inventory_policy", "inventory_policy"),
        FieldSpec::copy("inventory_management", "inventory_management"),
        FieldSpec::timestamp("created_at", "store_created_at"),
        FieldSpec::timestamp("updated_at", "store_updated_at"),
    ],
);

/// Shop settings, read from `GET /shop.json`.
pub const STORE_MAP: FieldMap = FieldMap::new(
    "stores",
    &[
        FieldSpec::copy("id", "store_shop_id"),
        FieldSpec::copy("primary_location_id", "store_primary_location_id").required(),
        FieldSpec::copy("name", "name").required(),
        FieldSpec::copy("shop_owner", "shop_owner").required(),
        FieldSpec::copy("email", "email").required(),
        FieldSpec::copy("customer_email", "customer_email"),
        FieldSpec::copy("domain", "domain"),
        FieldSpec::copy("myshopify_domain", "myshopify_domain").required(),
        FieldSpec::copy("address1", "address1"),
        FieldSpec::copy("address2", "address2"),
        FieldSpec::copy("city", "city"),
        FieldSpec::copy("zip", "zip"),
        FieldSpec::copy("province", "province"),
        FieldSpec::copy("province_code", "province_code"),
        FieldSpec::copy("country", "country"),
        FieldSpec::copy("country_code", "country_code"),
        FieldSpec::copy("country_name", "country_name"),
        FieldSpec::copy("source", "source"),
        FieldSpec::copy("phone", "phone"),
        FieldSpec::copy("latitude", "latitude"),
        FieldSpec::copy("longitude", "longitude"),
        FieldSpec::truncate("primary_locale", "primary_locale", 8).required(),
        FieldSpec::copy("timezone", "timezone").required(),
        FieldSpec::copy("iana_timezone", "iana_timezone"),
        FieldSpec::copy("currency", "currency").required(),
        FieldSpec::copy("money_format", "money_format"),
        FieldSpec::copy("money_with_currency_format", "money_with_currency_format"),
        FieldSpec::copy("weight_unit", "weight_unit"),
        FieldSpec::truncate("plan_name", "plan_name", 32),
        FieldSpec::truncate("plan_display_name", "plan_display_name", 16),
        FieldSpec::copy("has_discounts", "has_discounts"),
        FieldSpec::copy("has_gift_cards", "has_gift_cards"),
        FieldSpec::copy("has_storefront", "has_storefront"),
        FieldSpec::copy("eligible_for_payments", "eligible_for_payments"),
        FieldSpec::copy("finances", "finances"),
        FieldSpec::copy("checkout_api_supported", "checkout_api_supported"),
        FieldSpec::copy("multi_location_enabled", "multi_location_enabled").required(),
        FieldSpec::copy("force_ssl", "force_ssl"),
        FieldSpec::copy("pre_launch_enabled", "pre_launch_enabled"),
        FieldSpec::copy("password_enabled", "password_enabled"),
        FieldSpec::copy("enabled_presentment_currencies", "enabled_presentment_currencies"),
        FieldSpec::copy("taxes_included", "taxes_included"),
        FieldSpec::copy("tax_shipping", "tax_shipping"),
        FieldSpec::copy("county_taxes", "county_taxes"),
        FieldSpec::copy("setup_required", "setup_required"),
        FieldSpec::timestamp("created_at", "store_created_at").required(),
        FieldSpec::timestamp("updated_at", "store_updated_at").required(),
    ],
);

fn line_item_count(record: &Value) -> Value {
    json!(record.get("line_items").and_then(Value::as_array).map_or(0, Vec::len))
}

fn customer_full_name(record: &Value) -> Value {
    let Some(customer) = record.get("customer") else {
        return Value::Null;
    };
    let name = ["first_name", "last_name"]
        .iter()
        .filter_map(|key| customer.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        Value::Null
    } else {
        Value::String(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_map_flattens_and_truncates() {
        let order = json!({
            "id": 1001,
            "customer": {"id": 55, "first_name": "Ada", "last_name": " Lovelace "},
            "gateway": "g".repeat(80),
            "shipping_address": {"phone": "0".repeat(40), "address1": "1 Main St"},
            "client_details": {"browser_ip": "2001:0db8:85a3:0000:0000:8a2e:0370:7334"},
            "created_at": "2024-01-02T03:04:05Z",
            "line_items": [{}, {}, {}],
        });

        let mapped = ORDER_MAP.map(&order).unwrap();
        assert_eq!(mapped.i64("store_order_id"), Some(1001));
        assert_eq!(mapped.i64("store_customer_id"), Some(55));
        assert_eq!(mapped.string("gateway").unwrap().len(), 64);
        assert_eq!(mapped.string("shipping_phone").unwrap().len(), 32);
        assert_eq!(mapped.string("client_details_browser_ip").unwrap().len(), 32);
        assert_eq!(mapped.string("shipping_address1").as_deref(), Some("1 Main St"));
        assert_eq!(mapped.i64("line_item_count"), Some(3));

        let customer = CUSTOMER_MAP.map(&order).unwrap();
        assert_eq!(customer.string("full_name").as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_order_map_requires_id_and_created_at() {
        let err = ORDER_MAP.map(&json!({"name": "#1001"})).unwrap_err();
        assert!(err.to_string().contains("id"));
        assert!(err.to_string().contains("created_at"));
    }

    #[test]
    fn test_guest_order_has_no_customer_name() {
        let mapped = CUSTOMER_MAP.map(&json!({"email": "guest@example.com"})).unwrap();
        assert!(mapped.get("full_name").is_none());
        assert!(mapped.remote_id("store_customer_id").is_none());
    }

    #[test]
    fn test_store_map_truncates_plan_and_locale() {
        let shop = json!({
            "id": 548380009,
            "primary_location_id": 655441491,
            "name": "Acme",
            "shop_owner": "Jane Doe",
            "email": "owner@acme.test",
            "myshopify_domain": "acme.myshopify.com",
            "primary_locale": "en-GB-oxendict",
            "timezone": "(GMT-05:00) Eastern Time (US & Canada)",
            "currency": "USD",
            "plan_name": "p".repeat(40),
            "plan_display_name": "Shopify Plus Partner Sandbox",
            "multi_location_enabled": true,
            "created_at": "2019-03-04T10:11:12-05:00",
            "updated_at": "2024-05-01T00:00:00Z",
        });

        let mapped = STORE_MAP.map(&shop).unwrap();
        assert_eq!(mapped.string("primary_locale").as_deref(), Some("en-GB-ox"));
        assert_eq!(mapped.string("plan_name").unwrap().len(), 32);
        assert_eq!(mapped.string("plan_display_name").unwrap().len(), 16);
        assert_eq!(mapped.bool("multi_location_enabled"), Some(true));
        assert!(mapped.timestamp("store_created_at").is_some());
    }

    #[test]
    fn test_store_map_requires_identity_fields() {
        let err = STORE_MAP.map(&json!({"name": "Acme"})).unwrap_err();
        assert!(err.to_string().contains("myshopify_domain"));
        assert!(err.to_string().contains("currency"));
    }

    #[test]
    fn test_variant_map_requires_title() {
        let err = VARIANT_MAP.map(&json!({"id": 9})).unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
