//! Import gating: which fetched records are worth importing.

use std::collections::HashMap;

use serde_json::Value;
use shopsync_core::RemoteId;

use crate::models::Variant;
use crate::shopify::RemoteRecord;

/// Why a record is not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingId,
    /// The order has no `line_items` at all, or an empty list.
    NoLineItems,
    /// None of the order's line items reference a known variant.
    NoResolvableItems,
}

impl Rejection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::NoLineItems => "no_line_items",
            Self::NoResolvableItems => "no_resolvable_items",
        }
    }
}

/// Per-family import predicate.
pub trait ImportQualifier: Send + Sync {
    /// Decide whether an order is imported, given the local variants its line
    /// items resolve to.
    ///
    /// # Errors
    ///
    /// Returns the reason the order is skipped.
    fn order(
        &self,
        order: &RemoteRecord,
        variants: &HashMap<RemoteId, Variant>,
    ) -> Result<(), Rejection>;

    /// # Errors
    ///
    /// Returns the reason the product is skipped.
    fn product(&self, product: &RemoteRecord) -> Result<(), Rejection>;
}

/// Orders need at least one line item that resolves to a local variant;
/// products only need an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQualifier;

impl ImportQualifier for DefaultQualifier {
    fn order(
        &self,
        order: &RemoteRecord,
        variants: &HashMap<RemoteId, Variant>,
    ) -> Result<(), Rejection> {
        if order.id().is_none() {
            return Err(Rejection::MissingId);
        }
        let line_items = order.array("line_items");
        if line_items.is_empty() {
            return Err(Rejection::NoLineItems);
        }
        if resolvable_line_items(line_items, variants).next().is_none() {
            return Err(Rejection::NoResolvableItems);
        }
        Ok(())
    }

    fn product(&self, product: &RemoteRecord) -> Result<(), Rejection> {
        product.id().map(|_| ()).ok_or(Rejection::MissingId)
    }
}

/// Remote product and variant ids of a line item; either missing means the
/// item cannot be imported (custom sales, deleted products).
#[must_use]
pub fn line_item_refs(line_item: &Value) -> Option<(RemoteId, RemoteId)> {
    let product_id = line_item.get("product_id").and_then(RemoteId::from_json)?;
    let variant_id = line_item.get("variant_id").and_then(RemoteId::from_json)?;
    Some((product_id, variant_id))
}

/// Line items whose variant is known locally.
pub fn resolvable_line_items<'a>(
    line_items: &'a [Value],
    variants: &'a HashMap<RemoteId, Variant>,
) -> impl Iterator<Item = &'a Value> + 'a {
    line_items.iter().filter(|item| {
        line_item_refs(item).is_some_and(|(_, variant_id)| variants.contains_key(&variant_id))
    })
}

/// Distinct variant ids referenced by the line items of `orders`.
#[must_use]
pub fn referenced_variant_ids<'a>(orders: impl IntoIterator<Item = &'a RemoteRecord>) -> Vec<RemoteId> {
    let mut ids: Vec<RemoteId> = orders
        .into_iter()
        .flat_map(|order| order.array("line_items"))
        .filter_map(|item| line_item_refs(item).map(|(_, variant_id)| variant_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use shopsync_core::{ProductId, VariantId};

    use super::*;

    fn variant(remote_id: i64) -> Variant {
        Variant {
            id: VariantId::new(1),
            product_id: ProductId::new(1),
            remote_id: RemoteId::new(remote_id),
            remote_product_id: Some(RemoteId::new(10)),
            title: "Default".to_string(),
            sku: None,
            price: None,
            position: Some(1),
            inventory_quantity: None,
            attributes: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn known() -> HashMap<RemoteId, Variant> {
        HashMap::from([(RemoteId::new(100), variant(100))])
    }

    #[test]
    fn test_order_without_line_items_is_rejected() {
        let order = RemoteRecord::new(json!({"id": 1, "line_items": []}));
        assert_eq!(DefaultQualifier.order(&order, &known()), Err(Rejection::NoLineItems));

        let order = RemoteRecord::new(json!({"id": 1}));
        assert_eq!(DefaultQualifier.order(&order, &known()), Err(Rejection::NoLineItems));
    }

    #[test]
    fn test_order_with_unknown_variants_is_rejected() {
        let order = RemoteRecord::new(json!({
            "id": 1,
            "line_items": [
                {"id": 5, "product_id": 10, "variant_id": 999},
                {"id": 6, "product_id": null, "variant_id": null},
            ]
        }));
        assert_eq!(
            DefaultQualifier.order(&order, &known()),
            Err(Rejection::NoResolvableItems)
        );
    }

    #[test]
    fn test_order_with_one_resolvable_item_qualifies() {
        let order = RemoteRecord::new(json!({
            "id": 1,
            "line_items": [
                {"id": 5, "product_id": 10, "variant_id": 999},
                {"id": 6, "product_id": 10, "variant_id": "100"},
            ]
        }));
        assert!(DefaultQualifier.order(&order, &known()).is_ok());

        let variants = known();
        let items: Vec<_> = resolvable_line_items(order.array("line_items"), &variants).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], 6);
    }

    #[test]
    fn test_referenced_variant_ids_are_distinct() {
        let orders = [
            RemoteRecord::new(json!({"line_items": [{"product_id": 1, "variant_id": 3}]})),
            RemoteRecord::new(json!({"line_items": [
                {"product_id": 1, "variant_id": 3},
                {"product_id": 1, "variant_id": 2},
                {"product_id": null, "variant_id": 9},
            ]})),
        ];
        assert_eq!(
            referenced_variant_ids(&orders),
            vec![RemoteId::new(2), RemoteId::new(3)]
        );
    }

    #[test]
    fn test_product_requires_id() {
        assert!(DefaultQualifier.product(&RemoteRecord::new(json!({"id": 7}))).is_ok());
        assert_eq!(
            DefaultQualifier.product(&RemoteRecord::new(json!({"title": "x"}))),
            Err(Rejection::MissingId)
        );
    }
}
