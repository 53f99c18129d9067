//! Refund adjustment of line-item quantities.

use serde_json::Value;
use shopsync_core::RemoteId;

pub const REFUNDED_SUFFIX: &str = " *Refunded";
pub const PARTIALLY_REFUNDED_SUFFIX: &str = " *Partially Refunded";

/// Total quantity refunded for one line item across every refund of the
/// order (`refunds[].refund_line_items[]` where `line_item_id` matches).
#[must_use]
pub fn refunded_quantity(order: &Value, line_item_id: RemoteId) -> i64 {
    order
        .get("refunds")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|refund| refund.get("refund_line_items").and_then(Value::as_array))
        .flatten()
        .filter(|item| {
            item.get("line_item_id").and_then(RemoteId::from_json) == Some(line_item_id)
        })
        .filter_map(|item| item.get("quantity").and_then(Value::as_i64))
        .sum()
}

/// Quantity and display title after refunds.
///
/// The quantity never goes below zero. A fully refunded item gets
/// [`REFUNDED_SUFFIX`], a reduced one [`PARTIALLY_REFUNDED_SUFFIX`].
#[must_use]
pub fn apply_refund(quantity: i32, title: &str, refunded: i64) -> (i32, String) {
    if refunded <= 0 {
        return (quantity, title.to_string());
    }

    let remaining = i64::from(quantity) - refunded;
    if remaining <= 0 {
        (0, format!("{title}{REFUNDED_SUFFIX}"))
    } else {
        let remaining = i32::try_from(remaining).unwrap_or(quantity);
        (remaining, format!("{title}{PARTIALLY_REFUNDED_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order() -> Value {
        json!({
            "id": 1,
            "refunds": [
                {"refund_line_items": [
                    {"line_item_id": 11, "quantity": 1},
                    {"line_item_id": 12, "quantity": 4},
                ]},
                {"refund_line_items": [{"line_item_id": "11", "quantity": 1}]},
                {"note": "shipping only"},
            ]
        })
    }

    #[test]
    fn test_refunded_quantity_sums_across_refunds() {
        assert_eq!(refunded_quantity(&order(), RemoteId::new(11)), 2);
        assert_eq!(refunded_quantity(&order(), RemoteId::new(12)), 4);
        assert_eq!(refunded_quantity(&order(), RemoteId::new(13)), 0);
        assert_eq!(refunded_quantity(&json!({"refunds": null}), RemoteId::new(11)), 0);
    }

    #[test]
    fn test_full_refund_clamps_to_zero() {
        assert_eq!(apply_refund(5, "Tee", 5), (0, "Tee *Refunded".to_string()));
        assert_eq!(apply_refund(5, "Tee", 9), (0, "Tee *Refunded".to_string()));
    }

    #[test]
    fn test_partial_refund_reduces_quantity() {
        assert_eq!(apply_refund(5, "Tee", 2), (3, "Tee *Partially Refunded".to_string()));
    }

    #[test]
    fn test_no_refund_leaves_item_alone() {
        assert_eq!(apply_refund(5, "Tee", 0), (5, "Tee".to_string()));
    }
}
