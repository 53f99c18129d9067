//! Request and response types for collection walks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopsync_core::{RemoteId, SyncFamily};

use crate::sync::mapper::{lookup_path, parse_timestamp};

/// Fetch parameters shared by every page of one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub limit: u32,
    /// Sort expression, always ascending by creation.
    pub order: String,
    pub created_at_min: DateTime<Utc>,
    /// `any` for orders so closed and cancelled orders are included.
    pub status: Option<String>,
}

impl CollectionQuery {
    #[must_use]
    pub fn new(family: SyncFamily, limit: u32, created_at_min: DateTime<Utc>) -> Self {
        Self {
            limit,
            order: "created_at asc".to_string(),
            created_at_min,
            status: match family {
                SyncFamily::Orders => Some("any".to_string()),
                SyncFamily::Products => None,
            },
        }
    }
}

/// Which page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSelector {
    /// 1-based page number.
    Number(u32),
    /// Opaque `page_info` cursor from the previous response.
    Cursor(String),
}

impl PageSelector {
    #[must_use]
    pub const fn first() -> Self {
        Self::Number(1)
    }
}

/// A raw record as returned by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Value);

impl RemoteRecord {
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    #[must_use]
    pub fn id(&self) -> Option<RemoteId> {
        self.0.get("id").and_then(RemoteId::from_json)
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }

    /// Value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    /// Elements of an array field; empty when absent or not an array.
    #[must_use]
    pub fn array(&self, path: &str) -> &[Value] {
        self.get(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the field exists at all (even as `null` or `[]`).
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
}

impl From<Value> for RemoteRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePage {
    pub records: Vec<RemoteRecord>,
    /// Cursor for the following page, when the platform returned one.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_query_status_per_family() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            CollectionQuery::new(SyncFamily::Orders, 50, at).status.as_deref(),
            Some("any")
        );
        assert_eq!(CollectionQuery::new(SyncFamily::Products, 50, at).status, None);
        assert_eq!(CollectionQuery::new(SyncFamily::Products, 50, at).order, "created_at asc");
    }

    #[test]
    fn test_remote_record_accessors() {
        let record = RemoteRecord::new(json!({
            "id": "991",
            "created_at": "2024-02-03T04:05:06+01:00",
            "line_items": [{"id": 1}],
        }));
        assert_eq!(record.id(), Some(RemoteId::new(991)));
        assert_eq!(
            record.created_at(),
            Some(Utc.with_ymd_and_hms(2024, 2, 3, 3, 5, 6).unwrap())
        );
        assert_eq!(record.array("line_items").len(), 1);
        assert!(record.array("refunds").is_empty());
        assert!(record.has("line_items"));
        assert!(!record.has("refunds"));
    }
}
