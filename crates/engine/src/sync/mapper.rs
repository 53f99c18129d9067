//! Generic remote-to-local field mapper.
//!
//! A [`FieldMap`] is an ordered list of [`FieldSpec`] tuples
//! `(source path, target field, transform)`. [`FieldMap::apply`] walks the
//! list once against a nested JSON record and produces a flat
//! [`MappedRecord`]; [`FieldMap::validate`] then asserts that every required
//! source path was present. The tables themselves live in
//! [`crate::sync::fields`].

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use shopsync_core::{Email, RemoteId};
use thiserror::Error;

/// Computes a target value from the whole source record.
pub type ComputeFn = fn(&Value) -> Value;

/// Errors raised while mapping a remote record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Required source paths were absent from the record.
    #[error("{map}: missing required fields: {}", .fields.join(", "))]
    MissingRequired {
        map: &'static str,
        fields: Vec<&'static str>,
    },

    /// A timestamp field held something that is not RFC 3339.
    #[error("{map}: invalid timestamp in {field}: {value}")]
    InvalidTimestamp {
        map: &'static str,
        field: &'static str,
        value: String,
    },
}

/// Per-field coercion applied after the source value is read.
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// Copy the value as-is.
    Copy,
    /// Parse as RFC 3339 and re-emit in UTC.
    Timestamp,
    /// Truncate strings to at most this many characters.
    Truncate(usize),
    /// Ignore the source path and compute from the whole record.
    Computed(ComputeFn),
}

/// One row of a mapping table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub source: &'static str,
    pub target: &'static str,
    pub transform: Transform,
    pub required: bool,
}

impl FieldSpec {
    #[must_use]
    pub const fn copy(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            transform: Transform::Copy,
            required: false,
        }
    }

    #[must_use]
    pub const fn timestamp(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            transform: Transform::Timestamp,
            required: false,
        }
    }

    #[must_use]
    pub const fn truncate(source: &'static str, target: &'static str, max: usize) -> Self {
        Self {
            source,
            target,
            transform: Transform::Truncate(max),
            required: false,
        }
    }

    #[must_use]
    pub const fn computed(target: &'static str, compute: ComputeFn) -> Self {
        Self {
            source: "",
            target,
            transform: Transform::Computed(compute),
            required: false,
        }
    }

    /// Mark the source path as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A named, ordered mapping table.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    name: &'static str,
    fields: &'static [FieldSpec],
}

impl FieldMap {
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { name, fields }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Map and validate in one call.
    ///
    /// # Errors
    ///
    /// Returns `MappingError` if a timestamp is malformed or a required source
    /// path is absent.
    pub fn map(&self, record: &Value) -> Result<MappedRecord, MappingError> {
        let mapped = self.apply(record)?;
        self.validate(&mapped)?;
        Ok(mapped)
    }

    /// Run every spec against `record`. Absent sources map to `null`.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidTimestamp` for unparseable timestamps.
    pub fn apply(&self, record: &Value) -> Result<MappedRecord, MappingError> {
        let mut values = Map::with_capacity(self.fields.len());
        let mut absent = Vec::new();

        for spec in self.fields {
            let source = match spec.transform {
                Transform::Computed(compute) => Some(compute(record)),
                _ => lookup_path(record, spec.source).cloned(),
            };

            let Some(source) = source else {
                absent.push(spec.source);
                values.insert(spec.target.to_string(), Value::Null);
                continue;
            };

            let value = match spec.transform {
                Transform::Copy | Transform::Computed(_) => source,
                Transform::Timestamp => normalize_timestamp(&source).ok_or_else(|| {
                    MappingError::InvalidTimestamp {
                        map: self.name,
                        field: spec.source,
                        value: source.to_string(),
                    }
                })?,
                Transform::Truncate(max) => truncate(source, max),
            };
            values.insert(spec.target.to_string(), value);
        }

        Ok(MappedRecord {
            map: self.name,
            values,
            absent,
        })
    }

    /// Assert that every required source path was present.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::MissingRequired` listing every absent path.
    pub fn validate(&self, mapped: &MappedRecord) -> Result<(), MappingError> {
        let missing: Vec<&'static str> = self
            .fields
            .iter()
            .filter(|spec| spec.required && mapped.absent.contains(&spec.source))
            .map(|spec| spec.source)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MappingError::MissingRequired {
                map: self.name,
                fields: missing,
            })
        }
    }
}

/// Flat result of applying a [`FieldMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    map: &'static str,
    values: Map<String, Value>,
    absent: Vec<&'static str>,
}

impl MappedRecord {
    #[must_use]
    pub const fn map_name(&self) -> &'static str {
        self.map
    }

    /// Non-null value of a target field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    /// Non-empty string value; numbers are rendered as text.
    #[must_use]
    pub fn string(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn i64(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn i32(&self, field: &str) -> Option<i32> {
        self.i64(field).and_then(|v| i32::try_from(v).ok())
    }

    #[must_use]
    pub fn bool(&self, field: &str) -> Option<bool> {
        match self.get(field)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn decimal(&self, field: &str) -> Option<Decimal> {
        match self.get(field)? {
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        }
    }

    /// Timestamp field; values were normalised to RFC 3339 by the mapper.
    #[must_use]
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.get(field)? {
            Value::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn remote_id(&self, field: &str) -> Option<RemoteId> {
        RemoteId::from_json(self.get(field)?)
    }

    #[must_use]
    pub fn email(&self, field: &str) -> Option<Email> {
        Email::parse_lenient(self.string(field).as_deref())
    }

    /// Overwrite a target value after mapping.
    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    /// The flat record as a JSON object, for the `attributes` column.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Walk a dotted path through objects and arrays (`shipping_address.zip`,
/// `line_items.0.sku`).
#[must_use]
pub fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(record, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Parse an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn normalize_timestamp(value: &Value) -> Option<Value> {
    match value {
        Value::Null => Some(Value::Null),
        Value::String(s) if s.trim().is_empty() => Some(Value::Null),
        Value::String(s) => parse_timestamp(s)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        _ => None,
    }
}

fn truncate(value: Value, max: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max => {
            Value::String(s.chars().take(max).collect())
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn item_count(record: &Value) -> Value {
        json!(record["items"].as_array().map_or(0, Vec::len))
    }

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::copy("id", "store_id").required(),
        FieldSpec::copy("address.city", "city"),
        FieldSpec::truncate("address.phone", "phone", 5),
        FieldSpec::timestamp("created_at", "store_created_at").required(),
        FieldSpec::computed("item_count", item_count),
        FieldSpec::copy("items.1.sku", "second_sku"),
    ];
    const MAP: FieldMap = FieldMap::new("widgets", FIELDS);

    fn record() -> Value {
        json!({
            "id": 17,
            "address": {"city": "Montreal", "phone": "+1 514 555 0100"},
            "created_at": "2024-03-01T10:15:00-05:00",
            "items": [{"sku": "A"}, {"sku": "B"}],
        })
    }

    #[test]
    fn test_maps_nested_paths_in_order() {
        let mapped = MAP.map(&record()).unwrap();
        assert_eq!(mapped.i64("store_id"), Some(17));
        assert_eq!(mapped.string("city").as_deref(), Some("Montreal"));
        assert_eq!(mapped.string("second_sku").as_deref(), Some("B"));
        assert_eq!(mapped.i64("item_count"), Some(2));

        let keys: Vec<_> = mapped.to_value().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), FIELDS.len());
    }

    #[test]
    fn test_timestamp_normalized_to_utc() {
        let mapped = MAP.map(&record()).unwrap();
        assert_eq!(
            mapped.timestamp("store_created_at"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 15, 15, 0).unwrap())
        );
        assert_eq!(
            mapped.string("store_created_at").as_deref(),
            Some("2024-03-01T15:15:00Z")
        );
    }

    #[test]
    fn test_truncation_counts_characters() {
        let mapped = MAP.map(&record()).unwrap();
        assert_eq!(mapped.string("phone").as_deref(), Some("+1 51"));

        let mut short = record();
        short["address"]["phone"] = json!("é1");
        assert_eq!(MAP.map(&short).unwrap().string("phone").as_deref(), Some("é1"));
    }

    #[test]
    fn test_absent_optional_maps_to_null() {
        let mut sparse = record();
        sparse.as_object_mut().unwrap().remove("address");
        let mapped = MAP.map(&sparse).unwrap();
        assert!(mapped.get("city").is_none());
        assert_eq!(mapped.to_value()["city"], Value::Null);
    }

    #[test]
    fn test_required_validation_is_a_separate_pass() {
        let mut broken = record();
        broken.as_object_mut().unwrap().remove("id");
        broken.as_object_mut().unwrap().remove("created_at");

        let mapped = MAP.apply(&broken).unwrap();
        let err = MAP.validate(&mapped).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingRequired {
                map: "widgets",
                fields: vec!["id", "created_at"],
            }
        );
    }

    #[test]
    fn test_required_null_is_present() {
        let mut nulled = record();
        nulled["created_at"] = Value::Null;
        let mapped = MAP.map(&nulled).unwrap();
        assert!(mapped.timestamp("store_created_at").is_none());
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut bad = record();
        bad["created_at"] = json!("last tuesday");
        let err = MAP.map(&bad).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InvalidTimestamp { field: "created_at", .. }
        ));
    }

    #[test]
    fn test_typed_accessors() {
        const TYPED: FieldMap = FieldMap::new(
            "typed",
            &[
                FieldSpec::copy("price", "price"),
                FieldSpec::copy("qty", "qty"),
                FieldSpec::copy("flag", "flag"),
                FieldSpec::copy("email", "email"),
                FieldSpec::copy("empty", "empty"),
            ],
        );
        let mapped = TYPED
            .map(&json!({
                "price": "19.90",
                "qty": "3",
                "flag": 1,
                "email": " Someone@Example.com ",
                "empty": "",
            }))
            .unwrap();

        assert_eq!(mapped.decimal("price"), Some(Decimal::new(1990, 2)));
        assert_eq!(mapped.i32("qty"), Some(3));
        assert_eq!(mapped.bool("flag"), Some(true));
        assert_eq!(
            mapped.email("email").unwrap().as_str(),
            "Someone@example.com"
        );
        assert_eq!(mapped.string("empty"), None);
    }

    #[test]
    fn test_lookup_path_edge_cases() {
        let value = json!({"a": [{"b": 1}]});
        assert_eq!(lookup_path(&value, "a.0.b"), Some(&json!(1)));
        assert_eq!(lookup_path(&value, "a.x.b"), None);
        assert_eq!(lookup_path(&value, ""), None);
    }
}
