//! Status and mode enums shared by the engine and the CLI.
//!
//! These are persisted as plain `TEXT` columns (bound through `as_str()` and
//! read back through `FromStr`), so adding a variant never needs a migration.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Entity family walked by a page walker.
///
/// Each family has its own watermark on the store and its own lock key, so an
/// orders pass and a products pass for the same store never block each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFamily {
    Orders,
    Products,
}

impl SyncFamily {
    /// All walkable families, products first (orders depend on variants).
    pub const ALL: [Self; 2] = [Self::Products, Self::Orders];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Products => "products",
        }
    }

    /// Singular name used in per-record log keys (`order:123:dryrun`).
    #[must_use]
    pub const fn singular(self) -> &'static str {
        match self {
            Self::Orders => "order",
            Self::Products => "product",
        }
    }
}

impl fmt::Display for SyncFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncFamily {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orders" | "order" => Ok(Self::Orders),
            "products" | "product" => Ok(Self::Products),
            other => Err(UnknownVariant {
                kind: "sync family",
                value: other.to_string(),
            }),
        }
    }
}

/// How units of work are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every page and record is processed inline by the caller.
    #[default]
    Immediate,
    /// Pages and records are pushed onto the job queue and run by workers.
    Deferred,
}

impl ExecutionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "sync" => Ok(Self::Immediate),
            "deferred" | "queue" => Ok(Self::Deferred),
            other => Err(UnknownVariant {
                kind: "execution mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Order financial status.
///
/// Maps to the REST Admin API's lowercase financial status values. Values the
/// platform adds later land in `Unknown` instead of failing the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    #[default]
    Pending,
    Authorized,
    PartiallyPaid,
    Paid,
    PartiallyRefunded,
    Refunded,
    Voided,
    #[serde(other)]
    Unknown,
}

impl FinancialStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
            Self::Voided => "voided",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a remote value, falling back to `Unknown`.
    #[must_use]
    pub fn from_remote(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "authorized" => Self::Authorized,
            "partially_paid" => Self::PartiallyPaid,
            "paid" => Self::Paid,
            "partially_refunded" => Self::PartiallyRefunded,
            "refunded" => Self::Refunded,
            "voided" => Self::Voided,
            _ => Self::Unknown,
        }
    }
}

/// Order fulfillment status.
///
/// The REST API reports an unfulfilled order as `null`, which maps to
/// `Unfulfilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Unfulfilled,
    Partial,
    Fulfilled,
    Restocked,
    #[serde(other)]
    Unknown,
}

impl FulfillmentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unfulfilled => "unfulfilled",
            Self::Partial => "partial",
            Self::Fulfilled => "fulfilled",
            Self::Restocked => "restocked",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a remote value; `None` means unfulfilled.
    #[must_use]
    pub fn from_remote(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("" | "unfulfilled") => Self::Unfulfilled,
            Some("partial") => Self::Partial,
            Some("fulfilled") => Self::Fulfilled,
            Some("restocked") => Self::Restocked,
            Some(_) => Self::Unknown,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_family_parse() {
        assert_eq!("orders".parse::<SyncFamily>().unwrap(), SyncFamily::Orders);
        assert_eq!(" Product ".parse::<SyncFamily>().unwrap(), SyncFamily::Products);
        assert!("customers".parse::<SyncFamily>().is_err());
    }

    #[test]
    fn test_sync_family_serde() {
        let json = serde_json::to_string(&SyncFamily::Products).unwrap();
        assert_eq!(json, "\"products\"");
    }

    #[test]
    fn test_execution_mode_aliases() {
        assert_eq!("queue".parse::<ExecutionMode>().unwrap(), ExecutionMode::Deferred);
        assert_eq!("sync".parse::<ExecutionMode>().unwrap(), ExecutionMode::Immediate);
    }

    #[test]
    fn test_financial_status_from_remote() {
        assert_eq!(
            FinancialStatus::from_remote("partially_refunded"),
            FinancialStatus::PartiallyRefunded
        );
        assert_eq!(FinancialStatus::from_remote("expired"), FinancialStatus::Unknown);
    }

    #[test]
    fn test_fulfillment_status_null_is_unfulfilled() {
        assert_eq!(
            FulfillmentStatus::from_remote(None),
            FulfillmentStatus::Unfulfilled
        );
        assert_eq!(
            FulfillmentStatus::from_remote(Some("fulfilled")),
            FulfillmentStatus::Fulfilled
        );
    }
}
