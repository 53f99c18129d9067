//! Discriminated owner reference for store-scoped rows.
//!
//! Every product, order and customer row belongs to exactly one store. The
//! owner is stored as a `(store_type, store_id)` pair so a second commerce
//! platform can be added without widening every remote-id index.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::StoreId;
use super::status::UnknownVariant;

/// Kind of store that owns a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Shopify,
}

impl StoreType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shopify => "shopify",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shopify" => Ok(Self::Shopify),
            other => Err(UnknownVariant {
                kind: "store type",
                value: other.to_string(),
            }),
        }
    }
}

/// The store a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreOwner {
    pub owner_type: StoreType,
    pub owner_id: StoreId,
}

impl StoreOwner {
    #[must_use]
    pub const fn new(owner_type: StoreType, owner_id: StoreId) -> Self {
        Self {
            owner_type,
            owner_id,
        }
    }

    /// Owner reference for a Shopify store.
    #[must_use]
    pub const fn shopify(owner_id: StoreId) -> Self {
        Self::new(StoreType::Shopify, owner_id)
    }

    /// Whether this owner is the given store.
    #[must_use]
    pub fn is(&self, owner_type: StoreType, owner_id: StoreId) -> bool {
        self.owner_type == owner_type && self.owner_id == owner_id
    }
}

impl fmt::Display for StoreOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}
