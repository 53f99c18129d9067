//! Store model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use shopsync_core::{StoreId, StoreOwner, StoreType, SyncFamily, UnknownVariant};

const PLATFORM_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// An installed (or formerly installed) shop.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct Store {
    pub id: StoreId,
    pub store_type: StoreType,
    /// Normalised `<shop>.myshopify.com` domain.
    pub shop_domain: String,
    pub name: Option<String>,
    /// REST Admin API access token.
    pub access_token: SecretString,
    /// When the shop itself was created on the platform.
    pub store_created_at: DateTime<Utc>,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_product_import_at: Option<DateTime<Utc>>,
    pub last_order_import_at: Option<DateTime<Utc>>,
    pub last_customer_import_at: Option<DateTime<Utc>>,
    /// Shop settings from the last refresh, keyed by local field name.
    pub details: Value,
    pub customer_count: Option<i64>,
    pub order_count: Option<i64>,
    pub product_count: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("store_type", &self.store_type)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"[REDACTED]")
            .field("uninstalled_at", &self.uninstalled_at)
            .field("last_product_import_at", &self.last_product_import_at)
            .field("last_order_import_at", &self.last_order_import_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Identity fields attached to every sync log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreIdentity {
    pub id: StoreId,
    pub store_type: StoreType,
    pub shop_domain: String,
}

impl Store {
    #[must_use]
    pub const fn owner(&self) -> StoreOwner {
        StoreOwner::new(self.store_type, self.id)
    }

    /// Uninstalled stores are never scheduled.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.uninstalled_at.is_none() && self.deleted_at.is_none()
    }

    #[must_use]
    pub fn compact(&self) -> StoreIdentity {
        StoreIdentity {
            id: self.id,
            store_type: self.store_type,
            shop_domain: self.shop_domain.clone(),
        }
    }

    /// Persisted watermark for a family, if a page has ever completed.
    #[must_use]
    pub const fn watermark(&self, family: SyncFamily) -> Option<DateTime<Utc>> {
        match family {
            SyncFamily::Orders => self.last_order_import_at,
            SyncFamily::Products => self.last_product_import_at,
        }
    }

    /// Lower bound for the next fetch: the watermark, or the shop's creation
    /// time on a first sync.
    #[must_use]
    pub fn import_floor(&self, family: SyncFamily) -> DateTime<Utc> {
        self.watermark(family).unwrap_or(self.store_created_at)
    }
}

/// Input for registering a store.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub shop_domain: String,
    pub name: Option<String>,
    pub access_token: SecretString,
    pub store_created_at: DateTime<Utc>,
}

impl NewStore {
    #[must_use]
    pub fn new(shop: &str, access_token: SecretString, store_created_at: DateTime<Utc>) -> Self {
        Self {
            shop_domain: normalize_domain(shop),
            name: None,
            access_token,
            store_created_at,
        }
    }
}

/// Lowercase a shop handle or domain and make sure it ends in
/// `.myshopify.com`.
#[must_use]
pub fn normalize_domain(shop: &str) -> String {
    let shop = shop
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_lowercase();
    if shop.ends_with(PLATFORM_DOMAIN_SUFFIX) {
        shop
    } else {
        format!("{shop}{PLATFORM_DOMAIN_SUFFIX}")
    }
}

/// Entity groups a purge can remove for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeTarget {
    Orders,
    Customers,
    Products,
    /// Soft-delete the store row itself.
    Store,
}

impl PurgeTarget {
    pub const ALL: [Self; 4] = [Self::Orders, Self::Customers, Self::Products, Self::Store];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Customers => "customers",
            Self::Products => "products",
            Self::Store => "store",
        }
    }
}

impl FromStr for PurgeTarget {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orders" => Ok(Self::Orders),
            "customers" => Ok(Self::Customers),
            "products" => Ok(Self::Products),
            "store" => Ok(Self::Store),
            other => Err(UnknownVariant {
                kind: "purge target",
                value: other.to_string(),
            }),
        }
    }
}

/// Remote totals a store refresh can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreCount {
    Customers,
    Orders,
    Products,
}

impl StoreCount {
    pub const ALL: [Self; 3] = [Self::Customers, Self::Orders, Self::Products];

    /// Collection name, as used in `/{name}/count.json`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Orders => "orders",
            Self::Products => "products",
        }
    }
}

impl std::fmt::Display for StoreCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreCount {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customers" | "customer_count" => Ok(Self::Customers),
            "orders" | "order_count" => Ok(Self::Orders),
            "products" | "product_count" => Ok(Self::Products),
            other => Err(UnknownVariant {
                kind: "store count",
                value: other.to_string(),
            }),
        }
    }
}

/// Totals fetched by one refresh; `None` leaves the stored value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub customers: Option<i64>,
    pub orders: Option<i64>,
    pub products: Option<i64>,
}

impl StoreCounts {
    pub fn set(&mut self, count: StoreCount, total: u64) {
        let total = i64::try_from(total).unwrap_or(i64::MAX);
        match count {
            StoreCount::Customers => self.customers = Some(total),
            StoreCount::Orders => self.orders = Some(total),
            StoreCount::Products => self.products = Some(total),
        }
    }
}

/// Everything a store refresh writes. `None` fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreDetails {
    pub name: Option<String>,
    pub store_created_at: Option<DateTime<Utc>>,
    /// The mapped shop payload.
    pub details: Option<Value>,
    pub counts: StoreCounts,
}

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub orders: u64,
    pub customers: u64,
    pub products: u64,
    pub store_deleted: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn store() -> Store {
        Store {
            id: StoreId::new(3),
            store_type: StoreType::Shopify,
            shop_domain: "acme.myshopify.com".to_string(),
            name: None,
            access_token: SecretString::from("shpat_0123456789"),
            store_created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            installed_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            uninstalled_at: None,
            deleted_at: None,
            last_product_import_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            last_order_import_at: None,
            last_customer_import_at: None,
            details: Value::Null,
            customer_count: None,
            order_count: None,
            product_count: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("Acme"), "acme.myshopify.com");
        assert_eq!(normalize_domain("https://ACME.myshopify.com/"), "acme.myshopify.com");
        assert_eq!(normalize_domain(" acme.myshopify.com "), "acme.myshopify.com");
    }

    #[test]
    fn test_import_floor_falls_back_to_store_creation() {
        let store = store();
        assert_eq!(
            store.import_floor(SyncFamily::Products),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(store.import_floor(SyncFamily::Orders), store.store_created_at);
    }

    #[test]
    fn test_is_installed() {
        let mut store = store();
        assert!(store.is_installed());
        store.uninstalled_at = Some(Utc::now());
        assert!(!store.is_installed());
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", store());
        assert!(!debug.contains("shpat_"));
    }

    #[test]
    fn test_store_count_from_str() {
        assert_eq!("customer_count".parse::<StoreCount>().unwrap(), StoreCount::Customers);
        assert_eq!(" Orders ".parse::<StoreCount>().unwrap(), StoreCount::Orders);
        assert!("refunds".parse::<StoreCount>().is_err());
    }

    #[test]
    fn test_store_counts_only_touch_the_requested_total() {
        let mut counts = StoreCounts::default();
        counts.set(StoreCount::Orders, 12);
        assert_eq!(
            counts,
            StoreCounts {
                customers: None,
                orders: Some(12),
                products: None,
            }
        );
    }

    #[test]
    fn test_purge_target_from_str() {
        assert_eq!("Orders".parse::<PurgeTarget>().unwrap(), PurgeTarget::Orders);
        assert_eq!("store".parse::<PurgeTarget>().unwrap(), PurgeTarget::Store);
        assert!("everything".parse::<PurgeTarget>().is_err());
    }
}
