//! Structured sync log lines.
//!
//! Every line is keyed `"{scope}:{store_domain}:{event}"` and carries the
//! store's identity plus a JSON context. The scope is the family being walked,
//! or `stores` for store refreshes. `tracing` has no emergency level, so
//! emergencies go out at ERROR with `severity = "emergency"`.

use serde_json::Value;
use shopsync_core::SyncFamily;
use tracing::{debug, error, info, warn};

use crate::models::{Store, StoreIdentity};

/// Log levels used by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    /// Unexpected failure needing an operator.
    Emergency,
}

/// Log emitter bound to one store and scope.
#[derive(Debug, Clone)]
pub struct SyncLog {
    scope: &'static str,
    store: StoreIdentity,
}

impl SyncLog {
    #[must_use]
    pub fn new(family: SyncFamily, store: &Store) -> Self {
        Self {
            scope: family.as_str(),
            store: store.compact(),
        }
    }

    /// Lines about the store record itself.
    #[must_use]
    pub fn stores(store: &Store) -> Self {
        Self {
            scope: "stores",
            store: store.compact(),
        }
    }

    #[must_use]
    pub fn key(&self, event: &str) -> String {
        format!("{}:{}:{event}", self.scope, self.store.shop_domain)
    }

    pub fn emit(&self, severity: Severity, event: &str, context: &Value) {
        let key = self.key(event);
        let store_id = self.store.id.as_i32();
        let store_domain = self.store.shop_domain.as_str();
        let store_type = self.store.store_type.as_str();

        match severity {
            Severity::Debug => {
                debug!(%key, store_id, store_domain, store_type, %context, "sync");
            }
            Severity::Info => {
                info!(%key, store_id, store_domain, store_type, %context, "sync");
            }
            Severity::Warning => {
                warn!(%key, store_id, store_domain, store_type, %context, "sync");
            }
            Severity::Error => {
                error!(%key, store_id, store_domain, store_type, %context, "sync");
            }
            Severity::Emergency => {
                error!(
                    %key,
                    store_id,
                    store_domain,
                    store_type,
                    %context,
                    severity = "emergency",
                    "sync"
                );
            }
        }
    }

    pub fn debug(&self, event: &str, context: &Value) {
        self.emit(Severity::Debug, event, context);
    }

    pub fn info(&self, event: &str, context: &Value) {
        self.emit(Severity::Info, event, context);
    }

    pub fn warn(&self, event: &str, context: &Value) {
        self.emit(Severity::Warning, event, context);
    }

    pub fn error(&self, event: &str, context: &Value) {
        self.emit(Severity::Error, event, context);
    }

    pub fn emergency(&self, event: &str, context: &Value) {
        self.emit(Severity::Emergency, event, context);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::SecretString;
    use shopsync_core::{StoreId, StoreType};

    use super::*;

    #[test]
    fn test_key_format() {
        let store = Store {
            id: StoreId::new(8),
            store_type: StoreType::Shopify,
            shop_domain: "acme.myshopify.com".to_string(),
            name: None,
            access_token: SecretString::from("token"),
            store_created_at: Utc::now(),
            installed_at: Utc::now(),
            uninstalled_at: None,
            deleted_at: None,
            last_product_import_at: None,
            last_order_import_at: None,
            last_customer_import_at: None,
            details: Value::Null,
            customer_count: None,
            order_count: None,
            product_count: None,
            updated_at: Utc::now(),
        };
        let log = SyncLog::new(SyncFamily::Orders, &store);
        assert_eq!(log.key("order:1001:dryrun"), "orders:acme.myshopify.com:order:1001:dryrun");
        assert_eq!(
            SyncLog::stores(&store).key("api_failure:402"),
            "stores:acme.myshopify.com:api_failure:402"
        );
    }
}
