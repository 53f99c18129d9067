//! Per-store, per-family sync locks.
//!
//! A walker holds `"{family}-sync|{store_id}"` from its first page until it
//! finishes, gives up or fails on the remote side. Locks expire after a TTL so
//! a crashed worker cannot block a store forever.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use shopsync_core::{StoreId, SyncFamily};
use thiserror::Error;

/// Lock backend errors.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Build the lock key for a family and store.
#[must_use]
pub fn lock_key(family: SyncFamily, store_id: StoreId) -> String {
    format!("{}-sync|{store_id}", family.as_str())
}

/// An expiring mutual-exclusion store keyed by string.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Take `key` for `ttl` if it is free or expired.
    ///
    /// Returns `false` when another holder has it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Drop `key` regardless of holder. Releasing a free key is a no-op.
    async fn release(&self, key: &str) -> Result<(), LockError>;

    async fn is_held(&self, key: &str) -> Result<bool, LockError>;
}

#[derive(Debug, Clone)]
struct LockEntry {
    ttl: Duration,
}

struct LockExpiry;

impl Expiry<String, LockEntry> for LockExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LockEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process lock store backed by a `moka` cache with per-entry TTLs.
///
/// Only exclusive within one process; use the `PostgreSQL` store when several
/// workers share a database.
#[derive(Clone)]
pub struct MemoryLockStore {
    locks: Cache<String, LockEntry>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        let locks = Cache::builder()
            .max_capacity(100_000)
            .expire_after(LockExpiry)
            .build();
        Self { locks }
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLockStore")
            .field("entries", &self.locks.entry_count())
            .finish()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let entry = self
            .locks
            .entry(key.to_string())
            .or_insert_with(async move { LockEntry { ttl } })
            .await;
        Ok(entry.is_fresh())
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        self.locks.invalidate(key).await;
        Ok(())
    }

    async fn is_held(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.locks.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_format() {
        assert_eq!(lock_key(SyncFamily::Orders, StoreId::new(17)), "orders-sync|17");
        assert_eq!(lock_key(SyncFamily::Products, StoreId::new(3)), "products-sync|3");
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let locks = MemoryLockStore::new();
        let ttl = Duration::from_secs(60);

        assert!(locks.acquire("orders-sync|1", ttl).await.unwrap());
        assert!(!locks.acquire("orders-sync|1", ttl).await.unwrap());
        assert!(locks.acquire("products-sync|1", ttl).await.unwrap());
        assert!(locks.is_held("orders-sync|1").await.unwrap());

        locks.release("orders-sync|1").await.unwrap();
        assert!(!locks.is_held("orders-sync|1").await.unwrap());
        assert!(locks.acquire("orders-sync|1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expires_after_ttl() {
        let locks = MemoryLockStore::new();

        assert!(locks.acquire("orders-sync|2", Duration::from_millis(50)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!locks.is_held("orders-sync|2").await.unwrap());
        assert!(locks.acquire("orders-sync|2", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_of_free_key_is_noop() {
        let locks = MemoryLockStore::new();
        locks.release("orders-sync|9").await.unwrap();
        assert!(!locks.is_held("orders-sync|9").await.unwrap());
    }
}
