//! `PostgreSQL` lock store.
//!
//! Acquisition is a single upsert that only overwrites an expired row, so two
//! workers racing for the same key cannot both succeed.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::sync::lock::{LockError, LockStore};

/// Lock store shared by every worker connected to the same database.
#[derive(Debug, Clone)]
pub struct PgLockStore {
    pool: PgPool,
    /// Recorded on acquired rows for diagnostics.
    owner: String,
}

impl PgLockStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            owner: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let acquired: Option<String> = sqlx::query_scalar(
            "INSERT INTO sync.sync_locks (lock_key, owner, acquired_at, expires_at)
             VALUES ($1, $2, now(), now() + make_interval(secs => $3))
             ON CONFLICT (lock_key) DO UPDATE
             SET owner = EXCLUDED.owner,
                 acquired_at = EXCLUDED.acquired_at,
                 expires_at = EXCLUDED.expires_at
             WHERE sync.sync_locks.expires_at <= now()
             RETURNING lock_key",
        )
        .bind(key)
        .bind(&self.owner)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        sqlx::query("DELETE FROM sync.sync_locks WHERE lock_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_held(&self, key: &str) -> Result<bool, LockError> {
        let held: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sync.sync_locks WHERE lock_key = $1 AND expires_at > now())",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(held)
    }
}
