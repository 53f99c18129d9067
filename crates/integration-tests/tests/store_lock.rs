//! Integration tests for store lock contention.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shopsync_core::SyncFamily;
use shopsync_engine::sync::{
    LockError, LockStore, MemoryLockStore, PageStep, PageWalker, RunStatus, StartOutcome,
    SyncContext,
};
use shopsync_integration_tests::fixtures::{product, ts};
use shopsync_integration_tests::{Harness, LogCapture};

/// Takes and releases locks normally but cannot answer `is_held`.
struct UncheckableLocks(MemoryLockStore);

#[async_trait]
impl LockStore for UncheckableLocks {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        self.0.acquire(key, ttl).await
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        self.0.release(key).await
    }

    async fn is_held(&self, _key: &str) -> Result<bool, LockError> {
        Err(LockError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[tokio::test]
async fn test_stale_lock_expires_and_store_is_walked_again() {
    let harness = Harness::new();
    harness.shop.add(SyncFamily::Products, [product(1, ts(1), &[10])]);
    let key = harness.lock_key(SyncFamily::Products);
    assert!(harness.locks.acquire(&key, Duration::from_millis(50)).await.unwrap());

    let blocked = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();
    assert_eq!(blocked.status, RunStatus::AlreadyLocked);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(harness.repo.products().len(), 1);
}

#[tokio::test]
async fn test_lock_is_held_between_pages() {
    let harness = Harness::new();
    harness.shop.add(
        SyncFamily::Products,
        (1..=3).map(|i| product(i, ts(i), &[i * 10])),
    );
    let walker = harness.walker();
    let key = harness.lock_key(SyncFamily::Products);

    let StartOutcome::Started(state) = walker
        .start(&harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap()
    else {
        panic!("walk did not start");
    };
    assert!(harness.locks.is_held(&key).await.unwrap());

    // A second walk started mid-way is turned away.
    let competing = walker
        .start(&harness.request(SyncFamily::Products))
        .await
        .unwrap();
    assert_eq!(competing, StartOutcome::Finished(RunStatus::AlreadyLocked));

    let PageStep::Next(next) = walker.step(state).await.step else {
        panic!("expected a second page");
    };
    assert!(harness.locks.is_held(&key).await.unwrap());

    let outcome = walker.step(next).await;
    assert!(matches!(outcome.step, PageStep::Finished(RunStatus::Completed)));
    assert!(!harness.locks.is_held(&key).await.unwrap());
}

#[tokio::test]
async fn test_failed_lock_check_is_logged_and_the_page_still_runs() {
    let (logs, _guard) = LogCapture::install();
    let harness = Harness::new();
    harness.shop.add(SyncFamily::Products, [product(1, ts(1), &[10])]);
    let ctx = SyncContext::new(
        harness.config.clone(),
        Arc::clone(&harness.shop) as _,
        harness.repo.repositories(),
        Arc::new(UncheckableLocks(MemoryLockStore::new())),
        Arc::clone(&harness.events) as _,
    );

    let report = PageWalker::new(ctx)
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(harness.repo.products().len(), 1);
    assert_eq!(logs.count_event("lock_check_failed"), 1);
    let line = logs
        .lines()
        .into_iter()
        .find(|line| line["key"].as_str().is_some_and(|key| key.ends_with(":lock_check_failed")))
        .unwrap();
    assert_eq!(line["level"], "ERROR");
}
