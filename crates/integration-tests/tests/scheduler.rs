//! Integration tests for sync passes, deferred execution and purges.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use shopsync_core::{ExecutionMode, SyncFamily};
use shopsync_engine::models::PurgeTarget;
use shopsync_engine::sync::{
    JobQueue, LockStore, RunStatus, SyncJob, SyncPass, purge_store, run_pass, spawn_workers,
};
use shopsync_engine::{SyncConfig, SyncError};
use shopsync_integration_tests::{Harness, LogCapture};
use shopsync_integration_tests::fixtures::{line_item, order, product, test_config, ts};

fn catalog(harness: &Harness) {
    harness.shop.add(
        SyncFamily::Products,
        [product(10, ts(1), &[100, 101]), product(20, ts(2), &[200])],
    );
    harness.shop.add(
        SyncFamily::Orders,
        [
            order(1, ts(3), vec![line_item(11, 10, 100, 2)]),
            order(2, ts(4), vec![line_item(21, 20, 200, 1), line_item(22, 10, 101, 1)]),
        ],
    );
}

// =============================================================================
// Passes
// =============================================================================

#[tokio::test]
async fn test_disabled_sync_refuses_passes() {
    let harness = Harness::with_config(SyncConfig {
        enabled: false,
        ..test_config()
    });

    let err = run_pass(&harness.context(), &SyncPass::new(SyncFamily::Products))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Disabled));
}

#[tokio::test]
async fn test_orders_wait_for_a_product_import() {
    let harness = Harness::new();
    catalog(&harness);
    let ctx = harness.context();

    let summary = run_pass(&ctx, &SyncPass::new(SyncFamily::Orders)).await.unwrap();
    assert_eq!(summary.skipped, vec![harness.store.id]);
    assert!(summary.reports.is_empty());
    assert!(harness.shop.fetches().is_empty());

    run_pass(&ctx, &SyncPass::new(SyncFamily::Products)).await.unwrap();
    let summary = run_pass(&ctx, &SyncPass::new(SyncFamily::Orders)).await.unwrap();

    assert!(summary.skipped.is_empty());
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].status, RunStatus::Completed);
    assert_eq!(harness.repo.orders().len(), 2);
    assert_eq!(harness.repo.order_items().len(), 3);
}

#[tokio::test]
async fn test_pass_covers_installed_stores_only() {
    let harness = Harness::new();
    catalog(&harness);
    let second = harness.repo.add_store("second-shop", ts(0));
    let gone = harness.repo.add_store("gone-shop", ts(0));
    harness.repo.uninstall(gone.id);

    let summary = run_pass(&harness.context(), &SyncPass::new(SyncFamily::Products))
        .await
        .unwrap();

    let walked: Vec<_> = summary.reports.iter().map(|r| r.store_id).collect();
    assert_eq!(walked, vec![harness.store.id, second.id]);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_pass_can_target_stores() {
    let harness = Harness::new();
    catalog(&harness);
    let second = harness.repo.add_store("second-shop", ts(0));

    let pass = SyncPass {
        store_ids: Some(vec![second.id]),
        ..SyncPass::new(SyncFamily::Products)
    };
    let summary = run_pass(&harness.context(), &pass).await.unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].store_id, second.id);
}

// =============================================================================
// Deferred Execution
// =============================================================================

#[tokio::test]
async fn test_deferred_pass_without_queue_fails_per_store() {
    let harness = Harness::new();
    catalog(&harness);
    let pass = SyncPass {
        mode: ExecutionMode::Deferred,
        ..SyncPass::new(SyncFamily::Products)
    };

    let summary = run_pass(&harness.context(), &pass).await.unwrap();
    assert_eq!(summary.failed, vec![harness.store.id]);
}

#[tokio::test]
async fn test_deferred_pass_runs_on_workers() {
    let harness = Harness::new();
    catalog(&harness);
    harness.shop.use_cursors();
    let (queue, receiver) = JobQueue::channel();
    let ctx = harness.context().with_queue(queue.clone());
    let workers = spawn_workers(&ctx, receiver, 3);
    assert_eq!(workers.len(), 3);

    for family in [SyncFamily::Products, SyncFamily::Orders] {
        let pass = SyncPass {
            mode: ExecutionMode::Deferred,
            limit: Some(1),
            ..SyncPass::new(family)
        };
        let summary = run_pass(&ctx, &pass).await.unwrap();
        assert!(
            summary
                .reports
                .iter()
                .all(|r| r.status == RunStatus::Queued)
        );
        tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
            .await
            .unwrap();
    }

    assert_eq!(harness.repo.products().len(), 2);
    assert_eq!(harness.repo.orders().len(), 2);
    assert_eq!(queue.pending(), 0);
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Orders)).await.unwrap());
    assert_eq!(
        harness.current_store().unwrap().last_order_import_at,
        Some(ts(4))
    );

    workers.shutdown().await;
}

#[tokio::test]
async fn test_lost_follow_up_releases_the_lock() {
    let (logs, _guard) = LogCapture::install();
    let harness = Harness::new();
    catalog(&harness);
    let (queue, receiver) = JobQueue::channel();
    // Workers continue walks on a queue nobody reads from.
    let (closed, closed_receiver) = JobQueue::channel();
    drop(closed_receiver);
    let workers = spawn_workers(&harness.context().with_queue(closed), receiver, 1);

    queue
        .enqueue(SyncJob::StartImport(
            harness
                .request(SyncFamily::Products)
                .with_mode(ExecutionMode::Deferred),
        ))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    assert!(harness.repo.products().is_empty());
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
    assert_eq!(logs.count_event("follow_up_lost"), 1);
    let emergency = logs
        .lines()
        .into_iter()
        .find(|line| line["key"].as_str().is_some_and(|k| k.ends_with(":follow_up_lost")))
        .unwrap();
    assert_eq!(emergency["severity"], "emergency");

    workers.shutdown().await;
}

// =============================================================================
// Purge
// =============================================================================

#[tokio::test]
async fn test_purge_removes_data_and_resets_watermarks() {
    let harness = Harness::new();
    catalog(&harness);
    let ctx = harness.context();
    run_pass(&ctx, &SyncPass::new(SyncFamily::Products)).await.unwrap();
    run_pass(&ctx, &SyncPass::new(SyncFamily::Orders)).await.unwrap();

    let report = purge_store(&ctx, harness.store.id, &[PurgeTarget::Orders, PurgeTarget::Customers])
        .await
        .unwrap();

    assert_eq!(report.orders, 2);
    assert_eq!(report.customers, 1);
    assert_eq!(report.products, 0);
    assert!(!report.store_deleted);
    assert!(harness.repo.orders().is_empty());
    assert!(harness.repo.order_items().is_empty());
    assert_eq!(harness.repo.products().len(), 2);

    let store = harness.current_store().unwrap();
    assert_eq!(store.last_order_import_at, None);
    assert_eq!(store.last_product_import_at, Some(ts(2)));
}

#[tokio::test]
async fn test_purge_everything_deletes_the_store() {
    let harness = Harness::new();
    catalog(&harness);
    let ctx = harness.context();
    run_pass(&ctx, &SyncPass::new(SyncFamily::Products)).await.unwrap();
    let key = harness.lock_key(SyncFamily::Orders);
    assert!(harness.locks.acquire(&key, Duration::from_secs(60)).await.unwrap());

    let report = purge_store(&ctx, harness.store.id, &PurgeTarget::ALL).await.unwrap();

    assert_eq!(report.products, 2);
    assert!(report.store_deleted);
    assert!(harness.repo.variants().is_empty());
    assert!(!harness.locks.is_held(&key).await.unwrap());

    // A deleted store is no longer scheduled.
    let summary = run_pass(&ctx, &SyncPass::new(SyncFamily::Products)).await.unwrap();
    assert!(summary.reports.is_empty());
}

#[tokio::test]
async fn test_purge_of_unknown_store_fails() {
    let harness = Harness::new();
    let err = purge_store(
        &harness.context(),
        shopsync_core::StoreId::new(4040),
        &PurgeTarget::ALL,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SyncError::StoreNotFound(_)));
}
