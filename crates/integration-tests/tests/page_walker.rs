//! Integration tests for paginated walks.
//!
//! Every walk runs against the in-memory repository and the fake shop, so
//! these tests exercise locking, page planning, timeouts, rate limits and
//! watermark bookkeeping end to end.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use shopsync_core::{RemoteId, SyncFamily};
use shopsync_engine::shopify::PageSelector;
use shopsync_engine::sync::{LockStore, RunStatus, SyncEvent};
use shopsync_engine::{SyncConfig, SyncError};
use shopsync_integration_tests::fixtures::{line_item, order, product, test_config, ts};
use shopsync_integration_tests::{Harness, LogCapture, Scripted};

fn products(harness: &Harness, count: i64) {
    harness.shop.add(
        SyncFamily::Products,
        (1..=count).map(|i| product(i, ts(i * 10), &[i * 100])),
    );
}

// =============================================================================
// Completion and Locking
// =============================================================================

#[tokio::test]
async fn test_walk_imports_every_page_and_releases_lock() {
    let mut harness = Harness::new();
    products(&harness, 5);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages, 3);
    assert_eq!(report.limits, vec![2, 2, 2]);
    assert_eq!(report.stats.fetched, 5);
    assert_eq!(report.stats.created, 5);
    assert_eq!(harness.repo.products().len(), 5);
    assert_eq!(harness.repo.variants().len(), 5);

    let pages: Vec<PageSelector> = harness.shop.fetches().into_iter().map(|f| f.page).collect();
    assert_eq!(
        pages,
        vec![PageSelector::Number(1), PageSelector::Number(2), PageSelector::Number(3)]
    );

    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());

    let events = harness.events();
    let created = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::EntityCreated { .. }))
        .count();
    assert_eq!(created, 5);
    assert!(events.contains(&SyncEvent::FamilySynced {
        store_id: harness.store.id,
        family: SyncFamily::Products,
    }));
}

#[tokio::test]
async fn test_empty_collection_completes_without_watermark() {
    let harness = Harness::new();

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages, 1);
    assert!(harness.repo.watermark_writes().is_empty());
    assert_eq!(harness.current_store().unwrap().last_product_import_at, None);
}

#[tokio::test]
async fn test_locked_store_is_not_walked() {
    let (logs, _guard) = LogCapture::install();
    let harness = Harness::new();
    products(&harness, 2);
    let key = harness.lock_key(SyncFamily::Products);
    assert!(harness.locks.acquire(&key, Duration::from_secs(60)).await.unwrap());

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::AlreadyLocked);
    assert_eq!(report.pages, 0);
    assert!(harness.shop.fetches().is_empty());
    assert_eq!(harness.shop.count_calls(), 0);
    // The other holder keeps its lock.
    assert!(harness.locks.is_held(&key).await.unwrap());
    assert_eq!(logs.count_event("is_locked"), 1);
    assert!(
        logs.keys()
            .contains(&format!("products:{}:is_locked", harness.store.shop_domain))
    );
}

#[tokio::test]
async fn test_families_lock_independently() {
    let harness = Harness::new();
    products(&harness, 1);
    let orders_key = harness.lock_key(SyncFamily::Orders);
    assert!(harness.locks.acquire(&orders_key, Duration::from_secs(60)).await.unwrap());

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(harness.locks.is_held(&orders_key).await.unwrap());
}

#[tokio::test]
async fn test_missing_store_is_an_error() {
    let harness = Harness::new();
    let mut request = harness.request(SyncFamily::Products);
    request.store_id = shopsync_core::StoreId::new(9999);

    let err = harness.walker().run(request).await.unwrap_err();
    assert!(matches!(err, SyncError::StoreNotFound(_)));
}

// =============================================================================
// Timeouts and Page Size Halving
// =============================================================================

#[tokio::test]
async fn test_timeouts_retry_then_halve_the_limit() {
    let harness = Harness::new();
    products(&harness, 3);
    harness.shop.fail_fetches([Scripted::Timeout, Scripted::Timeout]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.limits, vec![128, 128, 64]);
    assert_eq!(report.stats.created, 3);

    let limits: Vec<u32> = harness.shop.fetches().iter().map(|f| f.limit).collect();
    assert_eq!(limits, vec![128, 128, 64]);
    // The restarted walk counted again.
    assert_eq!(harness.shop.count_calls(), 2);
}

#[tokio::test]
async fn test_gives_up_when_limit_cannot_be_halved() {
    let harness = Harness::new();
    products(&harness, 3);
    harness.shop.fail_fetches([Scripted::Timeout, Scripted::Timeout]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::GaveUp { limit: 2 });
    assert_eq!(report.limits, vec![2, 2]);
    assert!(harness.repo.products().is_empty());
    assert!(harness.repo.watermark_writes().is_empty());
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_page_budget_cuts_off_hanging_fetch() {
    let harness = Harness::new();
    products(&harness, 3);
    harness.shop.fail_fetches([Scripted::Hang, Scripted::Hang]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(4))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.limits, vec![4, 4, 2, 2]);
    assert_eq!(report.stats.created, 3);
}

// =============================================================================
// Remote Failures
// =============================================================================

#[tokio::test]
async fn test_rate_limited_fetch_is_retried() {
    let harness = Harness::new();
    products(&harness, 2);
    harness.shop.fail_fetches([Scripted::RateLimited, Scripted::RateLimited]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages, 1);
    assert_eq!(harness.shop.fetches().len(), 3);
    assert_eq!(report.stats.created, 2);
}

#[tokio::test]
async fn test_exhausted_rate_limit_fails_the_walk() {
    let harness = Harness::new();
    products(&harness, 2);
    harness.shop.fail_fetches([Scripted::RateLimited; 3]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::ApiFailed { status: Some(429) });
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
}

#[tokio::test]
async fn test_payment_required_suggests_uninstall() {
    let mut harness = Harness::new();
    products(&harness, 2);
    harness.shop.fail_counts([Scripted::Status(402)]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::UninstallSuggested { status: 402 });
    assert!(harness.shop.fetches().is_empty());
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
    assert_eq!(
        harness.events(),
        vec![SyncEvent::UninstallSuggested {
            store_id: harness.store.id,
            status: 402,
        }]
    );
}

#[tokio::test]
async fn test_server_error_on_page_fails_the_walk() {
    let harness = Harness::new();
    products(&harness, 2);
    harness.shop.fail_fetches([Scripted::Status(500)]);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::ApiFailed { status: Some(500) });
    assert!(report.status.releases_lock());
    assert!(!harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
}

// =============================================================================
// Cursor Pagination
// =============================================================================

#[tokio::test]
async fn test_returned_cursor_switches_pagination() {
    let harness = Harness::new();
    products(&harness, 5);
    harness.shop.use_cursors();

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.created, 5);

    let pages: Vec<PageSelector> = harness.shop.fetches().into_iter().map(|f| f.page).collect();
    assert_eq!(
        pages,
        vec![
            PageSelector::Number(1),
            PageSelector::Cursor("offset:2".to_string()),
            PageSelector::Cursor("offset:4".to_string()),
        ]
    );
}

// =============================================================================
// Dry Run and Idempotence
// =============================================================================

#[tokio::test]
async fn test_dry_run_decides_without_writing() {
    let (logs, _guard) = LogCapture::install();
    let mut harness = Harness::new();
    products(&harness, 10);

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(4).dry_run(true))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages, 3);
    let expected: Vec<RemoteId> = (1..=10).map(RemoteId::new).collect();
    assert_eq!(report.stats.dry_run, expected);
    assert_eq!(logs.count_event("dryrun"), 10);
    assert!(
        logs.keys()
            .contains(&format!("products:{}:product:1:dryrun", harness.store.shop_domain))
    );
    assert!(harness.repo.products().is_empty());
    assert!(harness.repo.watermark_writes().is_empty());
    assert!(
        !harness
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::EntityCreated { .. }))
    );
}

#[tokio::test]
async fn test_second_walk_skips_existing_records() {
    let harness = Harness::new();
    products(&harness, 3);
    let walker = harness.walker();

    let first = walker
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();
    assert_eq!(first.stats.created, 3);

    let second = walker
        .run(harness.request(SyncFamily::Products).with_created_at_min(ts(0)))
        .await
        .unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.stats.existing, 3);
    assert_eq!(second.stats.created, 0);
    assert_eq!(second.stats.updated, 0);
    assert_eq!(harness.repo.products().len(), 3);
}

// =============================================================================
// Watermarks
// =============================================================================

#[tokio::test]
async fn test_watermark_tracks_newest_created_at() {
    let harness = Harness::new();
    products(&harness, 3);

    harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap();

    let writes: Vec<_> = harness
        .repo
        .watermark_writes()
        .into_iter()
        .map(|(_, _, at)| at)
        .collect();
    assert_eq!(writes, vec![ts(20), ts(30)]);
    assert_eq!(
        harness.current_store().unwrap().last_product_import_at,
        Some(ts(30))
    );
}

#[tokio::test]
async fn test_next_walk_starts_at_watermark() {
    let harness = Harness::new();
    products(&harness, 3);
    harness
        .repo
        .set_watermark(harness.store.id, SyncFamily::Products, Some(ts(20)));

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap();

    assert_eq!(harness.shop.fetches()[0].created_at_min, ts(20));
    // Products 2 and 3 are at or after the watermark.
    assert_eq!(report.stats.created, 2);
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let harness = Harness::new();
    products(&harness, 3);
    harness
        .repo
        .set_watermark(harness.store.id, SyncFamily::Products, Some(ts(500)));

    harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_created_at_min(ts(0)))
        .await
        .unwrap();

    assert_eq!(
        harness.current_store().unwrap().last_product_import_at,
        Some(ts(500))
    );
    assert!(
        harness
            .repo
            .watermark_writes()
            .iter()
            .all(|(_, _, at)| *at == ts(500))
    );
}

#[tokio::test]
async fn test_undated_page_moves_watermark_to_start_minus_margin() {
    let harness = Harness::new();
    harness.shop.add(
        SyncFamily::Products,
        (1..=3).map(|i| json!({ "id": i, "title": format!("Undated {i}") })),
    );
    let before = Utc::now();

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Products).with_limit(2))
        .await
        .unwrap();

    // Mapping needs created_at, so every record fails and is swallowed.
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.failed, 3);

    // Only the first page writes; the final undated page leaves it alone.
    let writes = harness.repo.watermark_writes();
    assert_eq!(writes.len(), 1);
    let margin = ChronoDuration::minutes(30);
    let at = writes[0].2;
    assert!(at >= before - margin);
    assert!(at <= Utc::now() - margin);
}

// =============================================================================
// Processing Failures
// =============================================================================

#[tokio::test]
async fn test_raised_processing_error_aborts_and_keeps_lock() {
    let harness = Harness::with_config(SyncConfig {
        throw_processing_exceptions: true,
        ..test_config()
    });
    harness.shop.add(
        SyncFamily::Products,
        [json!({ "id": 1, "created_at": ts(5).to_rfc3339() })],
    );

    let err = harness
        .walker()
        .run(harness.request(SyncFamily::Products))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Mapping(_)));
    assert!(harness.locks.is_held(&harness.lock_key(SyncFamily::Products)).await.unwrap());
}

#[tokio::test]
async fn test_orders_failing_qualification_are_skipped() {
    let harness = Harness::new();
    harness.repo.seed_product(&harness.store, 10, &[100]).unwrap();
    harness.shop.add(
        SyncFamily::Orders,
        [
            order(1, ts(1), vec![line_item(11, 10, 100, 1)]),
            order(2, ts(2), vec![]),
            order(3, ts(3), vec![line_item(31, 10, 999, 1)]),
        ],
    );

    let report = harness
        .walker()
        .run(harness.request(SyncFamily::Orders))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.created, 1);
    assert_eq!(report.stats.skipped, 2);
    assert_eq!(harness.repo.orders().len(), 1);
    assert_eq!(harness.repo.orders()[0].remote_id, RemoteId::new(1));
}
