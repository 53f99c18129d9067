//! Paginated, resumable walk over one remote collection for one store.
//!
//! A walk is a chain of page steps. [`PageWalker::start`] takes the store
//! lock, counts the collection and plans the first [`PageCursorState`];
//! [`PageWalker::step`] processes one page and says what happens next. The
//! caller decides who runs the next step: [`PageWalker::run`] loops inline,
//! the job queue hands it to a worker.
//!
//! The lock is taken once per walk and assumed held for every later page.
//! It is released when the walk completes, gives up, or the remote rejects
//! the store. Unexpected failures keep it so the store waits for the TTL.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shopsync_core::{ExecutionMode, RemoteId, StoreId, SyncFamily};
use tracing::instrument;

use super::SyncContext;
use super::cursor::PageCursorState;
use super::events::SyncEvent;
use super::import::{ImportOutcome, import_record};
use super::lock::lock_key;
use super::log::SyncLog;
use super::qualifier::{Rejection, referenced_variant_ids};
use super::queue::SyncJob;
use super::rate_limit::RateLimitedRequest;
use crate::error::SyncError;
use crate::models::Store;
use crate::shopify::{CollectionQuery, RemotePage, RemoteRecord};

/// Parameters of a new walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub store_id: StoreId,
    pub family: SyncFamily,
    /// Page size; the configured `page_limit` when absent.
    pub limit: Option<u32>,
    /// Lower bound override; the store's watermark when absent.
    pub created_at_min: Option<DateTime<Utc>>,
    pub mode: ExecutionMode,
    pub dry_run: bool,
}

impl StartRequest {
    #[must_use]
    pub const fn new(store_id: StoreId, family: SyncFamily) -> Self {
        Self {
            store_id,
            family,
            limit: None,
            created_at_min: None,
            mode: ExecutionMode::Immediate,
            dry_run: false,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_created_at_min(mut self, created_at_min: DateTime<Utc>) -> Self {
        self.created_at_min = Some(created_at_min);
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// How a walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunStatus {
    /// The last page was processed.
    Completed,
    /// Handed to the job queue.
    Queued,
    /// Another walk holds the store lock.
    AlreadyLocked,
    /// Pages kept timing out and the limit could not be halved further.
    GaveUp { limit: u32 },
    /// The remote rejected a call.
    ApiFailed { status: Option<u16> },
    /// The remote answered with a status that usually means the app is gone.
    UninstallSuggested { status: u16 },
    /// Unexpected failure; the lock is kept until its TTL runs out.
    Failed { error: String },
}

impl RunStatus {
    /// Whether the store lock was released (or never taken) when the walk
    /// stopped.
    #[must_use]
    pub const fn releases_lock(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Queued)
    }
}

/// Per-record tallies for one page or one whole walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageStats {
    pub fetched: usize,
    /// Already imported locally.
    pub existing: usize,
    /// Rejected by the qualifier or skipped by the importer.
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Handed to workers in deferred mode.
    pub queued: usize,
    /// Ids that would have been imported in dry-run mode.
    pub dry_run: Vec<RemoteId>,
}

impl PageStats {
    pub fn record(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Created(_) => self.created += 1,
            ImportOutcome::Updated(_) => self.updated += 1,
            ImportOutcome::Skipped(_) => self.skipped += 1,
            ImportOutcome::Duplicate => self.duplicates += 1,
            ImportOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.fetched += other.fetched;
        self.existing += other.existing;
        self.skipped += other.skipped;
        self.created += other.created;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.queued += other.queued;
        self.dry_run.extend_from_slice(&other.dry_run);
    }
}

/// Result of [`PageWalker::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(PageCursorState),
    /// The walk ended before its first page.
    Finished(RunStatus),
}

/// What follows a processed page.
#[derive(Debug)]
pub enum PageStep {
    /// Process this state next (the following page, or the same page again).
    Next(PageCursorState),
    Finished(RunStatus),
    /// Begin a new walk with a smaller page size.
    Restart { request: StartRequest },
    /// A record import re-raised its error.
    Abort(SyncError),
}

#[derive(Debug)]
pub struct PageOutcome {
    pub step: PageStep,
    pub stats: PageStats,
}

/// Summary of an inline walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub store_id: StoreId,
    pub family: SyncFamily,
    pub status: RunStatus,
    /// Page steps executed, retries included.
    pub pages: u32,
    /// Page size used by each step, in order.
    pub limits: Vec<u32>,
    pub stats: PageStats,
    /// State of the last step executed.
    pub final_state: Option<PageCursorState>,
}

impl RunReport {
    fn new(request: &StartRequest, status: RunStatus) -> Self {
        Self {
            store_id: request.store_id,
            family: request.family,
            status,
            pages: 0,
            limits: Vec::new(),
            stats: PageStats::default(),
            final_state: None,
        }
    }
}

/// Failures that end a page early.
enum PageFailure {
    /// Fetching or bookkeeping failed; handled by the page failure policy.
    Page(SyncError),
    /// A record import re-raised its error.
    Record(SyncError),
}

impl From<SyncError> for PageFailure {
    fn from(error: SyncError) -> Self {
        Self::Page(error)
    }
}

/// Drives page walks over a [`SyncContext`].
#[derive(Debug, Clone)]
pub struct PageWalker {
    ctx: SyncContext,
}

impl PageWalker {
    #[must_use]
    pub const fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Run a walk to its end, or hand it to the job queue in deferred mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the store does not exist, the lock backend fails,
    /// deferred mode has no queue, or a record import re-raised its error.
    #[instrument(skip(self, request), fields(store_id = %request.store_id, family = %request.family))]
    pub async fn run(&self, request: StartRequest) -> Result<RunReport, SyncError> {
        if request.mode == ExecutionMode::Deferred {
            let queue = self.ctx.queue.as_ref().ok_or_else(|| {
                SyncError::QueueUnavailable("deferred mode needs a running job queue".to_string())
            })?;
            let report = RunReport::new(&request, RunStatus::Queued);
            queue.enqueue(SyncJob::StartImport(request))?;
            return Ok(report);
        }

        let mut report = RunReport::new(&request, RunStatus::Completed);
        let mut request = request;
        'walk: loop {
            let mut state = match self.start(&request).await? {
                StartOutcome::Started(state) => state,
                StartOutcome::Finished(status) => {
                    report.status = status;
                    return Ok(report);
                }
            };

            loop {
                report.pages += 1;
                report.limits.push(state.limit());
                report.final_state = Some(state.clone());

                let outcome = self.step(state).await;
                report.stats.merge(&outcome.stats);
                match outcome.step {
                    PageStep::Next(next) => state = next,
                    PageStep::Finished(status) => {
                        report.status = status;
                        return Ok(report);
                    }
                    PageStep::Restart { request: next } => {
                        request = next;
                        continue 'walk;
                    }
                    PageStep::Abort(error) => return Err(error),
                }
            }
        }
    }

    /// Take the store lock and plan the first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the store does not exist or the lock backend
    /// fails. Remote failures end the walk with a status instead.
    pub async fn start(&self, request: &StartRequest) -> Result<StartOutcome, SyncError> {
        let store = self.load_store(request.store_id).await?;
        let family = request.family;
        let log = SyncLog::new(family, &store);

        let key = lock_key(family, store.id);
        if !self.ctx.locks.acquire(&key, self.ctx.config.lock_ttl).await? {
            log.warn("is_locked", &json!({ "lock_key": key }));
            return Ok(StartOutcome::Finished(RunStatus::AlreadyLocked));
        }

        let limit = request.limit.unwrap_or(self.ctx.config.page_limit).max(1);
        let created_at_min = request
            .created_at_min
            .unwrap_or_else(|| store.import_floor(family));
        let query = CollectionQuery::new(family, limit, created_at_min);

        let api = &self.ctx.api;
        let counted = RateLimitedRequest::from_config(&self.ctx.config)
            .execute(&format!("{family}_count"), || api.count(&store, family, &query))
            .await;
        let total = match counted {
            Ok(total) => total,
            Err(e) => {
                let error = SyncError::from(e);
                let context = json!({
                    "step": "count",
                    "limit": limit,
                    "created_at_min": created_at_min,
                    "error": error.to_string(),
                });
                let status = self.remote_failure(&store, &log, family, &error, context).await;
                return Ok(StartOutcome::Finished(status));
            }
        };

        log.info(
            "started",
            &json!({
                "total": total,
                "limit": limit,
                "created_at_min": created_at_min,
                "mode": request.mode.as_str(),
                "dry_run": request.dry_run,
            }),
        );

        Ok(StartOutcome::Started(PageCursorState::planned(
            store.id,
            family,
            query,
            total,
            request.mode,
            request.dry_run,
        )))
    }

    /// Process one page within the configured execution budget.
    ///
    /// Never fails: every failure is turned into the next step according to
    /// the page failure policy.
    #[instrument(skip(self, state), fields(store_id = %state.store_id, family = %state.family, page = %state.page_label(), limit = state.limit()))]
    pub async fn step(&self, state: PageCursorState) -> PageOutcome {
        let budget = self.ctx.config.max_page_execution;
        let mut stats = PageStats::default();

        let result = match tokio::time::timeout(budget, self.process_page(&state, &mut stats)).await
        {
            Ok(result) => result,
            Err(_) => Err(PageFailure::Page(SyncError::PageTimeout(budget))),
        };

        let step = match result {
            Ok(PageStep::Next(next)) => {
                tokio::time::sleep(self.ctx.config.inter_page_sleep).await;
                PageStep::Next(next)
            }
            Ok(step) => step,
            Err(PageFailure::Record(error)) => PageStep::Abort(error),
            Err(PageFailure::Page(error)) => self.page_failed(&state, error).await,
        };

        PageOutcome { step, stats }
    }

    async fn process_page(
        &self,
        state: &PageCursorState,
        stats: &mut PageStats,
    ) -> Result<PageStep, PageFailure> {
        let started_at = Utc::now();
        let family = state.family;
        let store = self.load_store(state.store_id).await?;
        let log = SyncLog::new(family, &store);
        let singular = family.singular();

        match self.ctx.locks.is_held(&lock_key(family, store.id)).await {
            Ok(true) => {}
            Ok(false) => log.warn("lock_not_held", &json!({ "page": state.page_label() })),
            // The page still runs; remote-id dedup keeps a racing walk harmless.
            Err(e) => log.error(
                "lock_check_failed",
                &json!({ "page": state.page_label(), "error": e.to_string() }),
            ),
        }

        log.info(
            "initiated",
            &json!({
                "page": state.page_label(),
                "limit": state.limit(),
                "created_at_min": state.query.created_at_min,
                "attempt": state.attempt,
            }),
        );

        let page = self.fetch(&store, state).await?;
        stats.fetched = page.records.len();
        log.info(
            "received",
            &json!({ "page": state.page_label(), "count": page.records.len() }),
        );

        let max_created = page.records.iter().filter_map(RemoteRecord::created_at).max();
        let remote_ids: Vec<RemoteId> = page.records.iter().filter_map(RemoteRecord::id).collect();
        let existing = self.existing_ids(&store, family, &remote_ids).await?;
        let variants = match family {
            SyncFamily::Orders => {
                let ids = referenced_variant_ids(&page.records);
                self.ctx
                    .repos
                    .products
                    .variants_by_remote_ids(store.owner(), &ids)
                    .await
                    .map_err(SyncError::from)?
            }
            SyncFamily::Products => Default::default(),
        };

        for record in &page.records {
            let Some(remote_id) = record.id() else {
                log.warn(&format!("{singular}:missing_id"), &Value::Null);
                stats.skipped += 1;
                continue;
            };
            let label = format!("{singular}:{remote_id}");

            if existing.contains(&remote_id) {
                log.warn(&format!("{label}:already_exists"), &Value::Null);
                stats.existing += 1;
                continue;
            }

            let qualified = match family {
                SyncFamily::Orders => self.ctx.qualifier.order(record, &variants),
                SyncFamily::Products => self.ctx.qualifier.product(record),
            };
            if let Err(reason) = qualified {
                let context = json!({ "reason": reason.as_str() });
                if reason == Rejection::NoLineItems {
                    log.warn(&format!("{label}:ignored"), &context);
                } else {
                    log.info(&format!("{label}:ignored"), &context);
                }
                stats.skipped += 1;
                continue;
            }

            if state.dry_run {
                log.info(&format!("{label}:dryrun"), &Value::Null);
                stats.dry_run.push(remote_id);
                continue;
            }

            match state.mode {
                ExecutionMode::Immediate => {
                    let outcome = import_record(&self.ctx, &store, family, record)
                        .await
                        .map_err(PageFailure::Record)?;
                    stats.record(outcome);
                }
                ExecutionMode::Deferred => {
                    self.enqueue(SyncJob::ImportRecord {
                        store_id: store.id,
                        family,
                        record: record.clone(),
                    })?;
                    stats.queued += 1;
                }
            }
        }

        let handled = stats.created + stats.updated + stats.queued + stats.dry_run.len();
        let summary = json!({
            "page": state.page_label(),
            "fetched": stats.fetched,
            "existing": stats.existing,
            "skipped": stats.skipped,
            "handled": handled,
        });
        if handled > 0 {
            log.info(&format!("{family}_queued"), &summary);
        } else {
            log.info(&format!("no_{family}_queued"), &summary);
        }

        let next = state.advance(page.next_cursor.clone());
        let is_final = page.records.is_empty() || next.is_none();

        if !state.dry_run {
            self.advance_watermark(&store, state, &log, max_created, is_final, started_at)
                .await?;
        }

        match next {
            Some(next) if !is_final => Ok(PageStep::Next(next)),
            _ => {
                self.release(&store, family, &log).await;
                log.info(
                    "completed",
                    &json!({ "pages": state.pages_processed + 1, "limit": state.limit() }),
                );
                self.ctx.events.publish(SyncEvent::FamilySynced {
                    store_id: store.id,
                    family,
                });
                Ok(PageStep::Finished(RunStatus::Completed))
            }
        }
    }

    async fn fetch(&self, store: &Store, state: &PageCursorState) -> Result<RemotePage, SyncError> {
        let api = &self.ctx.api;
        let selector = state.selector();
        let nickname = format!("{}_page", state.family);
        RateLimitedRequest::from_config(&self.ctx.config)
            .execute(&nickname, || {
                api.fetch_page(store, state.family, &state.query, &selector)
            })
            .await
            .map_err(SyncError::from)
    }

    async fn existing_ids(
        &self,
        store: &Store,
        family: SyncFamily,
        remote_ids: &[RemoteId],
    ) -> Result<HashSet<RemoteId>, SyncError> {
        if remote_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let owner = store.owner();
        let ids = match family {
            SyncFamily::Orders => self
                .ctx
                .repos
                .orders
                .existing_ids(owner, remote_ids)
                .await?
                .into_keys()
                .collect(),
            SyncFamily::Products => self
                .ctx
                .repos
                .products
                .existing_ids(owner, remote_ids)
                .await?
                .into_keys()
                .collect(),
        };
        Ok(ids)
    }

    /// Move the watermark after a page.
    ///
    /// The newest `created_at` seen wins. A page with nothing dated that is
    /// not the last one moves it to the fetch start minus the safety margin.
    /// Writes never go below the fetch's lower bound and the repository never
    /// moves the stored value backwards.
    async fn advance_watermark(
        &self,
        store: &Store,
        state: &PageCursorState,
        log: &SyncLog,
        max_created: Option<DateTime<Utc>>,
        is_final: bool,
        started_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let floor = state.query.created_at_min;
        let target = match (max_created, is_final) {
            (Some(max), _) => max.max(floor),
            (None, false) => (started_at - self.ctx.config.watermark_margin_delta()).max(floor),
            (None, true) => return Ok(()),
        };

        let stored = self
            .ctx
            .repos
            .stores
            .advance_watermark(store.id, state.family, target)
            .await?;
        log.debug(
            "watermark",
            &json!({ "target": target, "stored": stored, "observed": max_created }),
        );
        Ok(())
    }

    /// Decide what follows a failed page.
    async fn page_failed(&self, state: &PageCursorState, error: SyncError) -> PageStep {
        let store = match self.load_store(state.store_id).await {
            Ok(store) => store,
            Err(e) => return PageStep::Abort(e),
        };
        let family = state.family;
        let log = SyncLog::new(family, &store);
        let context = json!({
            "page": state.page_label(),
            "limit": state.limit(),
            "attempt": state.attempt,
            "created_at_min": state.query.created_at_min,
            "error": error.to_string(),
        });

        if error.is_timeout() {
            if state.attempt + 1 < self.ctx.config.page_attempts {
                log.warn("page_timeout", &context);
                return PageStep::Next(state.retry());
            }

            log.error("queue_max_attempts_failure", &context);
            self.release(&store, family, &log).await;

            let limit = state.limit() / 2;
            if limit < 2 {
                log.error("unable_to_page", &context);
                return PageStep::Finished(RunStatus::GaveUp {
                    limit: state.limit(),
                });
            }

            log.info(
                "retrying_with_new_limit",
                &json!({ "limit": limit, "previous_limit": state.limit() }),
            );
            return PageStep::Restart {
                request: StartRequest {
                    store_id: store.id,
                    family,
                    limit: Some(limit),
                    created_at_min: None,
                    mode: state.mode,
                    dry_run: state.dry_run,
                },
            };
        }

        if error.is_remote_client_error() {
            let status = self.remote_failure(&store, &log, family, &error, context).await;
            return PageStep::Finished(status);
        }

        log.emergency("failed", &context);
        PageStep::Finished(RunStatus::Failed {
            error: error.to_string(),
        })
    }

    /// Release the lock and report a rejected remote call.
    async fn remote_failure(
        &self,
        store: &Store,
        log: &SyncLog,
        family: SyncFamily,
        error: &SyncError,
        context: Value,
    ) -> RunStatus {
        self.release(store, family, log).await;

        match error.remote_status() {
            Some(status) if self.ctx.config.is_uninstallable(status) => {
                log.warn(
                    "uninstall_suggested",
                    &json!({ "status": status, "context": context }),
                );
                self.ctx.events.publish(SyncEvent::UninstallSuggested {
                    store_id: store.id,
                    status,
                });
                RunStatus::UninstallSuggested { status }
            }
            status => {
                log.error("api_failed", &json!({ "status": status, "context": context }));
                RunStatus::ApiFailed { status }
            }
        }
    }

    async fn release(&self, store: &Store, family: SyncFamily, log: &SyncLog) {
        if let Err(e) = self.ctx.locks.release(&lock_key(family, store.id)).await {
            log.error("unlock_failed", &json!({ "error": e.to_string() }));
        }
    }

    fn enqueue(&self, job: SyncJob) -> Result<(), SyncError> {
        let queue = self.ctx.queue.as_ref().ok_or_else(|| {
            SyncError::QueueUnavailable("deferred mode needs a running job queue".to_string())
        })?;
        queue.enqueue(job)
    }

    async fn load_store(&self, store_id: StoreId) -> Result<Store, SyncError> {
        self.ctx
            .repos
            .stores
            .get(store_id)
            .await?
            .ok_or(SyncError::StoreNotFound(store_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::sync::import::SkipReason;

    #[test]
    fn test_page_stats_record_and_merge() {
        let mut page = PageStats::default();
        page.record(ImportOutcome::Created(RemoteId::new(1)));
        page.record(ImportOutcome::Updated(RemoteId::new(2)));
        page.record(ImportOutcome::Skipped(SkipReason::UpdateLocked));
        page.record(ImportOutcome::Duplicate);
        page.dry_run.push(RemoteId::new(3));

        let mut total = PageStats {
            created: 2,
            ..PageStats::default()
        };
        total.merge(&page);
        assert_eq!(total.created, 3);
        assert_eq!(total.updated, 1);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.duplicates, 1);
        assert_eq!(total.dry_run, vec![RemoteId::new(3)]);
    }

    #[test]
    fn test_start_request_builder() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let request = StartRequest::new(StoreId::new(4), SyncFamily::Orders)
            .with_limit(64)
            .with_created_at_min(at)
            .with_mode(ExecutionMode::Deferred)
            .dry_run(true);
        assert_eq!(request.limit, Some(64));
        assert_eq!(request.created_at_min, Some(at));
        assert_eq!(request.mode, ExecutionMode::Deferred);
        assert!(request.dry_run);
    }

    #[test]
    fn test_run_status_lock_policy() {
        assert!(RunStatus::Completed.releases_lock());
        assert!(RunStatus::GaveUp { limit: 1 }.releases_lock());
        assert!(RunStatus::ApiFailed { status: Some(500) }.releases_lock());
        assert!(
            !RunStatus::Failed {
                error: "boom".to_string()
            }
            .releases_lock()
        );
    }

    #[test]
    fn test_run_status_serializes_tagged() {
        let json = serde_json::to_value(RunStatus::UninstallSuggested { status: 402 }).unwrap();
        assert_eq!(json, json!({ "outcome": "uninstall_suggested", "status": 402 }));
    }
}
