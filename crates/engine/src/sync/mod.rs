//! The import pipeline.
//!
//! A sync pass flows through these pieces:
//!
//! - [`scheduler`] picks installed stores and starts a walk per store
//! - [`walker`] takes the [`lock`], plans pages and processes them one by one
//! - [`rate_limit`] wraps every remote call with bounded 429 retries
//! - [`qualifier`] and the [`fields`] maps decide what is imported and how
//! - [`import`] writes each record transactionally and emits [`events`]
//! - [`queue`] runs pages and records on worker tasks in deferred mode
//!
//! [`store_update`] refreshes shop settings and remote totals outside of walks.

pub mod cursor;
pub mod events;
pub mod fields;
pub mod import;
pub mod lock;
pub mod log;
pub mod mapper;
pub mod purge;
pub mod qualifier;
pub mod queue;
pub mod rate_limit;
pub mod scheduler;
pub mod store_update;
pub mod walker;

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::repository::Repositories;
use crate::shopify::CommerceApi;

pub use cursor::{PageCursorState, Pagination};
pub use events::{BroadcastEvents, EventSink, ImportedEntity, LogEvents, SyncEvent};
pub use import::{ImportOutcome, OrderImporter, ProductImporter, SkipReason};
pub use lock::{LockError, LockStore, MemoryLockStore, lock_key};
pub use purge::purge_store;
pub use qualifier::{DefaultQualifier, ImportQualifier, Rejection};
pub use queue::{JobQueue, JobReceiver, SyncJob, WorkerPool, spawn_workers};
pub use rate_limit::RateLimitedRequest;
pub use scheduler::{PassSummary, SyncPass, run_pass};
pub use store_update::{RefreshSummary, StoreRefresh, refresh_store, refresh_stores};
pub use walker::{
    PageOutcome, PageStats, PageStep, PageWalker, RunReport, RunStatus, StartOutcome, StartRequest,
};

/// Everything a sync component needs, shared by cheap clones.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<SyncConfig>,
    pub api: Arc<dyn CommerceApi>,
    pub repos: Repositories,
    pub locks: Arc<dyn LockStore>,
    pub events: Arc<dyn EventSink>,
    pub qualifier: Arc<dyn ImportQualifier>,
    /// Present when deferred execution is available.
    pub queue: Option<JobQueue>,
}

impl SyncContext {
    #[must_use]
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn CommerceApi>,
        repos: Repositories,
        locks: Arc<dyn LockStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            api,
            repos,
            locks,
            events,
            qualifier: Arc::new(DefaultQualifier),
            queue: None,
        }
    }

    #[must_use]
    pub fn with_qualifier(mut self, qualifier: Arc<dyn ImportQualifier>) -> Self {
        self.qualifier = qualifier;
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("queue", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}
