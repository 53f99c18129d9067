//! Test harness for the shopsync engine.
//!
//! Wires a [`SyncContext`] to an in-memory repository, a scriptable fake
//! shop, the moka-backed lock store and a broadcast event sink, so whole
//! walks can run without `PostgreSQL` or network access.

pub mod fixtures;
pub mod logs;
pub mod memory;
pub mod shop;

use std::sync::Arc;

use shopsync_core::SyncFamily;
use shopsync_engine::SyncConfig;
use shopsync_engine::models::Store;
use shopsync_engine::sync::{
    BroadcastEvents, MemoryLockStore, PageWalker, StartRequest, SyncContext, SyncEvent, lock_key,
};
use tokio::sync::broadcast;

pub use logs::LogCapture;
pub use memory::MemoryRepository;
pub use shop::{FakeShop, FetchCall, Scripted};

/// One store wired to fakes.
pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub shop: Arc<FakeShop>,
    pub locks: Arc<MemoryLockStore>,
    pub events: Arc<BroadcastEvents>,
    receiver: broadcast::Receiver<SyncEvent>,
    pub config: SyncConfig,
    pub store: Store,
}

impl Harness {
    /// A harness with [`fixtures::test_config`] and one installed store
    /// created at `ts(0)`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(fixtures::test_config())
    }

    #[must_use]
    pub fn with_config(config: SyncConfig) -> Self {
        let repo = MemoryRepository::new();
        let store = repo.add_store("acme", fixtures::ts(0));
        let events = Arc::new(BroadcastEvents::new(1024));
        let receiver = events.subscribe();
        Self {
            repo,
            shop: Arc::new(FakeShop::new()),
            locks: Arc::new(MemoryLockStore::new()),
            events,
            receiver,
            config,
            store,
        }
    }

    #[must_use]
    pub fn context(&self) -> SyncContext {
        SyncContext::new(
            self.config.clone(),
            Arc::clone(&self.shop) as _,
            self.repo.repositories(),
            Arc::clone(&self.locks) as _,
            Arc::clone(&self.events) as _,
        )
    }

    #[must_use]
    pub fn walker(&self) -> PageWalker {
        PageWalker::new(self.context())
    }

    #[must_use]
    pub const fn request(&self, family: SyncFamily) -> StartRequest {
        StartRequest::new(self.store.id, family)
    }

    #[must_use]
    pub fn lock_key(&self, family: SyncFamily) -> String {
        lock_key(family, self.store.id)
    }

    /// The store as currently persisted.
    #[must_use]
    pub fn current_store(&self) -> Option<Store> {
        self.repo.store(self.store.id)
    }

    /// Events published since the last call.
    pub fn events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
