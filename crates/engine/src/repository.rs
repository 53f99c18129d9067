//! Persistence seams used by the import pipeline.
//!
//! The `PostgreSQL` implementations live in [`crate::db`]; tests substitute
//! in-memory ones.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shopsync_core::{Email, OrderId, ProductId, RemoteId, StoreId, StoreOwner, SyncFamily};
use sqlx::PgPool;

use crate::db::{PgOrderRepository, PgProductRepository, PgStoreRepository, RepositoryError};
use crate::models::{
    Customer, NewStore, OrderAggregate, OrderWrite, ProductAggregate, ProductWrite, PurgeReport,
    PurgeTarget, Store, StoreDetails, Variant,
};

/// Stores and their watermarks.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Register a store.
    async fn insert(&self, store: NewStore) -> Result<Store, RepositoryError>;

    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    /// Installed stores with `id > after`, ascending, at most `limit`.
    ///
    /// `only` restricts the listing to the given ids.
    async fn list_installed(
        &self,
        after: Option<StoreId>,
        limit: u32,
        only: Option<&[StoreId]>,
    ) -> Result<Vec<Store>, RepositoryError>;

    /// Write the result of a store refresh and return the reloaded store.
    ///
    /// Counts that were not fetched keep their stored value.
    async fn update_details(
        &self,
        id: StoreId,
        details: &StoreDetails,
    ) -> Result<Store, RepositoryError>;

    /// Move a family's watermark forward to `at`.
    ///
    /// Never moves it backwards; returns the value now stored.
    async fn advance_watermark(
        &self,
        id: StoreId,
        family: SyncFamily,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RepositoryError>;

    /// Remove a store's imported data and reset the matching watermarks.
    async fn purge(
        &self,
        id: StoreId,
        targets: &[PurgeTarget],
    ) -> Result<PurgeReport, RepositoryError>;
}

/// Products and variants.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Local ids for the remote ids that were already imported, soft-deleted
    /// rows included.
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, ProductId>, RepositoryError>;

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<ProductAggregate>, RepositoryError>;

    /// Live variants by remote id. Retired variants and variants of
    /// soft-deleted products do not resolve.
    async fn variants_by_remote_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, Variant>, RepositoryError>;

    /// Apply a product write atomically and return the reloaded aggregate.
    async fn save(&self, write: ProductWrite) -> Result<ProductAggregate, RepositoryError>;
}

/// Orders, their line items and customers.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, OrderId>, RepositoryError>;

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<OrderAggregate>, RepositoryError>;

    async fn find_customer_by_remote_id(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<Customer>, RepositoryError>;

    /// Case-insensitive email match among live customers.
    async fn find_customer_by_email(
        &self,
        owner: StoreOwner,
        email: &Email,
    ) -> Result<Option<Customer>, RepositoryError>;

    /// Apply an order write (customer, header, items) atomically and return
    /// the reloaded aggregate.
    async fn save(&self, write: OrderWrite) -> Result<OrderAggregate, RepositoryError>;
}

/// The repositories a sync pass needs.
#[derive(Clone)]
pub struct Repositories {
    pub stores: Arc<dyn StoreRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            stores: Arc::new(PgStoreRepository::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool.clone())),
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
