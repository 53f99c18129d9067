//! Scriptable stand-in for the REST Admin API.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use shopsync_core::SyncFamily;
use shopsync_engine::models::{Store, StoreCount};
use shopsync_engine::shopify::{
    CollectionQuery, CommerceApi, PageSelector, RemotePage, RemoteRecord, ShopifyError,
};

/// A failure to serve instead of the next response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// The HTTP client gave up waiting.
    Timeout,
    /// Never answers; the page budget has to cut it off.
    Hang,
    /// 429 with a one-second retry hint.
    RateLimited,
    Status(u16),
}

impl Scripted {
    async fn fail<T>(self) -> Result<T, ShopifyError> {
        match self {
            Self::Timeout => Err(ShopifyError::Timeout),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ShopifyError::Timeout)
            }
            Self::RateLimited => Err(ShopifyError::RateLimited(1)),
            Self::Status(status) => Err(ShopifyError::Status {
                status,
                body: format!("scripted {status}"),
            }),
        }
    }
}

/// One `fetch_page` call as the shop saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub family: SyncFamily,
    pub limit: u32,
    pub page: PageSelector,
    pub created_at_min: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ShopState {
    records: HashMap<SyncFamily, Vec<Value>>,
    fetch_failures: VecDeque<Scripted>,
    count_failures: VecDeque<Scripted>,
    cursor_pagination: bool,
    fetches: Vec<FetchCall>,
    counts: Vec<(SyncFamily, DateTime<Utc>)>,
    shops: HashMap<String, Value>,
    shop_failures: VecDeque<Scripted>,
    customer_count: u64,
    shop_calls: Vec<String>,
    resource_counts: Vec<StoreCount>,
}

/// Serves stored payloads oldest first, filtered by `created_at_min`.
#[derive(Debug, Default)]
pub struct FakeShop {
    state: Mutex<ShopState>,
}

impl FakeShop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ShopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, family: SyncFamily, records: impl IntoIterator<Item = Value>) {
        self.state()
            .records
            .entry(family)
            .or_default()
            .extend(records);
    }

    /// Answer every page after the first with a `page_info` cursor instead of
    /// relying on page numbers.
    pub fn use_cursors(&self) {
        self.state().cursor_pagination = true;
    }

    /// Fail the next `fetch_page` calls, in order.
    pub fn fail_fetches(&self, failures: impl IntoIterator<Item = Scripted>) {
        self.state().fetch_failures.extend(failures);
    }

    /// Fail the next `count` calls, in order.
    pub fn fail_counts(&self, failures: impl IntoIterator<Item = Scripted>) {
        self.state().count_failures.extend(failures);
    }

    /// Serve `shop` as the settings record of `domain`.
    pub fn set_shop(&self, domain: &str, shop: Value) {
        self.state().shops.insert(domain.to_string(), shop);
    }

    /// Fail the next `shop` and `resource_count` calls, in order.
    pub fn fail_shop(&self, failures: impl IntoIterator<Item = Scripted>) {
        self.state().shop_failures.extend(failures);
    }

    pub fn set_customer_count(&self, total: u64) {
        self.state().customer_count = total;
    }

    /// Domains whose settings were requested, in call order.
    #[must_use]
    pub fn shop_calls(&self) -> Vec<String> {
        self.state().shop_calls.clone()
    }

    #[must_use]
    pub fn resource_counts(&self) -> Vec<StoreCount> {
        self.state().resource_counts.clone()
    }

    #[must_use]
    pub fn fetches(&self) -> Vec<FetchCall> {
        self.state().fetches.clone()
    }

    #[must_use]
    pub fn count_calls(&self) -> usize {
        self.state().counts.len()
    }

    fn matching(&self, family: SyncFamily, query: &CollectionQuery) -> Vec<Value> {
        let state = self.state();
        let mut records: Vec<Value> = state
            .records
            .get(&family)
            .into_iter()
            .flatten()
            .filter(|record| {
                RemoteRecord::new((*record).clone())
                    .created_at()
                    .is_none_or(|at| at >= query.created_at_min)
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| RemoteRecord::new(record.clone()).created_at());
        records
    }
}

fn offset_of(page: &PageSelector, limit: usize) -> usize {
    match page {
        PageSelector::Number(number) => (*number as usize).saturating_sub(1) * limit,
        PageSelector::Cursor(info) => info
            .strip_prefix("offset:")
            .and_then(|offset| offset.parse().ok())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl CommerceApi for FakeShop {
    async fn count(
        &self,
        _store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
    ) -> Result<u64, ShopifyError> {
        let failure = {
            let mut state = self.state();
            state.counts.push((family, query.created_at_min));
            state.count_failures.pop_front()
        };
        if let Some(failure) = failure {
            return failure.fail().await;
        }
        Ok(self.matching(family, query).len() as u64)
    }

    async fn fetch_page(
        &self,
        _store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
        page: &PageSelector,
    ) -> Result<RemotePage, ShopifyError> {
        let (failure, cursors) = {
            let mut state = self.state();
            state.fetches.push(FetchCall {
                family,
                limit: query.limit,
                page: page.clone(),
                created_at_min: query.created_at_min,
            });
            (state.fetch_failures.pop_front(), state.cursor_pagination)
        };
        if let Some(failure) = failure {
            return failure.fail().await;
        }

        let records = self.matching(family, query);
        let limit = query.limit as usize;
        let offset = offset_of(page, limit);
        let end = (offset + limit).min(records.len());
        let slice = records.get(offset..end).unwrap_or_default();

        let next_cursor = (cursors && end < records.len()).then(|| format!("offset:{end}"));
        Ok(RemotePage {
            records: slice.iter().cloned().map(RemoteRecord::new).collect(),
            next_cursor,
        })
    }

    async fn shop(&self, store: &Store) -> Result<RemoteRecord, ShopifyError> {
        let (failure, shop) = {
            let mut state = self.state();
            state.shop_calls.push(store.shop_domain.clone());
            (
                state.shop_failures.pop_front(),
                state.shops.get(&store.shop_domain).cloned(),
            )
        };
        if let Some(failure) = failure {
            return failure.fail().await;
        }
        shop.map(RemoteRecord::new).ok_or_else(|| ShopifyError::Status {
            status: 404,
            body: "Not Found".to_string(),
        })
    }

    async fn resource_count(&self, _store: &Store, count: StoreCount) -> Result<u64, ShopifyError> {
        let failure = {
            let mut state = self.state();
            state.resource_counts.push(count);
            state.shop_failures.pop_front()
        };
        if let Some(failure) = failure {
            return failure.fail().await;
        }
        let state = self.state();
        let family = match count {
            StoreCount::Customers => return Ok(state.customer_count),
            StoreCount::Orders => SyncFamily::Orders,
            StoreCount::Products => SyncFamily::Products,
        };
        Ok(state.records.get(&family).map_or(0, Vec::len) as u64)
    }
}
