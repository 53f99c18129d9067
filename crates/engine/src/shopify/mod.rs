//! Shopify REST Admin API access for the sync engine.
//!
//! The walker only needs two calls per entity family: a `count` used to plan
//! page numbers and a paginated collection fetch. Store refreshes add the
//! shop settings record and the plain resource totals. All of them live
//! behind the [`CommerceApi`] trait so the engine can be driven by an
//! in-memory shop in tests; [`ShopifyClient`] is the HTTP implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync_engine::shopify::{CollectionQuery, CommerceApi, PageSelector, ShopifyClient};
//!
//! let client = ShopifyClient::new(&config.shopify)?;
//! let query = CollectionQuery::new(SyncFamily::Orders, 128, created_at_min);
//! let total = client.count(&store, SyncFamily::Orders, &query).await?;
//! let page = client.fetch_page(&store, SyncFamily::Orders, &query, &PageSelector::first()).await?;
//! ```

mod client;
pub mod types;

use async_trait::async_trait;
use shopsync_core::SyncFamily;
use thiserror::Error;

pub use client::{ShopifyClient, next_page_info};
pub use types::{CollectionQuery, PageSelector, RemotePage, RemoteRecord};

use crate::models::{Store, StoreCount};

/// Errors that can occur when calling the remote platform.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Non-success status other than 429.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The store domain could not form a valid URL.
    #[error("invalid shop URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The response was valid JSON but not the expected shape.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
}

impl ShopifyError {
    /// Remote status code, when the platform answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited(_) => Some(429),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Remote paginated collection endpoint.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Number of records matching `query`, used to plan page numbers.
    async fn count(
        &self,
        store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
    ) -> Result<u64, ShopifyError>;

    /// One page of records matching `query`.
    async fn fetch_page(
        &self,
        store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
        page: &PageSelector,
    ) -> Result<RemotePage, ShopifyError>;

    /// The shop settings record.
    async fn shop(&self, store: &Store) -> Result<RemoteRecord, ShopifyError>;

    /// Unfiltered total of one resource, for the store's stats columns.
    async fn resource_count(&self, store: &Store, count: StoreCount) -> Result<u64, ShopifyError>;
}
