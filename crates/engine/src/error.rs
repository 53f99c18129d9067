//! Unified error handling for the sync engine.

use std::time::Duration;

use shopsync_core::StoreId;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::shopify::ShopifyError;
use crate::sync::lock::LockError;
use crate::sync::mapper::MappingError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote API call failed.
    #[error("Remote API error: {0}")]
    Remote(#[from] ShopifyError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    /// A remote record could not be mapped.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Lock backend failed.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// A page did not finish within its wall-clock budget.
    #[error("Page exceeded its {0:?} execution budget")]
    PageTimeout(Duration),

    /// Store does not exist.
    #[error("Store not found: {0}")]
    StoreNotFound(StoreId),

    /// Sync passes are switched off.
    #[error("Sync is disabled")]
    Disabled,

    /// Deferred execution was requested without a running queue.
    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Remote record is structurally unusable (e.g., no id).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl SyncError {
    /// Timeouts trigger the halve-the-page-size recovery.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::PageTimeout(_) => true,
            Self::Remote(e) => e.is_timeout(),
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Remote(ShopifyError::RateLimited(_)))
    }

    /// Status code of a remote-client failure.
    #[must_use]
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::Remote(e) => e.status(),
            _ => None,
        }
    }

    /// Remote failures that are neither timeouts nor local faults; the lock is
    /// released so a later pass can retry.
    #[must_use]
    pub fn is_remote_client_error(&self) -> bool {
        matches!(self, Self::Remote(_)) && !self.is_timeout()
    }

    /// Unique-key violations mean the record was already imported.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::Conflict(_)))
    }
}
