//! Customer model.
//!
//! Customers are never walked directly; they are derived from order payloads
//! and written in the same transaction as the order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shopsync_core::{CustomerId, Email, RemoteId, StoreOwner};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub owner: StoreOwner,
    pub remote_id: Option<RemoteId>,
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Resolved customer upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerWrite {
    /// Matched local customer; `None` inserts.
    pub existing: Option<CustomerId>,
    pub remote_id: Option<RemoteId>,
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub attributes: Value,
}
