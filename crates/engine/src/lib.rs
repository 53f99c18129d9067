//! Shopsync engine library.
//!
//! Imports a store's products and orders from the Shopify REST Admin API
//! into `PostgreSQL`. Walks are paginated, resumable from a per-family
//! watermark, retried on rate limits and idempotent by remote id.
//!
//! Start with [`sync::PageWalker`] for a single store or
//! [`sync::scheduler::run_pass`] for every installed store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod shopify;
pub mod sync;

pub use config::{EngineConfig, SyncConfig};
pub use error::SyncError;
pub use repository::Repositories;
pub use sync::SyncContext;
