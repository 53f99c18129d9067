//! Shopsync Core - Shared types library.
//!
//! This crate provides the types shared by the sync engine, the CLI and the
//! integration tests:
//! - `engine` - Paginated, resumable import pipeline
//! - `cli` - Operator commands (migrations, sync passes, purge)
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for local and remote IDs, emails, owners, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
