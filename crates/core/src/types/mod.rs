//! Core types for shopsync.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod owner;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use owner::{StoreOwner, StoreType};
pub use status::*;
