//! Core types and traits for the Portal URL shortener.
//!
//! This crate provides the shared model types, the storage capability
//! traits, and the error taxonomy used by every storage backend.

pub mod error;
pub mod model;
pub mod storage;

pub use error::{Result, StorageError};
pub use model::{normalize_url, parse_user_id, Statistics, UserUrl};
pub use storage::{Consumer, Lifecycle, Producer, Storage, Users};
