//! Storage backends for the Portal URL shortener.
//!
//! Two interchangeable implementations of the `portal_core` capability
//! traits — an in-memory map with optional file snapshots and a
//! PostgreSQL-backed store — plus the [`Store`] facade that picks one at
//! startup and composes the deferred-deletion worker pool alongside it.

pub mod config;
pub mod memory;
pub mod postgres;
mod snapshot;
pub mod store;

pub use config::StoreConfig;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::Store;

use jiff::Timestamp;

/// Presentation format for record creation times.
pub(crate) fn format_timestamp(ts: Timestamp) -> String {
    ts.strftime("%d.%m.%Y %H:%M:%S").to_string()
}
