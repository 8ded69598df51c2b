//! feedindex-storage: pluggable backends for the feedindex engine.
//!
//! Backends:
//! - [`MemoryStore`]: in-process (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use feedindex_core::memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
