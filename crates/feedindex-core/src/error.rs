//! Error types for the feed index engine.

use thiserror::Error;

/// Errors that can occur while reading or mutating feed indexes.
///
/// Missing keys, members, markers, and indexes are never errors: those paths
/// degrade to empty, `None`, or no-op results.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The caller left out a required argument (e.g. the marker of a page read).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Opaque failure reported by the backing store.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Corrupt marker '{field}' in '{key}': {value:?} is not a score")]
    CorruptMarker {
        key: String,
        field: String,
        value: String,
    },

    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Returns `true` if the error was raised by argument validation, before
    /// any store access.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
