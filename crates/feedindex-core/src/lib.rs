//! feedindex-core: time-ordered activity indexes over an ordered key-value store.
//!
//! # Architecture
//!
//! ```text
//! BubblingController (rescoring)
//!   └── IndexEngine            (add / remove / delete / paginate / union)
//!         ├── KeyNamer         (storage keys, marker fields)
//!         ├── TimestampCodec   (time → millisecond score)
//!         ├── IndexHooks       (post-operation layers)
//!         │     └── MarkerStore (read cursors)
//!         └── OrderedCollectionStore (memory / SQLite / remote)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use feedindex_core::{EngineConfig, IndexEngine, MemoryStore, PageQuery};
//!
//! # async fn example() -> Result<(), feedindex_core::FeedError> {
//! let engine = IndexEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//! engine.add("user:1", ["timeline", "profile"], "activity:42", "2024-05-01T10:00:00").await?;
//!
//! let page = engine
//!     .get("user:1", "timeline", PageQuery::before("2024-06-01T00:00:00").limit(10))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bubble;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod marker;
pub mod memory;
pub mod store;
pub mod timestamp;
pub mod types;

pub use bubble::BubblingController;
pub use config::{EngineBuilder, EngineConfig};
pub use engine::IndexEngine;
pub use error::FeedError;
pub use hooks::{IndexHooks, NoopHooks};
pub use keys::KeyNamer;
pub use marker::MarkerStore;
pub use memory::MemoryStore;
pub use store::{Order, OrderedCollectionStore, ScoreRange, WriteOp};
pub use timestamp::{Score, TimeInput};
pub use types::{Entry, Fanout, Names, Page, PageQuery};
