//! Bubbling: move entries within an index by rescoring them in place.
//!
//! A bubbled member keeps its identity (union and membership queries are
//! unaffected); only its position changes.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::IndexEngine;
use crate::error::FeedError;
use crate::marker::MarkerStore;
use crate::store::OrderedCollectionStore;
use crate::timestamp::{resolve_score, TimeInput};
use crate::types::Entry;

/// An [`IndexEngine`] with the marker layer installed, plus rescoring.
#[derive(Clone)]
pub struct BubblingController {
    engine: IndexEngine,
    markers: Arc<MarkerStore>,
}

impl BubblingController {
    pub fn new(store: Arc<dyn OrderedCollectionStore>, config: EngineConfig) -> Self {
        let markers = Arc::new(MarkerStore::new(store.clone(), &config));
        let engine = IndexEngine::new(store, config).with_hooks(markers.clone());
        Self { engine, markers }
    }

    pub fn engine(&self) -> &IndexEngine {
        &self.engine
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Rescore members of one index in a single batch.
    ///
    /// Each value may be a score, an integer string (used verbatim), a date
    /// (string or instant), or [`TimeInput::Now`]. Members not yet in the index
    /// are inserted.
    pub async fn bubble_values<I, K>(
        &self,
        object_id: &str,
        index: &str,
        values: I,
    ) -> Result<(), FeedError>
    where
        I: IntoIterator<Item = (K, TimeInput)>,
        K: Into<String>,
    {
        let entries: Vec<Entry> = values
            .into_iter()
            .map(|(member, value)| Entry::new(member, resolve_score(&value)))
            .collect();
        self.engine.rescore(object_id, index, entries).await
    }
}
