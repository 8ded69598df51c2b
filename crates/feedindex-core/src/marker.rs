//! Markers: named read cursors per index.
//!
//! All markers of an object live in one hash ([`KeyNamer::markers_key`]),
//! one field per `(index, marker name)`. A marker is advisory: it records a
//! score, nothing is locked.
//!
//! As an [`IndexHooks`] layer the store keeps markers in step with the
//! engine:
//! - forward reads (`after = true`) move each index's default marker to the
//!   score of the last entry returned
//! - backward reads never write
//! - deleting an index deletes all of its markers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::FeedError;
use crate::hooks::{self, AddEvent, DeleteEvent, GetEvent, IndexHooks, RemoveEvent};
use crate::keys::KeyNamer;
use crate::store::OrderedCollectionStore;
use crate::timestamp::Score;
use crate::types::{Fanout, Names};

/// Marker storage and the hook layer that maintains it.
pub struct MarkerStore {
    store: Arc<dyn OrderedCollectionStore>,
    keys: KeyNamer,
    default_name: String,
    inner: Arc<dyn IndexHooks>,
}

impl MarkerStore {
    pub fn new(store: Arc<dyn OrderedCollectionStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            keys: config.key_namer(),
            default_name: config.default_marker_name.clone(),
            inner: hooks::noop(),
        }
    }

    /// Stack this layer on top of `inner`, which runs first.
    pub fn layered(mut self, inner: Arc<dyn IndexHooks>) -> Self {
        self.inner = inner;
        self
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Create or overwrite named markers of one index.
    pub async fn set_markers<I, K>(
        &self,
        object_id: &str,
        index: &str,
        markers: I,
    ) -> Result<(), FeedError>
    where
        I: IntoIterator<Item = (K, Score)>,
        K: AsRef<str>,
    {
        let fields: Vec<(String, String)> = markers
            .into_iter()
            .map(|(name, score)| (self.keys.marker_field(index, name.as_ref()), score.to_string()))
            .collect();
        if fields.is_empty() {
            return Ok(());
        }
        self.store
            .hash_multi_set(&self.keys.markers_key(object_id), &fields)
            .await
    }

    /// Read named markers of one index. Unset markers are `None`.
    pub async fn get_markers(
        &self,
        object_id: &str,
        index: &str,
        names: impl Into<Names>,
    ) -> Result<Fanout<Option<Score>>, FeedError> {
        let names = names.into();
        let key = self.keys.markers_key(object_id);
        let fields: Vec<String> = names
            .as_slice()
            .iter()
            .map(|name| self.keys.marker_field(index, name))
            .collect();
        if fields.is_empty() {
            return Ok(Fanout::Many(vec![]));
        }

        let raw = self.store.hash_multi_get(&key, &fields).await?;
        let scores = raw
            .into_iter()
            .zip(&fields)
            .map(|(value, field)| parse_marker(&key, field, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.fanout(scores))
    }

    /// The default marker of one index, if set.
    pub async fn get_default_marker(
        &self,
        object_id: &str,
        index: &str,
    ) -> Result<Option<Score>, FeedError> {
        let key = self.keys.markers_key(object_id);
        let field = self.keys.marker_field(index, &self.default_name);
        let value = self.store.hash_get(&key, &field).await?;
        parse_marker(&key, &field, value)
    }

    /// Delete every marker of the named indexes.
    pub async fn delete_markers(
        &self,
        object_id: &str,
        indexes: &[String],
    ) -> Result<u64, FeedError> {
        let key = self.keys.markers_key(object_id);
        let prefixes: Vec<String> = indexes
            .iter()
            .map(|index| self.keys.marker_field_prefix(index))
            .collect();
        let doomed: Vec<String> = self
            .store
            .hash_fields(&key)
            .await?
            .into_iter()
            .filter(|field| prefixes.iter().any(|p| field.starts_with(p.as_str())))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        self.store.hash_delete(&key, &doomed).await
    }
}

fn parse_marker(key: &str, field: &str, value: Option<String>) -> Result<Option<Score>, FeedError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<Score>()
            .map(Some)
            .map_err(|_| FeedError::CorruptMarker {
                key: key.to_string(),
                field: field.to_string(),
                value: raw,
            }),
    }
}

#[async_trait]
impl IndexHooks for MarkerStore {
    async fn after_add(&self, event: &AddEvent<'_>) -> Result<(), FeedError> {
        self.inner.after_add(event).await
    }

    async fn after_remove(&self, event: &RemoveEvent<'_>) -> Result<(), FeedError> {
        self.inner.after_remove(event).await
    }

    async fn after_delete_index(&self, event: &DeleteEvent<'_>) -> Result<(), FeedError> {
        self.inner.after_delete_index(event).await?;
        let removed = self.delete_markers(event.object_id, event.indexes).await?;
        if removed > 0 {
            debug!(object = event.object_id, indexes = ?event.indexes, removed, "markers deleted");
        }
        Ok(())
    }

    async fn after_get(&self, event: &GetEvent<'_>) -> Result<(), FeedError> {
        self.inner.after_get(event).await?;
        if !event.after {
            return Ok(());
        }
        let fields: Vec<(String, String)> = event
            .indexes
            .iter()
            .zip(event.pages)
            .filter_map(|(index, page)| {
                page.last().map(|last| {
                    (
                        self.keys.marker_field(index, &self.default_name),
                        last.score.to_string(),
                    )
                })
            })
            .collect();
        if fields.is_empty() {
            return Ok(());
        }
        self.store
            .hash_multi_set(&self.keys.markers_key(event.object_id), &fields)
            .await?;
        debug!(object = event.object_id, advanced = fields.len(), "default markers advanced");
        Ok(())
    }
}
