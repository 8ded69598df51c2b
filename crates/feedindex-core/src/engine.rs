//! The index engine: add, remove, delete, and paginate named indexes.
//!
//! Every index of an object is a sorted set keyed by
//! [`KeyNamer::index_key`]; its name is recorded in the object's registry set
//! while the index exists. Removing entries never touches the registry; only
//! [`IndexEngine::delete_index`] does.
//!
//! Multi-index writes are sent as one [`WriteOp`] batch. A batch is not a
//! transaction: if the store fails halfway, earlier writes stay applied.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::FeedError;
use crate::hooks::{self, AddEvent, DeleteEvent, GetEvent, IndexHooks, RemoveEvent};
use crate::keys::KeyNamer;
use crate::store::{Order, OrderedCollectionStore, ScoreRange, WriteOp};
use crate::timestamp::{resolve_score, Score, TimeInput};
use crate::types::{Entry, Fanout, Names, Page, PageQuery};

/// Named, time-ordered indexes of activity ids per object.
#[derive(Clone)]
pub struct IndexEngine {
    store: Arc<dyn OrderedCollectionStore>,
    keys: KeyNamer,
    config: EngineConfig,
    hooks: Arc<dyn IndexHooks>,
}

impl IndexEngine {
    /// Create an engine with no hooks.
    pub fn new(store: Arc<dyn OrderedCollectionStore>, config: EngineConfig) -> Self {
        Self {
            store,
            keys: config.key_namer(),
            config,
            hooks: hooks::noop(),
        }
    }

    /// Replace the hook stack.
    pub fn with_hooks(mut self, hooks: Arc<dyn IndexHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderedCollectionStore> {
        &self.store
    }

    pub fn keys(&self) -> &KeyNamer {
        &self.keys
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─── Writes ─────────────────────────────────────────────────────────────

    /// Add `member` to every named index of `object_id`, scored by
    /// `published` (`TimeInput::Now` for the current time).
    ///
    /// Re-adding a member moves it to the new score.
    pub async fn add(
        &self,
        object_id: &str,
        indexes: impl Into<Names>,
        member: &str,
        published: impl Into<TimeInput>,
    ) -> Result<(), FeedError> {
        let names = indexes.into();
        let names = names.as_slice();
        if names.is_empty() {
            return Ok(());
        }
        let score = resolve_score(&published.into());

        let mut batch: Vec<WriteOp> = names
            .iter()
            .map(|index| WriteOp::SortedUpsert {
                key: self.keys.index_key(object_id, index),
                entries: vec![Entry::new(member, score)],
            })
            .collect();
        batch.push(WriteOp::SetAdd {
            key: self.keys.registry_key(object_id),
            members: names.to_vec(),
        });
        self.store.apply(batch).await?;
        debug!(object = object_id, indexes = ?names, member, score, "activity added");

        self.hooks
            .after_add(&AddEvent {
                object_id,
                indexes: names,
                member,
                score,
            })
            .await
    }

    /// Remove `member` from every named index. Indexes left empty stay
    /// registered until deleted.
    pub async fn remove(
        &self,
        object_id: &str,
        indexes: impl Into<Names>,
        member: &str,
    ) -> Result<(), FeedError> {
        let names = indexes.into();
        let names = names.as_slice();
        if names.is_empty() {
            return Ok(());
        }
        let members = vec![member.to_string()];

        let batch = names
            .iter()
            .map(|index| WriteOp::SortedRemove {
                key: self.keys.index_key(object_id, index),
                members: members.clone(),
            })
            .collect();
        self.store.apply(batch).await?;
        debug!(object = object_id, indexes = ?names, member, "activity removed");

        self.hooks
            .after_remove(&RemoveEvent {
                object_id,
                indexes: names,
                members: &members,
            })
            .await
    }

    /// Remove many members from one index. Absent members are ignored.
    pub async fn remove_values(
        &self,
        object_id: &str,
        index: &str,
        members: impl Into<Names>,
    ) -> Result<(), FeedError> {
        let members = members.into();
        let members = members.as_slice();
        if members.is_empty() {
            return Ok(());
        }
        let removed = self
            .store
            .sorted_remove(&self.keys.index_key(object_id, index), members)
            .await?;
        debug!(object = object_id, index, requested = members.len(), removed, "activities removed");

        let indexes = [index.to_string()];
        self.hooks
            .after_remove(&RemoveEvent {
                object_id,
                indexes: &indexes,
                members,
            })
            .await
    }

    /// Destroy the named indexes and drop them from the registry. The
    /// registry itself is deleted once it is empty. Unknown objects and
    /// indexes are ignored.
    pub async fn delete_index(
        &self,
        object_id: &str,
        indexes: impl Into<Names>,
    ) -> Result<(), FeedError> {
        let names = indexes.into();
        let names = names.as_slice();
        if names.is_empty() {
            return Ok(());
        }
        let registry = self.keys.registry_key(object_id);

        self.store
            .apply(vec![
                WriteOp::Delete {
                    keys: names
                        .iter()
                        .map(|index| self.keys.index_key(object_id, index))
                        .collect(),
                },
                WriteOp::SetRemove {
                    key: registry.clone(),
                    members: names.to_vec(),
                },
            ])
            .await?;

        // The store drops a set once it is empty.
        let registry_dropped = !self.store.key_exists(&registry).await?;
        debug!(object = object_id, indexes = ?names, registry_dropped, "indexes deleted");

        self.hooks
            .after_delete_index(&DeleteEvent {
                object_id,
                indexes: names,
                registry_dropped,
            })
            .await
    }

    /// Delete every index registered for `object_id`.
    pub async fn delete_object(&self, object_id: &str) -> Result<(), FeedError> {
        let names = self.indexes(object_id).await?;
        self.delete_index(object_id, names).await
    }

    /// Delete every key under the configured prefix, markers included.
    /// Hooks are not called. Returns the number of keys removed.
    pub async fn purge_namespace(&self) -> Result<u64, FeedError> {
        let keys = self.store.key_enumerate(self.keys.prefix()).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.store.key_delete(&keys).await?;
        debug!(prefix = self.keys.prefix(), removed, "namespace purged");
        Ok(removed)
    }

    /// Upsert pre-scored entries into one index, keeping the registry in step.
    pub(crate) async fn rescore(
        &self,
        object_id: &str,
        index: &str,
        entries: Vec<Entry>,
    ) -> Result<(), FeedError> {
        if entries.is_empty() {
            return Ok(());
        }
        let count = entries.len();
        self.store
            .apply(vec![
                WriteOp::SortedUpsert {
                    key: self.keys.index_key(object_id, index),
                    entries,
                },
                WriteOp::SetAdd {
                    key: self.keys.registry_key(object_id),
                    members: vec![index.to_string()],
                },
            ])
            .await?;
        debug!(object = object_id, index, count, "entries rescored");
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    /// Count entries at or before `published` (`after = false`), or at or
    /// after it (`after = true`).
    pub async fn get_count(
        &self,
        object_id: &str,
        index: &str,
        published: impl Into<TimeInput>,
        after: bool,
    ) -> Result<u64, FeedError> {
        let score = resolve_score(&published.into());
        let range = if after {
            ScoreRange::at_least(score)
        } else {
            ScoreRange::at_most(score)
        };
        self.store
            .sorted_count(&self.keys.index_key(object_id, index), range)
            .await
    }

    /// Read one page from each named index, relative to `query.marker`.
    ///
    /// Backwards (`after = false`): scores ≤ marker, newest first.
    /// Forwards (`after = true`): scores ≥ marker, oldest first.
    /// An entry exactly at the marker appears in both directions.
    ///
    /// Fails with [`FeedError::Validation`] if the query has no marker.
    pub async fn get(
        &self,
        object_id: &str,
        indexes: impl Into<Names>,
        query: PageQuery,
    ) -> Result<Fanout<Page>, FeedError> {
        let Some(marker) = query.marker.as_ref() else {
            return Err(FeedError::Validation(
                "a marker is required to page through an index".into(),
            ));
        };
        let marker = resolve_score(marker);
        let names = indexes.into();

        let (range, order) = if query.after {
            (ScoreRange::at_least(marker), Order::Ascending)
        } else {
            (ScoreRange::at_most(marker), Order::Descending)
        };
        let limit = query.limit;
        let pages = try_join_all(names.as_slice().iter().map(|index| {
            let key = self.keys.index_key(object_id, index);
            async move {
                self.store
                    .sorted_range_by_score(&key, range, order, 0, Some(limit))
                    .await
            }
        }))
        .await?;

        self.hooks
            .after_get(&GetEvent {
                object_id,
                indexes: names.as_slice(),
                marker,
                limit,
                after: query.after,
                pages: &pages,
            })
            .await?;

        let pages = pages
            .into_iter()
            .map(|entries| Page::shape(entries, query.with_scores))
            .collect();
        Ok(names.fanout(pages))
    }

    /// Every member of the named indexes, scores ignored.
    pub async fn get_union(
        &self,
        object_id: &str,
        indexes: impl Into<Names>,
    ) -> Result<BTreeSet<String>, FeedError> {
        let names = indexes.into();
        let all = try_join_all(names.as_slice().iter().map(|index| {
            let key = self.keys.index_key(object_id, index);
            async move { self.store.sorted_range_by_rank(&key, 0, -1).await }
        }))
        .await?;
        Ok(all.into_iter().flatten().map(|e| e.member).collect())
    }

    /// Names of the object's live indexes, sorted.
    pub async fn indexes(&self, object_id: &str) -> Result<Vec<String>, FeedError> {
        self.store.set_members(&self.keys.registry_key(object_id)).await
    }

    /// Number of entries in one index.
    pub async fn cardinality(&self, object_id: &str, index: &str) -> Result<u64, FeedError> {
        self.store
            .sorted_card(&self.keys.index_key(object_id, index))
            .await
    }

    /// 0-based position of `member` in score-ascending order.
    pub async fn rank(
        &self,
        object_id: &str,
        index: &str,
        member: &str,
    ) -> Result<Option<u64>, FeedError> {
        self.store
            .sorted_rank(&self.keys.index_key(object_id, index), member)
            .await
    }

    /// Current score of `member`, if present.
    pub async fn score(
        &self,
        object_id: &str,
        index: &str,
        member: &str,
    ) -> Result<Option<Score>, FeedError> {
        self.store
            .sorted_score(&self.keys.index_key(object_id, index), member)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn engine() -> (Arc<MemoryStore>, IndexEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = IndexEngine::new(store.clone(), EngineConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn add_registers_index() {
        let (store, engine) = engine();
        engine.add("streams", "profile_stream", "activity1234", 1000).await.unwrap();

        let key = engine.keys().index_key("streams", "profile_stream");
        assert_eq!(store.sorted_card(&key).await.unwrap(), 1);
        assert_eq!(engine.indexes("streams").await.unwrap(), vec!["profile_stream"]);
        assert_eq!(
            store.sorted_range_by_rank(&key, 0, -1).await.unwrap(),
            vec![Entry::new("activity1234", 1000)]
        );
    }

    #[tokio::test]
    async fn empty_name_lists_are_no_ops() {
        let (store, engine) = engine();
        engine.add("o", Vec::<String>::new(), "a", 1).await.unwrap();
        engine.remove("o", Vec::<String>::new(), "a").await.unwrap();
        engine.delete_index("o", Vec::<String>::new()).await.unwrap();
        engine.remove_values("o", "s", Vec::<String>::new()).await.unwrap();
        assert_eq!(store.key_count().unwrap(), 0);

        let pages = engine
            .get("o", Vec::<String>::new(), PageQuery::before(1))
            .await
            .unwrap();
        assert_eq!(pages, Fanout::Many(vec![]));
    }

    #[tokio::test]
    async fn score_lookup() {
        let (_, engine) = engine();
        engine.add("o", "s", "a", 10).await.unwrap();
        engine.add("o", "s", "b", 20).await.unwrap();
        assert_eq!(engine.score("o", "s", "b").await.unwrap(), Some(20));
        assert_eq!(engine.score("o", "s", "zz").await.unwrap(), None);
        assert_eq!(engine.rank("o", "s", "b").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn purge_leaves_other_namespaces() {
        let store = Arc::new(MemoryStore::new());
        let a = IndexEngine::new(store.clone(), EngineConfig { prefix: "a:".into(), ..Default::default() });
        let b = IndexEngine::new(store.clone(), EngineConfig { prefix: "b:".into(), ..Default::default() });
        a.add("o", ["s1", "s2"], "m", 1).await.unwrap();
        b.add("o", "s1", "m", 1).await.unwrap();

        assert_eq!(a.purge_namespace().await.unwrap(), 3);
        assert_eq!(a.purge_namespace().await.unwrap(), 0);
        assert_eq!(b.cardinality("o", "s1").await.unwrap(), 1);
    }
}
