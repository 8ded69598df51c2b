//! In-memory store.
//!
//! Implements the full [`OrderedCollectionStore`] contract in RAM, with the
//! same container semantics as a Redis server. All data is lost when the
//! store is dropped. Useful for tests and embedded, single-process feeds.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use crate::error::FeedError;
use crate::store::{rank_bounds, Order, OrderedCollectionStore, ScoreRange, WriteOp};
use crate::timestamp::Score;
use crate::types::Entry;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, Score>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn upsert(&mut self, member: &str, score: Score) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.order.remove(&(score, member.to_string())),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn ascending(&self, range: ScoreRange) -> impl Iterator<Item = &(Score, String)> {
        self.order
            .range((Bound::Included((range.min, String::new())), Bound::Unbounded))
            .take_while(move |(s, _)| *s <= range.max)
    }

    fn descending(&self, range: ScoreRange) -> impl Iterator<Item = &(Score, String)> {
        let upper = match range.max.checked_add(1) {
            Some(next) => Bound::Excluded((next, String::new())),
            None => Bound::Unbounded,
        };
        self.order
            .range((Bound::Unbounded, upper))
            .rev()
            .take_while(move |(s, _)| *s >= range.min)
    }
}

#[derive(Debug)]
enum Value {
    Sorted(SortedSet),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Self::Sorted(z) => z.len() == 0,
            Self::Set(s) => s.is_empty(),
            Self::Hash(h) => h.is_empty(),
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> FeedError {
    FeedError::Store(format!(
        "WRONGTYPE key '{key}' holds a different kind of value (expected {expected})"
    ))
}

#[derive(Debug, Default)]
struct Keyspace {
    data: BTreeMap<String, Value>,
}

impl Keyspace {
    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>, FeedError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Sorted(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        }
    }

    fn set(&self, key: &str) -> Result<Option<&BTreeSet<String>>, FeedError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>, FeedError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    /// Run `f` on the container at `key`, creating it with `make` if absent and
    /// dropping it if `f` leaves it empty.
    fn mutate<T>(
        &mut self,
        key: &str,
        make: fn() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T, FeedError>,
    ) -> Result<T, FeedError> {
        let value = self.data.entry(key.to_string()).or_insert_with(make);
        let out = f(value);
        if value.is_empty() {
            self.data.remove(key);
        }
        out
    }

    fn apply(&mut self, op: &WriteOp) -> Result<u64, FeedError> {
        match op {
            WriteOp::SortedUpsert { key, entries } => {
                self.mutate(key, || Value::Sorted(SortedSet::default()), |v| match v {
                    Value::Sorted(z) => {
                        for e in entries {
                            z.upsert(&e.member, e.score);
                        }
                        Ok(entries.len() as u64)
                    }
                    _ => Err(wrong_type(key, "sorted set")),
                })
            }
            WriteOp::SortedRemove { key, members } => {
                if self.sorted(key)?.is_none() {
                    return Ok(0);
                }
                self.mutate(key, || Value::Sorted(SortedSet::default()), |v| match v {
                    Value::Sorted(z) => Ok(members.iter().filter(|m| z.remove(m)).count() as u64),
                    _ => Err(wrong_type(key, "sorted set")),
                })
            }
            WriteOp::SetAdd { key, members } => {
                self.mutate(key, || Value::Set(BTreeSet::new()), |v| match v {
                    Value::Set(s) => {
                        Ok(members.iter().filter(|m| s.insert(m.to_string())).count() as u64)
                    }
                    _ => Err(wrong_type(key, "set")),
                })
            }
            WriteOp::SetRemove { key, members } => {
                if self.set(key)?.is_none() {
                    return Ok(0);
                }
                self.mutate(key, || Value::Set(BTreeSet::new()), |v| match v {
                    Value::Set(s) => Ok(members.iter().filter(|m| s.remove(*m)).count() as u64),
                    _ => Err(wrong_type(key, "set")),
                })
            }
            WriteOp::HashSet { key, fields } => {
                self.mutate(key, || Value::Hash(BTreeMap::new()), |v| match v {
                    Value::Hash(h) => {
                        for (field, value) in fields {
                            h.insert(field.clone(), value.clone());
                        }
                        Ok(fields.len() as u64)
                    }
                    _ => Err(wrong_type(key, "hash")),
                })
            }
            WriteOp::HashDelete { key, fields } => {
                if self.hash(key)?.is_none() {
                    return Ok(0);
                }
                self.mutate(key, || Value::Hash(BTreeMap::new()), |v| match v {
                    Value::Hash(h) => Ok(fields.iter().filter(|f| h.remove(*f).is_some()).count() as u64),
                    _ => Err(wrong_type(key, "hash")),
                })
            }
            WriteOp::Delete { keys } => {
                Ok(keys.iter().filter(|k| self.data.remove(*k).is_some()).count() as u64)
            }
        }
    }
}

/// In-memory ordered-collection store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Keyspace>, FeedError> {
        self.inner
            .lock()
            .map_err(|_| FeedError::Store("memory store lock poisoned".into()))
    }

    fn write(&self, op: WriteOp) -> Result<u64, FeedError> {
        self.lock()?.apply(&op)
    }

    /// Number of live keys.
    pub fn key_count(&self) -> Result<usize, FeedError> {
        Ok(self.lock()?.data.len())
    }

    /// Drop every key.
    pub fn flush(&self) -> Result<(), FeedError> {
        self.lock()?.data.clear();
        Ok(())
    }
}

#[async_trait]
impl OrderedCollectionStore for MemoryStore {
    async fn sorted_upsert(&self, key: &str, entries: &[Entry]) -> Result<(), FeedError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.write(WriteOp::SortedUpsert {
            key: key.to_string(),
            entries: entries.to_vec(),
        })?;
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        self.write(WriteOp::SortedRemove {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn sorted_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, FeedError> {
        let ks = self.lock()?;
        let Some(z) = ks.sorted(key)? else {
            return Ok(vec![]);
        };
        let take = limit.unwrap_or(usize::MAX);
        let to_entry = |(s, m): &(Score, String)| Entry::new(m.clone(), *s);
        let entries: Vec<Entry> = match order {
            Order::Ascending => z.ascending(range).skip(offset).take(take).map(to_entry).collect(),
            Order::Descending => z.descending(range).skip(offset).take(take).map(to_entry).collect(),
        };
        Ok(entries)
    }

    async fn sorted_card(&self, key: &str) -> Result<u64, FeedError> {
        Ok(self.lock()?.sorted(key)?.map_or(0, |z| z.len() as u64))
    }

    async fn sorted_count(&self, key: &str, range: ScoreRange) -> Result<u64, FeedError> {
        Ok(self
            .lock()?
            .sorted(key)?
            .map_or(0, |z| z.ascending(range).count() as u64))
    }

    async fn sorted_rank(&self, key: &str, member: &str) -> Result<Option<u64>, FeedError> {
        let ks = self.lock()?;
        let Some(z) = ks.sorted(key)? else {
            return Ok(None);
        };
        Ok(z.scores.get(member).map(|score| {
            z.order
                .range(..(*score, member.to_string()))
                .count() as u64
        }))
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<Score>, FeedError> {
        Ok(self
            .lock()?
            .sorted(key)?
            .and_then(|z| z.scores.get(member).copied()))
    }

    async fn sorted_range_by_rank(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Entry>, FeedError> {
        let ks = self.lock()?;
        let Some(z) = ks.sorted(key)? else {
            return Ok(vec![]);
        };
        let Some((start, stop)) = rank_bounds(z.len() as u64, start, stop) else {
            return Ok(vec![]);
        };
        Ok(z.order
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(s, m)| Entry::new(m.clone(), *s))
            .collect())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        if members.is_empty() {
            return Ok(0);
        }
        self.write(WriteOp::SetAdd {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        self.write(WriteOp::SetRemove {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn set_card(&self, key: &str) -> Result<u64, FeedError> {
        Ok(self.lock()?.set(key)?.map_or(0, |s| s.len() as u64))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, FeedError> {
        Ok(self
            .lock()?
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), FeedError> {
        self.write(WriteOp::HashSet {
            key: key.to_string(),
            fields: vec![(field.to_string(), value.to_string())],
        })?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, FeedError> {
        Ok(self.lock()?.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hash_multi_set(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), FeedError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.write(WriteOp::HashSet {
            key: key.to_string(),
            fields: fields.to_vec(),
        })?;
        Ok(())
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, FeedError> {
        let ks = self.lock()?;
        let hash = ks.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(f).cloned()))
            .collect())
    }

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<u64, FeedError> {
        self.write(WriteOp::HashDelete {
            key: key.to_string(),
            fields: fields.to_vec(),
        })
    }

    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, FeedError> {
        Ok(self
            .lock()?
            .hash(key)?
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn key_delete(&self, keys: &[String]) -> Result<u64, FeedError> {
        self.write(WriteOp::Delete {
            keys: keys.to_vec(),
        })
    }

    async fn key_exists(&self, key: &str) -> Result<bool, FeedError> {
        Ok(self.lock()?.data.contains_key(key))
    }

    async fn key_enumerate(&self, prefix: &str) -> Result<Vec<String>, FeedError> {
        Ok(self
            .lock()?
            .data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    /// Applies the whole batch under one lock, so readers never observe half
    /// of it. Ops before a failing op stay applied.
    async fn apply(&self, batch: Vec<WriteOp>) -> Result<(), FeedError> {
        let mut ks = self.lock()?;
        for op in &batch {
            ks.apply(op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.member.as_str()).collect()
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn upsert_updates_score_without_duplicates() {
        let store = MemoryStore::new();
        store.sorted_upsert("z", &[Entry::new("a", 1)]).await.unwrap();
        store.sorted_upsert("z", &[Entry::new("a", 5)]).await.unwrap();
        assert_eq!(store.sorted_card("z").await.unwrap(), 1);
        let all = store.sorted_range_by_rank("z", 0, -1).await.unwrap();
        assert_eq!(all, vec![Entry::new("a", 5)]);
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_member() {
        let store = MemoryStore::new();
        store
            .sorted_upsert("z", &[Entry::new("b", 1), Entry::new("c", 1), Entry::new("a", 1), Entry::new("x", 0)])
            .await
            .unwrap();

        let asc = store
            .sorted_range_by_score("z", ScoreRange::all(), Order::Ascending, 0, None)
            .await
            .unwrap();
        assert_eq!(members(&asc), vec!["x", "a", "b", "c"]);

        let desc = store
            .sorted_range_by_score("z", ScoreRange::all(), Order::Descending, 0, None)
            .await
            .unwrap();
        assert_eq!(members(&desc), vec!["c", "b", "a", "x"]);
    }

    #[tokio::test]
    async fn range_by_score_is_inclusive_with_offset_and_limit() {
        let store = MemoryStore::new();
        let entries: Vec<Entry> = (0..10).map(|i| Entry::new(format!("m{i}"), i)).collect();
        store.sorted_upsert("z", &entries).await.unwrap();

        let page = store
            .sorted_range_by_score("z", ScoreRange::new(3, 7), Order::Ascending, 1, Some(2))
            .await
            .unwrap();
        assert_eq!(members(&page), vec!["m4", "m5"]);

        let page = store
            .sorted_range_by_score("z", ScoreRange::at_most(7), Order::Descending, 0, Some(3))
            .await
            .unwrap();
        assert_eq!(members(&page), vec!["m7", "m6", "m5"]);

        let page = store
            .sorted_range_by_score("z", ScoreRange::at_least(8), Order::Descending, 0, None)
            .await
            .unwrap();
        assert_eq!(members(&page), vec!["m9", "m8"]);

        assert_eq!(store.sorted_count("z", ScoreRange::new(3, 7)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn rank_and_rank_slices() {
        let store = MemoryStore::new();
        store
            .sorted_upsert("z", &[Entry::new("a", 30), Entry::new("b", 10), Entry::new("c", 20)])
            .await
            .unwrap();
        assert_eq!(store.sorted_rank("z", "b").await.unwrap(), Some(0));
        assert_eq!(store.sorted_rank("z", "a").await.unwrap(), Some(2));
        assert_eq!(store.sorted_rank("z", "nope").await.unwrap(), None);
        assert_eq!(store.sorted_rank("missing", "a").await.unwrap(), None);

        let tail = store.sorted_range_by_rank("z", -2, -1).await.unwrap();
        assert_eq!(members(&tail), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn emptied_containers_disappear() {
        let store = MemoryStore::new();
        store.sorted_upsert("z", &[Entry::new("a", 1)]).await.unwrap();
        store.set_add("s", &s(&["x"])).await.unwrap();
        store.hash_set("h", "f", "v").await.unwrap();
        assert_eq!(store.key_count().unwrap(), 3);

        assert_eq!(store.sorted_remove("z", &s(&["a", "b"])).await.unwrap(), 1);
        assert_eq!(store.set_remove("s", &s(&["x"])).await.unwrap(), 1);
        assert_eq!(store.hash_delete("h", &s(&["f"])).await.unwrap(), 1);

        assert!(!store.key_exists("z").await.unwrap());
        assert!(!store.key_exists("s").await.unwrap());
        assert!(!store.key_exists("h").await.unwrap());
        assert_eq!(store.key_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_keys_read_as_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.sorted_card("nope").await.unwrap(), 0);
        assert_eq!(store.sorted_remove("nope", &s(&["a"])).await.unwrap(), 0);
        assert_eq!(store.set_members("nope").await.unwrap(), Vec::<String>::new());
        assert_eq!(store.hash_get("nope", "f").await.unwrap(), None);
        assert_eq!(
            store.hash_multi_get("nope", &s(&["a", "b"])).await.unwrap(),
            vec![None, None]
        );
        assert_eq!(store.key_delete(&s(&["nope"])).await.unwrap(), 0);
        assert_eq!(store.key_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_type_is_a_store_error() {
        let store = MemoryStore::new();
        store.set_add("k", &s(&["x"])).await.unwrap();
        let err = store.sorted_upsert("k", &[Entry::new("a", 1)]).await.unwrap_err();
        assert!(matches!(err, FeedError::Store(_)));
        assert!(store.hash_get("k", "f").await.is_err());
        // Failed write must not clobber the existing set.
        assert_eq!(store.set_card("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn enumerate_by_prefix() {
        let store = MemoryStore::new();
        for key in ["app:a", "app:b", "apq:c", "ap"] {
            store.set_add(key, &s(&["x"])).await.unwrap();
        }
        assert_eq!(store.key_enumerate("app:").await.unwrap(), s(&["app:a", "app:b"]));
        assert_eq!(store.key_enumerate("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        let store = MemoryStore::new();
        store
            .apply(vec![
                WriteOp::SortedUpsert { key: "z".into(), entries: vec![Entry::new("a", 1)] },
                WriteOp::SetAdd { key: "s".into(), members: s(&["z"]) },
                WriteOp::Delete { keys: s(&["z"]) },
                WriteOp::HashSet { key: "h".into(), fields: vec![("f".into(), "1".into())] },
            ])
            .await
            .unwrap();
        assert!(!store.key_exists("z").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), s(&["z"]));
        assert_eq!(store.hash_fields("h").await.unwrap(), s(&["f"]));
    }

    #[tokio::test]
    async fn sorted_score_reads_one_member() {
        let store = MemoryStore::new();
        store
            .sorted_upsert("z", &[Entry::new("a", 30), Entry::new("b", -4)])
            .await
            .unwrap();
        assert_eq!(store.sorted_score("z", "a").await.unwrap(), Some(30));
        assert_eq!(store.sorted_score("z", "b").await.unwrap(), Some(-4));
        assert_eq!(store.sorted_score("z", "nope").await.unwrap(), None);
        assert_eq!(store.sorted_score("missing", "a").await.unwrap(), None);

        store.set_add("s", &s(&["a"])).await.unwrap();
        assert!(store.sorted_score("s", "a").await.is_err());
    }

    #[test]
    fn poisoned_lock_is_reported_not_hidden() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.key_count(), Err(FeedError::Store(_))));
        assert!(store.flush().is_err());
    }
}
