//! The ordered-collection capability the engine consumes.
//!
//! The trait mirrors the primitives of a Redis-like store: sorted sets for
//! index entries, plain sets for the per-object registry, hashes for markers,
//! and whole-key lifecycle operations. Implementations include
//! [`MemoryStore`](crate::memory::MemoryStore) and, in `feedindex-storage`,
//! `SqliteStore`.
//!
//! Store contract:
//! - sorted sets order by score, ties by member (byte-wise), ascending
//! - a container that loses its last member ceases to exist
//! - using a key as the wrong container kind is a [`FeedError::Store`]

use async_trait::async_trait;

use crate::error::FeedError;
use crate::timestamp::Score;
use crate::types::Entry;

/// Inclusive score bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRange {
    pub min: Score,
    pub max: Score,
}

impl ScoreRange {
    pub fn new(min: Score, max: Score) -> Self {
        Self { min, max }
    }

    pub fn all() -> Self {
        Self::new(Score::MIN, Score::MAX)
    }

    pub fn at_most(max: Score) -> Self {
        Self::new(Score::MIN, max)
    }

    pub fn at_least(min: Score) -> Self {
        Self::new(min, Score::MAX)
    }

    pub fn contains(&self, score: Score) -> bool {
        self.min <= score && score <= self.max
    }
}

/// Direction of a range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// One write in a batch submitted through [`OrderedCollectionStore::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SortedUpsert { key: String, entries: Vec<Entry> },
    SortedRemove { key: String, members: Vec<String> },
    SetAdd { key: String, members: Vec<String> },
    SetRemove { key: String, members: Vec<String> },
    HashSet { key: String, fields: Vec<(String, String)> },
    HashDelete { key: String, fields: Vec<String> },
    Delete { keys: Vec<String> },
}

/// Ordered set / set / hash primitives over string keys.
#[async_trait]
pub trait OrderedCollectionStore: Send + Sync {
    // ─── Sorted sets ────────────────────────────────────────────────────────

    /// Insert members or update their scores.
    async fn sorted_upsert(&self, key: &str, entries: &[Entry]) -> Result<(), FeedError>;

    /// Remove members; returns how many were present.
    async fn sorted_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError>;

    /// Entries with scores inside `range`, in `order`, skipping `offset` and
    /// returning at most `limit` (all when `None`).
    async fn sorted_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, FeedError>;

    async fn sorted_card(&self, key: &str) -> Result<u64, FeedError>;

    async fn sorted_count(&self, key: &str, range: ScoreRange) -> Result<u64, FeedError>;

    /// 0-based ascending rank of `member`.
    async fn sorted_rank(&self, key: &str, member: &str) -> Result<Option<u64>, FeedError>;

    /// Current score of `member`.
    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<Score>, FeedError>;

    /// Ascending slice between two inclusive ranks; negative ranks count from
    /// the end (`-1` is the last entry).
    async fn sorted_range_by_rank(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Entry>, FeedError>;

    // ─── Sets ───────────────────────────────────────────────────────────────

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64, FeedError>;

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError>;

    async fn set_card(&self, key: &str) -> Result<u64, FeedError>;

    /// All members, sorted.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, FeedError>;

    // ─── Hashes ─────────────────────────────────────────────────────────────

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), FeedError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, FeedError>;

    async fn hash_multi_set(&self, key: &str, fields: &[(String, String)])
        -> Result<(), FeedError>;

    /// Values for `fields`, positionally; missing fields are `None`.
    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, FeedError>;

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<u64, FeedError>;

    /// All field names, sorted.
    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, FeedError>;

    // ─── Keys ───────────────────────────────────────────────────────────────

    /// Delete whole keys of any kind; returns how many existed.
    async fn key_delete(&self, keys: &[String]) -> Result<u64, FeedError>;

    async fn key_exists(&self, key: &str) -> Result<bool, FeedError>;

    /// Every key starting with `prefix`, sorted.
    async fn key_enumerate(&self, prefix: &str) -> Result<Vec<String>, FeedError>;

    // ─── Batches ────────────────────────────────────────────────────────────

    /// Apply a batch of writes. The default runs them one by one; stores that
    /// can pipeline or wrap them in a transaction should override this.
    async fn apply(&self, batch: Vec<WriteOp>) -> Result<(), FeedError> {
        for op in batch {
            match op {
                WriteOp::SortedUpsert { key, entries } => self.sorted_upsert(&key, &entries).await?,
                WriteOp::SortedRemove { key, members } => {
                    self.sorted_remove(&key, &members).await?;
                }
                WriteOp::SetAdd { key, members } => {
                    self.set_add(&key, &members).await?;
                }
                WriteOp::SetRemove { key, members } => {
                    self.set_remove(&key, &members).await?;
                }
                WriteOp::HashSet { key, fields } => self.hash_multi_set(&key, &fields).await?,
                WriteOp::HashDelete { key, fields } => {
                    self.hash_delete(&key, &fields).await?;
                }
                WriteOp::Delete { keys } => {
                    self.key_delete(&keys).await?;
                }
            }
        }
        Ok(())
    }
}

/// Normalise Redis-style inclusive ranks against a cardinality; `None` when
/// the slice is empty.
pub fn rank_bounds(card: u64, start: i64, stop: i64) -> Option<(u64, u64)> {
    let card = card as i64;
    let norm = |r: i64| if r < 0 { card + r } else { r };
    let start = norm(start).max(0);
    let stop = norm(stop).min(card - 1);
    if card == 0 || start > stop {
        return None;
    }
    Some((start as u64, stop as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_range_bounds() {
        let r = ScoreRange::at_most(10);
        assert!(r.contains(10) && r.contains(Score::MIN) && !r.contains(11));
        let r = ScoreRange::at_least(10);
        assert!(r.contains(10) && r.contains(Score::MAX) && !r.contains(9));
        assert!(ScoreRange::all().contains(0));
    }

    #[test]
    fn rank_bounds_normalise_negatives() {
        assert_eq!(rank_bounds(5, 0, -1), Some((0, 4)));
        assert_eq!(rank_bounds(5, -2, -1), Some((3, 4)));
        assert_eq!(rank_bounds(5, 1, 100), Some((1, 4)));
        assert_eq!(rank_bounds(5, -100, 0), Some((0, 0)));
        assert_eq!(rank_bounds(5, 3, 1), None);
        assert_eq!(rank_bounds(0, 0, -1), None);
    }
}
