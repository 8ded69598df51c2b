//! SQLite storage backend for feedindex.
//!
//! Sorted sets, sets and hashes live in three tables keyed by the logical
//! store key. Batches submitted through `apply` run in one transaction.
//!
//! # Usage
//! ```rust,no_run
//! use feedindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./feeds.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use feedindex_core::error::FeedError;
use feedindex_core::store::{rank_bounds, Order, OrderedCollectionStore, ScoreRange, WriteOp};
use feedindex_core::types::Entry;

fn db(e: sqlx::Error) -> FeedError {
    FeedError::Store(e.to_string())
}

/// SQLite-backed [`OrderedCollectionStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./feeds.db"`) or a full
    /// SQLite URL (`"sqlite:./feeds.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, FeedError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(db)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every pooled connection would see its own empty database, so the pool
    /// is pinned to a single long-lived connection.
    pub async fn in_memory() -> Result<Self, FeedError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), FeedError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sorted_entries (
                key    TEXT    NOT NULL,
                member TEXT    NOT NULL,
                score  INTEGER NOT NULL,
                PRIMARY KEY (key, member)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        // Range reads walk (key, score, member) in either direction.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sorted_order
             ON sorted_entries (key, score, member);",
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS set_members (
                key    TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hash_fields (
                key   TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, FeedError> {
        self.pool.acquire().await.map_err(db)
    }
}

// ─── Key kinds ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Sorted,
    Set,
    Hash,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Self::Sorted => "sorted set",
            Self::Set => "set",
            Self::Hash => "hash",
        }
    }
}

async fn kind_of(conn: &mut SqliteConnection, key: &str) -> Result<Option<Kind>, FeedError> {
    let row = sqlx::query(
        "SELECT 0 AS kind FROM sorted_entries WHERE key = ?
         UNION ALL SELECT 1 FROM set_members WHERE key = ?
         UNION ALL SELECT 2 FROM hash_fields WHERE key = ?
         LIMIT 1",
    )
    .bind(key)
    .bind(key)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db)?;

    Ok(row.map(|r| match r.get::<i64, _>("kind") {
        0 => Kind::Sorted,
        1 => Kind::Set,
        _ => Kind::Hash,
    }))
}

async fn ensure_kind(
    conn: &mut SqliteConnection,
    key: &str,
    expected: Kind,
) -> Result<(), FeedError> {
    match kind_of(conn, key).await? {
        Some(kind) if kind != expected => Err(FeedError::Store(format!(
            "WRONGTYPE key '{key}' holds a different kind of value (expected {})",
            expected.name()
        ))),
        _ => Ok(()),
    }
}

// ─── Writes (shared by single calls and transactional batches) ───────────────

async fn write_sorted_upsert(
    conn: &mut SqliteConnection,
    key: &str,
    entries: &[Entry],
) -> Result<(), FeedError> {
    if entries.is_empty() {
        return Ok(());
    }
    ensure_kind(conn, key, Kind::Sorted).await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO sorted_entries (key, member, score) VALUES (?, ?, ?)
             ON CONFLICT (key, member) DO UPDATE SET score = excluded.score",
        )
        .bind(key)
        .bind(&entry.member)
        .bind(entry.score)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    Ok(())
}

async fn write_sorted_remove(
    conn: &mut SqliteConnection,
    key: &str,
    members: &[String],
) -> Result<u64, FeedError> {
    ensure_kind(conn, key, Kind::Sorted).await?;
    let mut removed = 0;
    for member in members {
        removed += sqlx::query("DELETE FROM sorted_entries WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&mut *conn)
            .await
            .map_err(db)?
            .rows_affected();
    }
    Ok(removed)
}

async fn write_set_add(
    conn: &mut SqliteConnection,
    key: &str,
    members: &[String],
) -> Result<u64, FeedError> {
    if members.is_empty() {
        return Ok(0);
    }
    ensure_kind(conn, key, Kind::Set).await?;
    let mut added = 0;
    for member in members {
        added += sqlx::query("INSERT OR IGNORE INTO set_members (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&mut *conn)
            .await
            .map_err(db)?
            .rows_affected();
    }
    Ok(added)
}

async fn write_set_remove(
    conn: &mut SqliteConnection,
    key: &str,
    members: &[String],
) -> Result<u64, FeedError> {
    ensure_kind(conn, key, Kind::Set).await?;
    let mut removed = 0;
    for member in members {
        removed += sqlx::query("DELETE FROM set_members WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&mut *conn)
            .await
            .map_err(db)?
            .rows_affected();
    }
    Ok(removed)
}

async fn write_hash_set(
    conn: &mut SqliteConnection,
    key: &str,
    fields: &[(String, String)],
) -> Result<(), FeedError> {
    if fields.is_empty() {
        return Ok(());
    }
    ensure_kind(conn, key, Kind::Hash).await?;
    for (field, value) in fields {
        sqlx::query(
            "INSERT INTO hash_fields (key, field, value) VALUES (?, ?, ?)
             ON CONFLICT (key, field) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    Ok(())
}

async fn write_hash_delete(
    conn: &mut SqliteConnection,
    key: &str,
    fields: &[String],
) -> Result<u64, FeedError> {
    ensure_kind(conn, key, Kind::Hash).await?;
    let mut removed = 0;
    for field in fields {
        removed += sqlx::query("DELETE FROM hash_fields WHERE key = ? AND field = ?")
            .bind(key)
            .bind(field)
            .execute(&mut *conn)
            .await
            .map_err(db)?
            .rows_affected();
    }
    Ok(removed)
}

async fn write_key_delete(conn: &mut SqliteConnection, keys: &[String]) -> Result<u64, FeedError> {
    let mut removed = 0;
    for key in keys {
        let table = match kind_of(conn, key).await? {
            Some(Kind::Sorted) => "sorted_entries",
            Some(Kind::Set) => "set_members",
            Some(Kind::Hash) => "hash_fields",
            None => continue,
        };
        sqlx::query(&format!("DELETE FROM {table} WHERE key = ?"))
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(db)?;
        removed += 1;
    }
    Ok(removed)
}

async fn write_op(conn: &mut SqliteConnection, op: &WriteOp) -> Result<(), FeedError> {
    match op {
        WriteOp::SortedUpsert { key, entries } => write_sorted_upsert(conn, key, entries).await,
        WriteOp::SortedRemove { key, members } => {
            write_sorted_remove(conn, key, members).await.map(|_| ())
        }
        WriteOp::SetAdd { key, members } => write_set_add(conn, key, members).await.map(|_| ()),
        WriteOp::SetRemove { key, members } => {
            write_set_remove(conn, key, members).await.map(|_| ())
        }
        WriteOp::HashSet { key, fields } => write_hash_set(conn, key, fields).await,
        WriteOp::HashDelete { key, fields } => {
            write_hash_delete(conn, key, fields).await.map(|_| ())
        }
        WriteOp::Delete { keys } => write_key_delete(conn, keys).await.map(|_| ()),
    }
}

fn count_of(row: &sqlx::sqlite::SqliteRow) -> u64 {
    row.get::<i64, _>("cnt") as u64
}

fn entry_of(row: &sqlx::sqlite::SqliteRow) -> Entry {
    Entry::new(row.get::<String, _>("member"), row.get::<i64, _>("score"))
}

// ─── OrderedCollectionStore impl ─────────────────────────────────────────────

#[async_trait]
impl OrderedCollectionStore for SqliteStore {
    async fn sorted_upsert(&self, key: &str, entries: &[Entry]) -> Result<(), FeedError> {
        let mut conn = self.conn().await?;
        write_sorted_upsert(&mut conn, key, entries).await?;
        debug!(key, count = entries.len(), "sorted entries upserted");
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        write_sorted_remove(&mut conn, key, members).await
    }

    async fn sorted_range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Sorted).await?;

        let dir = match order {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        };
        let sql = format!(
            "SELECT member, score FROM sorted_entries
             WHERE key = ? AND score >= ? AND score <= ?
             ORDER BY score {dir}, member {dir}
             LIMIT ? OFFSET ?"
        );
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| n as i64);

        let rows = sqlx::query(&sql)
            .bind(key)
            .bind(range.min)
            .bind(range.max)
            .bind(limit)
            .bind(offset as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;

        Ok(rows.iter().map(entry_of).collect())
    }

    async fn sorted_card(&self, key: &str) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Sorted).await?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM sorted_entries WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(db)?;
        Ok(count_of(&row))
    }

    async fn sorted_count(&self, key: &str, range: ScoreRange) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Sorted).await?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM sorted_entries
             WHERE key = ? AND score >= ? AND score <= ?",
        )
        .bind(key)
        .bind(range.min)
        .bind(range.max)
        .fetch_one(&mut *conn)
        .await
        .map_err(db)?;
        Ok(count_of(&row))
    }

    async fn sorted_rank(&self, key: &str, member: &str) -> Result<Option<u64>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Sorted).await?;

        let row = sqlx::query("SELECT score FROM sorted_entries WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let score: i64 = row.get("score");

        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM sorted_entries
             WHERE key = ? AND (score < ? OR (score = ? AND member < ?))",
        )
        .bind(key)
        .bind(score)
        .bind(score)
        .bind(member)
        .fetch_one(&mut *conn)
        .await
        .map_err(db)?;
        Ok(Some(count_of(&row)))
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<i64>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Sorted).await?;
        let row = sqlx::query("SELECT score FROM sorted_entries WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db)?;
        Ok(row.map(|r| r.get::<i64, _>("score")))
    }

    async fn sorted_range_by_rank(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Entry>, FeedError> {
        let card = self.sorted_card(key).await?;
        let Some((start, stop)) = rank_bounds(card, start, stop) else {
            return Ok(vec![]);
        };

        let mut conn = self.conn().await?;
        let rows = sqlx::query(
            "SELECT member, score FROM sorted_entries WHERE key = ?
             ORDER BY score ASC, member ASC
             LIMIT ? OFFSET ?",
        )
        .bind(key)
        .bind((stop - start + 1) as i64)
        .bind(start as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(db)?;

        Ok(rows.iter().map(entry_of).collect())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        write_set_add(&mut conn, key, members).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        write_set_remove(&mut conn, key, members).await
    }

    async fn set_card(&self, key: &str) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Set).await?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM set_members WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(db)?;
        Ok(count_of(&row))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Set).await?;
        let rows = sqlx::query("SELECT member FROM set_members WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
        Ok(rows.iter().map(|r| r.get("member")).collect())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), FeedError> {
        self.hash_multi_set(key, &[(field.to_string(), value.to_string())])
            .await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, FeedError> {
        let mut values = self.hash_multi_get(key, &[field.to_string()]).await?;
        Ok(values.pop().flatten())
    }

    async fn hash_multi_set(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), FeedError> {
        let mut conn = self.conn().await?;
        write_hash_set(&mut conn, key, fields).await
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Hash).await?;
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let row = sqlx::query("SELECT value FROM hash_fields WHERE key = ? AND field = ?")
                .bind(key)
                .bind(field)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db)?;
            values.push(row.map(|r| r.get::<String, _>("value")));
        }
        Ok(values)
    }

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        write_hash_delete(&mut conn, key, fields).await
    }

    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, FeedError> {
        let mut conn = self.conn().await?;
        ensure_kind(&mut conn, key, Kind::Hash).await?;
        let rows = sqlx::query("SELECT field FROM hash_fields WHERE key = ? ORDER BY field")
            .bind(key)
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
        Ok(rows.iter().map(|r| r.get("field")).collect())
    }

    async fn key_delete(&self, keys: &[String]) -> Result<u64, FeedError> {
        let mut conn = self.conn().await?;
        let removed = write_key_delete(&mut conn, keys).await?;
        debug!(requested = keys.len(), removed, "keys deleted");
        Ok(removed)
    }

    async fn key_exists(&self, key: &str) -> Result<bool, FeedError> {
        let mut conn = self.conn().await?;
        Ok(kind_of(&mut conn, key).await?.is_some())
    }

    async fn key_enumerate(&self, prefix: &str) -> Result<Vec<String>, FeedError> {
        let mut conn = self.conn().await?;
        let len = prefix.chars().count() as i64;
        let rows = sqlx::query(
            "SELECT key FROM sorted_entries WHERE substr(key, 1, ?) = ?
             UNION SELECT key FROM set_members WHERE substr(key, 1, ?) = ?
             UNION SELECT key FROM hash_fields WHERE substr(key, 1, ?) = ?
             ORDER BY key",
        )
        .bind(len)
        .bind(prefix)
        .bind(len)
        .bind(prefix)
        .bind(len)
        .bind(prefix)
        .fetch_all(&mut *conn)
        .await
        .map_err(db)?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }

    async fn apply(&self, batch: Vec<WriteOp>) -> Result<(), FeedError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(db)?;
        for op in &batch {
            write_op(&mut tx, op).await?;
        }
        tx.commit().await.map_err(db)?;

        debug!(ops = batch.len(), "batch committed");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
