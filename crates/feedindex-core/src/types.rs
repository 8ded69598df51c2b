//! Shared types for index operations.

use serde::{Deserialize, Serialize};

use crate::timestamp::{Score, TimeInput};

/// Default page size of [`PageQuery`].
pub const DEFAULT_PAGE_LIMIT: usize = 30;

// ─── Entry ────────────────────────────────────────────────────────────────────

/// One member of an index together with its score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub member: String,
    pub score: Score,
}

impl Entry {
    pub fn new(member: impl Into<String>, score: Score) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

// ─── Names ────────────────────────────────────────────────────────────────────

/// A single name or a list of names.
///
/// Operations given a list fan out over every name; reads given a single name
/// return an unwrapped result (see [`Fanout`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Names {
    One(String),
    Many(Vec<String>),
}

impl Names {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Many(names) => names,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::One(_))
    }

    /// Shape per-name results the way the names were given.
    pub fn fanout<T>(&self, mut results: Vec<T>) -> Fanout<T> {
        match self {
            Self::One(_) if results.len() == 1 => Fanout::One(results.remove(0)),
            _ => Fanout::Many(results),
        }
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<&String> for Names {
    fn from(name: &String) -> Self {
        Self::One(name.clone())
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl From<Vec<&str>> for Names {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Names {
    fn from(names: &[&str]) -> Self {
        Self::Many(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        Self::Many(names.iter().map(|n| n.to_string()).collect())
    }
}

// ─── Fanout ───────────────────────────────────────────────────────────────────

/// Result of a read over [`Names`]: unwrapped for one name, one item per name
/// (in input order) for a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fanout<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Fanout<T> {
    /// The single result, or the first of many.
    pub fn into_one(self) -> Option<T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

// ─── Pages ────────────────────────────────────────────────────────────────────

/// Parameters of a paginated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Position to read from. Required; a query without one is rejected.
    pub marker: Option<TimeInput>,
    /// Maximum number of entries per index.
    pub limit: usize,
    /// `false`: entries at or before the marker, newest first.
    /// `true`: entries at or after the marker, oldest first.
    pub after: bool,
    /// Return `(member, score)` pairs instead of bare members.
    pub with_scores: bool,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            marker: None,
            limit: DEFAULT_PAGE_LIMIT,
            after: false,
            with_scores: false,
        }
    }
}

impl PageQuery {
    /// Read backwards from `marker` (the "scroll older" direction).
    pub fn before(marker: impl Into<TimeInput>) -> Self {
        Self {
            marker: Some(marker.into()),
            ..Default::default()
        }
    }

    /// Read forwards from `marker` (the "catch up" direction).
    pub fn after(marker: impl Into<TimeInput>) -> Self {
        Self {
            marker: Some(marker.into()),
            after: true,
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_scores(mut self) -> Self {
        self.with_scores = true;
        self
    }
}

/// Entries returned for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Members(Vec<String>),
    Scored(Vec<Entry>),
}

impl Page {
    pub(crate) fn shape(entries: Vec<Entry>, with_scores: bool) -> Self {
        if with_scores {
            Self::Scored(entries)
        } else {
            Self::Members(entries.into_iter().map(|e| e.member).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Members(m) => m.len(),
            Self::Scored(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in page order, dropping scores if present.
    pub fn into_members(self) -> Vec<String> {
        match self {
            Self::Members(m) => m,
            Self::Scored(e) => e.into_iter().map(|e| e.member).collect(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
