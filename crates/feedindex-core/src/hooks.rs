//! Post-operation hooks.
//!
//! [`IndexEngine`](crate::engine::IndexEngine) calls one [`IndexHooks`] after
//! every `add`, `remove`, `delete_index`, and `get`, once the store batch has
//! completed and before returning to the caller. Every method defaults to a
//! no-op. Layers are stacked by wrapping: a layer keeps the inner
//! `Arc<dyn IndexHooks>` and calls it before doing its own work.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FeedError;
use crate::timestamp::Score;
use crate::types::Entry;

/// An activity was added to one or more indexes.
#[derive(Debug, Clone)]
pub struct AddEvent<'a> {
    pub object_id: &'a str,
    pub indexes: &'a [String],
    pub member: &'a str,
    pub score: Score,
}

/// Members were removed from one or more indexes.
#[derive(Debug, Clone)]
pub struct RemoveEvent<'a> {
    pub object_id: &'a str,
    pub indexes: &'a [String],
    /// Members requested for removal, present or not.
    pub members: &'a [String],
}

/// Indexes were deleted.
#[derive(Debug, Clone)]
pub struct DeleteEvent<'a> {
    pub object_id: &'a str,
    pub indexes: &'a [String],
    /// Whether the object's registry was dropped because it became empty.
    pub registry_dropped: bool,
}

/// A page was read from one or more indexes.
#[derive(Debug, Clone)]
pub struct GetEvent<'a> {
    pub object_id: &'a str,
    pub indexes: &'a [String],
    pub marker: Score,
    pub limit: usize,
    pub after: bool,
    /// Scored entries per index, in the same order as `indexes`.
    pub pages: &'a [Vec<Entry>],
}

/// Observer of completed engine operations.
#[async_trait]
pub trait IndexHooks: Send + Sync {
    async fn after_add(&self, _event: &AddEvent<'_>) -> Result<(), FeedError> {
        Ok(())
    }

    async fn after_remove(&self, _event: &RemoveEvent<'_>) -> Result<(), FeedError> {
        Ok(())
    }

    async fn after_delete_index(&self, _event: &DeleteEvent<'_>) -> Result<(), FeedError> {
        Ok(())
    }

    async fn after_get(&self, _event: &GetEvent<'_>) -> Result<(), FeedError> {
        Ok(())
    }
}

/// The base layer: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl IndexHooks for NoopHooks {}

/// Shorthand for the bottom of a hook stack.
pub fn noop() -> Arc<dyn IndexHooks> {
    Arc::new(NoopHooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        inner: Arc<dyn IndexHooks>,
        adds: Arc<AtomicU32>,
    }

    #[async_trait]
    impl IndexHooks for Counter {
        async fn after_add(&self, event: &AddEvent<'_>) -> Result<(), FeedError> {
            self.inner.after_add(event).await?;
            self.adds.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn layers_call_through_to_inner() {
        let inner_adds = Arc::new(AtomicU32::new(0));
        let outer_adds = Arc::new(AtomicU32::new(0));
        let inner = Arc::new(Counter { inner: noop(), adds: inner_adds.clone() });
        let outer = Counter { inner, adds: outer_adds.clone() };

        let indexes = vec!["home".to_string()];
        let event = AddEvent { object_id: "u1", indexes: &indexes, member: "a1", score: 1 };
        outer.after_add(&event).await.unwrap();
        // Methods a layer doesn't override stay no-ops.
        outer
            .after_delete_index(&DeleteEvent { object_id: "u1", indexes: &indexes, registry_dropped: true })
            .await
            .unwrap();

        assert_eq!(inner_adds.load(Ordering::Relaxed), 1);
        assert_eq!(outer_adds.load(Ordering::Relaxed), 1);
    }
}
