//! Observers notified once per settled generation.

use super::state::BatchSnapshot;
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

/// Receives the consolidated snapshot of every generation that settles.
///
/// Superseded generations are never reported.
#[async_trait]
pub trait BatchListener<I>: Send + Sync {
    async fn on_settled(&self, snapshot: &BatchSnapshot<I>);
}

/// Records every settled snapshot; handy in tests and for diagnostics.
pub struct InMemoryListener<I> {
    snapshots: RwLock<Vec<BatchSnapshot<I>>>,
    max_snapshots: usize,
}

impl<I: Clone> InMemoryListener<I> {
    pub fn new(max: usize) -> Self {
        Self {
            snapshots: RwLock::new(Vec::new()),
            max_snapshots: max.max(1),
        }
    }

    pub fn snapshots(&self) -> Vec<BatchSnapshot<I>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<BatchSnapshot<I>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl<I: Clone + Send + Sync> BatchListener<I> for InMemoryListener<I> {
    async fn on_settled(&self, snapshot: &BatchSnapshot<I>) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.push(snapshot.clone());
        if snapshots.len() > self.max_snapshots {
            snapshots.remove(0);
        }
    }
}

/// Adapts a synchronous closure into a [`BatchListener`].
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<I, F> BatchListener<I> for FnListener<F>
where
    I: Send + Sync,
    F: Fn(&BatchSnapshot<I>) + Send + Sync,
{
    async fn on_settled(&self, snapshot: &BatchSnapshot<I>) {
        (self.f)(snapshot)
    }
}
