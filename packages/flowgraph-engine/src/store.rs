/*
 * Shared run-wide stores
 *
 * Summary edges are published through a per-method append-only store:
 * single writer (the unit owning the method), many readers. DashMap's
 * sharded locking gives the release-acquire publication the protocol
 * relies on.
 *
 * The incomplete-method registry collects methods whose results were cut
 * short by an application-graph inconsistency; it is surfaced as warnings
 * plus per-method flags on the final report, never as a run failure.
 */

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use flowgraph_core::SummaryEdge;

/// Published summary edges, keyed by method.
#[derive(Debug)]
pub struct SummaryStore<S, M: Eq + Hash, F> {
    per_method: Arc<DashMap<M, Vec<SummaryEdge<S, F>>>>,
}

impl<S, M: Eq + Hash, F> Clone for SummaryStore<S, M, F> {
    fn clone(&self) -> Self {
        Self {
            per_method: Arc::clone(&self.per_method),
        }
    }
}

impl<S, M, F> SummaryStore<S, M, F>
where
    S: Clone,
    M: Clone + Eq + Hash,
    F: Clone,
{
    pub fn new() -> Self {
        Self {
            per_method: Arc::new(DashMap::new()),
        }
    }

    pub fn publish(&self, method: &M, summary: SummaryEdge<S, F>) {
        self.per_method
            .entry(method.clone())
            .or_default()
            .push(summary);
    }

    pub fn summaries_for(&self, method: &M) -> Vec<SummaryEdge<S, F>> {
        self.per_method
            .get(method)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn method_count(&self) -> usize {
        self.per_method.len()
    }
}

impl<S, M, F> Default for SummaryStore<S, M, F>
where
    S: Clone,
    M: Clone + Eq + Hash,
    F: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Methods whose results are incomplete due to graph inconsistencies.
#[derive(Debug)]
pub struct IncompleteRegistry<M: Eq + Hash> {
    methods: Arc<RwLock<FxHashSet<M>>>,
}

impl<M: Eq + Hash> Clone for IncompleteRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            methods: Arc::clone(&self.methods),
        }
    }
}

impl<M: Clone + Eq + Hash> IncompleteRegistry<M> {
    pub fn new() -> Self {
        Self {
            methods: Arc::new(RwLock::new(FxHashSet::default())),
        }
    }

    pub fn mark(&self, method: M) {
        self.methods.write().insert(method);
    }

    pub fn contains(&self, method: &M) -> bool {
        self.methods.read().contains(method)
    }

    pub fn snapshot(&self) -> FxHashSet<M> {
        self.methods.read().clone()
    }
}

impl<M: Clone + Eq + Hash> Default for IncompleteRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::{Edge, Vertex};

    #[test]
    fn test_summary_store_appends() {
        let store: SummaryStore<&str, &str, u32> = SummaryStore::new();

        let e1 = SummaryEdge::new(Edge::new(Vertex::new("entry", 0), Vertex::new("exit", 0)));
        let e2 = SummaryEdge::new(Edge::new(Vertex::new("entry", 1), Vertex::new("exit", 1)));
        store.publish(&"f", e1);
        store.publish(&"f", e2);

        assert_eq!(store.summaries_for(&"f").len(), 2);
        assert!(store.summaries_for(&"g").is_empty());
    }

    #[test]
    fn test_incomplete_registry() {
        let registry = IncompleteRegistry::new();
        registry.mark("broken");

        assert!(registry.contains(&"broken"));
        assert!(!registry.contains(&"ok"));
        assert_eq!(registry.snapshot().len(), 1);
    }
}
