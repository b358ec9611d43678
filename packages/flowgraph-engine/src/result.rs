/*
 * Aggregated solver result
 *
 * Every unit's arena is re-interned into one global arena. Merging on
 * `(from, to)` pairs is what stitches cross-unit references together: a
 * summary edge imported into a subscriber's arena as an External
 * placeholder unifies with the owner's real record, so the predecessor
 * index is globally connected and trace reconstruction can cross unit
 * boundaries.
 */

use rustc_hash::{FxHashMap, FxHashSet};

use flowgraph_core::{ApplicationGraph, Edge, Fact, SummaryEdge, Vertex, Vulnerability};

use crate::arena::{EdgeArena, EdgeId, EdgeRecord, Predecessor};
use crate::runner::RunnerChunk;
use crate::trace::TraceGraph;

/// Counters for one solver run.
#[derive(Debug, Clone, Default)]
pub struct IfdsStatistics {
    /// Number of Runners spawned (units touched).
    pub runners: usize,

    /// Path edges in the merged arena.
    pub path_edges: usize,

    /// Summary edges across all methods.
    pub summary_edges: usize,

    /// Deduplicated vulnerabilities.
    pub vulnerabilities: usize,

    /// Messages the Manager routed to Runners.
    pub messages_routed: u64,

    /// Call-site edges reported for resolution.
    pub unresolved_calls: u64,

    /// Cross-unit subscriptions opened.
    pub cross_unit_subscriptions: u64,

    /// Wall-clock time of the run.
    pub elapsed_ms: u64,
}

/// The merged outcome of a run: global path edges, predecessor index,
/// summaries, vulnerabilities and incompleteness flags.
pub struct IfdsResult<G: ApplicationGraph, F: Fact> {
    arena: EdgeArena<G::Statement, F>,
    by_target: FxHashMap<Vertex<G::Statement, F>, Vec<EdgeId>>,
    summaries: FxHashMap<G::Method, Vec<EdgeId>>,
    vulnerabilities: Vec<Vulnerability<G::Statement, F>>,
    incomplete: FxHashSet<G::Method>,
    stats: IfdsStatistics,
    cancelled: bool,
}

impl<G: ApplicationGraph, F: Fact> IfdsResult<G, F> {
    pub(crate) fn assemble(
        chunks: Vec<RunnerChunk<G::Statement, G::Method, F>>,
        vulnerabilities: Vec<Vulnerability<G::Statement, F>>,
        incomplete: FxHashSet<G::Method>,
        mut stats: IfdsStatistics,
        cancelled: bool,
    ) -> Self {
        let mut arena = EdgeArena::new();
        let mut summaries: FxHashMap<G::Method, Vec<EdgeId>> = FxHashMap::default();

        for chunk in chunks {
            // Re-interning preserves ids only through the value index, so
            // summary ids are resolved by value after the merge.
            let summary_edges: Vec<(G::Method, Edge<G::Statement, F>)> = chunk
                .summaries
                .iter()
                .flat_map(|(method, ids)| {
                    ids.iter()
                        .map(|id| (method.clone(), chunk.arena.get(*id).edge()))
                })
                .collect();

            arena.absorb(chunk.arena);

            for (method, edge) in summary_edges {
                if let Some(id) = arena.lookup(&edge.from, &edge.to) {
                    let ids = summaries.entry(method).or_default();
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }

        let mut by_target: FxHashMap<Vertex<G::Statement, F>, Vec<EdgeId>> = FxHashMap::default();
        for (id, record) in arena.iter() {
            by_target.entry(record.to.clone()).or_default().push(id);
        }

        stats.path_edges = arena.len();
        stats.summary_edges = summaries.values().map(|v| v.len()).sum();
        stats.vulnerabilities = vulnerabilities.len();

        Self {
            arena,
            by_target,
            summaries,
            vulnerabilities,
            incomplete,
            stats,
            cancelled,
        }
    }

    pub fn edge(&self, id: EdgeId) -> &EdgeRecord<G::Statement, F> {
        self.arena.get(id)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeRecord<G::Statement, F>)> {
        self.arena.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.arena.len()
    }

    pub fn predecessors(&self, id: EdgeId) -> &FxHashSet<Predecessor> {
        self.arena.predecessors(id)
    }

    /// All path edges ending at a vertex; the seed set for trace
    /// reconstruction.
    pub fn edges_into(&self, vertex: &Vertex<G::Statement, F>) -> &[EdgeId] {
        self.by_target
            .get(vertex)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the edge set contains `(from, to)`.
    pub fn contains_edge(&self, from: &Vertex<G::Statement, F>, to: &Vertex<G::Statement, F>) -> bool {
        self.arena.lookup(from, to).is_some()
    }

    /// Summary edges discovered for a method.
    pub fn summaries_for(&self, method: &G::Method) -> Vec<SummaryEdge<G::Statement, F>> {
        self.summaries
            .get(method)
            .map(|ids| {
                ids.iter()
                    .map(|id| SummaryEdge::new(self.arena.get(*id).edge()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn methods_with_summaries(&self) -> impl Iterator<Item = &G::Method> {
        self.summaries.keys()
    }

    pub fn vulnerabilities(&self) -> &[Vulnerability<G::Statement, F>] {
        &self.vulnerabilities
    }

    pub fn incomplete_methods(&self) -> &FxHashSet<G::Method> {
        &self.incomplete
    }

    pub fn is_incomplete(&self, method: &G::Method) -> bool {
        self.incomplete.contains(method)
    }

    pub fn stats(&self) -> &IfdsStatistics {
        &self.stats
    }

    /// Whether the run was cancelled; the result is then a valid partial
    /// result.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reconstruct the witness DAG for a sink vertex.
    pub fn trace_graph(&self, sink: &Vertex<G::Statement, F>) -> TraceGraph<G::Statement, F> {
        TraceGraph::build(self, sink)
    }

    pub(crate) fn arena(&self) -> &EdgeArena<G::Statement, F> {
        &self.arena
    }
}
