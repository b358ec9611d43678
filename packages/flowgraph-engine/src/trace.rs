/*
 * Trace-graph reconstruction
 *
 * Given a sink vertex and the global predecessor index, rebuild the DAG
 * of witnesses from zero-fact sources to the sink. The walk is a DFS over
 * reverse (predecessor) records with two modes: normal mode crosses from
 * a callee entry into its caller, summary mode ("stop at method start",
 * set while expanding a ThroughSummary record) anchors at the entry
 * instead, so the walk never escapes the summary's boundary.
 *
 * Vertices are materialised in the graph only where the fact changes;
 * runs of equal-fact edges collapse into one adjacency. Visited
 * memoisation makes the walk safe on the cyclic predecessor graph.
 */

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use flowgraph_core::{ApplicationGraph, Fact, Vertex};

use crate::arena::{EdgeArena, EdgeId, Predecessor};
use crate::result::IfdsResult;

/// Witness DAG for one sink: adjacency runs source -> ... -> sink.
#[derive(Debug, Clone)]
pub struct TraceGraph<S, F> {
    pub sink: Vertex<S, F>,
    pub sources: FxHashSet<Vertex<S, F>>,
    pub successors: FxHashMap<Vertex<S, F>, FxHashSet<Vertex<S, F>>>,
}

impl<S, F> TraceGraph<S, F>
where
    S: Clone + Eq + Hash,
    F: Fact,
{
    pub(crate) fn build<G>(result: &IfdsResult<G, F>, sink: &Vertex<S, F>) -> Self
    where
        G: ApplicationGraph<Statement = S>,
    {
        let mut builder = Builder {
            arena: result.arena(),
            graph: TraceGraph {
                sink: sink.clone(),
                sources: FxHashSet::default(),
                successors: FxHashMap::default(),
            },
            visited: FxHashSet::default(),
        };

        builder.note_vertex(sink);
        for &edge in result.edges_into(sink) {
            builder.explore(edge, sink.clone(), false);
        }
        builder.graph
    }

    pub fn contains_edge(&self, from: &Vertex<S, F>, to: &Vertex<S, F>) -> bool {
        self.successors
            .get(from)
            .map(|succs| succs.contains(to))
            .unwrap_or(false)
    }

    /// Enumerate witness paths from sources to the sink, bounded by
    /// `max_traces`; `max_path_length` is the post-hoc witness-depth
    /// filter.
    pub fn traces(
        &self,
        max_traces: usize,
        max_path_length: Option<usize>,
    ) -> Vec<Vec<Vertex<S, F>>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        for source in &self.sources {
            if out.len() >= max_traces {
                break;
            }
            self.enumerate(source, &mut path, &mut out, max_traces, max_path_length);
        }
        out
    }

    fn enumerate(
        &self,
        vertex: &Vertex<S, F>,
        path: &mut Vec<Vertex<S, F>>,
        out: &mut Vec<Vec<Vertex<S, F>>>,
        max_traces: usize,
        max_path_length: Option<usize>,
    ) {
        if out.len() >= max_traces {
            return;
        }
        if let Some(bound) = max_path_length {
            if path.len() >= bound {
                return;
            }
        }
        path.push(vertex.clone());

        if *vertex == self.sink {
            out.push(path.clone());
        } else if let Some(succs) = self.successors.get(vertex) {
            for succ in succs {
                // the adjacency may be cyclic through recursion
                if !path.contains(succ) {
                    self.enumerate(succ, path, out, max_traces, max_path_length);
                }
            }
        }

        path.pop();
    }
}

struct Builder<'a, S, F> {
    arena: &'a EdgeArena<S, F>,
    graph: TraceGraph<S, F>,
    visited: FxHashSet<(EdgeId, Vertex<S, F>, bool)>,
}

impl<S, F> Builder<'_, S, F>
where
    S: Clone + Eq + Hash,
    F: Fact,
{
    /// Walk backwards from `edge.to`; `last` is the nearest downstream
    /// vertex already materialised in the graph.
    fn explore(&mut self, id: EdgeId, last: Vertex<S, F>, stop_at_start: bool) {
        if !self.visited.insert((id, last.clone(), stop_at_start)) {
            return;
        }

        let record = self.arena.get(id);
        let e_from = record.from.clone();
        let e_to = record.to.clone();
        let preds: Vec<Predecessor> = self.arena.predecessors(id).iter().copied().collect();

        // An External placeholder whose owning unit never reported back
        // (cancellation) has no records; its entry is the trace boundary.
        if preds.is_empty() {
            self.anchor_source(&e_from, &last);
            return;
        }

        for pred in preds {
            match pred {
                Predecessor::NoPredecessor => {
                    self.anchor_source(&e_from, &last);
                }
                Predecessor::Sequent(p) | Predecessor::CallToReturn(p) => {
                    self.step_back(p, &e_to, &last, stop_at_start);
                }
                Predecessor::CallToStart(p) | Predecessor::CrossUnitCall(p) => {
                    if stop_at_start {
                        // never cross the summary's boundary
                        self.anchor(&e_from, &last);
                    } else {
                        self.step_back(p, &e_to, &last, false);
                    }
                }
                Predecessor::ThroughSummary { pred, summary } => {
                    let s_from = self.arena.get(summary).from.clone();
                    let s_to = self.arena.get(summary).to.clone();
                    let p_to = self.arena.get(pred).to.clone();

                    self.add_edge(s_to.clone(), last.clone());
                    self.add_edge(p_to.clone(), s_from);
                    self.explore(summary, s_to, true);
                    self.explore(pred, p_to, stop_at_start);
                }
            }
        }
    }

    /// Continue the DFS through a same-method predecessor, materialising
    /// its vertex only when the fact changes.
    fn step_back(&mut self, pred: EdgeId, e_to: &Vertex<S, F>, last: &Vertex<S, F>, stop: bool) {
        let p_to = self.arena.get(pred).to.clone();
        if p_to.fact == e_to.fact {
            self.explore(pred, last.clone(), stop);
        } else {
            self.add_edge(p_to.clone(), last.clone());
            self.explore(pred, p_to, stop);
        }
    }

    /// Materialise a chain endpoint without marking it a source.
    fn anchor(&mut self, vertex: &Vertex<S, F>, last: &Vertex<S, F>) {
        if vertex != last {
            self.add_edge(vertex.clone(), last.clone());
        } else {
            self.note_vertex(vertex);
        }
    }

    fn anchor_source(&mut self, vertex: &Vertex<S, F>, last: &Vertex<S, F>) {
        self.anchor(vertex, last);
        self.graph.sources.insert(vertex.clone());
    }

    fn add_edge(&mut self, from: Vertex<S, F>, to: Vertex<S, F>) {
        self.note_vertex(&from);
        self.note_vertex(&to);
        self.graph.successors.entry(from).or_default().insert(to);
    }

    /// Every vertex reached with the zero fact is a trace root.
    fn note_vertex(&mut self, vertex: &Vertex<S, F>) {
        if vertex.fact.is_zero() {
            self.graph.sources.insert(vertex.clone());
        }
    }
}
