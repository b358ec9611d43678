/*
 * Edge arena
 *
 * Path edges and the predecessor index form a cyclic graph (witness
 * recovery walks it backwards, summaries point both ways). The arena
 * breaks those cycles structurally: edge records live in a Vec addressed
 * by integer ids, and both reasons and predecessor records store ids,
 * never owning references.
 *
 * Each edge carries exactly one primary reason, fixed at creation; the
 * predecessor set is appended to over the whole run as alternative
 * derivations show up. Records are never mutated otherwise, never
 * deleted.
 */

use rustc_hash::{FxHashMap, FxHashSet};

use flowgraph_core::{Edge, Vertex};

/// Index of an edge record within an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Why an edge was added. Every non-Initial variant references previously
/// existing edges of the same arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Seeded at a procedure entry.
    Initial,

    /// Intra-procedural transfer from a predecessor edge.
    Sequent(EdgeId),

    /// Approximated call effect at a return site.
    CallToReturn(EdgeId),

    /// Callee entry self-loop opened by a same-unit call edge.
    CallToStart(EdgeId),

    /// Return-site edge produced when the summary was discovered.
    ExitToReturnSite { caller: EdgeId, summary: EdgeId },

    /// Return-site edge produced by replaying a stored or notified summary.
    ThroughSummary { pred: EdgeId, summary: EdgeId },

    /// Callee entry self-loop opened on behalf of a caller in another unit.
    CrossUnitCall(EdgeId),

    /// Imported from another unit for reference only; never scheduled.
    External,
}

/// One recorded derivation of an edge, for witness reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predecessor {
    /// Seed edge; the trace builder treats its vertex as a source.
    NoPredecessor,
    Sequent(EdgeId),
    CallToReturn(EdgeId),
    CallToStart(EdgeId),
    ThroughSummary { pred: EdgeId, summary: EdgeId },
    CrossUnitCall(EdgeId),
}

/// An immutable path-edge record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord<S, F> {
    pub from: Vertex<S, F>,
    pub to: Vertex<S, F>,
    pub reason: Reason,
}

impl<S: Clone, F: Clone> EdgeRecord<S, F> {
    pub fn edge(&self) -> Edge<S, F> {
        Edge::new(self.from.clone(), self.to.clone())
    }
}

/// Append-only store of deduplicated path edges plus the predecessor
/// index.
#[derive(Debug, Clone)]
pub struct EdgeArena<S, F> {
    records: Vec<EdgeRecord<S, F>>,
    index: FxHashMap<(Vertex<S, F>, Vertex<S, F>), EdgeId>,
    preds: Vec<FxHashSet<Predecessor>>,
}

impl<S, F> Default for EdgeArena<S, F> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: FxHashMap::default(),
            preds: Vec::new(),
        }
    }
}

impl<S, F> EdgeArena<S, F>
where
    S: Clone + Eq + std::hash::Hash,
    F: Clone + Eq + std::hash::Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge, deduplicating on the `(from, to)` pair. Returns the
    /// id and whether the record is newly created. An existing record
    /// keeps its primary reason, except that `External` placeholders are
    /// upgraded by the first real derivation.
    pub fn insert(&mut self, from: Vertex<S, F>, to: Vertex<S, F>, reason: Reason) -> (EdgeId, bool) {
        let key = (from.clone(), to.clone());
        if let Some(&id) = self.index.get(&key) {
            if self.records[id.index()].reason == Reason::External && reason != Reason::External {
                self.records[id.index()].reason = reason;
            }
            return (id, false);
        }

        let id = EdgeId(self.records.len() as u32);
        self.records.push(EdgeRecord { from, to, reason });
        self.preds.push(FxHashSet::default());
        self.index.insert(key, id);
        (id, true)
    }

    /// Intern an edge owned by another unit. The record exists for
    /// cross-unit reason references and is never scheduled.
    pub fn register_external(&mut self, edge: &Edge<S, F>) -> EdgeId {
        self.insert(edge.from.clone(), edge.to.clone(), Reason::External).0
    }

    pub fn lookup(&self, from: &Vertex<S, F>, to: &Vertex<S, F>) -> Option<EdgeId> {
        self.index.get(&(from.clone(), to.clone())).copied()
    }

    pub fn get(&self, id: EdgeId) -> &EdgeRecord<S, F> {
        &self.records[id.index()]
    }

    pub fn add_predecessor(&mut self, id: EdgeId, record: Predecessor) {
        self.preds[id.index()].insert(record);
    }

    pub fn predecessors(&self, id: EdgeId) -> &FxHashSet<Predecessor> {
        &self.preds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EdgeId> {
        (0..self.records.len() as u32).map(EdgeId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &EdgeRecord<S, F>)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (EdgeId(i as u32), r))
    }

    /// Merge another arena into this one, re-interning every record and
    /// remapping the ids inside reasons and predecessor records.
    /// Reasons only ever reference earlier records, so a single forward
    /// pass suffices.
    pub fn absorb(&mut self, other: EdgeArena<S, F>) {
        let mut remap = Vec::with_capacity(other.records.len());
        let EdgeArena { records, preds, .. } = other;

        for (record, pred_set) in records.into_iter().zip(preds) {
            let reason = remap_reason(record.reason, &remap);
            let (id, _) = self.insert(record.from, record.to, reason);
            for pred in pred_set {
                self.add_predecessor(id, remap_predecessor(pred, &remap));
            }
            remap.push(id);
        }
    }
}

fn remap_reason(reason: Reason, remap: &[EdgeId]) -> Reason {
    let m = |id: EdgeId| remap[id.index()];
    match reason {
        Reason::Initial => Reason::Initial,
        Reason::Sequent(p) => Reason::Sequent(m(p)),
        Reason::CallToReturn(p) => Reason::CallToReturn(m(p)),
        Reason::CallToStart(p) => Reason::CallToStart(m(p)),
        Reason::ExitToReturnSite { caller, summary } => Reason::ExitToReturnSite {
            caller: m(caller),
            summary: m(summary),
        },
        Reason::ThroughSummary { pred, summary } => Reason::ThroughSummary {
            pred: m(pred),
            summary: m(summary),
        },
        Reason::CrossUnitCall(p) => Reason::CrossUnitCall(m(p)),
        Reason::External => Reason::External,
    }
}

fn remap_predecessor(record: Predecessor, remap: &[EdgeId]) -> Predecessor {
    let m = |id: EdgeId| remap[id.index()];
    match record {
        Predecessor::NoPredecessor => Predecessor::NoPredecessor,
        Predecessor::Sequent(p) => Predecessor::Sequent(m(p)),
        Predecessor::CallToReturn(p) => Predecessor::CallToReturn(m(p)),
        Predecessor::CallToStart(p) => Predecessor::CallToStart(m(p)),
        Predecessor::ThroughSummary { pred, summary } => Predecessor::ThroughSummary {
            pred: m(pred),
            summary: m(summary),
        },
        Predecessor::CrossUnitCall(p) => Predecessor::CrossUnitCall(m(p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str, f: u32) -> Vertex<String, u32> {
        Vertex::new(s.to_string(), f)
    }

    #[test]
    fn test_insert_deduplicates() {
        let mut arena = EdgeArena::new();

        let (a, new_a) = arena.insert(v("e", 0), v("n1", 1), Reason::Initial);
        let (b, new_b) = arena.insert(v("e", 0), v("n1", 1), Reason::Sequent(a));

        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
        // first reason wins
        assert_eq!(arena.get(a).reason, Reason::Initial);
    }

    #[test]
    fn test_predecessors_accumulate() {
        let mut arena = EdgeArena::new();

        let (a, _) = arena.insert(v("e", 0), v("e", 0), Reason::Initial);
        let (b, _) = arena.insert(v("e", 0), v("n1", 1), Reason::Sequent(a));

        arena.add_predecessor(b, Predecessor::Sequent(a));
        arena.add_predecessor(b, Predecessor::Sequent(a));
        arena.add_predecessor(b, Predecessor::CallToReturn(a));

        assert_eq!(arena.predecessors(b).len(), 2);
    }

    #[test]
    fn test_external_reason_upgraded() {
        let mut arena = EdgeArena::new();

        let edge = Edge::new(v("e", 0), v("x", 1));
        let id = arena.register_external(&edge);
        assert_eq!(arena.get(id).reason, Reason::External);

        let (same, is_new) = arena.insert(v("e", 0), v("x", 1), Reason::Initial);
        assert_eq!(same, id);
        assert!(!is_new);
        assert_eq!(arena.get(id).reason, Reason::Initial);
    }

    #[test]
    fn test_absorb_remaps_ids() {
        // Global arena already holds one record; absorbing a foreign arena
        // must shift the foreign ids.
        let mut global = EdgeArena::new();
        global.insert(v("g", 0), v("g", 0), Reason::Initial);

        let mut local = EdgeArena::new();
        let (a, _) = local.insert(v("e", 0), v("e", 0), Reason::Initial);
        local.add_predecessor(a, Predecessor::NoPredecessor);
        let (b, _) = local.insert(v("e", 0), v("n1", 1), Reason::Sequent(a));
        local.add_predecessor(b, Predecessor::Sequent(a));

        global.absorb(local);

        assert_eq!(global.len(), 3);
        let gb = global.lookup(&v("e", 0), &v("n1", 1)).unwrap();
        let ga = global.lookup(&v("e", 0), &v("e", 0)).unwrap();
        assert_eq!(global.get(gb).reason, Reason::Sequent(ga));
        assert!(global.predecessors(gb).contains(&Predecessor::Sequent(ga)));
    }

    #[test]
    fn test_absorb_merges_duplicate_edges() {
        // The same summary edge appears in two units: as a real record in
        // the owner and as an External import in the subscriber. Merging
        // must unify them and keep the real derivations.
        let mut owner = EdgeArena::new();
        let (s, _) = owner.insert(v("f_entry", 1), v("f_exit", 2), Reason::Initial);
        owner.add_predecessor(s, Predecessor::NoPredecessor);

        let mut subscriber = EdgeArena::new();
        subscriber.register_external(&Edge::new(v("f_entry", 1), v("f_exit", 2)));

        let mut global = EdgeArena::new();
        global.absorb(subscriber);
        global.absorb(owner);

        assert_eq!(global.len(), 1);
        let id = global.lookup(&v("f_entry", 1), &v("f_exit", 2)).unwrap();
        assert_eq!(global.get(id).reason, Reason::Initial);
        assert!(global
            .predecessors(id)
            .contains(&Predecessor::NoPredecessor));
    }
}
