/*
 * Per-unit IFDS worker
 *
 * Implements the tabulation loop of Reps, Horwitz, Sagiv (1995) over one
 * scheduling unit. The Runner owns its worklist, edge arena, summary
 * tables, caller table and subscription tables exclusively; everything
 * that crosses a unit boundary goes through the Manager as a message.
 *
 * Invariants:
 * - processNewEdge is idempotent: a known edge only gains a predecessor
 *   record, a new edge is scheduled exactly once.
 * - Summaries for a given entry vertex are computed once and replayed for
 *   every caller, whether the caller registered before or after the
 *   summary appeared.
 * - A failing flow function aborts the offending edge only; a graph
 *   inconsistency marks the enclosing method incomplete and the Runner
 *   keeps going.
 */

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use flowgraph_core::{
    Analysis, ApplicationGraph, Edge, FlowError, GraphError, SummaryEdge, UnitId, UnitResolver,
    Vertex, Vulnerability,
};

use crate::arena::{EdgeArena, EdgeId, Predecessor, Reason};
use crate::cancel::CancellationToken;
use crate::messages::{ManagerMessage, RunnerMessage};
use crate::store::{IncompleteRegistry, SummaryStore};

type Stmt<G> = <G as ApplicationGraph>::Statement;
type Method<G> = <G as ApplicationGraph>::Method;
type AFact<G, A> = <A as Analysis<G>>::Fact;

/// A standing cross-unit request: notify `unit` about every summary that
/// appears at the subscribed entry vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription<S, M, F> {
    unit: UnitId<M>,
    caller: Edge<S, F>,
}

/// Whether a summary is being replayed at the moment of its discovery or
/// from the summary store / a cross-unit notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryVia {
    Discovery,
    Stored,
}

/// The state a Runner hands back when it shuts down.
#[derive(Debug)]
pub(crate) struct RunnerChunk<S, M, F> {
    pub unit: UnitId<M>,
    pub arena: EdgeArena<S, F>,
    pub summaries: FxHashMap<M, Vec<EdgeId>>,
}

pub(crate) struct Runner<G: ApplicationGraph, A: Analysis<G>> {
    unit: UnitId<Method<G>>,
    graph: Arc<G>,
    analysis: Arc<A>,
    resolver: Arc<dyn UnitResolver<Method<G>>>,

    worklist: VecDeque<EdgeId>,
    arena: EdgeArena<Stmt<G>, AFact<G, A>>,

    /// Summary edges discovered in this unit, keyed by entry vertex.
    summaries_by_entry: FxHashMap<Vertex<Stmt<G>, AFact<G, A>>, FxHashSet<EdgeId>>,
    summaries_by_method: FxHashMap<Method<G>, Vec<EdgeId>>,

    /// Same-unit caller edges awaiting summaries at an entry vertex.
    callers: FxHashMap<Vertex<Stmt<G>, AFact<G, A>>, FxHashSet<EdgeId>>,

    /// Incoming cross-unit subscriptions, keyed by entry vertex.
    subscriptions: FxHashMap<Vertex<Stmt<G>, AFact<G, A>>, Vec<Subscription<Stmt<G>, Method<G>, AFact<G, A>>>>,

    /// Outgoing subscriptions already sent, for dedup.
    pending_start_subscriptions: FxHashSet<(EdgeId, Vertex<Stmt<G>, AFact<G, A>>)>,

    summary_store: SummaryStore<Stmt<G>, Method<G>, AFact<G, A>>,
    incomplete: IncompleteRegistry<Method<G>>,
    to_manager: Sender<ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
    cancel: CancellationToken,

    /// Messages processed so far; reported with every Idle.
    received: u64,
}

impl<G: ApplicationGraph, A: Analysis<G>> Runner<G, A> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        unit: UnitId<Method<G>>,
        graph: Arc<G>,
        analysis: Arc<A>,
        resolver: Arc<dyn UnitResolver<Method<G>>>,
        summary_store: SummaryStore<Stmt<G>, Method<G>, AFact<G, A>>,
        incomplete: IncompleteRegistry<Method<G>>,
        to_manager: Sender<ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            unit,
            graph,
            analysis,
            resolver,
            worklist: VecDeque::new(),
            arena: EdgeArena::new(),
            summaries_by_entry: FxHashMap::default(),
            summaries_by_method: FxHashMap::default(),
            callers: FxHashMap::default(),
            subscriptions: FxHashMap::default(),
            pending_start_subscriptions: FxHashSet::default(),
            summary_store,
            incomplete,
            to_manager,
            cancel,
            received: 0,
        }
    }

    /// Message loop: process everything queued, drain the worklist, report
    /// idle, suspend on the channel. A message may reactivate a Runner
    /// that has already quiesced.
    pub(crate) fn run(
        mut self,
        inbox: Receiver<RunnerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
    ) -> RunnerChunk<Stmt<G>, Method<G>, AFact<G, A>> {
        'suspended: loop {
            let first = match inbox.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            };

            let mut next = Some(first);
            while let Some(msg) = next {
                if matches!(msg, RunnerMessage::Shutdown) {
                    break 'suspended;
                }
                self.received += 1;
                self.handle(msg);
                self.drain();
                next = inbox.try_recv().ok();
            }

            let _ = self.to_manager.send(ManagerMessage::Idle {
                unit: self.unit.clone(),
                received: self.received,
            });
        }

        RunnerChunk {
            unit: self.unit,
            arena: self.arena,
            summaries: self.summaries_by_method,
        }
    }

    fn handle(&mut self, msg: RunnerMessage<Stmt<G>, Method<G>, AFact<G, A>>) {
        match msg {
            RunnerMessage::AnalyzeMethod { method } => self.seed(method),
            RunnerMessage::ResolvedCall { edge, callee } => self.expand_call(edge, callee),
            RunnerMessage::SubscriptionOnStart {
                callee_entry,
                caller,
                caller_unit,
            } => self.register_subscription(callee_entry, caller, caller_unit),
            RunnerMessage::NotificationOnStart { subscriber, summary } => {
                self.apply_notification(subscriber, summary)
            }
            RunnerMessage::Shutdown => {}
        }
    }

    /// Seed the entry points of a start method with its initial facts.
    fn seed(&mut self, method: Method<G>) {
        let entries = match self.graph.entry_points(&method) {
            Ok(entries) => entries,
            Err(e) => return self.mark_incomplete(method, &e),
        };
        let facts = match self.analysis.initial(&method) {
            Ok(facts) => facts,
            Err(e) => return self.skip_flow(&e),
        };

        for entry in entries {
            for fact in &facts {
                let v = Vertex::new(entry.clone(), fact.clone());
                self.propagate(v.clone(), v, Reason::Initial, Predecessor::NoPredecessor);
            }
        }
    }

    fn drain(&mut self) {
        while let Some(id) = self.worklist.pop_front() {
            if self.cancel.is_cancelled() {
                debug!(unit = ?self.unit, "cancelled; releasing worklist");
                self.worklist.clear();
                return;
            }
            self.process(id);
        }
    }

    /// One step of the tabulation loop.
    fn process(&mut self, id: EdgeId) {
        let record = self.arena.get(id).clone();
        let stmt = record.to.statement.clone();

        if self.graph.is_call(&stmt) {
            self.process_call(id, &record.from, &record.to);
        } else if self.graph.is_exit(&stmt) {
            self.process_exit(id, &record.from, &record.to);
        } else {
            self.process_sequent(id, &record.from, &record.to);
        }
    }

    /// Call site: hand callee resolution to the Manager and, concurrently,
    /// approximate the call across every return site.
    fn process_call(
        &mut self,
        id: EdgeId,
        from: &Vertex<Stmt<G>, AFact<G, A>>,
        to: &Vertex<Stmt<G>, AFact<G, A>>,
    ) {
        let _ = self.to_manager.send(ManagerMessage::UnresolvedCall {
            unit: self.unit.clone(),
            edge: id,
            call: to.statement.clone(),
        });

        let return_sites = match self.graph.successors(&to.statement) {
            Ok(succs) => succs,
            Err(e) => return self.mark_incomplete_at(&to.statement, &e),
        };
        for site in return_sites {
            let facts = match self.analysis.call_to_return(&to.statement, &site, &to.fact) {
                Ok(facts) => facts,
                Err(e) => {
                    self.skip_flow(&e);
                    continue;
                }
            };
            for fact in facts {
                self.propagate(
                    from.clone(),
                    Vertex::new(site.clone(), fact),
                    Reason::CallToReturn(id),
                    Predecessor::CallToReturn(id),
                );
            }
        }
    }

    /// Exit point: the edge is a summary. Publish it and replay it for
    /// every caller already waiting, local or cross-unit.
    fn process_exit(
        &mut self,
        id: EdgeId,
        from: &Vertex<Stmt<G>, AFact<G, A>>,
        to: &Vertex<Stmt<G>, AFact<G, A>>,
    ) {
        let method = match self.graph.method_of(&to.statement) {
            Ok(method) => method,
            Err(e) => return self.mark_incomplete_at(&to.statement, &e),
        };

        if !self
            .summaries_by_entry
            .entry(from.clone())
            .or_default()
            .insert(id)
        {
            return;
        }
        self.summaries_by_method
            .entry(method.clone())
            .or_default()
            .push(id);

        let summary = SummaryEdge::new(Edge::new(from.clone(), to.clone()));
        self.summary_store.publish(&method, summary.clone());
        let _ = self.to_manager.send(ManagerMessage::NewSummaryEdge {
            unit: self.unit.clone(),
            method,
            summary: summary.clone(),
        });

        if let Some(callers) = self.callers.get(from).cloned() {
            for caller in callers {
                self.apply_summary(caller, id, SummaryVia::Discovery);
            }
        }

        if let Some(subs) = self.subscriptions.get(from).cloned() {
            for sub in subs {
                let _ = self.to_manager.send(ManagerMessage::NotificationOnStart {
                    target: sub.unit,
                    subscriber: sub.caller,
                    summary: summary.clone(),
                });
            }
        }
    }

    /// Plain intra-procedural transfer.
    fn process_sequent(
        &mut self,
        id: EdgeId,
        from: &Vertex<Stmt<G>, AFact<G, A>>,
        to: &Vertex<Stmt<G>, AFact<G, A>>,
    ) {
        let successors = match self.graph.successors(&to.statement) {
            Ok(succs) => succs,
            Err(e) => return self.mark_incomplete_at(&to.statement, &e),
        };
        for succ in successors {
            let facts = match self.analysis.sequent(&to.statement, &succ, &to.fact) {
                Ok(facts) => facts,
                Err(e) => {
                    self.skip_flow(&e);
                    continue;
                }
            };
            for fact in facts {
                self.propagate(
                    from.clone(),
                    Vertex::new(succ.clone(), fact),
                    Reason::Sequent(id),
                    Predecessor::Sequent(id),
                );
            }
        }
    }

    /// The Manager resolved one callee of a call-site edge. Open the
    /// interprocedural edge: locally when the callee is ours, through a
    /// subscription otherwise.
    fn expand_call(&mut self, edge: EdgeId, callee: Method<G>) {
        let call_edge = self.arena.get(edge).clone();
        let call_stmt = call_edge.to.statement.clone();

        let entries = match self.graph.entry_points(&callee) {
            Ok(entries) => entries,
            Err(e) => return self.mark_incomplete(callee, &e),
        };
        let target_unit = self.resolver.resolve(&callee);

        for entry in entries {
            let facts = match self
                .analysis
                .call_to_start(&call_stmt, &entry, &call_edge.to.fact)
            {
                Ok(facts) => facts,
                Err(e) => {
                    self.skip_flow(&e);
                    continue;
                }
            };
            for fact in facts {
                let v = Vertex::new(entry.clone(), fact);
                if target_unit == self.unit {
                    self.callers.entry(v.clone()).or_default().insert(edge);
                    self.propagate(
                        v.clone(),
                        v.clone(),
                        Reason::CallToStart(edge),
                        Predecessor::CallToStart(edge),
                    );
                    let known: Vec<EdgeId> = self
                        .summaries_by_entry
                        .get(&v)
                        .map(|s| s.iter().copied().collect())
                        .unwrap_or_default();
                    for summary in known {
                        self.apply_summary(edge, summary, SummaryVia::Stored);
                    }
                } else if self.pending_start_subscriptions.insert((edge, v.clone())) {
                    let _ = self.to_manager.send(ManagerMessage::SubscriptionOnStart {
                        target: target_unit.clone(),
                        callee_entry: v.clone(),
                        caller: call_edge.edge(),
                        caller_unit: self.unit.clone(),
                    });
                    // summaries published before the subscription lands are
                    // visible through the shared store; replaying both ways
                    // is idempotent
                    for published in self.summary_store.summaries_for(&callee) {
                        if published.from == v {
                            let summary_id = self.arena.register_external(&published);
                            self.apply_summary(edge, summary_id, SummaryVia::Stored);
                        }
                    }
                }
            }
        }
    }

    /// Callee side of a cross-unit call: remember the subscriber, open the
    /// entry self-loop, and notify about summaries that already exist.
    fn register_subscription(
        &mut self,
        callee_entry: Vertex<Stmt<G>, AFact<G, A>>,
        caller: Edge<Stmt<G>, AFact<G, A>>,
        caller_unit: UnitId<Method<G>>,
    ) {
        let caller_id = self.arena.register_external(&caller);
        let subscription = Subscription {
            unit: caller_unit.clone(),
            caller: caller.clone(),
        };

        let subs = self.subscriptions.entry(callee_entry.clone()).or_default();
        if subs.contains(&subscription) {
            return;
        }
        subs.push(subscription);

        self.propagate(
            callee_entry.clone(),
            callee_entry.clone(),
            Reason::CrossUnitCall(caller_id),
            Predecessor::CrossUnitCall(caller_id),
        );

        let known: Vec<EdgeId> = self
            .summaries_by_entry
            .get(&callee_entry)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for summary in known {
            let summary_edge = SummaryEdge::new(self.arena.get(summary).edge());
            let _ = self.to_manager.send(ManagerMessage::NotificationOnStart {
                target: caller_unit.clone(),
                subscriber: caller.clone(),
                summary: summary_edge,
            });
        }
    }

    /// Caller side of a cross-unit summary: replay exit-to-return-site
    /// production as if the summary were local.
    fn apply_notification(
        &mut self,
        subscriber: Edge<Stmt<G>, AFact<G, A>>,
        summary: SummaryEdge<Stmt<G>, AFact<G, A>>,
    ) {
        let Some(subscriber_id) = self.arena.lookup(&subscriber.from, &subscriber.to) else {
            warn!(
                unit = ?self.unit,
                "notification for unknown subscription; dropping"
            );
            return;
        };
        let summary_id = self.arena.register_external(&summary);
        self.apply_summary(subscriber_id, summary_id, SummaryVia::Stored);
    }

    /// Map a summary back into a caller's scope at every return site of
    /// the call.
    fn apply_summary(&mut self, caller: EdgeId, summary: EdgeId, via: SummaryVia) {
        let caller_record = self.arena.get(caller).clone();
        let summary_record = self.arena.get(summary).clone();
        let call_stmt = caller_record.to.statement.clone();

        let return_sites = match self.graph.successors(&call_stmt) {
            Ok(succs) => succs,
            Err(e) => return self.mark_incomplete_at(&call_stmt, &e),
        };

        let reason = match via {
            SummaryVia::Discovery => Reason::ExitToReturnSite { caller, summary },
            SummaryVia::Stored => Reason::ThroughSummary {
                pred: caller,
                summary,
            },
        };

        for site in return_sites {
            let facts = match self.analysis.exit_to_return_site(
                &call_stmt,
                &site,
                &summary_record.to.statement,
                &summary_record.to.fact,
            ) {
                Ok(facts) => facts,
                Err(e) => {
                    self.skip_flow(&e);
                    continue;
                }
            };
            for fact in facts {
                self.propagate(
                    caller_record.from.clone(),
                    Vertex::new(site.clone(), fact),
                    reason,
                    Predecessor::ThroughSummary {
                        pred: caller,
                        summary,
                    },
                );
            }
        }
    }

    /// processNewEdge: idempotent edge insertion. A known edge only gains
    /// a predecessor record; a new edge is scheduled and sink-checked.
    fn propagate(
        &mut self,
        from: Vertex<Stmt<G>, AFact<G, A>>,
        to: Vertex<Stmt<G>, AFact<G, A>>,
        reason: Reason,
        predecessor: Predecessor,
    ) {
        let (id, is_new) = self.arena.insert(from, to, reason);
        self.arena.add_predecessor(id, predecessor);
        if !is_new {
            return;
        }
        self.worklist.push_back(id);

        let record = self.arena.get(id);
        if let Some(hit) = self.analysis.sink(&record.to.statement, &record.to.fact) {
            let _ = self
                .to_manager
                .send(ManagerMessage::NewVulnerability(Vulnerability {
                    analysis: self.analysis.name().to_string(),
                    vulnerability_type: hit.vulnerability_type,
                    message: hit.message,
                    rule: hit.rule,
                    sink: record.to.clone(),
                }));
        }
    }

    fn skip_flow(&self, error: &FlowError) {
        warn!(unit = ?self.unit, %error, "flow function failed; skipping edge");
    }

    /// Graph inconsistency at a statement: fatal for the enclosing method
    /// only.
    fn mark_incomplete_at(&mut self, stmt: &Stmt<G>, error: &GraphError) {
        match self.graph.method_of(stmt) {
            Ok(method) => self.mark_incomplete(method, error),
            Err(_) => warn!(
                unit = ?self.unit,
                ?stmt,
                %error,
                "graph inconsistency at statement with no owner"
            ),
        }
    }

    fn mark_incomplete(&mut self, method: Method<G>, error: &GraphError) {
        warn!(
            unit = ?self.unit,
            ?method,
            %error,
            "graph inconsistency; marking method incomplete"
        );
        self.incomplete.mark(method);
    }
}
