/*
 * Cross-unit coordinator
 *
 * The Manager spawns one Runner thread per unit (lazily, as units are
 * discovered), routes every cross-unit message, resolves callees via the
 * application graph, accumulates vulnerabilities, and detects global
 * quiescence.
 *
 * Quiescence is two-phase by construction: a Runner's Idle report carries
 * the number of messages it has processed, and the Manager terminates
 * only when every Runner's latest report matches the number of messages
 * sent to it. Any send after a report invalidates that report, which is
 * exactly the protocol restart of phase 2.
 */

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use flowgraph_core::{Analysis, ApplicationGraph, UnitId, UnitResolver, Vulnerability};

use crate::cancel::CancellationToken;
use crate::messages::{ManagerMessage, RunnerMessage};
use crate::result::{IfdsResult, IfdsStatistics};
use crate::runner::{Runner, RunnerChunk};
use crate::store::{IncompleteRegistry, SummaryStore};

type Stmt<G> = <G as ApplicationGraph>::Statement;
type Method<G> = <G as ApplicationGraph>::Method;
type AFact<G, A> = <A as Analysis<G>>::Fact;

const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn runner thread: {0}")]
    Spawn(String),
}

/// Entry point of the solver: configure, then `run` over the start
/// methods.
pub struct IfdsManager<G: ApplicationGraph, A: Analysis<G>> {
    graph: Arc<G>,
    analysis: Arc<A>,
    resolver: Arc<dyn UnitResolver<Method<G>>>,
    cancel: CancellationToken,
}

impl<G: ApplicationGraph, A: Analysis<G>> IfdsManager<G, A> {
    pub fn new(
        graph: Arc<G>,
        analysis: Arc<A>,
        resolver: Arc<dyn UnitResolver<Method<G>>>,
    ) -> Self {
        Self {
            graph,
            analysis,
            resolver,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token. Cancelling yields
    /// a partial result, never an error.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Solve to global quiescence (or cancellation) and aggregate every
    /// unit's state into one result.
    pub fn run(
        self,
        start_methods: Vec<Method<G>>,
    ) -> Result<IfdsResult<G, AFact<G, A>>, EngineError> {
        let started = Instant::now();
        let (to_manager, inbox) = mpsc::channel();

        let mut coordinator = Coordinator {
            graph: self.graph,
            analysis: self.analysis,
            resolver: self.resolver,
            cancel: self.cancel,
            summary_store: SummaryStore::new(),
            incomplete: IncompleteRegistry::new(),
            to_manager,
            runners: FxHashMap::default(),
            vulnerabilities: Vec::new(),
            seen_vulnerabilities: FxHashSet::default(),
            stats: IfdsStatistics::default(),
        };

        info!(start_methods = start_methods.len(), "starting IFDS run");
        coordinator.seed(start_methods)?;
        coordinator.event_loop(&inbox)?;
        let result = coordinator.finish(inbox, started);

        info!(
            path_edges = result.stats().path_edges,
            summary_edges = result.stats().summary_edges,
            vulnerabilities = result.stats().vulnerabilities,
            runners = result.stats().runners,
            elapsed_ms = result.stats().elapsed_ms,
            cancelled = result.cancelled(),
            "IFDS run finished"
        );
        Ok(result)
    }
}

struct RunnerHandle<S, M, F> {
    sender: Sender<RunnerMessage<S, M, F>>,
    join: JoinHandle<RunnerChunk<S, M, F>>,
    sent: u64,
    idle_received: Option<u64>,
}

struct Coordinator<G: ApplicationGraph, A: Analysis<G>> {
    graph: Arc<G>,
    analysis: Arc<A>,
    resolver: Arc<dyn UnitResolver<Method<G>>>,
    cancel: CancellationToken,
    summary_store: SummaryStore<Stmt<G>, Method<G>, AFact<G, A>>,
    incomplete: IncompleteRegistry<Method<G>>,
    to_manager: Sender<ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
    runners: FxHashMap<UnitId<Method<G>>, RunnerHandle<Stmt<G>, Method<G>, AFact<G, A>>>,
    vulnerabilities: Vec<Vulnerability<Stmt<G>, AFact<G, A>>>,
    seen_vulnerabilities: FxHashSet<Vulnerability<Stmt<G>, AFact<G, A>>>,
    stats: IfdsStatistics,
}

impl<G: ApplicationGraph, A: Analysis<G>> Coordinator<G, A> {
    fn seed(&mut self, start_methods: Vec<Method<G>>) -> Result<(), EngineError> {
        for method in start_methods {
            let unit = self.resolver.resolve(&method);
            self.send_to(unit, RunnerMessage::AnalyzeMethod { method })?;
        }
        Ok(())
    }

    /// Process messages until quiescence or cancellation.
    fn event_loop(
        &mut self,
        inbox: &Receiver<ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
    ) -> Result<(), EngineError> {
        loop {
            if self.cancel.is_cancelled() {
                info!("run cancelled; collecting partial result");
                return Ok(());
            }
            if self.quiescent() {
                return Ok(());
            }
            match inbox.recv_timeout(IDLE_POLL) {
                Ok(msg) => self.handle(msg)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Phase 1: every Runner reported idle. Phase 2: no message the
    /// Manager sent since that report is unaccounted for.
    fn quiescent(&self) -> bool {
        self.runners
            .values()
            .all(|r| r.idle_received == Some(r.sent))
    }

    fn handle(
        &mut self,
        msg: ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>,
    ) -> Result<(), EngineError> {
        match msg {
            ManagerMessage::UnresolvedCall { unit, edge, call } => {
                self.stats.unresolved_calls += 1;
                let callees = match self.graph.callees(&call) {
                    Ok(callees) => callees,
                    Err(e) => {
                        warn!(%e, "callee resolution failed");
                        if let Ok(method) = self.graph.method_of(&call) {
                            self.incomplete.mark(method);
                        }
                        return Ok(());
                    }
                };
                // Zero callees: the call degenerates to call-to-return,
                // which the Runner has already applied.
                for callee in callees {
                    self.send_to(unit.clone(), RunnerMessage::ResolvedCall { edge, callee })?;
                }
            }
            ManagerMessage::SubscriptionOnStart {
                target,
                callee_entry,
                caller,
                caller_unit,
            } => {
                self.stats.cross_unit_subscriptions += 1;
                self.send_to(
                    target,
                    RunnerMessage::SubscriptionOnStart {
                        callee_entry,
                        caller,
                        caller_unit,
                    },
                )?;
            }
            ManagerMessage::NotificationOnStart {
                target,
                subscriber,
                summary,
            } => {
                if self.runners.contains_key(&target) {
                    self.send_to(
                        target,
                        RunnerMessage::NotificationOnStart { subscriber, summary },
                    )?;
                } else {
                    warn!(?target, "summary notification for unknown runner; dropping");
                }
            }
            ManagerMessage::NewSummaryEdge { unit, .. } => {
                debug!(?unit, "summary edge published");
            }
            ManagerMessage::NewVulnerability(vulnerability) => {
                if self.seen_vulnerabilities.insert(vulnerability.clone()) {
                    info!(
                        analysis = %vulnerability.analysis,
                        message = %vulnerability.message,
                        "vulnerability found"
                    );
                    self.vulnerabilities.push(vulnerability);
                }
            }
            ManagerMessage::Idle { unit, received } => {
                if let Some(handle) = self.runners.get_mut(&unit) {
                    handle.idle_received = Some(received);
                }
            }
        }
        Ok(())
    }

    fn send_to(
        &mut self,
        unit: UnitId<Method<G>>,
        msg: RunnerMessage<Stmt<G>, Method<G>, AFact<G, A>>,
    ) -> Result<(), EngineError> {
        self.ensure_runner(unit.clone())?;
        if let Some(handle) = self.runners.get_mut(&unit) {
            handle.sent += 1;
            self.stats.messages_routed += 1;
            if handle.sender.send(msg).is_err() {
                warn!(?unit, "runner channel closed; dropping message");
            }
        }
        Ok(())
    }

    fn ensure_runner(&mut self, unit: UnitId<Method<G>>) -> Result<(), EngineError> {
        if self.runners.contains_key(&unit) {
            return Ok(());
        }

        debug!(?unit, "spawning runner");
        let (sender, receiver) = mpsc::channel();
        let runner = Runner::<G, A>::new(
            unit.clone(),
            Arc::clone(&self.graph),
            Arc::clone(&self.analysis),
            Arc::clone(&self.resolver),
            self.summary_store.clone(),
            self.incomplete.clone(),
            self.to_manager.clone(),
            self.cancel.clone(),
        );
        let join = thread::Builder::new()
            .name(format!("flowgraph-runner-{}", self.runners.len()))
            .spawn(move || runner.run(receiver))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        self.runners.insert(
            unit,
            RunnerHandle {
                sender,
                join,
                sent: 0,
                idle_received: None,
            },
        );
        Ok(())
    }

    /// Shut every Runner down, join their state, drain in-flight
    /// vulnerabilities and assemble the global result.
    fn finish(
        mut self,
        inbox: Receiver<ManagerMessage<Stmt<G>, Method<G>, AFact<G, A>>>,
        started: Instant,
    ) -> IfdsResult<G, AFact<G, A>> {
        let mut chunks = Vec::with_capacity(self.runners.len());
        self.stats.runners = self.runners.len();

        for (_, handle) in self.runners.drain() {
            let _ = handle.sender.send(RunnerMessage::Shutdown);
            match handle.join.join() {
                Ok(chunk) => chunks.push(chunk),
                Err(_) => warn!("runner thread panicked; its unit is lost"),
            }
        }

        while let Ok(msg) = inbox.try_recv() {
            if let ManagerMessage::NewVulnerability(vulnerability) = msg {
                if self.seen_vulnerabilities.insert(vulnerability.clone()) {
                    self.vulnerabilities.push(vulnerability);
                }
            }
        }

        self.stats.elapsed_ms = started.elapsed().as_millis() as u64;
        let cancelled = self.cancel.is_cancelled();
        IfdsResult::assemble(
            chunks,
            self.vulnerabilities,
            self.incomplete.snapshot(),
            self.stats,
            cancelled,
        )
    }
}
