/*
 * Cross-unit protocol
 *
 * Runners own their state exclusively; everything between units travels as
 * a typed message routed by the Manager. Messages are bounded by edge
 * count, so the channels are unbounded and backpressure-free.
 */

use flowgraph_core::{Edge, SummaryEdge, UnitId, Vertex, Vulnerability};

use crate::arena::EdgeId;

/// Manager -> Runner.
#[derive(Debug, Clone)]
pub enum RunnerMessage<S, M, F> {
    /// Seed the entry points of a start method.
    AnalyzeMethod { method: M },

    /// One resolved callee of a call-site edge previously reported as
    /// unresolved. A virtual call produces one message per target.
    ResolvedCall { edge: EdgeId, callee: M },

    /// A caller in another unit asks to be notified of summaries at the
    /// given callee entry vertex.
    SubscriptionOnStart {
        callee_entry: Vertex<S, F>,
        caller: Edge<S, F>,
        caller_unit: UnitId<M>,
    },

    /// A summary matching one of this Runner's subscriptions was
    /// published by the callee's unit.
    NotificationOnStart {
        subscriber: Edge<S, F>,
        summary: SummaryEdge<S, F>,
    },

    /// Release the worklist and hand back the unit's state.
    Shutdown,
}

/// Runner -> Manager.
#[derive(Debug, Clone)]
pub enum ManagerMessage<S, M, F> {
    /// A path edge landed on a call site; the Manager enumerates callees
    /// via the application graph and answers with ResolvedCall.
    UnresolvedCall {
        unit: UnitId<M>,
        edge: EdgeId,
        call: S,
    },

    /// Route a subscription to the unit owning the callee.
    SubscriptionOnStart {
        target: UnitId<M>,
        callee_entry: Vertex<S, F>,
        caller: Edge<S, F>,
        caller_unit: UnitId<M>,
    },

    /// Route a summary notification back to a subscriber.
    NotificationOnStart {
        target: UnitId<M>,
        subscriber: Edge<S, F>,
        summary: SummaryEdge<S, F>,
    },

    /// A summary edge was published to the shared store.
    NewSummaryEdge {
        unit: UnitId<M>,
        method: M,
        summary: SummaryEdge<S, F>,
    },

    /// A sink was hit.
    NewVulnerability(Vulnerability<S, F>),

    /// The Runner's worklist drained after processing `received` messages
    /// in total. Quiescence holds once every Runner's latest report
    /// matches the number of messages the Manager has sent it.
    Idle { unit: UnitId<M>, received: u64 },
}
