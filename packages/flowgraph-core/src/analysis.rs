/*
 * Flow-function contract
 *
 * An analysis supplies five pure functions, each mapping one input fact to
 * a finite set of output facts, plus a sink classifier. The functions must
 * be deterministic in their inputs and must not observe mutable global
 * state; the engine memoises their use implicitly through edge
 * deduplication, so they may be expensive.
 *
 * A flow function that signals failure aborts the offending edge only: the
 * Runner logs the error and keeps processing other edges.
 */

use crate::errors::FlowResult;
use crate::facts::Fact;
use crate::graph::ApplicationGraph;

/// A sink classification produced when a vertex lands on a user-declared
/// sink statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkMatch {
    /// Short classification, e.g. "taint-flow".
    pub vulnerability_type: String,

    /// Human-readable description of the hit.
    pub message: String,

    /// The declaring rule, when one exists.
    pub rule: Option<String>,
}

impl SinkMatch {
    pub fn new(vulnerability_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            vulnerability_type: vulnerability_type.into(),
            message: message.into(),
            rule: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

/// An IFDS analysis: the five flow functions of the tabulation algorithm
/// plus source/sink classification.
pub trait Analysis<G: ApplicationGraph>: Send + Sync + 'static {
    type Fact: Fact;

    /// Analysis name, used in logs and vulnerability reports.
    fn name(&self) -> &str;

    /// Seed facts at a method entry. Typically just ZERO.
    fn initial(&self, _method: &G::Method) -> FlowResult<Vec<Self::Fact>> {
        Ok(vec![Self::Fact::zero()])
    }

    /// Intra-procedural transfer over a non-call, non-exit edge.
    fn sequent(
        &self,
        current: &G::Statement,
        next: &G::Statement,
        fact: &Self::Fact,
    ) -> FlowResult<Vec<Self::Fact>>;

    /// Effect of a call without descending into callees: library stubs,
    /// sanitisation, taint propagation through unresolved calls.
    fn call_to_return(
        &self,
        call: &G::Statement,
        return_site: &G::Statement,
        fact: &Self::Fact,
    ) -> FlowResult<Vec<Self::Fact>>;

    /// Facts seeding the callee entry when an interprocedural edge opens.
    fn call_to_start(
        &self,
        call: &G::Statement,
        callee_entry: &G::Statement,
        fact: &Self::Fact,
    ) -> FlowResult<Vec<Self::Fact>>;

    /// Maps a summary from a callee exit back into the caller's scope at
    /// the return site. `fact` is the fact at the callee exit.
    fn exit_to_return_site(
        &self,
        call: &G::Statement,
        return_site: &G::Statement,
        exit: &G::Statement,
        fact: &Self::Fact,
    ) -> FlowResult<Vec<Self::Fact>>;

    /// Whether `(stmt, fact)` hits a user-declared sink.
    fn sink(&self, stmt: &G::Statement, fact: &Self::Fact) -> Option<SinkMatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_match_builder() {
        let m = SinkMatch::new("taint-flow", "tainted data reaches exec").with_rule("cmd-injection");

        assert_eq!(m.vulnerability_type, "taint-flow");
        assert_eq!(m.rule.as_deref(), Some("cmd-injection"));
    }
}
