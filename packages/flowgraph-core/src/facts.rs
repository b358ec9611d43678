use std::fmt::Debug;
use std::hash::Hash;

/// Dataflow fact (abstract domain element).
///
/// The engine works over the powerset of facts with union join; a fact only
/// needs equality and hashing. The distinguished ZERO fact means "reachable
/// with no dataflow assumption" and doubles as the trace-root marker.
///
/// Example:
///   - Taint analysis: Tainted { variable: "x" }
///   - Null pointer: MayBeNull { variable: "p" }
pub trait Fact: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Create the ZERO fact.
    fn zero() -> Self;

    /// Check whether this is the ZERO fact.
    fn is_zero(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum TestFact {
        Zero,
        Tainted(String),
    }

    impl Fact for TestFact {
        fn zero() -> Self {
            TestFact::Zero
        }

        fn is_zero(&self) -> bool {
            matches!(self, TestFact::Zero)
        }
    }

    #[test]
    fn test_zero_fact() {
        let zero = TestFact::zero();
        assert!(zero.is_zero());
        assert!(!TestFact::Tainted("x".to_string()).is_zero());
    }
}
