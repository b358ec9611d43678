use flowgraph_core::Fact;

/// Taint fact: either the ZERO seed or a tainted variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaintFact {
    Zero,
    Tainted { variable: String },
}

impl TaintFact {
    pub fn tainted(variable: impl Into<String>) -> Self {
        TaintFact::Tainted {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> Option<&str> {
        match self {
            TaintFact::Zero => None,
            TaintFact::Tainted { variable } => Some(variable),
        }
    }
}

impl Fact for TaintFact {
    fn zero() -> Self {
        TaintFact::Zero
    }

    fn is_zero(&self) -> bool {
        matches!(self, TaintFact::Zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert!(TaintFact::zero().is_zero());
        assert!(!TaintFact::tainted("x").is_zero());
    }

    #[test]
    fn test_variable_accessor() {
        assert_eq!(TaintFact::tainted("x").variable(), Some("x"));
        assert_eq!(TaintFact::Zero.variable(), None);
    }
}
