use thiserror::Error;

/// Configuration errors abort a run before any Runner is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown unit resolver: {0} (expected method|class|package|singleton)")]
    UnknownResolver(String),

    #[error("Unknown option `{option}` for analysis `{analysis}`")]
    UnknownOption { analysis: String, option: String },

    #[error("Invalid value `{value}` for option `{option}`: {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("Invalid method pattern `{pattern}`: {reason}")]
    BadPattern { pattern: String, reason: String },

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// Application-graph inconsistencies. Fatal for the enclosing method only:
/// the Runner marks that method incomplete and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown statement: {0}")]
    UnknownStatement(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Inconsistent graph: {0}")]
    Inconsistent(String),
}

/// A flow function signalled failure. Aborts the offending edge only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Flow function `{function}` failed: {message}")]
pub struct FlowError {
    pub function: &'static str,
    pub message: String,
}

impl FlowError {
    pub fn new(function: &'static str, message: impl Into<String>) -> Self {
        Self {
            function,
            message: message.into(),
        }
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
pub type FlowResult<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownResolver("file".to_string());
        assert!(err.to_string().contains("file"));
        assert!(err.to_string().contains("singleton"));
    }

    #[test]
    fn test_flow_error_display() {
        let err = FlowError::new("sequent", "bad fact");
        assert_eq!(err.to_string(), "Flow function `sequent` failed: bad fact");
    }
}
