/*
 * Taint rules
 *
 * Source, sink and sanitiser classifiers over callee names, compiled once
 * from glob patterns and shared read-only across all Runners.
 */

use flowgraph_core::{AnalysisOptions, ConfigError, MatcherSet};

#[derive(Debug, Clone, Default)]
pub struct TaintRules {
    pub sources: MatcherSet,
    pub sinks: MatcherSet,
    pub sanitizers: MatcherSet,
}

impl TaintRules {
    pub fn new(sources: MatcherSet, sinks: MatcherSet, sanitizers: MatcherSet) -> Self {
        Self {
            sources,
            sinks,
            sanitizers,
        }
    }

    /// Rules from validated analysis options (the `sources`/`sinks`/
    /// `sanitizers` pattern lists).
    pub fn from_options(options: &AnalysisOptions) -> Self {
        Self {
            sources: options.sources.clone(),
            sinks: options.sinks.clone(),
            sanitizers: options.sanitizers.clone(),
        }
    }

    /// A default rule set covering the common library names.
    pub fn defaults() -> Result<Self, ConfigError> {
        Ok(Self {
            sources: MatcherSet::compile(["source", "getenv", "read*", "input"])?,
            sinks: MatcherSet::compile(["sink", "exec*", "eval", "system"])?,
            sanitizers: MatcherSet::compile(["sanitize*", "escape*", "quote*"])?,
        })
    }

    pub fn is_source(&self, callee: &str) -> bool {
        self.sources.matches(callee)
    }

    pub fn is_sink(&self, callee: &str) -> bool {
        self.sinks.matches(callee)
    }

    pub fn is_sanitizer(&self, callee: &str) -> bool {
        self.sanitizers.matches(callee)
    }

    pub fn sink_rule(&self, callee: &str) -> Option<&str> {
        self.sinks.matching_rule(callee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = TaintRules::defaults().unwrap();

        assert!(rules.is_source("source"));
        assert!(rules.is_source("readLine"));
        assert!(rules.is_sink("sink"));
        assert!(rules.is_sink("execCommand"));
        assert!(rules.is_sanitizer("escapeHtml"));
        assert!(!rules.is_source("compute"));
    }

    #[test]
    fn test_sink_rule_reports_pattern() {
        let rules = TaintRules::defaults().unwrap();

        assert_eq!(rules.sink_rule("execCommand"), Some("exec*"));
        assert_eq!(rules.sink_rule("compute"), None);
    }

    #[test]
    fn test_from_options() {
        let mut config = flowgraph_core::AnalysisConfig::new();
        config.set("taint", "sources", "tainted_input");
        config.set("taint", "sinks", "dangerous");
        let options = config.options_for("taint").unwrap();

        let rules = TaintRules::from_options(&options);
        assert!(rules.is_source("tainted_input"));
        assert!(rules.is_sink("dangerous"));
        assert!(!rules.is_sanitizer("escape"));
    }
}
