/*
 * Analysis configuration
 *
 * Raw configuration is a string-keyed mapping
 * `{ analysis-name -> { option -> value } }`, deserialised from JSON.
 * It is validated exactly once at startup: unknown options and malformed
 * values are configuration errors and abort the run before any Runner is
 * spawned. Validation compiles the per-method classifiers into matcher
 * sets that are shared across Runners.
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::matchers::MatcherSet;

pub const DEFAULT_MAX_TRACES: usize = 3;

/// Raw, unvalidated analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(flatten)]
    analyses: HashMap<String, HashMap<String, String>>,
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Set one option, creating the analysis section on demand.
    pub fn set(
        &mut self,
        analysis: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.analyses
            .entry(analysis.into())
            .or_default()
            .insert(option.into(), value.into());
        self
    }

    pub fn analyses(&self) -> impl Iterator<Item = &str> {
        self.analyses.keys().map(|s| s.as_str())
    }

    /// Validate the options of one analysis. Absent sections yield the
    /// defaults.
    pub fn options_for(&self, analysis: &str) -> Result<AnalysisOptions, ConfigError> {
        let mut options = AnalysisOptions::default();
        let Some(section) = self.analyses.get(analysis) else {
            return Ok(options);
        };

        for (option, value) in section {
            match option.as_str() {
                "maxPathLength" => {
                    options.max_path_length = Some(parse_usize(option, value)?);
                }
                "maxTraces" => {
                    options.max_traces = parse_usize(option, value)?;
                }
                "sources" => {
                    options.sources = MatcherSet::compile(split_patterns(value))?;
                }
                "sinks" => {
                    options.sinks = MatcherSet::compile(split_patterns(value))?;
                }
                "sanitizers" => {
                    options.sanitizers = MatcherSet::compile(split_patterns(value))?;
                }
                _ => {
                    return Err(ConfigError::UnknownOption {
                        analysis: analysis.to_string(),
                        option: option.clone(),
                    });
                }
            }
        }

        Ok(options)
    }
}

/// Validated options for one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Bound on witness depth; a post-hoc filter on trace enumeration,
    /// never an edge-production bound.
    pub max_path_length: Option<usize>,

    /// Maximum number of enumerated traces per vulnerability.
    pub max_traces: usize,

    pub sources: MatcherSet,
    pub sinks: MatcherSet,
    pub sanitizers: MatcherSet,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_path_length: None,
            max_traces: DEFAULT_MAX_TRACES,
            sources: MatcherSet::default(),
            sinks: MatcherSet::default(),
            sanitizers: MatcherSet::default(),
        }
    }
}

fn parse_usize(option: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn split_patterns(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
