/*
 * Vulnerability reports
 *
 * Flattens solver findings into the JSON result schema: one entry per
 * vulnerability with `vulnerabilityType`, `sources`, `sink` and `traces`
 * (a list of witness paths, each an ordered list of rendered
 * "method:line: statement" records). Trace graphs are independent per
 * vulnerability, so they are built in parallel.
 */

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use flowgraph_core::{AnalysisOptions, ApplicationGraph, Fact, Vertex, DEFAULT_MAX_TRACES};

use crate::result::IfdsResult;

/// Rendering bounds for trace enumeration.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Maximum number of enumerated traces per vulnerability.
    pub max_traces: usize,

    /// Bound on witness depth, applied after enumeration.
    pub max_path_length: Option<usize>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            max_traces: DEFAULT_MAX_TRACES,
            max_path_length: None,
        }
    }
}

impl From<&AnalysisOptions> for ReportOptions {
    fn from(options: &AnalysisOptions) -> Self {
        Self {
            max_traces: options.max_traces,
            max_path_length: options.max_path_length,
        }
    }
}

/// One reported finding, in the serialised result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityReport {
    pub vulnerability_type: String,
    pub sources: Vec<String>,
    pub sink: String,
    pub traces: Vec<Vec<String>>,
}

/// Build the report list for every vulnerability in the result.
pub fn build_reports<G, F>(
    graph: &G,
    result: &IfdsResult<G, F>,
    options: &ReportOptions,
) -> Vec<VulnerabilityReport>
where
    G: ApplicationGraph,
    F: Fact,
{
    result
        .vulnerabilities()
        .par_iter()
        .map(|vulnerability| {
            let trace_graph = result.trace_graph(&vulnerability.sink);

            let mut sources: Vec<String> = trace_graph
                .sources
                .iter()
                .map(|v| render_vertex(graph, v))
                .collect();
            sources.sort();

            let traces = trace_graph
                .traces(options.max_traces, options.max_path_length)
                .iter()
                .map(|trace| trace.iter().map(|v| render_vertex(graph, v)).collect())
                .collect();

            VulnerabilityReport {
                vulnerability_type: vulnerability.vulnerability_type.clone(),
                sources,
                sink: render_vertex(graph, &vulnerability.sink),
                traces,
            }
        })
        .collect()
}

/// Serialise reports to pretty-printed JSON.
pub fn to_json(reports: &[VulnerabilityReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

fn render_vertex<G, F>(graph: &G, vertex: &Vertex<G::Statement, F>) -> String
where
    G: ApplicationGraph,
    F: Fact,
{
    let method = graph
        .method_of(&vertex.statement)
        .map(|m| graph.method_name(&m))
        .unwrap_or_else(|_| "<unknown>".to_string());
    format!(
        "{}:{}: {}",
        method,
        graph.line_of(&vertex.statement),
        graph.statement_text(&vertex.statement)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialises_camel_case() {
        let report = VulnerabilityReport {
            vulnerability_type: "taint-flow".to_string(),
            sources: vec!["main:1: x = source()".to_string()],
            sink: "main:3: sink(y)".to_string(),
            traces: vec![vec![
                "main:1: x = source()".to_string(),
                "main:3: sink(y)".to_string(),
            ]],
        };

        let json = to_json(&[report]).unwrap();
        assert!(json.contains("\"vulnerabilityType\""));
        assert!(json.contains("\"sources\""));
        assert!(json.contains("\"sink\""));
        assert!(json.contains("\"traces\""));

        let parsed: Vec<VulnerabilityReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].vulnerability_type, "taint-flow");
    }

    #[test]
    fn test_report_options_from_analysis_options() {
        let mut analysis_options = AnalysisOptions::default();
        analysis_options.max_traces = 7;
        analysis_options.max_path_length = Some(20);

        let options = ReportOptions::from(&analysis_options);
        assert_eq!(options.max_traces, 7);
        assert_eq!(options.max_path_length, Some(20));
    }
}
