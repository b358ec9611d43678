/*
 * flowgraph-core
 *
 * Data model and external-collaborator contracts for the flowgraph IFDS
 * engine:
 * - model/      : Vertex, Edge, Vulnerability values
 * - facts       : the Fact trait (powerset domain with union join)
 * - graph       : ApplicationGraph, the program view the engine runs over
 * - analysis    : the five flow functions + sink classification
 * - units       : unit ids and the built-in unit resolvers
 * - config      : string-keyed analysis options, validated at startup
 * - matchers    : glob-style method matchers compiled to regexes
 *
 * The engine itself lives in flowgraph-engine; concrete analyses provide
 * an Analysis impl and an ApplicationGraph impl.
 */

pub mod analysis;
pub mod config;
pub mod errors;
pub mod facts;
pub mod graph;
pub mod matchers;
pub mod model;
pub mod units;

pub use analysis::{Analysis, SinkMatch};
pub use config::{AnalysisConfig, AnalysisOptions, DEFAULT_MAX_TRACES};
pub use errors::{ConfigError, FlowError, FlowResult, GraphError, GraphResult};
pub use facts::Fact;
pub use graph::ApplicationGraph;
pub use matchers::{MatcherSet, MethodMatcher};
pub use model::{Edge, SummaryEdge, Vertex, Vulnerability};
pub use units::{
    resolver_from_name, ClassUnitResolver, MethodMeta, MethodUnitResolver, PackageUnitResolver,
    SingletonUnitResolver, UnitId, UnitResolver,
};
