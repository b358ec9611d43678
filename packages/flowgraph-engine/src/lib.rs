/*
 * flowgraph-engine
 *
 * Message-based interprocedural IFDS solver:
 * - arena/     : deduplicated path-edge records + predecessor index
 * - runner     : per-unit tabulation worker
 * - manager    : runner spawning, message routing, quiescence detection
 * - messages   : the cross-unit protocol
 * - store      : shared summary store and incomplete-method registry
 * - result     : global aggregation over all units
 * - trace      : witness DAG reconstruction from the predecessor index
 * - report     : JSON vulnerability reports
 * - cancel     : cooperative cancellation
 *
 * The engine is generic over the program representation (ApplicationGraph)
 * and the dataflow domain (Analysis / Fact), both defined in
 * flowgraph-core.
 */

pub mod arena;
pub mod cancel;
pub mod manager;
pub mod messages;
pub mod report;
pub mod result;
mod runner;
pub mod store;
pub mod trace;

pub use arena::{EdgeArena, EdgeId, EdgeRecord, Predecessor, Reason};
pub use cancel::CancellationToken;
pub use manager::{EngineError, IfdsManager};
pub use messages::{ManagerMessage, RunnerMessage};
pub use report::{build_reports, to_json, ReportOptions, VulnerabilityReport};
pub use result::{IfdsResult, IfdsStatistics};
pub use store::{IncompleteRegistry, SummaryStore};
pub use trace::TraceGraph;
