/*
 * flowgraph-taint
 *
 * Taint analysis over the flowgraph IFDS engine:
 * - fact      : tainted-variable facts
 * - rules     : source/sink/sanitiser classifiers (compiled glob patterns)
 * - analysis  : the five flow functions + sink detection
 * - program   : a small three-address IR with an ApplicationGraph view,
 *               used to drive the engine end-to-end
 */

pub mod analysis;
pub mod fact;
pub mod program;
pub mod rules;

pub use analysis::TaintAnalysis;
pub use fact::TaintFact;
pub use program::{Instr, MethodBody, MethodBuilder, MethodSig, Program, StmtId};
pub use rules::TaintRules;
