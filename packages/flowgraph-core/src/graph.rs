/*
 * Application Graph contract
 *
 * The engine is generic over the program representation: it only needs
 * per-method entry/exit points, intra-procedural successors, the owning
 * method of a statement, and call-site resolution. Virtual dispatch is an
 * over-approximation: `callees` may return zero or more methods.
 *
 * Successor semantics: `successors` is intra-procedural. The successors of
 * a call site are its return sites, never the callee entry; the engine
 * opens interprocedural edges itself via `callees`/`entry_points`.
 *
 * All lookups return GraphResult so that an inconsistency (successor of a
 * non-existent statement, unknown method) can be confined to the enclosing
 * method instead of aborting the run.
 */

use std::fmt::Debug;
use std::hash::Hash;

use crate::errors::GraphResult;

/// Read-only view of the analysed program. Shared by every Runner, so
/// implementations must be safe for concurrent read-only use.
pub trait ApplicationGraph: Send + Sync + 'static {
    type Statement: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Method: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Entry statements of a method. Usually a single statement; empty for
    /// bodiless methods (abstract, native).
    fn entry_points(&self, method: &Self::Method) -> GraphResult<Vec<Self::Statement>>;

    /// Exit statements of a method.
    fn exit_points(&self, method: &Self::Method) -> GraphResult<Vec<Self::Statement>>;

    /// Intra-procedural CFG successors of a statement.
    fn successors(&self, stmt: &Self::Statement) -> GraphResult<Vec<Self::Statement>>;

    /// The method owning a statement.
    fn method_of(&self, stmt: &Self::Statement) -> GraphResult<Self::Method>;

    /// Resolved callees of a call site. Empty for library/unresolved calls;
    /// more than one target for virtual dispatch.
    fn callees(&self, stmt: &Self::Statement) -> GraphResult<Vec<Self::Method>>;

    /// Whether the statement is a call site.
    fn is_call(&self, stmt: &Self::Statement) -> bool;

    /// Whether the statement is an exit point of its method.
    fn is_exit(&self, stmt: &Self::Statement) -> bool {
        self.method_of(stmt)
            .and_then(|m| self.exit_points(&m))
            .map(|exits| exits.contains(stmt))
            .unwrap_or(false)
    }

    /// Source text of a statement, for report rendering.
    fn statement_text(&self, stmt: &Self::Statement) -> String;

    /// Source line of a statement. Implementations without position
    /// information may return 0.
    fn line_of(&self, stmt: &Self::Statement) -> i32 {
        0
    }

    /// Display name of a method, for report rendering.
    fn method_name(&self, method: &Self::Method) -> String;
}
