/*
 * Minimal three-address program representation
 *
 * Just enough structure to exercise the engine end-to-end: straight-line
 * instructions with explicit successor overrides for branches, a
 * name-keyed dispatch table (virtual dispatch over-approximation: one
 * name may resolve to several bodies; library names resolve to none), and
 * an ApplicationGraph view over the whole thing.
 */

use rustc_hash::FxHashMap;

use flowgraph_core::{ApplicationGraph, GraphError, GraphResult, MethodMeta};

/// Fully qualified method identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    pub package: String,
    pub class: String,
    pub name: String,
}

impl MethodSig {
    pub fn new(
        package: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        let mut out = String::new();
        if !self.package.is_empty() {
            out.push_str(&self.package);
            out.push('.');
        }
        if !self.class.is_empty() {
            out.push_str(&self.class);
            out.push('.');
        }
        out.push_str(&self.name);
        out
    }
}

impl MethodMeta for MethodSig {
    fn package_name(&self) -> &str {
        &self.package
    }

    fn class_name(&self) -> &str {
        &self.class
    }
}

/// Statement identity: a method plus an instruction index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StmtId {
    pub method: MethodSig,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instr {
    /// `lhs = <const>`
    Const { lhs: String },

    /// `lhs = rhs`
    Assign { lhs: String, rhs: String },

    /// `lhs = callee(args)` or `callee(args)`
    Call {
        lhs: Option<String>,
        callee: String,
        args: Vec<String>,
    },

    /// `return value` / `return`
    Return { value: Option<String> },

    /// Nondeterministic branch; targets come from explicit edges.
    Branch,
}

impl Instr {
    fn render(&self) -> String {
        match self {
            Instr::Const { lhs } => format!("{} = const", lhs),
            Instr::Assign { lhs, rhs } => format!("{} = {}", lhs, rhs),
            Instr::Call { lhs, callee, args } => {
                let call = format!("{}({})", callee, args.join(", "));
                match lhs {
                    Some(lhs) => format!("{} = {}", lhs, call),
                    None => call,
                }
            }
            Instr::Return { value } => match value {
                Some(value) => format!("return {}", value),
                None => "return".to_string(),
            },
            Instr::Branch => "if (*)".to_string(),
        }
    }
}

/// One method body with its explicit CFG.
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub sig: MethodSig,
    pub params: Vec<String>,
    pub instrs: Vec<Instr>,
    pub succs: Vec<Vec<usize>>,
}

impl MethodBody {
    fn exits(&self) -> Vec<usize> {
        let returns: Vec<usize> = self
            .instrs
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i, Instr::Return { .. }))
            .map(|(i, _)| i)
            .collect();
        if !returns.is_empty() {
            return returns;
        }
        // a body without returns falls off its last instruction
        if self.instrs.is_empty() {
            Vec::new()
        } else {
            vec![self.instrs.len() - 1]
        }
    }
}

/// Builder for one method. Instructions default to fall-through control
/// flow; `edge` overrides the successors of a statement (for branches and
/// joins).
pub struct MethodBuilder {
    sig: MethodSig,
    params: Vec<String>,
    instrs: Vec<Instr>,
    explicit: FxHashMap<usize, Vec<usize>>,
}

impl MethodBuilder {
    pub fn new(
        package: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            sig: MethodSig::new(package, class, name),
            params: Vec::new(),
            instrs: Vec::new(),
            explicit: FxHashMap::default(),
        }
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn constant(mut self, lhs: impl Into<String>) -> Self {
        self.instrs.push(Instr::Const { lhs: lhs.into() });
        self
    }

    pub fn assign(mut self, lhs: impl Into<String>, rhs: impl Into<String>) -> Self {
        self.instrs.push(Instr::Assign {
            lhs: lhs.into(),
            rhs: rhs.into(),
        });
        self
    }

    pub fn call(
        mut self,
        lhs: impl Into<String>,
        callee: impl Into<String>,
        args: &[&str],
    ) -> Self {
        self.instrs.push(Instr::Call {
            lhs: Some(lhs.into()),
            callee: callee.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn call_void(mut self, callee: impl Into<String>, args: &[&str]) -> Self {
        self.instrs.push(Instr::Call {
            lhs: None,
            callee: callee.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn ret(mut self, value: impl Into<String>) -> Self {
        self.instrs.push(Instr::Return {
            value: Some(value.into()),
        });
        self
    }

    pub fn ret_void(mut self) -> Self {
        self.instrs.push(Instr::Return { value: None });
        self
    }

    pub fn branch(mut self) -> Self {
        self.instrs.push(Instr::Branch);
        self
    }

    /// Explicit CFG edge. The first explicit edge for a statement
    /// replaces its fall-through successor.
    pub fn edge(mut self, from: usize, to: usize) -> Self {
        self.explicit.entry(from).or_default().push(to);
        self
    }

    pub fn build(self) -> MethodBody {
        let len = self.instrs.len();
        let succs = (0..len)
            .map(|i| {
                if let Some(targets) = self.explicit.get(&i) {
                    targets.clone()
                } else if matches!(self.instrs[i], Instr::Return { .. }) || i + 1 >= len {
                    Vec::new()
                } else {
                    vec![i + 1]
                }
            })
            .collect();

        MethodBody {
            sig: self.sig,
            params: self.params,
            instrs: self.instrs,
            succs,
        }
    }
}

/// A whole program: method bodies plus the dispatch table.
#[derive(Debug, Clone, Default)]
pub struct Program {
    methods: FxHashMap<MethodSig, MethodBody>,
    dispatch: FxHashMap<String, Vec<MethodSig>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body. The method becomes a dispatch target for its bare
    /// name; several bodies may share a name (virtual overrides).
    pub fn add_method(&mut self, body: MethodBody) -> &mut Self {
        self.dispatch
            .entry(body.sig.name.clone())
            .or_default()
            .push(body.sig.clone());
        self.methods.insert(body.sig.clone(), body);
        self
    }

    pub fn method(&self, sig: &MethodSig) -> Option<&MethodBody> {
        self.methods.get(sig)
    }

    pub fn instr(&self, stmt: &StmtId) -> Option<&Instr> {
        self.methods
            .get(&stmt.method)
            .and_then(|body| body.instrs.get(stmt.index))
    }

    pub fn params(&self, sig: &MethodSig) -> &[String] {
        self.methods
            .get(sig)
            .map(|body| body.params.as_slice())
            .unwrap_or(&[])
    }

    /// Dispatch targets for a callee name; empty for library calls.
    pub fn targets(&self, callee: &str) -> &[MethodSig] {
        self.dispatch
            .get(callee)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn body(&self, sig: &MethodSig) -> GraphResult<&MethodBody> {
        self.methods
            .get(sig)
            .ok_or_else(|| GraphError::UnknownMethod(sig.qualified_name()))
    }

    fn body_of(&self, stmt: &StmtId) -> GraphResult<&MethodBody> {
        let body = self.body(&stmt.method)?;
        if stmt.index >= body.instrs.len() {
            return Err(GraphError::UnknownStatement(format!(
                "{}:{}",
                stmt.method.qualified_name(),
                stmt.index
            )));
        }
        Ok(body)
    }
}

impl ApplicationGraph for Program {
    type Statement = StmtId;
    type Method = MethodSig;

    fn entry_points(&self, method: &MethodSig) -> GraphResult<Vec<StmtId>> {
        let body = self.body(method)?;
        if body.instrs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![StmtId {
            method: method.clone(),
            index: 0,
        }])
    }

    fn exit_points(&self, method: &MethodSig) -> GraphResult<Vec<StmtId>> {
        let body = self.body(method)?;
        Ok(body
            .exits()
            .into_iter()
            .map(|index| StmtId {
                method: method.clone(),
                index,
            })
            .collect())
    }

    fn successors(&self, stmt: &StmtId) -> GraphResult<Vec<StmtId>> {
        let body = self.body_of(stmt)?;
        Ok(body.succs[stmt.index]
            .iter()
            .map(|&index| StmtId {
                method: stmt.method.clone(),
                index,
            })
            .collect())
    }

    fn method_of(&self, stmt: &StmtId) -> GraphResult<MethodSig> {
        self.body_of(stmt)?;
        Ok(stmt.method.clone())
    }

    fn callees(&self, stmt: &StmtId) -> GraphResult<Vec<MethodSig>> {
        match self.instr(stmt) {
            Some(Instr::Call { callee, .. }) => Ok(self.targets(callee).to_vec()),
            Some(_) => Ok(Vec::new()),
            None => Err(GraphError::UnknownStatement(format!(
                "{}:{}",
                stmt.method.qualified_name(),
                stmt.index
            ))),
        }
    }

    fn is_call(&self, stmt: &StmtId) -> bool {
        matches!(self.instr(stmt), Some(Instr::Call { .. }))
    }

    fn statement_text(&self, stmt: &StmtId) -> String {
        self.instr(stmt)
            .map(|i| i.render())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn line_of(&self, stmt: &StmtId) -> i32 {
        stmt.index as i32 + 1
    }

    fn method_name(&self, method: &MethodSig) -> String {
        method.qualified_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_main() -> Program {
        let mut program = Program::new();
        program.add_method(
            MethodBuilder::new("app", "Main", "main")
                .call("x", "source", &[])
                .assign("y", "x")
                .call_void("sink", &["y"])
                .build(),
        );
        program
    }

    #[test]
    fn test_entry_and_exit_points() {
        let program = linear_main();
        let main = MethodSig::new("app", "Main", "main");

        let entries = program.entry_points(&main).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 0);

        // no return instruction: falls off the last statement
        let exits = program.exit_points(&main).unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].index, 2);
    }

    #[test]
    fn test_fallthrough_successors() {
        let program = linear_main();
        let main = MethodSig::new("app", "Main", "main");

        let s0 = StmtId { method: main.clone(), index: 0 };
        let succs = program.successors(&s0).unwrap();
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].index, 1);
    }

    #[test]
    fn test_explicit_branch_edges() {
        let mut program = Program::new();
        program.add_method(
            MethodBuilder::new("app", "Main", "choose")
                .param("x")
                .branch()
                .ret("x")
                .constant("c")
                .ret("c")
                .edge(0, 1)
                .edge(0, 2)
                .build(),
        );
        let sig = MethodSig::new("app", "Main", "choose");

        let s0 = StmtId { method: sig.clone(), index: 0 };
        let succs = program.successors(&s0).unwrap();
        assert_eq!(
            succs.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let exits = program.exit_points(&sig).unwrap();
        assert_eq!(
            exits.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_dispatch_over_approximates() {
        let mut program = Program::new();
        program.add_method(
            MethodBuilder::new("app", "A", "m").param("a").ret("a").build(),
        );
        program.add_method(
            MethodBuilder::new("app", "B", "m")
                .param("b")
                .constant("c")
                .ret("c")
                .build(),
        );
        program.add_method(
            MethodBuilder::new("app", "Main", "main")
                .call("y", "m", &["x"])
                .build(),
        );

        let call = StmtId {
            method: MethodSig::new("app", "Main", "main"),
            index: 0,
        };
        let callees = program.callees(&call).unwrap();
        assert_eq!(callees.len(), 2);

        // library names resolve to nothing
        assert!(program.targets("source").is_empty());
    }

    #[test]
    fn test_unknown_statement_is_inconsistency() {
        let program = linear_main();
        let bogus = StmtId {
            method: MethodSig::new("app", "Main", "main"),
            index: 99,
        };

        assert!(matches!(
            program.successors(&bogus),
            Err(GraphError::UnknownStatement(_))
        ));
    }

    #[test]
    fn test_statement_rendering() {
        let program = linear_main();
        let main = MethodSig::new("app", "Main", "main");

        let s0 = StmtId { method: main.clone(), index: 0 };
        assert_eq!(program.statement_text(&s0), "x = source()");
        let s2 = StmtId { method: main.clone(), index: 2 };
        assert_eq!(program.statement_text(&s2), "sink(y)");
        assert_eq!(program.line_of(&s2), 3);
        assert_eq!(program.method_name(&main), "app.Main.main");
    }
}
