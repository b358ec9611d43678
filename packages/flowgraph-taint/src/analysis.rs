/*
 * Taint flow functions
 *
 * Facts are tainted variables. Assignments propagate taint and strong
 * updates kill it; calls split three ways:
 * - resolved calls leave the result to the callee's summaries (the
 *   call-to-return path kills the overwritten result),
 * - unresolved source calls generate taint into the result,
 * - unresolved sanitiser calls leave the result clean,
 * - any other unresolved call conservatively carries argument taint into
 *   the result.
 *
 * Call-to-start maps actuals to formals by position; exit-to-return-site
 * maps the returned variable back into the call's result.
 */

use std::sync::Arc;

use flowgraph_core::{Analysis, FlowError, FlowResult, SinkMatch};

use crate::fact::TaintFact;
use crate::program::{Instr, Program, StmtId};
use crate::rules::TaintRules;

pub struct TaintAnalysis {
    program: Arc<Program>,
    rules: TaintRules,
}

impl TaintAnalysis {
    pub fn new(program: Arc<Program>, rules: TaintRules) -> Self {
        Self { program, rules }
    }

    fn instr(&self, stmt: &StmtId, function: &'static str) -> FlowResult<&Instr> {
        self.program
            .instr(stmt)
            .ok_or_else(|| FlowError::new(function, format!("no instruction at {:?}", stmt)))
    }
}

impl Analysis<Program> for TaintAnalysis {
    type Fact = TaintFact;

    fn name(&self) -> &str {
        "taint"
    }

    fn sequent(
        &self,
        current: &StmtId,
        _next: &StmtId,
        fact: &TaintFact,
    ) -> FlowResult<Vec<TaintFact>> {
        let instr = self.instr(current, "sequent")?;
        let TaintFact::Tainted { variable } = fact else {
            return Ok(vec![TaintFact::Zero]);
        };

        Ok(match instr {
            Instr::Const { lhs } => {
                if lhs == variable {
                    vec![]
                } else {
                    vec![fact.clone()]
                }
            }
            Instr::Assign { lhs, rhs } => {
                if rhs == variable {
                    if lhs == rhs {
                        vec![fact.clone()]
                    } else {
                        vec![fact.clone(), TaintFact::tainted(lhs.clone())]
                    }
                } else if lhs == variable {
                    vec![]
                } else {
                    vec![fact.clone()]
                }
            }
            Instr::Call { .. } | Instr::Return { .. } | Instr::Branch => vec![fact.clone()],
        })
    }

    fn call_to_return(
        &self,
        call: &StmtId,
        _return_site: &StmtId,
        fact: &TaintFact,
    ) -> FlowResult<Vec<TaintFact>> {
        let instr = self.instr(call, "callToReturn")?;
        let Instr::Call { lhs, callee, args } = instr else {
            return Err(FlowError::new("callToReturn", "statement is not a call"));
        };
        let resolved = !self.program.targets(callee).is_empty();

        let TaintFact::Tainted { variable } = fact else {
            // taint is born here: an unresolved source call taints its result
            let mut out = vec![TaintFact::Zero];
            if !resolved && self.rules.is_source(callee) {
                if let Some(lhs) = lhs {
                    out.push(TaintFact::tainted(lhs.clone()));
                }
            }
            return Ok(out);
        };

        // the call overwrites its result; summaries or the cases below
        // re-establish it
        let mut out = if lhs.as_deref() == Some(variable.as_str()) {
            vec![]
        } else {
            vec![fact.clone()]
        };

        if !resolved
            && !self.rules.is_sanitizer(callee)
            && !self.rules.is_source(callee)
            && args.iter().any(|a| a == variable)
        {
            // unknown library call: taint flows from arguments to result
            if let Some(lhs) = lhs {
                out.push(TaintFact::tainted(lhs.clone()));
            }
        }

        Ok(out)
    }

    fn call_to_start(
        &self,
        call: &StmtId,
        callee_entry: &StmtId,
        fact: &TaintFact,
    ) -> FlowResult<Vec<TaintFact>> {
        let instr = self.instr(call, "callToStart")?;
        let Instr::Call { args, .. } = instr else {
            return Err(FlowError::new("callToStart", "statement is not a call"));
        };

        let TaintFact::Tainted { variable } = fact else {
            return Ok(vec![TaintFact::Zero]);
        };

        let params = self.program.params(&callee_entry.method);
        Ok(args
            .iter()
            .zip(params)
            .filter(|(arg, _)| *arg == variable)
            .map(|(_, param)| TaintFact::tainted(param.clone()))
            .collect())
    }

    fn exit_to_return_site(
        &self,
        call: &StmtId,
        _return_site: &StmtId,
        exit: &StmtId,
        fact: &TaintFact,
    ) -> FlowResult<Vec<TaintFact>> {
        let call_instr = self.instr(call, "exitToReturnSite")?;
        let Instr::Call { lhs, .. } = call_instr else {
            return Err(FlowError::new("exitToReturnSite", "statement is not a call"));
        };

        let TaintFact::Tainted { variable } = fact else {
            return Ok(vec![TaintFact::Zero]);
        };

        let returned = match self.instr(exit, "exitToReturnSite")? {
            Instr::Return { value } => value.as_deref(),
            // falling off a body without a return yields nothing
            _ => None,
        };

        Ok(match (returned, lhs) {
            (Some(returned), Some(lhs)) if returned == variable => {
                vec![TaintFact::tainted(lhs.clone())]
            }
            _ => vec![],
        })
    }

    fn sink(&self, stmt: &StmtId, fact: &TaintFact) -> Option<SinkMatch> {
        let TaintFact::Tainted { variable } = fact else {
            return None;
        };
        let Some(Instr::Call { callee, args, .. }) = self.program.instr(stmt) else {
            return None;
        };
        if !self.rules.is_sink(callee) || !args.iter().any(|a| a == variable) {
            return None;
        }

        let mut hit = SinkMatch::new(
            "taint-flow",
            format!("tainted value `{}` reaches sink `{}`", variable, callee),
        );
        if let Some(rule) = self.rules.sink_rule(callee) {
            hit = hit.with_rule(rule);
        }
        Some(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::MethodBuilder;
    use flowgraph_core::Fact;

    fn fixture() -> (Arc<Program>, TaintAnalysis) {
        let mut program = Program::new();
        program.add_method(
            MethodBuilder::new("app", "Main", "main")
                .call("x", "source", &[])
                .assign("y", "x")
                .call("z", "sanitize", &["y"])
                .call("w", "mystery", &["y"])
                .call_void("sink", &["y"])
                .build(),
        );
        program.add_method(
            MethodBuilder::new("app", "Lib", "id")
                .param("a")
                .ret("a")
                .build(),
        );
        let program = Arc::new(program);
        let analysis = TaintAnalysis::new(Arc::clone(&program), TaintRules::defaults().unwrap());
        (program, analysis)
    }

    fn stmt(index: usize) -> StmtId {
        StmtId {
            method: crate::program::MethodSig::new("app", "Main", "main"),
            index,
        }
    }

    #[test]
    fn test_source_call_generates_taint() {
        let (_, analysis) = fixture();

        let out = analysis
            .call_to_return(&stmt(0), &stmt(1), &TaintFact::Zero)
            .unwrap();
        assert!(out.contains(&TaintFact::Zero));
        assert!(out.contains(&TaintFact::tainted("x")));
    }

    #[test]
    fn test_assignment_propagates_taint() {
        let (_, analysis) = fixture();

        let out = analysis
            .sequent(&stmt(1), &stmt(2), &TaintFact::tainted("x"))
            .unwrap();
        assert!(out.contains(&TaintFact::tainted("x")));
        assert!(out.contains(&TaintFact::tainted("y")));
    }

    #[test]
    fn test_sanitizer_keeps_result_clean() {
        let (_, analysis) = fixture();

        let out = analysis
            .call_to_return(&stmt(2), &stmt(3), &TaintFact::tainted("y"))
            .unwrap();
        assert!(out.contains(&TaintFact::tainted("y")));
        assert!(!out.contains(&TaintFact::tainted("z")));
    }

    #[test]
    fn test_unknown_call_carries_argument_taint() {
        let (_, analysis) = fixture();

        let out = analysis
            .call_to_return(&stmt(3), &stmt(4), &TaintFact::tainted("y"))
            .unwrap();
        assert!(out.contains(&TaintFact::tainted("y")));
        assert!(out.contains(&TaintFact::tainted("w")));
    }

    #[test]
    fn test_sink_detection() {
        let (_, analysis) = fixture();

        assert!(analysis.sink(&stmt(4), &TaintFact::tainted("y")).is_some());
        assert!(analysis.sink(&stmt(4), &TaintFact::tainted("q")).is_none());
        assert!(analysis.sink(&stmt(4), &TaintFact::zero()).is_none());
        // not a sink statement
        assert!(analysis.sink(&stmt(1), &TaintFact::tainted("y")).is_none());
    }

    #[test]
    fn test_call_to_start_maps_actuals_to_formals() {
        let (_, analysis) = fixture();
        let entry = StmtId {
            method: crate::program::MethodSig::new("app", "Lib", "id"),
            index: 0,
        };
        let call = StmtId {
            method: crate::program::MethodSig::new("app", "Main", "main"),
            index: 3,
        };

        // mystery(y) against id(a)'s formals: y -> a
        let out = analysis
            .call_to_start(&call, &entry, &TaintFact::tainted("y"))
            .unwrap();
        assert_eq!(out, vec![TaintFact::tainted("a")]);

        let none = analysis
            .call_to_start(&call, &entry, &TaintFact::tainted("q"))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_exit_to_return_site_maps_return_value() {
        let (_, analysis) = fixture();
        let call = stmt(3);
        let exit = StmtId {
            method: crate::program::MethodSig::new("app", "Lib", "id"),
            index: 1,
        };

        let out = analysis
            .exit_to_return_site(&call, &stmt(4), &exit, &TaintFact::tainted("a"))
            .unwrap();
        assert_eq!(out, vec![TaintFact::tainted("w")]);

        let none = analysis
            .exit_to_return_site(&call, &stmt(4), &exit, &TaintFact::tainted("b"))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_flow_error_on_bogus_statement() {
        let (_, analysis) = fixture();
        let bogus = stmt(42);

        assert!(analysis
            .sequent(&bogus, &stmt(0), &TaintFact::zero())
            .is_err());
    }
}
