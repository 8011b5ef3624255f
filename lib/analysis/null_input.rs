//! Null-input satisfiability.
//!
//! Decides, per function, whether passing null for every parameter is
//! handled by an early guard that returns null — the shape databases expect
//! from a "RETURNS NULL ON NULL INPUT" user-defined function.
//!
//! The intraprocedural state is the set of registers proven to have been
//! null-checked on the current path. Blocks that are not part of a
//! null-check prologue (a chain of zero-test branches over parameter
//! registers feeding return-null blocks) collapse the state; branch edges
//! that take the "not null" direction drop their register again. The
//! function satisfies the property iff the checked set at its return points
//! covers every parameter.
//!
//! Summary direction: joined up from Bottom, unlike the determinism
//! analysis's meet-narrowing.

use crate::analysis::call_graph::CallGraph;
use crate::analysis::config::AnalysisConfig;
use crate::analysis::fixpoint::{IntraproceduralAnalysis, MonotonicFixpointIterator};
use crate::analysis::interprocedural::{
    AnalyzedFunction, InterproceduralAnalysis, InterproceduralAnalyzer, Outcome, SummaryQuery,
};
use crate::domain::{AbstractDomain, FiniteValue, Lattice, Partition, SetDomain};
use crate::il::{self, FunctionId, Operation, ParamIndex, Register, ZeroTest};
use crate::Error;
use log::trace;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sat and Unsat are incomparable facts between Bottom and Top.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum NullInput {
    Bottom,
    Sat,
    Unsat,
    Top,
}

pub type NullInputValue = FiniteValue<NullInput>;

pub fn null_input_lattice() -> Result<Arc<Lattice<NullInput>>, Error> {
    Ok(Arc::new(Lattice::new(
        &[
            NullInput::Bottom,
            NullInput::Sat,
            NullInput::Unsat,
            NullInput::Top,
        ],
        &[
            (NullInput::Bottom, NullInput::Sat),
            (NullInput::Bottom, NullInput::Unsat),
            (NullInput::Sat, NullInput::Top),
            (NullInput::Unsat, NullInput::Top),
        ],
    )?))
}

/// The set of registers proven null-checked on the current path.
type CheckedRegisters = SetDomain<Register>;

struct NullCheckScan<'a> {
    function: &'a il::Function,
}

impl<'a> NullCheckScan<'a> {
    fn is_zero_test(operation: &Operation) -> Option<(ZeroTest, Register)> {
        match *operation {
            Operation::IfZero { test, operand } if test == ZeroTest::Eq || test == ZeroTest::Ne => {
                Some((test, operand))
            }
            _ => None,
        }
    }
}

impl IntraproceduralAnalysis for NullCheckScan<'_> {
    type State = CheckedRegisters;

    fn analyze_instruction(
        &self,
        _instruction: &il::Instruction,
        _state: &mut CheckedRegisters,
    ) -> Result<(), Error> {
        // All reasoning is block-shaped; see analyze_node.
        Ok(())
    }

    fn analyze_node(&self, block: &il::Block, state: &mut CheckedRegisters) -> Result<(), Error> {
        let (first, last) = match (block.first_instruction(), block.last_instruction()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(()),
        };

        let continues_chain = matches!(first.operation(), Operation::Goto)
            || Self::is_zero_test(first.operation()).is_some();

        if !continues_chain {
            if last.is_return() {
                // A return block stays in the chain only if it returns the
                // null just produced: a lone return, or const-0 feeding it.
                let returns_null = block.instructions().len() == 1
                    || matches!(*first.operation(), Operation::Const { value: 0, .. });
                if !returns_null {
                    trace!("block {} is not a return-null block", block.index());
                    state.set_to_bottom();
                }
                return Ok(());
            }
            if Self::is_zero_test(last.operation()).is_some()
                && Some(block.index()) == self.function.control_flow_graph().entry()
            {
                // The first null-check block of the prologue.
            } else {
                trace!("block {} leaves the null-check prologue", block.index());
                state.set_to_bottom();
                return Ok(());
            }
        }

        // Record the register this block tests against null.
        if let Some((_, operand)) = Self::is_zero_test(last.operation()) {
            if state.is_bottom() {
                state.join_with(&SetDomain::empty());
            }
            state.add(operand);
        }
        Ok(())
    }

    fn analyze_edge(
        &self,
        edge: &il::Edge,
        exit_state: &CheckedRegisters,
    ) -> Result<CheckedRegisters, Error> {
        let mut state = exit_state.clone();
        // Only the edge that takes the "is null" direction of a zero test
        // keeps the tested register: the branch-true side of if-eqz, the
        // fallthrough of if-nez. Everything else drops it.
        let head = self.function.control_flow_graph().block(edge.head())?;
        if let Some(last) = head.last_instruction() {
            if let Some((test, operand)) = Self::is_zero_test(last.operation()) {
                let keeps = matches!(
                    (test, edge.kind()),
                    (ZeroTest::Eq, il::EdgeKind::BranchTrue) | (ZeroTest::Ne, il::EdgeKind::Goto)
                );
                if !keeps {
                    state.remove(&operand);
                }
            }
        }
        Ok(state)
    }
}

/// The null-input analysis.
pub struct NullInputAnalysis {
    lattice: Arc<Lattice<NullInput>>,
    sat: NullInputValue,
    unsat: NullInputValue,
}

impl NullInputAnalysis {
    pub fn new() -> Result<NullInputAnalysis, Error> {
        let lattice = null_input_lattice()?;
        let sat = FiniteValue::new(&lattice, NullInput::Sat)?;
        let unsat = FiniteValue::new(&lattice, NullInput::Unsat)?;
        Ok(NullInputAnalysis { lattice, sat, unsat })
    }

    pub fn lattice(&self) -> &Arc<Lattice<NullInput>> {
        &self.lattice
    }

    /// The parameter registers a caller could pass null for: every
    /// parameter, minus the receiver of a non-static function.
    fn nullable_parameters(function: &il::Function) -> Vec<Register> {
        let start = if function.is_static() { 0 } else { 1 };
        (start..function.param_count()).collect()
    }

    /// Analyze one function body; SAT iff the checked set at the return
    /// points covers every nullable parameter.
    pub fn analyze_function_body(
        &self,
        function: &il::Function,
    ) -> Result<NullInputValue, Error> {
        let scan = NullCheckScan { function };
        let mut iterator =
            MonotonicFixpointIterator::new(&scan, function.control_flow_graph());
        iterator.run(SetDomain::bottom())?;

        let checked = match iterator.joined_return_state() {
            Some(checked) => checked,
            None => return Ok(FiniteValue::bottom(&self.lattice)),
        };
        let satisfied = NullInputAnalysis::nullable_parameters(function)
            .iter()
            .all(|register| checked.contains(register));
        trace!(
            "{}: checked registers {:?}, satisfied {}",
            function.qualified_name(),
            checked,
            satisfied
        );
        Ok(if satisfied {
            self.sat.clone()
        } else {
            self.unsat.clone()
        })
    }
}

impl InterproceduralAnalysis for NullInputAnalysis {
    type Summary = NullInputValue;
    // The property is per-function; calling contexts carry nothing.
    type Context = Partition<ParamIndex, NullInputValue>;

    fn top_summary(&self) -> NullInputValue {
        FiniteValue::top(&self.lattice)
    }

    fn initial_context(&self) -> Self::Context {
        Partition::bottom(FiniteValue::bottom(&self.lattice))
    }

    fn analyze_function(
        &self,
        function: &il::Function,
        _context: &Self::Context,
        _summaries: &SummaryQuery<Self>,
    ) -> Result<AnalyzedFunction<NullInputValue, Self::Context>, Error> {
        let body_result = self.analyze_function_body(function)?;
        // The summary joins up from Bottom.
        let mut summary = FiniteValue::bottom(&self.lattice);
        summary.join_with(&body_result);
        Ok(AnalyzedFunction {
            summary,
            call_site_contexts: Vec::new(),
        })
    }
}

/// The result of a null-input run.
#[derive(Clone, Debug)]
pub struct NullInputResults {
    pub summaries: FxHashMap<FunctionId, NullInput>,
    pub outcome: Outcome,
}

/// Run the null-input analysis over a whole program.
pub fn analyze(program: &il::Program, config: &AnalysisConfig) -> Result<NullInputResults, Error> {
    let analysis = NullInputAnalysis::new()?;
    let call_graph = CallGraph::build(program, config.override_threshold)?;
    let mut analyzer = InterproceduralAnalyzer::new(
        program,
        &call_graph,
        &analysis,
        crate::analysis::interprocedural::OverrideTable::new(),
        config.max_iteration,
    )?;
    let outcome = analyzer.run()?;
    let summaries = analyzer
        .summaries()
        .into_iter()
        .map(|(function, value)| (function, value.element()))
        .collect();
    Ok(NullInputResults { summaries, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{ControlFlowGraph, Function};

    // if (p1 == null) return null; if (p2 == null) return null; <body>
    fn guarded_function(param_count: u32, guards: &[Register]) -> Function {
        let mut cfg = ControlFlowGraph::new();
        let mut check_blocks = Vec::new();
        for &register in guards {
            let block = cfg.new_block().unwrap();
            block.if_zero(ZeroTest::Eq, register);
            check_blocks.push(block.index());
        }
        let return_null = cfg.new_block().unwrap();
        return_null.constant(31, 0);
        return_null.ret(31);
        let return_null = return_null.index();
        let body = cfg.new_block().unwrap();
        body.constant(30, 7);
        body.ret(30);
        let body = body.index();

        for (i, &check) in check_blocks.iter().enumerate() {
            cfg.branch_true_edge(check, return_null).unwrap();
            let fallthrough = check_blocks.get(i + 1).copied().unwrap_or(body);
            cfg.goto_edge(check, fallthrough).unwrap();
        }
        cfg.set_entry(check_blocks[0]).unwrap();
        Function::new("Udf", "eval", param_count, true, cfg)
    }

    #[test]
    fn checking_every_parameter_is_sat() {
        let function = guarded_function(2, &[0, 1]);
        let analysis = NullInputAnalysis::new().unwrap();
        let result = analysis.analyze_function_body(&function).unwrap();
        assert_eq!(result.element(), NullInput::Sat);
    }

    #[test]
    fn missing_a_parameter_check_is_unsat() {
        let function = guarded_function(2, &[0]);
        let analysis = NullInputAnalysis::new().unwrap();
        let result = analysis.analyze_function_body(&function).unwrap();
        assert_eq!(result.element(), NullInput::Unsat);
    }

    #[test]
    fn no_guard_at_all_is_unsat() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.constant(5, 7);
        block.ret(5);
        let entry = block.index();
        cfg.set_entry(entry).unwrap();
        let function = Function::new("Udf", "eval", 1, true, cfg);
        let analysis = NullInputAnalysis::new().unwrap();
        let result = analysis.analyze_function_body(&function).unwrap();
        assert_eq!(result.element(), NullInput::Unsat);
    }

    #[test]
    fn parameterless_functions_are_trivially_sat() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.constant(0, 7);
        block.ret(0);
        let entry = block.index();
        cfg.set_entry(entry).unwrap();
        let function = Function::new("Udf", "eval", 0, true, cfg);
        let analysis = NullInputAnalysis::new().unwrap();
        let result = analysis.analyze_function_body(&function).unwrap();
        assert_eq!(result.element(), NullInput::Sat);
    }

    #[test]
    fn the_not_null_direction_drops_the_register() {
        // A single if-eqz whose *fallthrough* leads to the returning body:
        // the guard register must not count as checked there.
        let mut cfg = ControlFlowGraph::new();
        let check = cfg.new_block().unwrap();
        check.if_zero(ZeroTest::Eq, 0);
        let check = check.index();
        let return_null = cfg.new_block().unwrap();
        return_null.constant(31, 0);
        return_null.ret(31);
        let return_null = return_null.index();
        let body = cfg.new_block().unwrap();
        body.goto();
        body.ret(0);
        let body = body.index();
        cfg.branch_true_edge(check, return_null).unwrap();
        cfg.goto_edge(check, body).unwrap();
        cfg.set_entry(check).unwrap();
        let function = Function::new("Udf", "eval", 1, true, cfg);

        let scan = NullCheckScan {
            function: &function,
        };
        let mut iterator =
            MonotonicFixpointIterator::new(&scan, function.control_flow_graph());
        iterator.run(SetDomain::bottom()).unwrap();
        // Along the null path the register is checked.
        assert!(iterator.entry_state_at(return_null).unwrap().contains(&0));
        // Along the fallthrough it is not.
        assert!(!iterator.entry_state_at(body).unwrap().contains(&0));
    }
}
