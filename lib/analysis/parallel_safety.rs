//! Parallel-safety inference.
//!
//! Decides, per function, whether it is safe to run on parallel query
//! workers. A function is unsafe once it can reach an exception handler, can
//! issue a mutating query (recognized by an `update` string constant), or
//! calls anything unsafe. The safety value reuses the determinism lattice
//! shape — Det as "safe", NotDet as "unsafe" — over its own lattice
//! instance.
//!
//! Summary direction: joined up from Bottom.

use crate::analysis::call_graph::CallGraph;
use crate::analysis::config::AnalysisConfig;
use crate::analysis::determinism::{determinism_lattice, Determinism, DeterminismValue};
use crate::analysis::fixpoint::{IntraproceduralAnalysis, MonotonicFixpointIterator};
use crate::analysis::interprocedural::{
    AnalyzedFunction, InterproceduralAnalysis, InterproceduralAnalyzer, Outcome, OverrideTable,
    SummaryQuery,
};
use crate::domain::{AbstractDomain, FiniteValue, Lattice, Partition, ReducedProduct};
use crate::il::{self, FunctionId, Operation, ParamIndex};
use crate::Error;
use log::trace;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type Components = (DeterminismValue, DeterminismValue);

fn no_reduction(_: &mut Components) {}

/// The transfer state: the safety of the path so far, and the safety
/// observed at return points.
#[derive(Clone, Debug, PartialEq)]
struct SafetyState {
    product: ReducedProduct<Components>,
}

impl SafetyState {
    fn top(lattice: &Arc<Lattice<Determinism>>) -> SafetyState {
        SafetyState {
            product: ReducedProduct::new(
                (FiniteValue::top(lattice), FiniteValue::top(lattice)),
                no_reduction,
            ),
        }
    }

    fn safety(&self) -> DeterminismValue {
        self.product.components().0.clone()
    }

    fn set_safety(&mut self, value: &DeterminismValue) {
        self.product.apply(|components| {
            components.0.set_to_top();
            components.0.meet_with(value);
        });
    }

    /// Fold a callee's effect into the path safety. Unsafe is absorbing,
    /// then unknown; a safe path takes the effect as-is.
    fn taint(&mut self, effect: &DeterminismValue, unsafe_value: &DeterminismValue) {
        let current = self.safety();
        let value = if current == *unsafe_value || *effect == *unsafe_value {
            unsafe_value.clone()
        } else if current.is_top() || effect.is_top() {
            let mut top = effect.clone();
            top.set_to_top();
            top
        } else {
            effect.clone()
        };
        self.set_safety(&value);
    }

    fn returned(&self) -> DeterminismValue {
        self.product.components().1.clone()
    }

    fn observe_return(&mut self) {
        let safety = self.safety();
        self.product.apply(|components| {
            components.1.set_to_top();
            components.1.meet_with(&safety);
        });
    }
}

impl AbstractDomain for SafetyState {
    fn is_bottom(&self) -> bool {
        self.product.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.product.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        self.product.leq(&other.product)
    }

    fn join_with(&mut self, other: &Self) {
        self.product.join_with(&other.product);
    }

    fn meet_with(&mut self, other: &Self) {
        self.product.meet_with(&other.product);
    }

    fn set_to_bottom(&mut self) {
        self.product.set_to_bottom();
    }

    fn set_to_top(&mut self) {
        self.product.set_to_top();
    }
}

struct SafetyScan<'a, 'q> {
    analysis: &'a ParallelSafetyAnalysis,
    summary_query: Option<&'q dyn Fn(&il::Instruction) -> DeterminismValue>,
}

impl IntraproceduralAnalysis for SafetyScan<'_, '_> {
    type State = SafetyState;

    fn analyze_node(&self, block: &il::Block, state: &mut SafetyState) -> Result<(), Error> {
        // Reaching an exception handler already makes the function unsafe;
        // its instructions cannot redeem it.
        if block.starts_with_move_exception() {
            state.set_safety(&self.analysis.unsafe_value);
            return Ok(());
        }
        for instruction in block.instructions() {
            self.analyze_instruction(instruction, state)?;
        }
        Ok(())
    }

    fn analyze_instruction(
        &self,
        instruction: &il::Instruction,
        state: &mut SafetyState,
    ) -> Result<(), Error> {
        match *instruction.operation() {
            Operation::Invoke { .. } => {
                // A call is as unsafe as its callee; an unresolvable callee
                // is assumed unsafe.
                let effect = match self.summary_query {
                    Some(query) => query(instruction),
                    None => self.analysis.unsafe_value.clone(),
                };
                state.taint(&effect, &self.analysis.unsafe_value);
            }
            Operation::ConstString { ref value, .. } => {
                if value.contains("update") {
                    state.set_safety(&self.analysis.unsafe_value);
                }
            }
            Operation::Return { .. } | Operation::ReturnVoid => {
                state.observe_return();
            }
            _ => {}
        }
        Ok(())
    }
}

/// The parallel-safety analysis.
pub struct ParallelSafetyAnalysis {
    lattice: Arc<Lattice<Determinism>>,
    safe_value: DeterminismValue,
    unsafe_value: DeterminismValue,
}

impl ParallelSafetyAnalysis {
    pub fn new() -> Result<ParallelSafetyAnalysis, Error> {
        // A fresh lattice instance; independent of any determinism run in
        // the same process.
        let lattice = determinism_lattice()?;
        let safe_value = FiniteValue::new(&lattice, Determinism::Det)?;
        let unsafe_value = FiniteValue::new(&lattice, Determinism::NotDet)?;
        Ok(ParallelSafetyAnalysis {
            lattice,
            safe_value,
            unsafe_value,
        })
    }

    pub fn lattice(&self) -> &Arc<Lattice<Determinism>> {
        &self.lattice
    }

    fn entry_state(&self) -> SafetyState {
        let mut state = SafetyState::top(&self.lattice);
        state.set_safety(&self.safe_value);
        state
    }

    fn run_body(
        &self,
        function: &il::Function,
        summary_query: Option<&dyn Fn(&il::Instruction) -> DeterminismValue>,
    ) -> Result<DeterminismValue, Error> {
        let scan = SafetyScan {
            analysis: self,
            summary_query,
        };
        let mut iterator =
            MonotonicFixpointIterator::new(&scan, function.control_flow_graph());
        iterator.run(self.entry_state())?;

        let mut summary = FiniteValue::bottom(&self.lattice);
        if let Some(exit_state) = iterator.joined_return_state() {
            summary.join_with(&exit_state.returned());
        }
        trace!(
            "{} parallel safety {}",
            function.qualified_name(),
            summary
        );
        Ok(summary)
    }
}

impl InterproceduralAnalysis for ParallelSafetyAnalysis {
    type Summary = DeterminismValue;
    type Context = Partition<ParamIndex, DeterminismValue>;

    fn top_summary(&self) -> DeterminismValue {
        FiniteValue::top(&self.lattice)
    }

    fn initial_context(&self) -> Self::Context {
        Partition::bottom(FiniteValue::bottom(&self.lattice))
    }

    fn analyze_function(
        &self,
        function: &il::Function,
        _context: &Self::Context,
        summaries: &SummaryQuery<Self>,
    ) -> Result<AnalyzedFunction<DeterminismValue, Self::Context>, Error> {
        let query = |instruction: &il::Instruction| summaries.query(instruction);
        let summary = self.run_body(function, Some(&query))?;
        Ok(AnalyzedFunction {
            summary,
            call_site_contexts: Vec::new(),
        })
    }
}

/// The result of a parallel-safety run. `Det` reads as "safe", `NotDet` as
/// "unsafe", `Top` as unknown.
#[derive(Clone, Debug)]
pub struct ParallelSafetyResults {
    pub summaries: FxHashMap<FunctionId, Determinism>,
    pub outcome: Outcome,
}

/// Run the parallel-safety analysis over a whole program.
pub fn analyze(
    program: &il::Program,
    config: &AnalysisConfig,
) -> Result<ParallelSafetyResults, Error> {
    let analysis = ParallelSafetyAnalysis::new()?;
    let call_graph = CallGraph::build(program, config.override_threshold)?;
    let mut analyzer = InterproceduralAnalyzer::new(
        program,
        &call_graph,
        &analysis,
        OverrideTable::new(),
        config.max_iteration,
    )?;
    let outcome = analyzer.run()?;
    let summaries = analyzer
        .summaries()
        .into_iter()
        .map(|(function, value)| (function, value.element()))
        .collect();
    Ok(ParallelSafetyResults { summaries, outcome })
}
