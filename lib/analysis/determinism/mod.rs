//! Whole-program determinism inference.
//!
//! Infers, for every function, whether it always computes the same output
//! from the same inputs. The intraprocedural half tracks an abstract
//! determinism value per register through each function body; the
//! interprocedural driver propagates per-function return summaries and
//! calling contexts bottom-up over the call graph until they stabilize.
//!
//! Summary direction: every function starts from an assumed-Top summary that
//! is *narrowed by meet* with the joined abstraction at its return points —
//! unlike the null-input and parallel-safety analyses, which join up from
//! Bottom. The asymmetry is deliberate and covered by tests here.

use crate::analysis::call_graph::CallGraph;
use crate::analysis::config::{AnalysisConfig, SummaryLabel};
use crate::analysis::interprocedural::{
    AnalyzedFunction, InterproceduralAnalysis, InterproceduralAnalyzer, Outcome, OverrideTable,
    SummaryQuery,
};
use crate::domain::{FiniteValue, Lattice, Partition};
use crate::il::{self, FunctionId, ParamIndex};
use crate::Error;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod intra;

pub(crate) use self::intra::Analyzer;

/// The determinism lattice: Det and NotDet are incomparable facts between
/// Bottom (unreachable) and Top (unknown).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Determinism {
    Bottom,
    Det,
    NotDet,
    Top,
}

/// Per-block exception reachability, used when `track_exception` is on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ExceptionState {
    Bottom,
    Unvisited,
    FromException,
    NoException,
    Top,
}

pub type DeterminismValue = FiniteValue<Determinism>;

/// The abstraction of the actual arguments visible to a callee at one call
/// site: parameter index to determinism value.
pub type CallingContext = Partition<ParamIndex, DeterminismValue>;

pub fn determinism_lattice() -> Result<Arc<Lattice<Determinism>>, Error> {
    Ok(Arc::new(Lattice::new(
        &[
            Determinism::Bottom,
            Determinism::Det,
            Determinism::NotDet,
            Determinism::Top,
        ],
        &[
            (Determinism::Bottom, Determinism::Det),
            (Determinism::Bottom, Determinism::NotDet),
            (Determinism::Det, Determinism::Top),
            (Determinism::NotDet, Determinism::Top),
        ],
    )?))
}

pub fn exception_lattice() -> Result<Arc<Lattice<ExceptionState>>, Error> {
    Ok(Arc::new(Lattice::new(
        &[
            ExceptionState::Bottom,
            ExceptionState::Unvisited,
            ExceptionState::FromException,
            ExceptionState::NoException,
            ExceptionState::Top,
        ],
        &[
            (ExceptionState::Bottom, ExceptionState::Unvisited),
            (ExceptionState::Unvisited, ExceptionState::FromException),
            (ExceptionState::Unvisited, ExceptionState::NoException),
            (ExceptionState::FromException, ExceptionState::Top),
            (ExceptionState::NoException, ExceptionState::Top),
        ],
    )?))
}

/// The determinism analysis, instantiated once per run with its own lattice
/// instances.
pub struct DeterminismAnalysis {
    pub(crate) lattice: Arc<Lattice<Determinism>>,
    pub(crate) exception_lattice: Arc<Lattice<ExceptionState>>,
    pub(crate) track_exception: bool,
    pub(crate) reset_functions: FxHashSet<String>,
    pub(crate) det: DeterminismValue,
    pub(crate) not_det: DeterminismValue,
    pub(crate) unvisited: FiniteValue<ExceptionState>,
    pub(crate) from_exception: FiniteValue<ExceptionState>,
    pub(crate) no_exception: FiniteValue<ExceptionState>,
}

impl DeterminismAnalysis {
    pub fn new(config: &AnalysisConfig) -> Result<DeterminismAnalysis, Error> {
        let lattice = determinism_lattice()?;
        let exception_lattice = exception_lattice()?;
        let det = FiniteValue::new(&lattice, Determinism::Det)?;
        let not_det = FiniteValue::new(&lattice, Determinism::NotDet)?;
        let unvisited = FiniteValue::new(&exception_lattice, ExceptionState::Unvisited)?;
        let from_exception =
            FiniteValue::new(&exception_lattice, ExceptionState::FromException)?;
        let no_exception = FiniteValue::new(&exception_lattice, ExceptionState::NoException)?;
        Ok(DeterminismAnalysis {
            lattice,
            exception_lattice,
            track_exception: config.track_exception,
            reset_functions: config.reset_functions.clone(),
            det,
            not_det,
            unvisited,
            from_exception,
            no_exception,
        })
    }

    pub fn lattice(&self) -> &Arc<Lattice<Determinism>> {
        &self.lattice
    }

    /// The value a configured label forces.
    pub fn label_value(&self, label: SummaryLabel) -> DeterminismValue {
        match label {
            SummaryLabel::Det | SummaryLabel::ForceDet => self.det.clone(),
            SummaryLabel::NotDet => self.not_det.clone(),
            SummaryLabel::Top => FiniteValue::top(&self.lattice),
        }
    }

    /// The override table induced by the configuration's function labels.
    pub fn override_table(&self, config: &AnalysisConfig) -> OverrideTable<DeterminismValue> {
        let mut table = OverrideTable::new();
        for (name, &label) in &config.function_labels {
            table.insert(name.clone(), self.label_value(label));
        }
        table
    }
}

impl InterproceduralAnalysis for DeterminismAnalysis {
    type Summary = DeterminismValue;
    type Context = CallingContext;

    fn top_summary(&self) -> DeterminismValue {
        FiniteValue::top(&self.lattice)
    }

    fn initial_context(&self) -> CallingContext {
        Partition::bottom(FiniteValue::bottom(&self.lattice))
    }

    fn analyze_function(
        &self,
        function: &il::Function,
        context: &CallingContext,
        summaries: &SummaryQuery<Self>,
    ) -> Result<AnalyzedFunction<DeterminismValue, CallingContext>, Error> {
        let query = |instruction: &il::Instruction| summaries.query(instruction);
        let analyzer = Analyzer::new(self, function, Some(&query));
        let (summary, call_site_contexts) = analyzer.run(context)?;
        Ok(AnalyzedFunction {
            summary,
            call_site_contexts,
        })
    }
}

/// The result of a determinism run: one lattice element per function, plus
/// whether the run converged or hit the pass cap.
#[derive(Clone, Debug)]
pub struct DeterminismResults {
    pub summaries: FxHashMap<FunctionId, Determinism>,
    pub outcome: Outcome,
}

impl DeterminismResults {
    pub fn summary(&self, function: FunctionId) -> Determinism {
        self.summaries
            .get(&function)
            .copied()
            .unwrap_or(Determinism::Top)
    }
}

/// Run the determinism analysis over a whole program.
pub fn analyze(program: &il::Program, config: &AnalysisConfig) -> Result<DeterminismResults, Error> {
    let analysis = DeterminismAnalysis::new(config)?;
    let call_graph = CallGraph::build(program, config.override_threshold)?;
    let overrides = analysis.override_table(config);
    let mut analyzer = InterproceduralAnalyzer::new(
        program,
        &call_graph,
        &analysis,
        overrides,
        config.max_iteration,
    )?;
    let outcome = analyzer.run()?;
    let summaries = analyzer
        .summaries()
        .into_iter()
        .map(|(function, value)| (function, value.element()))
        .collect();
    Ok(DeterminismResults { summaries, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AbstractDomain;
    use crate::il::{ControlFlowGraph, Function};

    fn single_block_function<F: FnOnce(&mut crate::il::Block)>(
        name: &str,
        param_count: u32,
        build: F,
    ) -> Function {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        let entry = block.index();
        build(block);
        cfg.set_entry(entry).unwrap();
        Function::new("Udf", name, param_count, true, cfg)
    }

    #[test]
    fn constants_are_deterministic() {
        let function = single_block_function("constant", 0, |block| {
            block.constant(0, 42);
            block.ret(0);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Det);
    }

    #[test]
    fn unknown_calls_are_top() {
        // Without a summary query every call is an unknown external effect.
        let function = single_block_function("call", 0, |block| {
            block.invoke(
                crate::il::InvokeKind::Static,
                crate::il::MethodRef::new("Lib", "get"),
                vec![],
                Some(0),
            );
            block.ret(0);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Top);
    }

    #[test]
    fn void_functions_keep_the_top_assumption() {
        // The summary narrows from Top by meet; with no returned value there
        // is nothing to narrow with.
        let function = single_block_function("void", 0, |block| {
            block.constant(0, 1);
            block.ret_void();
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert!(summary.is_top());
    }

    #[test]
    fn parameters_default_to_deterministic_without_context() {
        let function = single_block_function("identity", 1, |block| {
            block.ret(0);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Det);
    }

    #[test]
    fn calling_context_constrains_parameters() {
        let function = single_block_function("identity", 1, |block| {
            block.ret(0);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let context = analysis
            .initial_context()
            .set(0, analysis.not_det.clone());
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&context).unwrap();
        assert_eq!(summary.element(), Determinism::NotDet);
    }

    #[test]
    fn field_values_flow_through_the_field_environment() {
        use crate::il::FieldId;
        let function = single_block_function("flow", 0, |block| {
            block.constant(1, 5);
            block.field_put(1, 0, FieldId(0));
            block.field_get(2, 0, FieldId(0));
            block.ret(2);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Det);
    }

    #[test]
    fn storing_an_unknown_value_contaminates_the_array() {
        let function = single_block_function("contaminate", 0, |block| {
            block.constant(1, 1);
            block.new_array(2, 1);
            block.invoke(
                crate::il::InvokeKind::Static,
                crate::il::MethodRef::new("Lib", "get"),
                vec![],
                Some(3),
            );
            block.constant(4, 0);
            block.array_put(3, 2, 4);
            block.array_get(5, 2, 4);
            block.ret(5);
        });
        let analysis = DeterminismAnalysis::new(&AnalysisConfig::new()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Top);
    }

    #[test]
    fn reset_functions_relabel_their_receiver() {
        let mut config = AnalysisConfig::new();
        config.reset_functions.insert("Builder.fill".to_string());
        // r0 becomes unknown through a call, then a reset call with known
        // arguments re-labels it.
        let function = single_block_function("reset", 0, |block| {
            block.invoke(
                crate::il::InvokeKind::Static,
                crate::il::MethodRef::new("Lib", "get"),
                vec![],
                Some(0),
            );
            block.constant(1, 5);
            block.invoke(
                crate::il::InvokeKind::Virtual,
                crate::il::MethodRef::new("Builder", "fill"),
                vec![0, 1],
                None,
            );
            block.ret(0);
        });
        let analysis = DeterminismAnalysis::new(&config.normalized().unwrap()).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let (summary, _) = analyzer.run(&analysis.initial_context()).unwrap();
        assert_eq!(summary.element(), Determinism::Det);
    }

    #[test]
    fn exception_blocks_enter_the_from_exception_state() {
        let mut config = AnalysisConfig::new();
        config.track_exception = true;

        let mut cfg = ControlFlowGraph::new();
        let body = cfg.new_block().unwrap();
        body.constant(0, 1);
        let body = body.index();
        let handler = cfg.new_block().unwrap();
        handler.move_exception(1);
        handler.ret(0);
        let handler = handler.index();
        let exit = cfg.new_block().unwrap();
        exit.ret(0);
        let exit = exit.index();
        cfg.throw_edge(body, handler).unwrap();
        cfg.goto_edge(body, exit).unwrap();
        cfg.set_entry(body).unwrap();
        let function = Function::new("Udf", "guarded", 0, true, cfg);

        let analysis = DeterminismAnalysis::new(&config).unwrap();
        let analyzer = Analyzer::new(&analysis, &function, None);
        let cfg = function.control_flow_graph();
        let mut iterator =
            crate::analysis::fixpoint::MonotonicFixpointIterator::new(&analyzer, cfg);
        iterator.run(analyzer_entry(&analysis, &analyzer)).unwrap();
        assert_eq!(
            iterator.exit_state_at(handler).unwrap().exception(),
            analysis.from_exception
        );
        assert_eq!(
            iterator.exit_state_at(exit).unwrap().exception(),
            analysis.no_exception
        );
    }

    fn analyzer_entry(
        analysis: &DeterminismAnalysis,
        _analyzer: &Analyzer,
    ) -> intra::DetState {
        let mut state = intra::DetState::top(analysis);
        state.set_exception(&analysis.unvisited);
        state
    }
}
