//! The bottom-up interprocedural analyzer.
//!
//! One pass analyzes every function in bottom-up call-graph order, feeding
//! each the calling context accumulated from its call sites and a summary
//! query over its callees. Passes repeat until a full pass leaves the summary
//! registry unchanged, or the pass cap is reached — in which case the last
//! summaries are still returned as a best-effort approximation.
//!
//! Within a pass, functions are analyzed on parallel workers. The bottom-up
//! ordering is advisory, not a barrier: a caller analyzed before its callee's
//! newest summary lands simply reads a slightly stale value, which the next
//! pass corrects — summaries only move monotonically and convergence is
//! re-checked globally.

use crate::analysis::call_graph::{CallGraph, CalleeSet};
use crate::analysis::registry::SummaryRegistry;
use crate::domain::AbstractDomain;
use crate::il::{self, FunctionId, InstructionId, MethodRef, Operation};
use crate::Error;
use dashmap::DashMap;
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Summaries forced by configuration, short-circuiting summary lookup for a
/// call site entirely. Keys are either exact qualified names (`Class.name`)
/// or class-wide wildcards (`Class*`).
#[derive(Clone, Debug, Default)]
pub struct OverrideTable<S> {
    entries: FxHashMap<String, S>,
}

impl<S> OverrideTable<S> {
    pub fn new() -> OverrideTable<S> {
        OverrideTable {
            entries: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, key: String, summary: S) {
        self.entries.insert(key, summary);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// An exact-name entry wins over the class wildcard.
    pub fn lookup(&self, target: &MethodRef) -> Option<&S> {
        self.entries
            .get(&target.qualified())
            .or_else(|| self.entries.get(&target.class_wildcard()))
    }
}

/// One resolved caller/callee pair at one call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallSite {
    pub caller: FunctionId,
    pub instruction: InstructionId,
    pub callee: FunctionId,
}

/// What the analysis of one function produced: its summary, and the calling
/// context it established at each of its call sites.
#[derive(Clone, Debug)]
pub struct AnalyzedFunction<S, C> {
    pub summary: S,
    pub call_site_contexts: Vec<(InstructionId, C)>,
}

/// A client analysis of the interprocedural analyzer.
pub trait InterproceduralAnalysis: Sync {
    type Summary: AbstractDomain + Send + Sync;
    type Context: AbstractDomain + Send + Sync;

    /// The summary assumed for callees that have not been analyzed yet, and
    /// the value unresolved queries normalize to. Conservatively Top.
    fn top_summary(&self) -> Self::Summary;

    /// The entry context of a function no call site has reached (yet).
    fn initial_context(&self) -> Self::Context;

    /// Analyze one function body under the given calling context, resolving
    /// callee effects through `summaries`.
    fn analyze_function(
        &self,
        function: &il::Function,
        context: &Self::Context,
        summaries: &SummaryQuery<Self>,
    ) -> Result<AnalyzedFunction<Self::Summary, Self::Context>, Error>;

    /// Map the context a caller established at a call site to the callee's
    /// entry context for that edge. Defaults to the identity.
    fn analyze_edge(
        &self,
        call_site: &CallSite,
        context_at_site: &Self::Context,
    ) -> Result<Self::Context, Error> {
        let _ = call_site;
        Ok(context_at_site.clone())
    }
}

/// Resolves the abstract effect of call instructions against the override
/// table, the call graph and the summary registry.
pub struct SummaryQuery<'a, A: InterproceduralAnalysis + ?Sized> {
    analysis: &'a A,
    registry: &'a SummaryRegistry<A::Summary>,
    call_graph: &'a CallGraph,
    overrides: &'a OverrideTable<A::Summary>,
    caller: FunctionId,
}

impl<'a, A: InterproceduralAnalysis + ?Sized> SummaryQuery<'a, A> {
    /// The joined summary of every statically resolved callee of this call
    /// instruction.
    ///
    /// A manual override for the callee's name short-circuits resolution
    /// entirely. Callees without a recorded summary count as Top, and an
    /// unresolved, opaque or would-be-Bottom result is normalized to Top —
    /// "no callee found" must never read as "callee never returns".
    pub fn query(&self, instruction: &il::Instruction) -> A::Summary {
        let target = match instruction.operation() {
            Operation::Invoke { target, .. } => target,
            _ => return self.analysis.top_summary(),
        };

        if let Some(forced) = self.overrides.lookup(target) {
            debug!("{}: summary forced by override table", target);
            return forced.clone();
        }

        match self.call_graph.callees(self.caller, instruction.id()) {
            Some(CalleeSet::Resolved(callees)) if !callees.is_empty() => {
                let mut result: Option<A::Summary> = None;
                for &callee in callees {
                    let summary = self.registry.get(callee, self.analysis.top_summary());
                    match result {
                        Some(ref mut joined) => joined.join_with(&summary),
                        None => result = Some(summary),
                    }
                }
                match result {
                    Some(result) if !result.is_bottom() => result,
                    _ => self.analysis.top_summary(),
                }
            }
            _ => self.analysis.top_summary(),
        }
    }
}

/// The analyzer's position in its run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalyzerState {
    Initialized,
    Iterating,
    Converged,
    IterationLimitReached,
}

/// How a run ended. `IterationLimitReached` is not an error: the summaries
/// computed so far are a sound approximation, just not a proven fixpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Converged { passes: usize },
    IterationLimitReached { passes: usize },
}

impl Outcome {
    pub fn converged(&self) -> bool {
        matches!(self, Outcome::Converged { .. })
    }

    pub fn passes(&self) -> usize {
        match *self {
            Outcome::Converged { passes } | Outcome::IterationLimitReached { passes } => passes,
        }
    }
}

/// Drives repeated intraprocedural analyses over the call graph to a global
/// fixpoint.
pub struct InterproceduralAnalyzer<'a, A: InterproceduralAnalysis> {
    program: &'a il::Program,
    call_graph: &'a CallGraph,
    analysis: &'a A,
    overrides: OverrideTable<A::Summary>,
    max_iteration: usize,
    registry: SummaryRegistry<A::Summary>,
    contexts: DashMap<FunctionId, A::Context>,
    state: AnalyzerState,
}

impl<'a, A: InterproceduralAnalysis> InterproceduralAnalyzer<'a, A> {
    pub fn new(
        program: &'a il::Program,
        call_graph: &'a CallGraph,
        analysis: &'a A,
        overrides: OverrideTable<A::Summary>,
        max_iteration: usize,
    ) -> Result<InterproceduralAnalyzer<'a, A>, Error> {
        if max_iteration == 0 {
            return Err(Error::Configuration(
                "max_iteration must be at least 1".to_string(),
            ));
        }
        Ok(InterproceduralAnalyzer {
            program,
            call_graph,
            analysis,
            overrides,
            max_iteration,
            registry: SummaryRegistry::new(),
            contexts: DashMap::new(),
            state: AnalyzerState::Initialized,
        })
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn registry(&self) -> &SummaryRegistry<A::Summary> {
        &self.registry
    }

    /// The final summaries, one per analyzed function.
    pub fn summaries(&self) -> FxHashMap<FunctionId, A::Summary> {
        self.registry.snapshot()
    }

    /// Run passes until convergence or the pass cap.
    pub fn run(&mut self) -> Result<Outcome, Error> {
        if self.state != AnalyzerState::Initialized {
            return Err(Error::Custom(
                "interprocedural analyzer has already run".to_string(),
            ));
        }
        self.state = AnalyzerState::Iterating;

        // Bottom-up dependency levels: parallel within a level, sequential
        // across levels. A function on a call cycle reads summaries that may
        // be one pass stale; the convergence check below covers that.
        let levels = self.call_graph.bottom_up_levels()?;
        for pass in 1..=self.max_iteration {
            info!("interprocedural pass {} of {}", pass, self.max_iteration);
            self.registry.materialize_update();

            for level in &levels {
                level
                    .par_iter()
                    .try_for_each(|&function| self.analyze_one(function))?;
            }

            if !self.registry.has_update() {
                info!("converged after {} passes", pass);
                self.state = AnalyzerState::Converged;
                return Ok(Outcome::Converged { passes: pass });
            }
        }

        info!(
            "no convergence after {} passes, returning the last summaries",
            self.max_iteration
        );
        self.state = AnalyzerState::IterationLimitReached;
        Ok(Outcome::IterationLimitReached {
            passes: self.max_iteration,
        })
    }

    fn analyze_one(&self, id: FunctionId) -> Result<(), Error> {
        let function = self.program.function(id)?;
        let context = self
            .contexts
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.analysis.initial_context());

        let query = SummaryQuery {
            analysis: self.analysis,
            registry: &self.registry,
            call_graph: self.call_graph,
            overrides: &self.overrides,
            caller: id,
        };
        debug!("analyzing {}", function.qualified_name());
        let analyzed = self.analysis.analyze_function(function, &context, &query)?;

        let summary = analyzed.summary;
        self.registry
            .maybe_update(id, self.analysis.top_summary(), |current| {
                if *current == summary {
                    return false;
                }
                *current = summary.clone();
                true
            });

        // Push the contexts established at this function's call sites down
        // to the callees they reach.
        for (instruction, context_at_site) in analyzed.call_site_contexts {
            let callees = match self.call_graph.callees(id, instruction) {
                Some(CalleeSet::Resolved(callees)) => callees.clone(),
                _ => continue,
            };
            for callee in callees {
                let call_site = CallSite {
                    caller: id,
                    instruction,
                    callee,
                };
                let entry_context = self.analysis.analyze_edge(&call_site, &context_at_site)?;
                self.contexts
                    .entry(callee)
                    .and_modify(|context| context.join_with(&entry_context))
                    .or_insert(entry_context);
            }
        }

        Ok(())
    }
}
