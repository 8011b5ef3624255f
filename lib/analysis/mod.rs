//! Implementations and traits for static analysis over kestrel IL.
//!
//! The framework half of this module is analysis-agnostic: a monotone
//! intraprocedural fixpoint iterator over one function's control-flow graph
//! ([`fixpoint`]), a call graph with bounded virtual-dispatch fan-out
//! ([`call_graph`]), a concurrent summary registry ([`registry`]), and a
//! bottom-up interprocedural driver ([`interprocedural`]).
//!
//! The client half instantiates the framework: [`determinism`],
//! [`null_input`] and [`parallel_safety`].

pub mod call_graph;
pub mod config;
pub mod determinism;
pub mod fixpoint;
pub mod interprocedural;
pub mod null_input;
pub mod parallel_safety;
pub mod registry;

pub use self::call_graph::{CallGraph, CalleeSet};
pub use self::config::{AnalysisConfig, SummaryLabel};
pub use self::fixpoint::{IntraproceduralAnalysis, MonotonicFixpointIterator};
pub use self::interprocedural::{
    AnalyzedFunction, CallSite, InterproceduralAnalysis, InterproceduralAnalyzer, Outcome,
    OverrideTable, SummaryQuery,
};
pub use self::registry::SummaryRegistry;
