//! Kestrel is a whole-program static analysis engine built around abstract
//! interpretation.
//!
//! The crate provides a generic framework, and several analyses built on top
//! of it:
//!
//! * [`domain`] — finite lattices, abstract domains, sparse
//!   environments/partitions, and the reduced-product combinator.
//! * [`il`] — a small register-based intermediate language with explicit
//!   control-flow graphs.
//! * [`analysis`] — the intraprocedural monotone fixpoint iterator, the call
//!   graph, the bottom-up interprocedural analyzer, and the bundled
//!   determinism, null-input and parallel-safety analyses.
//!
//! Analyses are written as clients: an intraprocedural transfer function over
//! [`il::Operation`], and an interprocedural adaptor describing summaries and
//! calling contexts. The framework drives both to fixpoint.

pub mod analysis;
pub mod domain;
pub mod graph;
pub mod il;
#[cfg(test)]
mod tests;

use thiserror::Error;

/// Error type for everything that can go wrong in kestrel.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// A lattice declaration was not a valid complete lattice. This is a
    /// configuration error and aborts analysis construction.
    #[error("invalid lattice: {0}")]
    Lattice(String),

    /// A graph operation referenced a vertex or edge that does not exist.
    #[error("graph error: {0}")]
    Graph(String),

    /// A transfer function was handed an instruction that violates one of its
    /// declared shape preconditions.
    #[error("instruction shape violation: {0}")]
    InstructionShape(String),

    /// The intraprocedural fixpoint failed to stabilize within its iteration
    /// cap. This signals a non-monotone or infinite-height client transfer
    /// function.
    #[error("fixpoint did not stabilize after {0} block visits")]
    FixpointDiverged(usize),

    /// Invalid analysis configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Error while decoding a configuration document.
    #[error("json error: {0}")]
    Json(String),

    /// A custom error
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(error: &str) -> Error {
        Error::Custom(error.to_string())
    }
}

impl From<String> for Error {
    fn from(error: String) -> Error {
        Error::Custom(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Json(error.to_string())
    }
}
