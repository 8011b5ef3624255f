//! Abstract domains and the lattice machinery underneath them.
//!
//! An abstract domain is a value type approximating a set of concrete program
//! states, ordered by precision. Every domain implements [`AbstractDomain`];
//! the building blocks provided here are:
//!
//! * [`Lattice`] / [`FiniteValue`] — a finite partial order declared as a
//!   Hasse diagram, and values over it;
//! * [`Environment`] / [`Partition`] — sparse key/value domains with Top
//!   (resp. Bottom) defaults for unbound keys;
//! * [`ConstantDomain`] — the flat lattice over an arbitrary value type;
//! * [`SetDomain`] — sets ordered by inclusion, with join as union;
//! * [`ReducedProduct`] — a tuple of component domains kept consistent by a
//!   reduction hook.
//!
//! Lattices are plain values owned by whoever instantiates an analysis and
//! passed explicitly (behind an `Arc`) into every `FiniteValue`; nothing in
//! this module is a process-wide singleton, so independent analyses can
//! declare independent lattices side by side.

use std::fmt;

mod constant;
mod environment;
mod finite;
mod hashed_set;
mod lattice;
mod partition;
mod product;

pub use self::constant::ConstantDomain;
pub use self::environment::Environment;
pub use self::finite::FiniteValue;
pub use self::hashed_set::SetDomain;
pub use self::lattice::Lattice;
pub use self::partition::Partition;
pub use self::product::{DomainTuple, ReducedProduct};

/// The operations every abstract domain supports.
///
/// `join_with`/`meet_with` mutate in place; the consuming `join`/`meet`
/// helpers are provided for expression-style use. Implementations must be
/// monotonic, and joins must be idempotent under repeated application of the
/// same value — the fixpoint iterators rely on both for termination.
pub trait AbstractDomain: Clone + fmt::Debug + PartialEq {
    fn is_bottom(&self) -> bool;

    fn is_top(&self) -> bool;

    /// Tests the partial order: is `self` at least as precise as `other`?
    fn leq(&self, other: &Self) -> bool;

    /// Replace `self` with the least upper bound of `self` and `other`.
    fn join_with(&mut self, other: &Self);

    /// Replace `self` with the greatest lower bound of `self` and `other`.
    fn meet_with(&mut self, other: &Self);

    fn set_to_bottom(&mut self);

    fn set_to_top(&mut self);

    fn join(mut self, other: &Self) -> Self {
        self.join_with(other);
        self
    }

    fn meet(mut self, other: &Self) -> Self {
        self.meet_with(other);
        self
    }

    fn equals(&self, other: &Self) -> bool {
        self == other
    }
}
