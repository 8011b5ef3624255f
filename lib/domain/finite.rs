use crate::domain::{AbstractDomain, Lattice};
use crate::Error;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A value drawn from a finite [`Lattice`].
///
/// Values are immutable in the lattice-theoretic sense: the trait's mutating
/// operations only ever move the encoding to another element of the same
/// lattice. Every value holds a reference to the lattice it was drawn from,
/// so domains over different lattices never mix.
#[derive(Clone)]
pub struct FiniteValue<E> {
    lattice: Arc<Lattice<E>>,
    encoding: u64,
}

impl<E> FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    /// A value holding the given element. Errors if the element is not part
    /// of the lattice.
    pub fn new(lattice: &Arc<Lattice<E>>, element: E) -> Result<FiniteValue<E>, Error> {
        Ok(FiniteValue {
            lattice: lattice.clone(),
            encoding: lattice.encode(element)?,
        })
    }

    pub fn top(lattice: &Arc<Lattice<E>>) -> FiniteValue<E> {
        FiniteValue {
            lattice: lattice.clone(),
            encoding: lattice.top(),
        }
    }

    pub fn bottom(lattice: &Arc<Lattice<E>>) -> FiniteValue<E> {
        FiniteValue {
            lattice: lattice.clone(),
            encoding: lattice.bottom(),
        }
    }

    /// The lattice element this value currently holds.
    pub fn element(&self) -> E {
        self.lattice.decode(self.encoding)
    }

    pub fn lattice(&self) -> &Arc<Lattice<E>> {
        &self.lattice
    }

    fn assert_same_lattice(&self, other: &FiniteValue<E>) {
        debug_assert!(
            Arc::ptr_eq(&self.lattice, &other.lattice),
            "finite values drawn from different lattices"
        );
    }
}

impl<E> AbstractDomain for FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    fn is_bottom(&self) -> bool {
        self.lattice.is_bottom(self.encoding)
    }

    fn is_top(&self) -> bool {
        self.lattice.is_top(self.encoding)
    }

    fn leq(&self, other: &Self) -> bool {
        self.assert_same_lattice(other);
        self.lattice.leq(self.encoding, other.encoding)
    }

    fn join_with(&mut self, other: &Self) {
        self.assert_same_lattice(other);
        self.encoding = self.lattice.join(self.encoding, other.encoding);
    }

    fn meet_with(&mut self, other: &Self) {
        self.assert_same_lattice(other);
        self.encoding = self.lattice.meet(self.encoding, other.encoding);
    }

    fn set_to_bottom(&mut self) {
        self.encoding = self.lattice.bottom();
    }

    fn set_to_top(&mut self) {
        self.encoding = self.lattice.top();
    }
}

impl<E> PartialEq for FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lattice, &other.lattice) && self.encoding == other.encoding
    }
}

impl<E> Eq for FiniteValue<E> where E: Copy + Eq + Hash + fmt::Debug {}

impl<E> fmt::Debug for FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.element())
    }
}

impl<E> fmt::Display for FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.element())
    }
}

impl<E> Serialize for FiniteValue<E>
where
    E: Copy + Eq + Hash + fmt::Debug + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.element().serialize(serializer)
    }
}
