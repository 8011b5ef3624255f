//! A finite lattice declared as a Hasse diagram.
//!
//! The encoding is based on the following paper, which proposes an efficient
//! representation of lattice operations over bit vectors:
//!
//!   H. Aït-Kaci, R. Boyer, P. Lincoln, R. Nasr. Efficient implementation of
//!   lattice operations. In ACM Transactions on Programming Languages and
//!   Systems (TOPLAS), Volume 11, Issue 1, Jan. 1989, pages 115-146.
//!
//! Each element is encoded as the row of the reflexive-transitive closure of
//! the "immediately greater than" relation: in the lower semilattice a row is
//! the element's down-set and bitwise AND computes the meet; in the opposite
//! semilattice (the order reversed) a row is the element's up-set and bitwise
//! AND computes the join. A `Lattice` maintains both semilattices and uses
//! the opposite encoding as the canonical one, since join dominates in a
//! fixpoint computation.

use crate::Error;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// Encodings are single machine words; a lattice may declare at most this
/// many elements.
pub const MAX_CARDINALITY: usize = 64;

#[derive(Clone, Debug)]
struct SemiLattice {
    // Element index -> encoding.
    encodings: Vec<u64>,
    // Encoding -> element index.
    decode: FxHashMap<u64, usize>,
    bottom: usize,
    top: usize,
}

impl SemiLattice {
    /// Build one semilattice from the Hasse diagram. `reversed` selects the
    /// opposite order (top and bottom swapped).
    fn new(
        cardinality: usize,
        hasse_diagram: &[(usize, usize)],
        reversed: bool,
    ) -> Result<SemiLattice, Error> {
        let full: u64 = if cardinality == MAX_CARDINALITY {
            u64::MAX
        } else {
            (1u64 << cardinality) - 1
        };

        // If y is immediately greater than x in the order considered, then
        // bit x of row y is set.
        let mut rows = vec![0u64; cardinality];
        for &(lesser, greater) in hasse_diagram {
            let (x, y) = if reversed {
                (greater, lesser)
            } else {
                (lesser, greater)
            };
            rows[y] |= 1 << x;
        }

        // Reflexive closure, then transitive closure (Warshall).
        for (i, row) in rows.iter_mut().enumerate() {
            *row |= 1 << i;
        }
        for k in 0..cardinality {
            for i in 0..cardinality {
                if rows[i] & (1 << k) != 0 {
                    rows[i] |= rows[k];
                }
            }
        }

        let mut decode = FxHashMap::default();
        for (index, &row) in rows.iter().enumerate() {
            if decode.insert(row, index).is_some() {
                return Err(Error::Lattice(
                    "two elements share an encoding; the order relation contains a cycle"
                        .to_string(),
                ));
            }
        }

        // In the order considered, the least element is encoded by a single
        // bit (only itself below it) and the greatest by the full row. When
        // the order is reversed those are the original top and bottom
        // respectively.
        let mut leasts = (0..cardinality).filter(|&i| rows[i].count_ones() == 1);
        let mut greatests = (0..cardinality).filter(|&i| rows[i] == full);
        let least = leasts
            .next()
            .ok_or_else(|| Error::Lattice("no extremal element".to_string()))?;
        let greatest = greatests
            .next()
            .ok_or_else(|| Error::Lattice("no extremal element".to_string()))?;
        if leasts.next().is_some() || greatests.next().is_some() {
            return Err(Error::Lattice(
                "missing or duplicate extremal element".to_string(),
            ));
        }
        let (bottom, top) = if reversed {
            (greatest, least)
        } else {
            (least, greatest)
        };

        // Closure under bitwise AND: the meet (in the order considered) of
        // every pair of elements must itself be an element.
        for i in 0..cardinality {
            for j in 0..cardinality {
                if !decode.contains_key(&(rows[i] & rows[j])) {
                    return Err(Error::Lattice(format!(
                        "elements {} and {} have no unique bound",
                        i, j
                    )));
                }
            }
        }

        Ok(SemiLattice {
            encodings: rows,
            decode,
            bottom,
            top,
        })
    }
}

/// A finite complete lattice over elements of type `E`.
///
/// Constructed from the full element set and the covering edges of the
/// partial order (the Hasse diagram, `(lesser, greater)` pairs). Construction
/// fails unless the declaration is a valid complete lattice: unique bottom,
/// unique top, no cycles, and a well-defined join and meet for every pair of
/// elements. This is a configuration error, not a runtime condition.
///
/// A `Lattice` is owned by the analysis that declares it and handed to
/// [`FiniteValue`](crate::domain::FiniteValue)s behind an `Arc`; several
/// independent lattices can coexist in one process.
pub struct Lattice<E> {
    elements: Vec<E>,
    indices: FxHashMap<E, usize>,
    lower: SemiLattice,
    opposite: SemiLattice,
}

impl<E> Lattice<E>
where
    E: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new(elements: &[E], hasse_diagram: &[(E, E)]) -> Result<Lattice<E>, Error> {
        if elements.is_empty() {
            return Err(Error::Lattice("no elements".to_string()));
        }
        if elements.len() > MAX_CARDINALITY {
            return Err(Error::Lattice(format!(
                "{} elements exceed the maximum cardinality of {}",
                elements.len(),
                MAX_CARDINALITY
            )));
        }

        let mut indices = FxHashMap::default();
        for (index, &element) in elements.iter().enumerate() {
            if indices.insert(element, index).is_some() {
                return Err(Error::Lattice(format!("duplicate element {:?}", element)));
            }
        }

        let diagram = hasse_diagram
            .iter()
            .map(|(lesser, greater)| {
                let lesser = *indices
                    .get(lesser)
                    .ok_or_else(|| Error::Lattice(format!("unknown element {:?}", lesser)))?;
                let greater = *indices
                    .get(greater)
                    .ok_or_else(|| Error::Lattice(format!("unknown element {:?}", greater)))?;
                Ok((lesser, greater))
            })
            .collect::<Result<Vec<(usize, usize)>, Error>>()?;

        let lower = SemiLattice::new(elements.len(), &diagram, false)?;
        let opposite = SemiLattice::new(elements.len(), &diagram, true)?;

        if lower.bottom != opposite.bottom || lower.top != opposite.top {
            return Err(Error::Lattice(
                "extremal elements of the two semilattices disagree".to_string(),
            ));
        }

        Ok(Lattice {
            elements: elements.to_vec(),
            indices,
            lower,
            opposite,
        })
    }

    pub fn cardinality(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[E] {
        &self.elements
    }

    pub fn contains(&self, element: E) -> bool {
        self.indices.contains_key(&element)
    }

    /// Encode an element in the canonical (opposite) semilattice.
    pub(crate) fn encode(&self, element: E) -> Result<u64, Error> {
        let index = self
            .indices
            .get(&element)
            .ok_or_else(|| Error::Lattice(format!("unknown element {:?}", element)))?;
        Ok(self.opposite.encodings[*index])
    }

    pub(crate) fn decode(&self, encoding: u64) -> E {
        // Every encoding in circulation was produced by this lattice.
        self.elements[self.opposite.decode[&encoding]]
    }

    pub(crate) fn bottom(&self) -> u64 {
        self.opposite.encodings[self.opposite.bottom]
    }

    pub(crate) fn top(&self) -> u64 {
        self.opposite.encodings[self.opposite.top]
    }

    pub(crate) fn is_bottom(&self, encoding: u64) -> bool {
        encoding == self.bottom()
    }

    pub(crate) fn is_top(&self, encoding: u64) -> bool {
        encoding == self.top()
    }

    /// x is below y iff x's up-set contains y's up-set.
    pub(crate) fn leq(&self, x: u64, y: u64) -> bool {
        (x & y) == y
    }

    pub(crate) fn join(&self, x: u64, y: u64) -> u64 {
        // The intersection of the up-sets is the up-set of the least upper
        // bound.
        x & y
    }

    pub(crate) fn meet(&self, x: u64, y: u64) -> u64 {
        // Meet is computed in the lower semilattice and translated back.
        let x = self.lower.encodings[self.opposite.decode[&x]];
        let y = self.lower.encodings[self.opposite.decode[&y]];
        self.opposite.encodings[self.lower.decode[&(x & y)]]
    }
}

impl<E: fmt::Debug> fmt::Debug for Lattice<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lattice")
            .field("elements", &self.elements)
            .finish()
    }
}
