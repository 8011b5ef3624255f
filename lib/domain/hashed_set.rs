use crate::domain::AbstractDomain;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::Hash;

/// A powerset domain ordered by inclusion: Bottom, a finite set of elements,
/// or Top (any set). Join is set union, meet is intersection.
///
/// The empty set and Bottom are distinct: the empty set is a known fact
/// ("nothing collected"), Bottom is unreachability.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SetDomain<T>
where
    T: Clone + Eq + Hash + fmt::Debug,
{
    Bottom,
    Set(FxHashSet<T>),
    Top,
}

impl<T> SetDomain<T>
where
    T: Clone + Eq + Hash + fmt::Debug,
{
    pub fn empty() -> SetDomain<T> {
        SetDomain::Set(FxHashSet::default())
    }

    pub fn singleton(element: T) -> SetDomain<T> {
        let mut set = FxHashSet::default();
        set.insert(element);
        SetDomain::Set(set)
    }

    pub fn bottom() -> SetDomain<T> {
        SetDomain::Bottom
    }

    pub fn top() -> SetDomain<T> {
        SetDomain::Top
    }

    /// Add an element. Adding to Bottom produces the singleton set; Top
    /// absorbs.
    pub fn add(&mut self, element: T) {
        match self {
            SetDomain::Bottom => *self = SetDomain::singleton(element),
            SetDomain::Set(set) => {
                set.insert(element);
            }
            SetDomain::Top => {}
        }
    }

    /// Remove an element, if the set is finite.
    pub fn remove(&mut self, element: &T) {
        if let SetDomain::Set(set) = self {
            set.remove(element);
        }
    }

    pub fn contains(&self, element: &T) -> bool {
        match self {
            SetDomain::Bottom => false,
            SetDomain::Set(set) => set.contains(element),
            SetDomain::Top => true,
        }
    }

    /// The elements, if the set is finite.
    pub fn elements(&self) -> Option<&FxHashSet<T>> {
        match self {
            SetDomain::Set(set) => Some(set),
            SetDomain::Bottom | SetDomain::Top => None,
        }
    }
}

impl<T> AbstractDomain for SetDomain<T>
where
    T: Clone + Eq + Hash + fmt::Debug,
{
    fn is_bottom(&self) -> bool {
        matches!(self, SetDomain::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, SetDomain::Top)
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (SetDomain::Bottom, _) => true,
            (_, SetDomain::Top) => true,
            (SetDomain::Set(a), SetDomain::Set(b)) => a.is_subset(b),
            _ => false,
        }
    }

    fn join_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (SetDomain::Top, _) | (_, SetDomain::Bottom) => {}
            (SetDomain::Bottom, _) => *self = other.clone(),
            (SetDomain::Set(a), SetDomain::Set(b)) => {
                a.extend(b.iter().cloned());
            }
            (_, SetDomain::Top) => *self = SetDomain::Top,
        }
    }

    fn meet_with(&mut self, other: &Self) {
        match (&mut *self, other) {
            (SetDomain::Bottom, _) | (_, SetDomain::Top) => {}
            (SetDomain::Top, _) => *self = other.clone(),
            (SetDomain::Set(a), SetDomain::Set(b)) => {
                a.retain(|element| b.contains(element));
            }
            (_, SetDomain::Bottom) => *self = SetDomain::Bottom,
        }
    }

    fn set_to_bottom(&mut self) {
        *self = SetDomain::Bottom;
    }

    fn set_to_top(&mut self) {
        *self = SetDomain::Top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_union() {
        let mut a = SetDomain::singleton(1);
        a.add(2);
        let b = SetDomain::singleton(3);
        let joined = a.join(&b);
        assert!(joined.contains(&1) && joined.contains(&2) && joined.contains(&3));
    }

    #[test]
    fn meet_is_intersection() {
        let mut a = SetDomain::singleton(1);
        a.add(2);
        let b = SetDomain::singleton(2);
        let met = a.meet(&b);
        assert!(!met.contains(&1));
        assert!(met.contains(&2));
    }

    #[test]
    fn empty_set_is_not_bottom() {
        let empty: SetDomain<u32> = SetDomain::empty();
        assert!(!empty.is_bottom());
        assert!(SetDomain::<u32>::bottom().leq(&empty));
    }

    #[test]
    fn adding_to_bottom_produces_a_singleton() {
        let mut set = SetDomain::bottom();
        set.add(5);
        assert_eq!(set, SetDomain::singleton(5));
    }

    #[test]
    fn subset_order() {
        let small = SetDomain::singleton(1);
        let mut big = SetDomain::singleton(1);
        big.add(2);
        assert!(small.leq(&big));
        assert!(!big.leq(&small));
        assert!(big.leq(&SetDomain::top()));
    }
}
