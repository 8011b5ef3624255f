use crate::domain::AbstractDomain;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// A sparse mapping from keys to abstract values in which an unbound key is
/// Bottom: "unreachable unless proven reachable".
///
/// The dual of [`Environment`](crate::domain::Environment): the Bottom
/// partition (no bindings) and the Top partition are distinguished values.
/// Bindings equal to Bottom are not stored; the Top partition absorbs all
/// updates. Unlike an environment, a partition may bind a key to Top without
/// collapsing.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition<K: Eq + Hash, D> {
    default: D,
    bindings: FxHashMap<K, D>,
    top: bool,
}

impl<K, D> Partition<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
    D: AbstractDomain,
{
    /// The Bottom partition: every key unbound.
    pub fn bottom(mut default: D) -> Partition<K, D> {
        default.set_to_bottom();
        Partition {
            default,
            bindings: FxHashMap::default(),
            top: false,
        }
    }

    /// The Top partition.
    pub fn top(mut default: D) -> Partition<K, D> {
        default.set_to_bottom();
        Partition {
            default,
            bindings: FxHashMap::default(),
            top: true,
        }
    }

    /// The value bound to `key`, or Bottom if the key is unbound.
    pub fn get(&self, key: &K) -> D {
        if self.top {
            let mut value = self.default.clone();
            value.set_to_top();
            return value;
        }
        self.bindings
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Bind `key` to `value`. Binding Bottom unbinds the key; the Top
    /// partition absorbs all updates.
    pub fn set(mut self, key: K, value: D) -> Self {
        self.set_in_place(key, value);
        self
    }

    /// Replace the value bound to `key` by `f` of it.
    pub fn update<F: FnOnce(D) -> D>(self, key: K, f: F) -> Self {
        if self.top {
            return self;
        }
        let value = f(self.get(&key));
        self.set(key, value)
    }

    pub(crate) fn set_in_place(&mut self, key: K, value: D) {
        if self.top {
            return;
        }
        if value.is_bottom() {
            self.bindings.remove(&key);
        } else {
            self.bindings.insert(key, value);
        }
    }

    /// The explicit (non-Bottom) bindings of this partition.
    pub fn bindings(&self) -> impl Iterator<Item = (&K, &D)> {
        self.bindings.iter()
    }
}

impl<K, D> AbstractDomain for Partition<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
    D: AbstractDomain,
{
    fn is_bottom(&self) -> bool {
        !self.top && self.bindings.is_empty()
    }

    fn is_top(&self) -> bool {
        self.top
    }

    fn leq(&self, other: &Self) -> bool {
        if other.top {
            return true;
        }
        if self.top {
            return false;
        }
        // Keys bound only in `other` are above Bottom on this side; a key
        // bound only in `self` compares a non-Bottom value against Bottom.
        self.bindings
            .iter()
            .all(|(key, value)| value.leq(&other.get(key)))
    }

    fn join_with(&mut self, other: &Self) {
        if self.top {
            return;
        }
        if other.top {
            self.set_to_top();
            return;
        }
        // Pointwise join over the union of bound keys; a key unbound on one
        // side keeps the other side's value.
        for (key, other_value) in &other.bindings {
            match self.bindings.get_mut(key) {
                Some(value) => value.join_with(other_value),
                None => {
                    self.bindings.insert(key.clone(), other_value.clone());
                }
            }
        }
    }

    fn meet_with(&mut self, other: &Self) {
        if other.top {
            return;
        }
        if self.top {
            *self = other.clone();
            return;
        }
        // Pointwise meet; a key unbound on either side meets to Bottom and
        // is dropped.
        let mut met = FxHashMap::default();
        for (key, value) in self.bindings.drain() {
            if let Some(other_value) = other.bindings.get(&key) {
                let value = value.meet(other_value);
                if !value.is_bottom() {
                    met.insert(key, value);
                }
            }
        }
        self.bindings = met;
    }

    fn set_to_bottom(&mut self) {
        self.bindings.clear();
        self.top = false;
    }

    fn set_to_top(&mut self) {
        self.bindings.clear();
        self.top = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstantDomain;

    type Part = Partition<u32, ConstantDomain<u32>>;

    fn partition() -> Part {
        Partition::bottom(ConstantDomain::top())
    }

    #[test]
    fn unbound_keys_are_bottom() {
        assert!(partition().get(&0).is_bottom());
        assert!(Part::top(ConstantDomain::top()).get(&0).is_top());
    }

    #[test]
    fn set_then_get() {
        let p = partition().set(0, ConstantDomain::new(7));
        assert_eq!(p.get(&0), ConstantDomain::new(7));
        assert!(p.get(&1).is_bottom());
    }

    #[test]
    fn top_bindings_are_representable() {
        let p = partition().set(0, ConstantDomain::top());
        assert!(p.get(&0).is_top());
        assert!(!p.is_top());
    }

    #[test]
    fn top_absorbs_updates() {
        let p = Part::top(ConstantDomain::top()).set(0, ConstantDomain::new(1));
        assert!(p.is_top());
    }

    #[test]
    fn join_is_union() {
        let a = partition().set(0, ConstantDomain::new(1));
        let b = partition().set(1, ConstantDomain::new(2));
        let joined = a.join(&b);
        assert_eq!(joined.get(&0), ConstantDomain::new(1));
        assert_eq!(joined.get(&1), ConstantDomain::new(2));
    }

    #[test]
    fn meet_is_intersection() {
        let a = partition()
            .set(0, ConstantDomain::new(1))
            .set(1, ConstantDomain::new(2));
        let b = partition().set(0, ConstantDomain::new(1));
        let met = a.meet(&b);
        assert_eq!(met.get(&0), ConstantDomain::new(1));
        assert!(met.get(&1).is_bottom());
    }

    #[test]
    fn leq_over_bound_keys() {
        let small = partition().set(0, ConstantDomain::new(1));
        let big = partition()
            .set(0, ConstantDomain::top())
            .set(1, ConstantDomain::new(2));
        assert!(small.leq(&big));
        assert!(!big.leq(&small));
        assert!(partition().leq(&small));
    }
}
