use crate::domain::AbstractDomain;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// A sparse mapping from keys to abstract values in which an unbound key is
/// Top: "unconstrained unless proven otherwise".
///
/// The Top environment (no bindings) and the Bottom environment are
/// distinguished values, never enumerated maps, so the key space may be
/// practically unbounded. Bindings equal to Top are not stored; binding any
/// key to Bottom collapses the whole environment to Bottom, since one
/// impossible value makes the whole state unreachable.
///
/// Because domain values carry their lattice explicitly, an environment is
/// created from a `default` value of the underlying domain, which it forces
/// to Top and hands out for unbound keys.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment<K: Eq + Hash, D> {
    default: D,
    bindings: FxHashMap<K, D>,
    bottom: bool,
}

impl<K, D> Environment<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
    D: AbstractDomain,
{
    /// The Top environment: every key unbound.
    pub fn top(mut default: D) -> Environment<K, D> {
        default.set_to_top();
        Environment {
            default,
            bindings: FxHashMap::default(),
            bottom: false,
        }
    }

    /// The Bottom environment.
    pub fn bottom(mut default: D) -> Environment<K, D> {
        default.set_to_top();
        Environment {
            default,
            bindings: FxHashMap::default(),
            bottom: true,
        }
    }

    /// The value bound to `key`, or Top if the key is unbound.
    pub fn get(&self, key: &K) -> D {
        if self.bottom {
            let mut value = self.default.clone();
            value.set_to_bottom();
            return value;
        }
        self.bindings
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Bind `key` to `value`. Binding Top unbinds the key; binding Bottom
    /// collapses the environment to Bottom; the Bottom environment absorbs
    /// all updates.
    pub fn set(mut self, key: K, value: D) -> Self {
        self.set_in_place(key, value);
        self
    }

    /// Replace the value bound to `key` by `f` of it.
    pub fn update<F: FnOnce(D) -> D>(self, key: K, f: F) -> Self {
        if self.bottom {
            return self;
        }
        let value = f(self.get(&key));
        self.set(key, value)
    }

    pub(crate) fn set_in_place(&mut self, key: K, value: D) {
        if self.bottom {
            return;
        }
        if value.is_bottom() {
            self.set_to_bottom();
        } else if value.is_top() {
            self.bindings.remove(&key);
        } else {
            self.bindings.insert(key, value);
        }
    }

    /// The explicit (non-Top) bindings of this environment.
    pub fn bindings(&self) -> impl Iterator<Item = (&K, &D)> {
        self.bindings.iter()
    }
}

impl<K, D> AbstractDomain for Environment<K, D>
where
    K: Clone + Eq + Hash + fmt::Debug,
    D: AbstractDomain,
{
    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.bindings.is_empty()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.bottom {
            return true;
        }
        if other.bottom {
            return false;
        }
        // Keys bound only in `self` are below Top on the other side; keys
        // bound only in `other` compare Top against a non-Top binding.
        other
            .bindings
            .iter()
            .all(|(key, value)| self.get(key).leq(value))
    }

    fn join_with(&mut self, other: &Self) {
        if other.bottom {
            return;
        }
        if self.bottom {
            *self = other.clone();
            return;
        }
        // Pointwise join; a key unbound on either side joins to Top and is
        // dropped.
        let mut joined = FxHashMap::default();
        for (key, value) in self.bindings.drain() {
            if let Some(other_value) = other.bindings.get(&key) {
                let value = value.join(other_value);
                if !value.is_top() {
                    joined.insert(key, value);
                }
            }
        }
        self.bindings = joined;
    }

    fn meet_with(&mut self, other: &Self) {
        if self.bottom {
            return;
        }
        if other.bottom {
            self.set_to_bottom();
            return;
        }
        // Pointwise meet over the union of bound keys; a key unbound on one
        // side keeps the other side's value.
        for (key, other_value) in &other.bindings {
            let value = self.get(key).meet(other_value);
            if value.is_bottom() {
                self.set_to_bottom();
                return;
            }
            self.set_in_place(key.clone(), value);
        }
    }

    fn set_to_bottom(&mut self) {
        self.bindings.clear();
        self.bottom = true;
    }

    fn set_to_top(&mut self) {
        self.bindings.clear();
        self.bottom = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstantDomain;

    type Env = Environment<&'static str, ConstantDomain<u32>>;

    fn env() -> Env {
        Environment::top(ConstantDomain::top())
    }

    #[test]
    fn unbound_keys_are_top() {
        assert!(env().get(&"x").is_top());
        assert!(Env::bottom(ConstantDomain::top()).get(&"x").is_bottom());
    }

    #[test]
    fn set_then_get() {
        let e = env().set("x", ConstantDomain::new(1));
        assert_eq!(e.get(&"x"), ConstantDomain::new(1));
        assert!(e.get(&"y").is_top());
    }

    #[test]
    fn binding_bottom_collapses() {
        let e = env()
            .set("x", ConstantDomain::new(1))
            .set("y", ConstantDomain::bottom());
        assert!(e.is_bottom());
        assert!(e.get(&"x").is_bottom());
    }

    #[test]
    fn bottom_absorbs_updates() {
        let e = Env::bottom(ConstantDomain::top()).set("x", ConstantDomain::new(1));
        assert!(e.is_bottom());
    }

    #[test]
    fn join_is_pointwise_with_top_default() {
        let a = env()
            .set("x", ConstantDomain::new(1))
            .set("y", ConstantDomain::new(2));
        let b = env()
            .set("x", ConstantDomain::new(1))
            .set("z", ConstantDomain::new(3));
        let joined = a.join(&b);
        assert_eq!(joined.get(&"x"), ConstantDomain::new(1));
        // y and z are unbound on one side, and join against Top.
        assert!(joined.get(&"y").is_top());
        assert!(joined.get(&"z").is_top());
    }

    #[test]
    fn meet_keeps_one_sided_bindings() {
        let a = env().set("x", ConstantDomain::new(1));
        let b = env().set("y", ConstantDomain::new(2));
        let met = a.clone().meet(&b);
        assert_eq!(met.get(&"x"), ConstantDomain::new(1));
        assert_eq!(met.get(&"y"), ConstantDomain::new(2));

        // Conflicting constants meet to Bottom, collapsing the environment.
        let conflicting = env().set("x", ConstantDomain::new(9));
        assert!(a.meet(&conflicting).is_bottom());
    }

    #[test]
    fn leq_over_bound_keys() {
        let precise = env().set("x", ConstantDomain::new(1));
        let top = env();
        assert!(precise.leq(&top));
        assert!(!top.leq(&precise));
        assert!(Env::bottom(ConstantDomain::top()).leq(&precise));
    }
}
