//! The reduced product of several abstract domains.

use crate::domain::AbstractDomain;
use std::fmt;

/// A fixed-size tuple of abstract domains, combined component-wise.
///
/// Implemented for tuples of 2 to 6 [`AbstractDomain`]s. The tuple is Bottom
/// as soon as any component is Bottom, and Top only when all components are
/// Top.
pub trait DomainTuple: Clone + fmt::Debug + PartialEq {
    fn any_bottom(&self) -> bool;
    fn all_top(&self) -> bool;
    fn leq(&self, other: &Self) -> bool;
    fn join_with(&mut self, other: &Self);
    fn meet_with(&mut self, other: &Self);
    fn set_to_bottom(&mut self);
    fn set_to_top(&mut self);
}

macro_rules! domain_tuple {
    ($($domain:ident.$index:tt),+) => {
        impl<$($domain: AbstractDomain),+> DomainTuple for ($($domain,)+) {
            fn any_bottom(&self) -> bool {
                false $(|| self.$index.is_bottom())+
            }

            fn all_top(&self) -> bool {
                true $(&& self.$index.is_top())+
            }

            fn leq(&self, other: &Self) -> bool {
                true $(&& self.$index.leq(&other.$index))+
            }

            fn join_with(&mut self, other: &Self) {
                $(self.$index.join_with(&other.$index);)+
            }

            fn meet_with(&mut self, other: &Self) {
                $(self.$index.meet_with(&other.$index);)+
            }

            fn set_to_bottom(&mut self) {
                $(self.$index.set_to_bottom();)+
            }

            fn set_to_top(&mut self) {
                $(self.$index.set_to_top();)+
            }
        }
    }
}

domain_tuple!(A.0, B.1);
domain_tuple!(A.0, B.1, C.2);
domain_tuple!(A.0, B.1, C.2, D.3);
domain_tuple!(A.0, B.1, C.2, D.3, E.4);
domain_tuple!(A.0, B.1, C.2, D.3, E.4, F.5);

/// The reduced product of the component domains of `T`.
///
/// A product value is a tuple of component values plus a reduction hook. The
/// hook re-establishes the client's cross-component invariant (for example:
/// "if the escape component says escaped, all sibling components are Top")
/// and is re-applied after construction and after every mutation — both the
/// component-wise `join`/`meet` and the [`apply`](ReducedProduct::apply)
/// mutator. Reduction must be idempotent and monotonic:
/// `reduce(join(a, b))` must not be below `join(reduce(a), reduce(b))`.
///
/// The product collapses to uniform Bottom whenever any component becomes
/// Bottom.
#[derive(Clone)]
pub struct ReducedProduct<T: DomainTuple> {
    components: T,
    reduce: fn(&mut T),
}

impl<T: DomainTuple> ReducedProduct<T> {
    pub fn new(components: T, reduce: fn(&mut T)) -> ReducedProduct<T> {
        let mut product = ReducedProduct { components, reduce };
        product.reduce_and_normalize();
        product
    }

    /// The component tuple.
    pub fn components(&self) -> &T {
        &self.components
    }

    /// Mutate the component tuple, then re-apply the reduction. Bottom is
    /// absorbing: applying a mutator to a Bottom product is a no-op.
    pub fn apply<F: FnOnce(&mut T)>(&mut self, f: F) {
        if self.is_bottom() {
            return;
        }
        f(&mut self.components);
        self.reduce_and_normalize();
    }

    fn reduce_and_normalize(&mut self) {
        (self.reduce)(&mut self.components);
        if self.components.any_bottom() {
            self.components.set_to_bottom();
        }
    }
}

impl<T: DomainTuple> AbstractDomain for ReducedProduct<T> {
    fn is_bottom(&self) -> bool {
        self.components.any_bottom()
    }

    fn is_top(&self) -> bool {
        self.components.all_top()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.components.leq(&other.components)
    }

    fn join_with(&mut self, other: &Self) {
        if other.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = other.clone();
            return;
        }
        self.components.join_with(&other.components);
        self.reduce_and_normalize();
    }

    fn meet_with(&mut self, other: &Self) {
        if self.is_bottom() {
            return;
        }
        if other.is_bottom() {
            self.set_to_bottom();
            return;
        }
        self.components.meet_with(&other.components);
        self.reduce_and_normalize();
    }

    fn set_to_bottom(&mut self) {
        self.components.set_to_bottom();
    }

    fn set_to_top(&mut self) {
        self.components.set_to_top();
    }
}

impl<T: DomainTuple> PartialEq for ReducedProduct<T> {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl<T: DomainTuple> fmt::Debug for ReducedProduct<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReducedProduct({:?})", self.components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstantDomain;

    // An escape component and a value component: once something may escape,
    // nothing is known about the value.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum Escape {
        Bottom,
        Local,
        Escaped,
        Top,
    }

    impl AbstractDomain for Escape {
        fn is_bottom(&self) -> bool {
            *self == Escape::Bottom
        }
        fn is_top(&self) -> bool {
            *self == Escape::Top
        }
        fn leq(&self, other: &Self) -> bool {
            self == other || self.is_bottom() || other.is_top()
        }
        fn join_with(&mut self, other: &Self) {
            if self == other || other.is_bottom() {
            } else if self.is_bottom() {
                *self = *other;
            } else {
                *self = Escape::Top;
            }
        }
        fn meet_with(&mut self, other: &Self) {
            if self == other || other.is_top() {
            } else if self.is_top() {
                *self = *other;
            } else {
                *self = Escape::Bottom;
            }
        }
        fn set_to_bottom(&mut self) {
            *self = Escape::Bottom;
        }
        fn set_to_top(&mut self) {
            *self = Escape::Top;
        }
    }

    type State = ReducedProduct<(Escape, ConstantDomain<u32>)>;

    fn reduce(components: &mut (Escape, ConstantDomain<u32>)) {
        if components.0 == Escape::Escaped {
            components.1.set_to_top();
        }
    }

    fn state(escape: Escape, value: ConstantDomain<u32>) -> State {
        ReducedProduct::new((escape, value), reduce)
    }

    #[test]
    fn reduction_is_applied_on_construction() {
        let s = state(Escape::Escaped, ConstantDomain::new(1));
        assert!(s.components().1.is_top());
    }

    #[test]
    fn reduction_is_applied_after_apply() {
        let mut s = state(Escape::Local, ConstantDomain::new(1));
        s.apply(|components| components.0 = Escape::Escaped);
        assert!(s.components().1.is_top());
    }

    #[test]
    fn reduction_is_applied_after_join_and_meet() {
        let local = state(Escape::Local, ConstantDomain::new(1));
        let escaped = state(Escape::Escaped, ConstantDomain::top());
        let joined = local.clone().join(&escaped);
        assert_eq!(joined.components().0, Escape::Top);
        assert!(joined.components().1.is_top());

        let met = state(Escape::Top, ConstantDomain::new(1))
            .meet(&state(Escape::Escaped, ConstantDomain::new(1)));
        assert_eq!(met.components().0, Escape::Escaped);
        assert!(met.components().1.is_top());
    }

    #[test]
    fn any_bottom_component_collapses_the_product() {
        let mut s = state(Escape::Local, ConstantDomain::new(1));
        s.apply(|components| components.1.set_to_bottom());
        assert!(s.is_bottom());
        assert!(s.components().0.is_bottom());
    }

    #[test]
    fn top_iff_all_components_top() {
        let mut s = state(Escape::Top, ConstantDomain::new(1));
        assert!(!s.is_top());
        s.apply(|components| components.1.set_to_top());
        assert!(s.is_top());
    }

    #[test]
    fn bottom_is_absorbing_under_apply() {
        let mut s = state(Escape::Local, ConstantDomain::new(1));
        s.set_to_bottom();
        s.apply(|components| components.0 = Escape::Local);
        assert!(s.is_bottom());
    }
}
