use crate::domain::AbstractDomain;
use std::fmt;

/// The flat lattice over an arbitrary value type: Bottom, a single known
/// value, or Top. Two different values join directly to Top.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConstantDomain<T> {
    Bottom,
    Constant(T),
    Top,
}

impl<T> ConstantDomain<T>
where
    T: Clone + Eq + fmt::Debug,
{
    pub fn new(value: T) -> ConstantDomain<T> {
        ConstantDomain::Constant(value)
    }

    pub fn bottom() -> ConstantDomain<T> {
        ConstantDomain::Bottom
    }

    pub fn top() -> ConstantDomain<T> {
        ConstantDomain::Top
    }

    /// The known value, if there is exactly one.
    pub fn get(&self) -> Option<&T> {
        match self {
            ConstantDomain::Constant(value) => Some(value),
            ConstantDomain::Bottom | ConstantDomain::Top => None,
        }
    }
}

impl<T> AbstractDomain for ConstantDomain<T>
where
    T: Clone + Eq + fmt::Debug,
{
    fn is_bottom(&self) -> bool {
        matches!(self, ConstantDomain::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, ConstantDomain::Top)
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantDomain::Bottom, _) => true,
            (_, ConstantDomain::Top) => true,
            (ConstantDomain::Constant(a), ConstantDomain::Constant(b)) => a == b,
            _ => false,
        }
    }

    fn join_with(&mut self, other: &Self) {
        match (&*self, other) {
            (ConstantDomain::Top, _) | (_, ConstantDomain::Bottom) => {}
            (ConstantDomain::Bottom, _) => *self = other.clone(),
            (ConstantDomain::Constant(a), ConstantDomain::Constant(b)) => {
                if a != b {
                    *self = ConstantDomain::Top;
                }
            }
            (_, ConstantDomain::Top) => *self = ConstantDomain::Top,
        }
    }

    fn meet_with(&mut self, other: &Self) {
        match (&*self, other) {
            (ConstantDomain::Bottom, _) | (_, ConstantDomain::Top) => {}
            (ConstantDomain::Top, _) => *self = other.clone(),
            (ConstantDomain::Constant(a), ConstantDomain::Constant(b)) => {
                if a != b {
                    *self = ConstantDomain::Bottom;
                }
            }
            (_, ConstantDomain::Bottom) => *self = ConstantDomain::Bottom,
        }
    }

    fn set_to_bottom(&mut self) {
        *self = ConstantDomain::Bottom;
    }

    fn set_to_top(&mut self) {
        *self = ConstantDomain::Top;
    }
}
