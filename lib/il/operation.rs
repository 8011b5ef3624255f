use crate::il::{FieldId, MethodRef, Register};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unary register-to-register operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum UnaryOp {
    Neg,
    Cast,
    CheckCast,
    InstanceOf,
    ArrayLength,
}

/// A binary arithmetic or bitwise operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Cmp,
}

/// The dispatch discipline of a call site.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum InvokeKind {
    /// Static dispatch, no receiver.
    Static,
    /// Virtual dispatch through the receiver in the first argument; resolves
    /// to the named method and every override of it.
    Virtual,
    /// Direct dispatch through the receiver in the first argument
    /// (constructors, private methods).
    Direct,
}

/// A zero test used by conditional branches.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ZeroTest {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// An operation over virtual registers.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Operation {
    /// Load an integer constant.
    Const { dst: Register, value: i64 },
    /// Load a string constant.
    ConstString { dst: Register, value: String },
    /// Copy a register.
    Move { dst: Register, src: Register },
    /// A unary operation.
    Unary {
        op: UnaryOp,
        dst: Register,
        src: Register,
    },
    /// A binary operation over two registers.
    Binary {
        op: BinaryOp,
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    /// A binary operation whose second operand is a literal.
    BinaryConst {
        op: BinaryOp,
        dst: Register,
        src: Register,
        value: i64,
    },
    /// Allocate a new object of the named class.
    NewInstance { dst: Register, class: String },
    /// Allocate a new array with the given size register.
    NewArray { dst: Register, size: Register },
    /// Read `array[index]`.
    ArrayGet {
        dst: Register,
        array: Register,
        index: Register,
    },
    /// Write `array[index] = src`.
    ArrayPut {
        src: Register,
        array: Register,
        index: Register,
    },
    /// Read an instance field.
    FieldGet {
        dst: Register,
        object: Register,
        field: FieldId,
    },
    /// Write an instance field.
    FieldPut {
        src: Register,
        object: Register,
        field: FieldId,
    },
    /// Call a function. For `Virtual` and `Direct` calls the first argument
    /// is the receiver.
    Invoke {
        kind: InvokeKind,
        target: MethodRef,
        arguments: Vec<Register>,
        dst: Option<Register>,
    },
    /// Branch on a zero test of `operand`; the block's `BranchTrue` edge is
    /// taken when the test holds, the `Goto` edge otherwise.
    IfZero { test: ZeroTest, operand: Register },
    /// Unconditional jump along the block's `Goto` edge.
    Goto,
    /// Move a caught exception into a register. Only valid as the first
    /// instruction of a block targeted by `Throw` edges.
    MoveException { dst: Register },
    /// Return a value.
    Return { src: Register },
    /// Return without a value.
    ReturnVoid,
    Nop,
}

impl Operation {
    /// The register written by this operation, if any.
    pub fn dst(&self) -> Option<Register> {
        match *self {
            Operation::Const { dst, .. }
            | Operation::ConstString { dst, .. }
            | Operation::Move { dst, .. }
            | Operation::Unary { dst, .. }
            | Operation::Binary { dst, .. }
            | Operation::BinaryConst { dst, .. }
            | Operation::NewInstance { dst, .. }
            | Operation::NewArray { dst, .. }
            | Operation::ArrayGet { dst, .. }
            | Operation::FieldGet { dst, .. }
            | Operation::MoveException { dst } => Some(dst),
            Operation::Invoke { dst, .. } => dst,
            Operation::ArrayPut { .. }
            | Operation::FieldPut { .. }
            | Operation::IfZero { .. }
            | Operation::Goto
            | Operation::Return { .. }
            | Operation::ReturnVoid
            | Operation::Nop => None,
        }
    }

    /// The registers read by this operation, in operand order.
    pub fn sources(&self) -> Vec<Register> {
        match *self {
            Operation::Move { src, .. }
            | Operation::Unary { src, .. }
            | Operation::BinaryConst { src, .. }
            | Operation::Return { src }
            | Operation::FieldPut { src, .. } => vec![src],
            Operation::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Operation::NewArray { size, .. } => vec![size],
            Operation::ArrayGet { array, index, .. } => vec![array, index],
            Operation::ArrayPut { src, array, index } => vec![src, array, index],
            Operation::FieldGet { object, .. } => vec![object],
            Operation::Invoke { ref arguments, .. } => arguments.clone(),
            Operation::IfZero { operand, .. } => vec![operand],
            Operation::Const { .. }
            | Operation::ConstString { .. }
            | Operation::NewInstance { .. }
            | Operation::Goto
            | Operation::MoveException { .. }
            | Operation::ReturnVoid
            | Operation::Nop => Vec::new(),
        }
    }

    pub fn is_invoke(&self) -> bool {
        matches!(*self, Operation::Invoke { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(*self, Operation::Return { .. } | Operation::ReturnVoid)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operation::Const { dst, value } => write!(f, "const r{dst}, {value}"),
            Operation::ConstString { dst, ref value } => {
                write!(f, "const-string r{dst}, {value:?}")
            }
            Operation::Move { dst, src } => write!(f, "move r{dst}, r{src}"),
            Operation::Unary { op, dst, src } => write!(f, "{op:?} r{dst}, r{src}"),
            Operation::Binary { op, dst, lhs, rhs } => {
                write!(f, "{op:?} r{dst}, r{lhs}, r{rhs}")
            }
            Operation::BinaryConst {
                op,
                dst,
                src,
                value,
            } => write!(f, "{op:?} r{dst}, r{src}, #{value}"),
            Operation::NewInstance { dst, ref class } => {
                write!(f, "new-instance r{dst}, {class}")
            }
            Operation::NewArray { dst, size } => write!(f, "new-array r{dst}, r{size}"),
            Operation::ArrayGet { dst, array, index } => {
                write!(f, "aget r{dst}, r{array}[r{index}]")
            }
            Operation::ArrayPut { src, array, index } => {
                write!(f, "aput r{src}, r{array}[r{index}]")
            }
            Operation::FieldGet { dst, object, field } => {
                write!(f, "iget r{dst}, r{object}.{field}")
            }
            Operation::FieldPut { src, object, field } => {
                write!(f, "iput r{src}, r{object}.{field}")
            }
            Operation::Invoke {
                kind,
                ref target,
                ref arguments,
                dst,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|r| format!("r{r}"))
                    .collect::<Vec<String>>()
                    .join(", ");
                match dst {
                    Some(dst) => write!(f, "invoke-{kind:?} r{dst}, {target}({arguments})"),
                    None => write!(f, "invoke-{kind:?} {target}({arguments})"),
                }
            }
            Operation::IfZero { test, operand } => write!(f, "if-{test:?}z r{operand}"),
            Operation::Goto => write!(f, "goto"),
            Operation::MoveException { dst } => write!(f, "move-exception r{dst}"),
            Operation::Return { src } => write!(f, "return r{src}"),
            Operation::ReturnVoid => write!(f, "return-void"),
            Operation::Nop => write!(f, "nop"),
        }
    }
}
