use crate::il::{
    BinaryOp, FieldId, Instruction, InstructionId, InvokeKind, MethodRef, Operation, Register,
    UnaryOp, ZeroTest,
};
use crate::graph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block: an ordered sequence of instructions.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Block {
    /// The index of this block in its `ControlFlowGraph`.
    index: usize,
    /// The instructions in this block.
    instructions: Vec<Instruction>,
}

impl Block {
    pub(crate) fn new(index: usize) -> Block {
        Block {
            index,
            instructions: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn first_instruction(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// True if this block begins with a `MoveException` instruction, i.e. it
    /// is the entry of an exception handler.
    pub fn starts_with_move_exception(&self) -> bool {
        matches!(
            self.first_instruction().map(Instruction::operation),
            Some(Operation::MoveException { .. })
        )
    }

    /// Append an operation to this block, assigning its instruction id.
    pub fn push(&mut self, operation: Operation) -> InstructionId {
        let id = InstructionId {
            block: self.index,
            index: self.instructions.len(),
        };
        self.instructions.push(Instruction::new(id, operation));
        id
    }

    pub fn constant(&mut self, dst: Register, value: i64) -> InstructionId {
        self.push(Operation::Const { dst, value })
    }

    pub fn const_string<S: Into<String>>(&mut self, dst: Register, value: S) -> InstructionId {
        self.push(Operation::ConstString {
            dst,
            value: value.into(),
        })
    }

    pub fn mov(&mut self, dst: Register, src: Register) -> InstructionId {
        self.push(Operation::Move { dst, src })
    }

    pub fn unary(&mut self, op: UnaryOp, dst: Register, src: Register) -> InstructionId {
        self.push(Operation::Unary { op, dst, src })
    }

    pub fn binary(
        &mut self,
        op: BinaryOp,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> InstructionId {
        self.push(Operation::Binary { op, dst, lhs, rhs })
    }

    pub fn binary_const(
        &mut self,
        op: BinaryOp,
        dst: Register,
        src: Register,
        value: i64,
    ) -> InstructionId {
        self.push(Operation::BinaryConst {
            op,
            dst,
            src,
            value,
        })
    }

    pub fn new_instance<S: Into<String>>(&mut self, dst: Register, class: S) -> InstructionId {
        self.push(Operation::NewInstance {
            dst,
            class: class.into(),
        })
    }

    pub fn new_array(&mut self, dst: Register, size: Register) -> InstructionId {
        self.push(Operation::NewArray { dst, size })
    }

    pub fn array_get(&mut self, dst: Register, array: Register, index: Register) -> InstructionId {
        self.push(Operation::ArrayGet { dst, array, index })
    }

    pub fn array_put(&mut self, src: Register, array: Register, index: Register) -> InstructionId {
        self.push(Operation::ArrayPut { src, array, index })
    }

    pub fn field_get(&mut self, dst: Register, object: Register, field: FieldId) -> InstructionId {
        self.push(Operation::FieldGet { dst, object, field })
    }

    pub fn field_put(&mut self, src: Register, object: Register, field: FieldId) -> InstructionId {
        self.push(Operation::FieldPut { src, object, field })
    }

    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        target: MethodRef,
        arguments: Vec<Register>,
        dst: Option<Register>,
    ) -> InstructionId {
        self.push(Operation::Invoke {
            kind,
            target,
            arguments,
            dst,
        })
    }

    pub fn if_zero(&mut self, test: ZeroTest, operand: Register) -> InstructionId {
        self.push(Operation::IfZero { test, operand })
    }

    pub fn goto(&mut self) -> InstructionId {
        self.push(Operation::Goto)
    }

    pub fn move_exception(&mut self, dst: Register) -> InstructionId {
        self.push(Operation::MoveException { dst })
    }

    pub fn ret(&mut self, src: Register) -> InstructionId {
        self.push(Operation::Return { src })
    }

    pub fn ret_void(&mut self) -> InstructionId {
        self.push(Operation::ReturnVoid)
    }

    pub fn nop(&mut self) -> InstructionId {
        self.push(Operation::Nop)
    }
}

impl graph::Vertex for Block {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: 0x{:X} ]", self.index)?;
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}
