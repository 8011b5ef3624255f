use crate::il::{InstructionId, Operation, Register};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An `Operation` together with its stable id.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Instruction {
    id: InstructionId,
    operation: Operation,
}

impl Instruction {
    pub(crate) fn new(id: InstructionId, operation: Operation) -> Instruction {
        Instruction { id, operation }
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn dst(&self) -> Option<Register> {
        self.operation.dst()
    }

    pub fn sources(&self) -> Vec<Register> {
        self.operation.sources()
    }

    pub fn is_invoke(&self) -> bool {
        self.operation.is_invoke()
    }

    pub fn is_return(&self) -> bool {
        self.operation.is_return()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.operation)
    }
}
