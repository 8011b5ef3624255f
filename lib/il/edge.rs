use crate::graph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a control-flow edge.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum EdgeKind {
    /// Taken when the branch condition of the head block holds.
    BranchTrue,
    /// The fallthrough of a conditional branch, or an unconditional jump.
    Goto,
    /// Taken when the head block raises an exception; the tail block is an
    /// exception handler.
    Throw,
}

/// A directed edge between two blocks of a `ControlFlowGraph`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Edge {
    head: usize,
    tail: usize,
    kind: EdgeKind,
}

impl Edge {
    pub(crate) fn new(head: usize, tail: usize, kind: EdgeKind) -> Edge {
        Edge { head, tail, kind }
    }

    /// The index of the block this edge originates from.
    pub fn head(&self) -> usize {
        self.head
    }

    /// The index of the block this edge leads to.
    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn is_branch_true(&self) -> bool {
        self.kind == EdgeKind::BranchTrue
    }

    pub fn is_goto(&self) -> bool {
        self.kind == EdgeKind::Goto
    }

    pub fn is_throw(&self) -> bool {
        self.kind == EdgeKind::Throw
    }
}

impl graph::Edge for Edge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            EdgeKind::BranchTrue => write!(f, "(0x{:X}->0x{:X}) true", self.head, self.tail),
            EdgeKind::Goto => write!(f, "(0x{:X}->0x{:X})", self.head, self.tail),
            EdgeKind::Throw => write!(f, "(0x{:X}->0x{:X}) throw", self.head, self.tail),
        }
    }
}
