//! A `ControlFlowGraph` is a directed `Graph` of `Block` and `Edge`.

use crate::graph;
use crate::il::{Block, Edge, EdgeKind, Instruction, InstructionId};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed graph of types `Block` and `Edge`.
///
/// A `ControlFlowGraph` has one entry block, set with `set_entry`, and one or
/// more return blocks, which are discovered from the instructions themselves.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ControlFlowGraph {
    // The internal graph used to store our blocks.
    graph: graph::Graph<Block, Edge>,
    // The next index to use when creating a basic block.
    next_index: usize,
    // An optional entry index for the graph.
    entry: Option<usize>,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph {
            graph: graph::Graph::new(),
            next_index: 0,
            entry: None,
        }
    }

    /// Returns the underlying graph.
    pub fn graph(&self) -> &graph::Graph<Block, Edge> {
        &self.graph
    }

    /// Creates a new basic block and returns a mutable reference to it.
    pub fn new_block(&mut self) -> Result<&mut Block, Error> {
        let index = self.next_index;
        self.next_index += 1;
        self.graph.insert_vertex(Block::new(index))?;
        self.graph.vertex_mut(index)
    }

    /// Sets the entry point for this `ControlFlowGraph` to the given `Block`
    /// index.
    pub fn set_entry(&mut self, entry: usize) -> Result<(), Error> {
        if self.graph.has_vertex(entry) {
            self.entry = Some(entry);
            return Ok(());
        }
        Err("Index does not exist for set_entry".into())
    }

    /// Get the entry `Block` index for this `ControlFlowGraph`.
    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    /// Get a `Block` by index.
    pub fn block(&self, index: usize) -> Result<&Block, Error> {
        self.graph.vertex(index)
    }

    /// Get a mutable reference to a `Block` by index.
    pub fn block_mut(&mut self, index: usize) -> Result<&mut Block, Error> {
        self.graph.vertex_mut(index)
    }

    /// Get every `Block` in this `ControlFlowGraph`.
    pub fn blocks(&self) -> Vec<&Block> {
        self.graph.vertices()
    }

    /// Get an `Edge` by its head and tail `Block` indices.
    pub fn edge(&self, head: usize, tail: usize) -> Result<&Edge, Error> {
        self.graph.edge(head, tail)
    }

    /// Get every incoming edge to a block.
    pub fn edges_in(&self, index: usize) -> Result<&[Edge], Error> {
        self.graph.edges_in(index)
    }

    /// Get every outgoing edge from a block.
    pub fn edges_out(&self, index: usize) -> Result<&[Edge], Error> {
        self.graph.edges_out(index)
    }

    /// Get the indices of every predecessor of a `Block` in this
    /// `ControlFlowGraph`.
    pub fn predecessor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.graph.predecessor_indices(index)
    }

    /// Get the indices of every successor of a `Block` in this
    /// `ControlFlowGraph`.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.graph.successor_indices(index)
    }

    /// Adds a `BranchTrue` edge between two blocks.
    pub fn branch_true_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(Edge::new(head, tail, EdgeKind::BranchTrue))
    }

    /// Adds a `Goto` edge between two blocks: the fallthrough of a branch, or
    /// an unconditional jump.
    pub fn goto_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(Edge::new(head, tail, EdgeKind::Goto))
    }

    /// Adds a `Throw` edge from a block to an exception handler block.
    pub fn throw_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(Edge::new(head, tail, EdgeKind::Throw))
    }

    /// The indices of every block whose last instruction is a return.
    pub fn return_blocks(&self) -> Vec<usize> {
        self.blocks()
            .into_iter()
            .filter(|block| {
                block
                    .last_instruction()
                    .map(Instruction::is_return)
                    .unwrap_or(false)
            })
            .map(Block::index)
            .collect()
    }

    /// Find an instruction by its id.
    pub fn instruction(&self, id: InstructionId) -> Result<&Instruction, Error> {
        self.block(id.block)?
            .instructions()
            .get(id.index)
            .ok_or_else(|| Error::Graph(format!("instruction {} does not exist", id)))
    }

    /// Every instruction of every block, in block-index order.
    pub fn instructions(&self) -> Vec<&Instruction> {
        self.blocks()
            .into_iter()
            .flat_map(|block| block.instructions().iter())
            .collect()
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in self.blocks() {
            writeln!(f, "{}", block)?;
        }
        for edge in self.graph.edges() {
            writeln!(f, "edge {}", edge)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_get_sequential_indices() {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.new_block().unwrap().index();
        let b = cfg.new_block().unwrap().index();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn instruction_ids_are_stable() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        let first = block.constant(0, 1);
        let second = block.ret(0);
        assert_eq!(first, InstructionId { block: 0, index: 0 });
        assert_eq!(second, InstructionId { block: 0, index: 1 });
        assert!(cfg.instruction(first).unwrap().operation()
            == &crate::il::Operation::Const { dst: 0, value: 1 });
    }

    #[test]
    fn return_blocks_are_discovered() {
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.new_block().unwrap();
        entry.goto();
        let entry = entry.index();
        let exit = cfg.new_block().unwrap();
        exit.ret_void();
        let exit = exit.index();
        cfg.goto_edge(entry, exit).unwrap();
        cfg.set_entry(entry).unwrap();
        assert_eq!(cfg.return_blocks(), vec![exit]);
    }
}
