//! Whole-program scenario tests.

use crate::il::{Block, ControlFlowGraph, Function, Program};


/// A static function whose control-flow graph is built by `build`; the
/// closure returns the entry block index.
pub(crate) fn function_with<F>(class: &str, name: &str, param_count: u32, build: F) -> Function
where
    F: FnOnce(&mut ControlFlowGraph) -> usize,
{
    let mut cfg = ControlFlowGraph::new();
    let entry = build(&mut cfg);
    cfg.set_entry(entry).unwrap();
    Function::new(class, name, param_count, true, cfg)
}

/// A static function with a single basic block.
pub(crate) fn single_block_function<F>(
    class: &str,
    name: &str,
    param_count: u32,
    build: F,
) -> Function
where
    F: FnOnce(&mut Block),
{
    function_with(class, name, param_count, |cfg| {
        let block = cfg.new_block().unwrap();
        let index = block.index();
        build(block);
        index
    })
}

pub(crate) fn program_of(functions: Vec<Function>) -> Program {
    let mut program = Program::new();
    for function in functions {
        program.add_function(function).unwrap();
    }
    program
}
