//! The program's call graph.

use crate::graph;
use crate::il::{self, FunctionId, InstructionId, InvokeKind, Operation};
use crate::Error;
use log::debug;
use rustc_hash::FxHashMap;
use std::fmt;

/// What a call-graph node stands for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// The synthetic ghost node standing in for unknown external callers.
    Entry,
    /// The synthetic ghost node standing in for unknown external callees.
    Exit,
    /// A function with a body.
    Function(FunctionId),
}

/// A node of the call graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallGraphNode {
    index: usize,
    kind: NodeKind,
    label: String,
}

impl CallGraphNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn function_id(&self) -> Option<FunctionId> {
        match self.kind {
            NodeKind::Function(id) => Some(id),
            NodeKind::Entry | NodeKind::Exit => None,
        }
    }

    pub fn is_ghost(&self) -> bool {
        !matches!(self.kind, NodeKind::Function(_))
    }
}

impl graph::Vertex for CallGraphNode {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        self.label.clone()
    }
}

/// An edge of the call graph: one caller/callee pair, labelled with the
/// first call site that produced it. Ghost edges carry no call site.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallEdge {
    head: usize,
    tail: usize,
    call_site: Option<InstructionId>,
}

impl CallEdge {
    pub fn call_site(&self) -> Option<InstructionId> {
        self.call_site
    }
}

impl graph::Edge for CallEdge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        match self.call_site {
            Some(call_site) => format!("{}", call_site),
            None => String::new(),
        }
    }
}

/// The statically resolved callees of one call site.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CalleeSet {
    /// The call dispatches to one of these functions. May be empty when the
    /// named function has no body in the program.
    Resolved(Vec<FunctionId>),
    /// The dispatch set was too large to enumerate (or could not be
    /// bounded); the callee is unknown and summary queries answer Top.
    Opaque,
}

/// Functions as nodes, call sites as edges, plus the two ghost nodes.
///
/// Built once from the program before any analysis pass, single-threaded,
/// and immutable afterwards. A virtual call site fans out to the named
/// function and every override of it, unless the override count exceeds
/// `override_threshold` — then the set is treated as opaque rather than
/// enumerated, bounding graph size on highly polymorphic call sites at the
/// cost of precision.
pub struct CallGraph {
    graph: graph::Graph<CallGraphNode, CallEdge>,
    entry: usize,
    exit: usize,
    nodes_by_function: FxHashMap<FunctionId, usize>,
    callees_by_site: FxHashMap<(FunctionId, InstructionId), CalleeSet>,
}

impl CallGraph {
    pub fn build(program: &il::Program, override_threshold: usize) -> Result<CallGraph, Error> {
        let mut graph = graph::Graph::new();
        let entry = 0;
        let exit = 1;
        graph.insert_vertex(CallGraphNode {
            index: entry,
            kind: NodeKind::Entry,
            label: "<ghost entry>".to_string(),
        })?;
        graph.insert_vertex(CallGraphNode {
            index: exit,
            kind: NodeKind::Exit,
            label: "<ghost exit>".to_string(),
        })?;

        let mut nodes_by_function = FxHashMap::default();
        for function in program.functions() {
            let id = function
                .id()
                .ok_or_else(|| Error::Custom("function without an id".to_string()))?;
            let index = graph.num_vertices();
            graph.insert_vertex(CallGraphNode {
                index,
                kind: NodeKind::Function(id),
                label: function.qualified_name(),
            })?;
            nodes_by_function.insert(id, index);
        }

        let mut callees_by_site = FxHashMap::default();
        for function in program.functions() {
            let caller = match function.id() {
                Some(id) => id,
                None => continue,
            };
            let caller_index = nodes_by_function[&caller];
            for block in function.control_flow_graph().blocks() {
                for instruction in block.instructions() {
                    let (kind, target) = match instruction.operation() {
                        Operation::Invoke { kind, target, .. } => (*kind, target),
                        _ => continue,
                    };
                    let callees = Self::resolve(program, kind, target, override_threshold);
                    if let CalleeSet::Resolved(ref resolved) = callees {
                        for &callee in resolved {
                            let edge = CallEdge {
                                head: caller_index,
                                tail: nodes_by_function[&callee],
                                call_site: Some(instruction.id()),
                            };
                            // Parallel call sites between the same pair of
                            // functions collapse onto one graph edge.
                            if graph.edge(edge.head, edge.tail).is_err() {
                                graph.insert_edge(edge)?;
                            }
                        }
                    }
                    callees_by_site.insert((caller, instruction.id()), callees);
                }
            }
        }

        // Functions nobody calls are roots, reached from the ghost entry;
        // functions that call nothing lead to the ghost exit.
        for (&_id, &index) in &nodes_by_function {
            if graph.edges_in(index)?.is_empty() {
                graph.insert_edge(CallEdge {
                    head: entry,
                    tail: index,
                    call_site: None,
                })?;
            }
            if graph.edges_out(index)?.is_empty() {
                graph.insert_edge(CallEdge {
                    head: index,
                    tail: exit,
                    call_site: None,
                })?;
            }
        }

        debug!(
            "call graph: {} nodes, {} call sites",
            graph.num_vertices(),
            callees_by_site.len()
        );

        Ok(CallGraph {
            graph,
            entry,
            exit,
            nodes_by_function,
            callees_by_site,
        })
    }

    fn resolve(
        program: &il::Program,
        kind: InvokeKind,
        target: &il::MethodRef,
        override_threshold: usize,
    ) -> CalleeSet {
        let base = program.resolve(target);
        match kind {
            InvokeKind::Static | InvokeKind::Direct => {
                CalleeSet::Resolved(base.into_iter().collect())
            }
            InvokeKind::Virtual => {
                let mut callees: Vec<FunctionId> = base.into_iter().collect();
                if let Some(base) = base {
                    callees.extend_from_slice(program.overrides_of(base));
                }
                if callees.len() > override_threshold {
                    debug!(
                        "{} has {} overrides, over the threshold of {}; treating as opaque",
                        target,
                        callees.len(),
                        override_threshold
                    );
                    CalleeSet::Opaque
                } else {
                    CalleeSet::Resolved(callees)
                }
            }
        }
    }

    pub fn graph(&self) -> &graph::Graph<CallGraphNode, CallEdge> {
        &self.graph
    }

    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn exit(&self) -> usize {
        self.exit
    }

    /// The resolved callees of a call site, or `None` for instructions that
    /// are not call sites of this graph.
    pub fn callees(&self, caller: FunctionId, call_site: InstructionId) -> Option<&CalleeSet> {
        self.callees_by_site.get(&(caller, call_site))
    }

    pub fn node_of(&self, function: FunctionId) -> Option<usize> {
        self.nodes_by_function.get(&function).copied()
    }

    /// Every function, callees before callers. This is the pass order of the
    /// bottom-up interprocedural analyzer: a depth-first post order from the
    /// ghost entry (the natural edge direction reversed puts callees first),
    /// with functions unreachable from any root — closed call cycles —
    /// appended afterwards.
    pub fn bottom_up_order(&self) -> Result<Vec<FunctionId>, Error> {
        let mut order = Vec::with_capacity(self.nodes_by_function.len());
        let mut seen = rustc_hash::FxHashSet::default();
        for index in self.graph.post_order(self.entry)? {
            if let Some(id) = self.graph.vertex(index)?.function_id() {
                order.push(id);
                seen.insert(id);
            }
        }
        let mut rest: Vec<FunctionId> = self
            .nodes_by_function
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        rest.sort_unstable();
        order.extend(rest);
        Ok(order)
    }

    /// The bottom-up order, grouped into dependency levels: every resolved
    /// callee of a function sits in an earlier level, except for functions
    /// on call cycles, which all land together in the last level and
    /// converge across passes instead. Functions within one level have no
    /// unresolved same-pass dependency on each other and may be analyzed
    /// concurrently.
    pub fn bottom_up_levels(&self) -> Result<Vec<Vec<FunctionId>>, Error> {
        let mut callees_of: FxHashMap<FunctionId, rustc_hash::FxHashSet<FunctionId>> = self
            .nodes_by_function
            .keys()
            .map(|&id| (id, rustc_hash::FxHashSet::default()))
            .collect();
        for ((caller, _site), callees) in &self.callees_by_site {
            if let CalleeSet::Resolved(resolved) = callees {
                for &callee in resolved {
                    // Self-recursion is not a same-pass dependency.
                    if callee != *caller {
                        callees_of.entry(*caller).or_default().insert(callee);
                    }
                }
            }
        }

        let mut remaining: Vec<FunctionId> = self.nodes_by_function.keys().copied().collect();
        remaining.sort_unstable();
        let mut assigned = rustc_hash::FxHashSet::default();
        let mut levels = Vec::new();
        while !remaining.is_empty() {
            let ready: Vec<FunctionId> = remaining
                .iter()
                .filter(|id| callees_of[id].iter().all(|callee| assigned.contains(callee)))
                .copied()
                .collect();
            if ready.is_empty() {
                // Only closed call cycles are left.
                levels.push(remaining);
                break;
            }
            assigned.extend(ready.iter().copied());
            remaining.retain(|id| !assigned.contains(id));
            levels.push(ready);
        }
        Ok(levels)
    }

    /// Render the call graph in dot graphviz format.
    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl fmt::Debug for CallGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallGraph")
            .field("functions", &self.nodes_by_function.len())
            .field("call_sites", &self.callees_by_site.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{ControlFlowGraph, Function, MethodRef, Program};

    fn leaf(class: &str, name: &str) -> Function {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.constant(0, 1);
        block.ret(0);
        let entry = block.index();
        cfg.set_entry(entry).unwrap();
        Function::new(class, name, 0, true, cfg)
    }

    fn caller(class: &str, name: &str, kind: InvokeKind, target: MethodRef) -> Function {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.invoke(kind, target, vec![], Some(0));
        block.ret(0);
        let entry = block.index();
        cfg.set_entry(entry).unwrap();
        Function::new(class, name, 0, true, cfg)
    }

    fn invoke_site(program: &Program, id: FunctionId) -> InstructionId {
        program
            .function(id)
            .unwrap()
            .control_flow_graph()
            .instructions()
            .into_iter()
            .find(|instruction| instruction.is_invoke())
            .unwrap()
            .id()
    }

    #[test]
    fn static_calls_resolve_to_one_callee() {
        let mut program = Program::new();
        let callee = program.add_function(leaf("Lib", "compute")).unwrap();
        let caller_id = program
            .add_function(caller(
                "Main",
                "run",
                InvokeKind::Static,
                MethodRef::new("Lib", "compute"),
            ))
            .unwrap();
        let graph = CallGraph::build(&program, 5).unwrap();

        let site = invoke_site(&program, caller_id);
        assert_eq!(
            graph.callees(caller_id, site),
            Some(&CalleeSet::Resolved(vec![callee]))
        );
        // Bottom-up: the callee is analyzed before its caller.
        let order = graph.bottom_up_order().unwrap();
        let position = |id| order.iter().position(|&f| f == id).unwrap();
        assert!(position(callee) < position(caller_id));
        // And it sits in a strictly earlier dependency level.
        let levels = graph.bottom_up_levels().unwrap();
        assert_eq!(levels, vec![vec![callee], vec![caller_id]]);
    }

    #[test]
    fn virtual_calls_fan_out_to_overrides() {
        let mut program = Program::new();
        let base = program.add_function(leaf("Base", "run")).unwrap();
        let sub = program.add_function(leaf("Sub", "run")).unwrap();
        program.add_override(base, sub).unwrap();
        let caller_id = program
            .add_function(caller(
                "Main",
                "go",
                InvokeKind::Virtual,
                MethodRef::new("Base", "run"),
            ))
            .unwrap();
        let graph = CallGraph::build(&program, 5).unwrap();
        let site = invoke_site(&program, caller_id);
        assert_eq!(
            graph.callees(caller_id, site),
            Some(&CalleeSet::Resolved(vec![base, sub]))
        );
    }

    #[test]
    fn large_dispatch_sets_become_opaque() {
        let mut program = Program::new();
        let base = program.add_function(leaf("Base", "run")).unwrap();
        for i in 0..3 {
            let sub = program
                .add_function(leaf(&format!("Sub{}", i), "run"))
                .unwrap();
            program.add_override(base, sub).unwrap();
        }
        let caller_id = program
            .add_function(caller(
                "Main",
                "go",
                InvokeKind::Virtual,
                MethodRef::new("Base", "run"),
            ))
            .unwrap();
        // Threshold below the fan-out of 4.
        let graph = CallGraph::build(&program, 3).unwrap();
        let site = invoke_site(&program, caller_id);
        assert_eq!(graph.callees(caller_id, site), Some(&CalleeSet::Opaque));
    }

    #[test]
    fn unresolved_callees_are_an_empty_set() {
        let mut program = Program::new();
        let caller_id = program
            .add_function(caller(
                "Main",
                "go",
                InvokeKind::Static,
                MethodRef::new("java.lang.Math", "random"),
            ))
            .unwrap();
        let graph = CallGraph::build(&program, 5).unwrap();
        let site = invoke_site(&program, caller_id);
        assert_eq!(
            graph.callees(caller_id, site),
            Some(&CalleeSet::Resolved(vec![]))
        );
    }

    #[test]
    fn mutually_recursive_functions_are_still_ordered() {
        let mut program = Program::new();
        let a = program
            .add_function(caller(
                "M",
                "a",
                InvokeKind::Static,
                MethodRef::new("M", "b"),
            ))
            .unwrap();
        let b = program
            .add_function(caller(
                "M",
                "b",
                InvokeKind::Static,
                MethodRef::new("M", "a"),
            ))
            .unwrap();
        let graph = CallGraph::build(&program, 5).unwrap();
        let order = graph.bottom_up_order().unwrap();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&a) && order.contains(&b));
        // The cycle collapses into one level and converges across passes.
        let levels = graph.bottom_up_levels().unwrap();
        assert_eq!(levels, vec![vec![a, b]]);
    }

    #[test]
    fn ghost_nodes_frame_the_graph() {
        let mut program = Program::new();
        program.add_function(leaf("Lib", "compute")).unwrap();
        let graph = CallGraph::build(&program, 5).unwrap();
        let dot = graph.dot_graph();
        assert!(dot.contains("ghost entry"));
        assert!(dot.contains("ghost exit"));
        assert!(dot.contains("Lib.compute"));
    }
}
