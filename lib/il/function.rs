use crate::il::{ControlFlowGraph, FunctionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A function under analysis.
///
/// On entry, registers `0..param_count` hold the parameters in declaration
/// order. For a non-static function, parameter 0 is the receiver.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Function {
    // The class this function belongs to.
    class: String,
    // The name of the function.
    name: String,
    // The number of formal parameters, including the receiver for non-static
    // functions.
    param_count: u32,
    // Whether this function is static (has no receiver).
    is_static: bool,
    // The `ControlFlowGraph` capturing the semantics of the function.
    control_flow_graph: ControlFlowGraph,
    // Functions which belong to Programs have ids.
    id: Option<FunctionId>,
}

impl Function {
    pub fn new<C: Into<String>, N: Into<String>>(
        class: C,
        name: N,
        param_count: u32,
        is_static: bool,
        control_flow_graph: ControlFlowGraph,
    ) -> Function {
        Function {
            class: class.into(),
            name: name.into(),
            param_count,
            is_static,
            control_flow_graph,
            id: None,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `Class.name` form used for override-table and reset-set lookups.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }

    pub fn param_count(&self) -> u32 {
        self.param_count
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn control_flow_graph(&self) -> &ControlFlowGraph {
        &self.control_flow_graph
    }

    pub fn control_flow_graph_mut(&mut self) -> &mut ControlFlowGraph {
        &mut self.control_flow_graph
    }

    /// The id of this function within its `Program`, if it has been added to
    /// one.
    pub fn id(&self) -> Option<FunctionId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: FunctionId) {
        self.id = Some(id);
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}", id, self.qualified_name()),
            None => write!(f, "{}", self.qualified_name()),
        }
    }
}
