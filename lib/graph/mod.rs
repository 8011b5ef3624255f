//! Implements a directed graph.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Error;

pub trait Vertex: Clone {
    /// The index of this vertex.
    fn index(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
}

pub trait Edge: Clone {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
}

/// A directed graph.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Graph<V, E> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    edges_out: FxHashMap<usize, Vec<E>>,
    edges_in: FxHashMap<usize, Vec<E>>,
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            edges_out: FxHashMap::default(),
            edges_in: FxHashMap::default(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Returns true if the vertex with the given index exists in this graph.
    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Inserts a vertex into the graph. Errors if a vertex with the same
    /// index already exists.
    pub fn insert_vertex(&mut self, vertex: V) -> Result<(), Error> {
        let index = vertex.index();
        if self.vertices.contains_key(&index) {
            return Err(Error::Graph(format!("vertex {} already exists", index)));
        }
        self.vertices.insert(index, vertex);
        self.edges_out.insert(index, Vec::new());
        self.edges_in.insert(index, Vec::new());
        Ok(())
    }

    /// Inserts an edge into the graph. Errors if either endpoint does not
    /// exist, or if an edge between the same endpoints already exists.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        let head = edge.head();
        let tail = edge.tail();
        if !self.vertices.contains_key(&head) {
            return Err(Error::Graph(format!("head vertex {} does not exist", head)));
        }
        if !self.vertices.contains_key(&tail) {
            return Err(Error::Graph(format!("tail vertex {} does not exist", tail)));
        }
        if self.edges.contains_key(&(head, tail)) {
            return Err(Error::Graph(format!("edge {}->{} already exists", head, tail)));
        }
        self.edges.insert((head, tail), edge.clone());
        self.edges_out.entry(head).or_default().push(edge.clone());
        self.edges_in.entry(tail).or_default().push(edge);
        Ok(())
    }

    /// Get a vertex by index.
    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or_else(|| Error::Graph(format!("vertex {} does not exist", index)))
    }

    /// Get a mutable reference to a vertex by index.
    pub fn vertex_mut(&mut self, index: usize) -> Result<&mut V, Error> {
        self.vertices
            .get_mut(&index)
            .ok_or_else(|| Error::Graph(format!("vertex {} does not exist", index)))
    }

    /// Get every vertex in the graph, in index order.
    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    /// Get an edge by its head and tail indices.
    pub fn edge(&self, head: usize, tail: usize) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or_else(|| Error::Graph(format!("edge {}->{} does not exist", head, tail)))
    }

    /// Get every edge in the graph.
    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    /// Get every incoming edge to a vertex.
    pub fn edges_in(&self, index: usize) -> Result<&[E], Error> {
        self.edges_in
            .get(&index)
            .map(|edges| edges.as_slice())
            .ok_or_else(|| Error::Graph(format!("vertex {} does not exist", index)))
    }

    /// Get every outgoing edge from a vertex.
    pub fn edges_out(&self, index: usize) -> Result<&[E], Error> {
        self.edges_out
            .get(&index)
            .map(|edges| edges.as_slice())
            .ok_or_else(|| Error::Graph(format!("vertex {} does not exist", index)))
    }

    /// Get the indices of every predecessor of the given vertex.
    pub fn predecessor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        Ok(self.edges_in(index)?.iter().map(|e| e.head()).collect())
    }

    /// Get the indices of every successor of the given vertex.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        Ok(self.edges_out(index)?.iter().map(|e| e.tail()).collect())
    }

    /// Compute a depth-first post order over the vertices reachable from
    /// `root`. Vertices appear after all of their successors, which makes the
    /// reverse of this order the canonical iteration order for forward
    /// dataflow, and the order itself the canonical bottom-up order over a
    /// call graph.
    pub fn post_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::Graph(format!("vertex {} does not exist", root)));
        }
        let mut visited = FxHashSet::default();
        let mut order = Vec::with_capacity(self.vertices.len());
        // Iterative DFS; the bool marks whether the vertex's successors have
        // already been pushed.
        let mut stack = vec![(root, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                order.push(index);
                continue;
            }
            if !visited.insert(index) {
                continue;
            }
            stack.push((index, true));
            for successor in self.successor_indices(index)? {
                if !visited.contains(&successor) {
                    stack.push((successor, false));
                }
            }
        }
        Ok(order)
    }

    /// Render this graph in dot graphviz format.
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .values()
            .map(|v| {
                format!(
                    "{} [shape=\"box\", label=\"{}\"];",
                    v.index(),
                    v.dot_label().replace('\n', "\\l")
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .values()
            .map(|e| format!("{} -> {} [label=\"{}\"];", e.head(), e.tail(), e.dot_label()))
            .collect::<Vec<String>>();

        format!(
            "digraph G {{\n{}\n{}\n}}",
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}
