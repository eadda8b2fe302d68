//! Implements a directed graph.
//!
//! The graph is an arena of vertices keyed by index. It is used both for
//! control flow graphs and for the points-to graph of storage nodes, the
//! latter of which is routinely cyclic. Every traversal here carries an
//! explicit visited set.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::Error;

pub trait Vertex: Clone + Sync {
    /// The index of this vertex.
    fn index(&self) -> usize;
}

pub trait Edge: Clone + Sync {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
}

/// A directed graph.
///
/// A graph serializes as its list of vertices and list of edges.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
}

impl<V: Vertex, E: Edge> Default for Graph<V, E> {
    fn default() -> Graph<V, E> {
        Graph::new()
    }
}

impl<V, E> Serialize for Graph<V, E>
where
    V: Vertex + Serialize,
    E: Edge + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("vertices", &self.vertices())?;
        state.serialize_field("edges", &self.edges())?;
        state.end()
    }
}

impl<'de, V, E> Deserialize<'de> for Graph<V, E>
where
    V: Vertex + Deserialize<'de>,
    E: Edge + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Parts<V, E> {
            vertices: Vec<V>,
            #[serde(default = "Vec::new")]
            edges: Vec<E>,
        }

        let parts = Parts::<V, E>::deserialize(deserializer)?;
        let mut graph = Graph::new();
        for vertex in parts.vertices {
            graph.insert_vertex(vertex).map_err(D::Error::custom)?;
        }
        for edge in parts.edges {
            graph.insert_edge(edge).map_err(D::Error::custom)?;
        }
        Ok(graph)
    }
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
            successors: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    pub fn has_edge(&self, head: usize, tail: usize) -> bool {
        self.edges.contains_key(&(head, tail))
    }

    /// Inserts a vertex into the graph.
    /// # Errors
    /// Error if the vertex already exists by index.
    pub fn insert_vertex(&mut self, vertex: V) -> Result<(), Error> {
        let index = vertex.index();
        if self.has_vertex(index) {
            return Err(format!("duplicate vertex {}", index).into());
        }
        self.successors.insert(index, BTreeSet::new());
        self.vertices.insert(index, vertex);
        Ok(())
    }

    /// Inserts an edge into the graph.
    /// # Errors
    /// Error if the edge already exists, or if either end is missing.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        let (head, tail) = (edge.head(), edge.tail());
        if self.has_edge(head, tail) {
            return Err(format!("duplicate edge {} -> {}", head, tail).into());
        }
        if !self.has_vertex(tail) {
            return Err(Error::GraphVertexNotFound(tail));
        }
        self.successors
            .get_mut(&head)
            .ok_or(Error::GraphVertexNotFound(head))?
            .insert(tail);
        self.edges.insert((head, tail), edge);
        Ok(())
    }

    /// The indices of the immediate successors of a vertex, in ascending
    /// order.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.successors
            .get(&index)
            .map(|successors| successors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Every vertex reachable from any of `roots`, the roots included.
    pub fn reachable_from<I>(&self, roots: I) -> Result<BTreeSet<usize>, Error>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut reachable = BTreeSet::new();
        let mut worklist = Vec::new();
        for root in roots {
            if !self.has_vertex(root) {
                return Err(Error::GraphVertexNotFound(root));
            }
            if reachable.insert(root) {
                worklist.push(root);
            }
        }

        while let Some(vertex) = worklist.pop() {
            for &successor in &self.successors[&vertex] {
                if reachable.insert(successor) {
                    worklist.push(successor);
                }
            }
        }
        Ok(reachable)
    }

    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    pub fn vertices_mut(&mut self) -> Vec<&mut V> {
        self.vertices.values_mut().collect()
    }

    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    pub fn vertex_mut(&mut self, index: usize) -> Result<&mut V, Error> {
        self.vertices
            .get_mut(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    pub fn edge(&self, head: usize, tail: usize) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    pub fn edges_mut(&mut self) -> Vec<&mut E> {
        self.edges.values_mut().collect()
    }

    /// The edges leaving a vertex, ordered by tail.
    pub fn edges_out(&self, index: usize) -> Result<Vec<&E>, Error> {
        let successors = self
            .successors
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))?;
        Ok(successors
            .iter()
            .map(|tail| &self.edges[&(index, *tail)])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Vertex for usize {
        fn index(&self) -> usize {
            *self
        }
    }

    impl Edge for (usize, usize) {
        fn head(&self) -> usize {
            self.0
        }

        fn tail(&self) -> usize {
            self.1
        }
    }

    /// 1 -> 2, 2 -> {3, 4, 6}, {3, 4} -> 5, 5 -> 2, and 7 on its own.
    fn cyclic() -> Graph<usize, (usize, usize)> {
        let mut graph = Graph::new();
        for vertex in 1..8 {
            graph.insert_vertex(vertex).unwrap();
        }
        for edge in [(1, 2), (2, 3), (2, 4), (2, 6), (3, 5), (4, 5), (5, 2)] {
            graph.insert_edge(edge).unwrap();
        }
        graph
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut graph = cyclic();
        assert!(graph.insert_vertex(1).is_err());
        assert!(graph.insert_edge((1, 2)).is_err());
        assert!(graph.insert_edge((1, 9)).is_err());
        assert!(graph.insert_edge((9, 1)).is_err());
    }

    #[test]
    fn successors_are_ordered() {
        let graph = cyclic();
        assert_eq!(graph.successor_indices(2).unwrap(), vec![3, 4, 6]);
        let tails: Vec<usize> = graph
            .edges_out(2)
            .unwrap()
            .iter()
            .map(|edge| edge.tail())
            .collect();
        assert_eq!(tails, vec![3, 4, 6]);
        assert!(graph.successor_indices(9).is_err());
    }

    #[test]
    fn reachability_terminates_on_cycles() {
        let graph = cyclic();
        let reachable = graph.reachable_from(vec![6, 7]).unwrap();
        assert_eq!(reachable, vec![6, 7].into_iter().collect());

        let reachable = graph.reachable_from(vec![3, 3]).unwrap();
        assert_eq!(reachable, vec![2, 3, 4, 5, 6].into_iter().collect());

        let again = graph.reachable_from(reachable.iter().cloned()).unwrap();
        assert_eq!(again, reachable);
        assert!(graph.reachable_from(vec![9]).is_err());
    }

    #[test]
    fn default_needs_no_default_vertices() {
        #[derive(Clone)]
        struct Node(usize);

        impl Vertex for Node {
            fn index(&self) -> usize {
                self.0
            }
        }

        let graph: Graph<Node, (usize, usize)> = Graph::default();
        assert_eq!(graph.num_vertices(), 0);
    }

    #[test]
    fn json_round_trip() {
        let graph = cyclic();
        let json = serde_json::to_string(&graph).unwrap();
        let parsed: Graph<usize, (usize, usize)> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);

        let dangling = r#"{"vertices": [1], "edges": [[1, 2]]}"#;
        assert!(serde_json::from_str::<Graph<usize, (usize, usize)>>(dangling).is_err());
    }
}
