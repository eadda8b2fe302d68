//! The storage-node graph produced by a points-to analysis.
//!
//! Each `StorageNode` stands for an alias equivalence class of memory
//! objects. Nodes link to the nodes their contents point to, keyed by the
//! byte offset of the pointer within the node. The graph is general and
//! routinely cyclic.

use crate::graph;
use crate::il::ValueRef;
use crate::Error;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

bitflags! {
    /// Properties of a storage node.
    #[derive(Default, Deserialize, Serialize)]
    pub struct NodeFlags: u32 {
        const HEAP                     = 0x001;
        const EXTERNAL                 = 0x002;
        /// The analysis could not see every use of the node.
        const INCOMPLETE               = 0x004;
        /// Every offset of the node has been collapsed onto offset 0.
        const FOLDED                   = 0x008;
        /// The node holds functions defined outside the module.
        const EXTERNAL_FUNCTION        = 0x010;
        const UNKNOWN                  = 0x020;
        const DO_NOT_ENCRYPT_REACHABLE = 0x100;
        const DO_NOT_ENCRYPT           = 0x200;
        const DO_NOT_REPLACE_ADDRESS   = 0x400;
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (NodeFlags::HEAP, "H"),
            (NodeFlags::EXTERNAL, "E"),
            (NodeFlags::INCOMPLETE, "I"),
            (NodeFlags::FOLDED, "F"),
            (NodeFlags::EXTERNAL_FUNCTION, "X"),
            (NodeFlags::UNKNOWN, "U"),
            (NodeFlags::DO_NOT_ENCRYPT, "D"),
            (NodeFlags::DO_NOT_REPLACE_ADDRESS, "A"),
        ];
        for (flag, name) in names.iter() {
            if self.contains(*flag) {
                write!(f, "{}", name)?;
            }
        }
        Ok(())
    }
}

/// A location within a storage node.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NodeHandle {
    pub node: usize,
    #[serde(default)]
    pub offset: u64,
}

impl NodeHandle {
    pub fn new(node: usize, offset: u64) -> NodeHandle {
        NodeHandle { node, offset }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}+{}", self.node, self.offset)
    }
}

/// An abstract memory object.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageNode {
    index: usize,
    #[serde(default)]
    flags: NodeFlags,
    /// Size in bytes.
    #[serde(default)]
    size: u64,
    #[serde(default)]
    links: BTreeMap<u64, NodeHandle>,
    #[serde(default)]
    functions: BTreeSet<String>,
    #[serde(default)]
    globals: BTreeSet<String>,
    /// The number of allocation sites creating objects of this node.
    #[serde(default)]
    allocations: u64,
    #[serde(default)]
    reasons: BTreeSet<String>,
}

impl StorageNode {
    pub fn new(index: usize, flags: NodeFlags, size: u64) -> StorageNode {
        StorageNode {
            index,
            flags,
            size,
            ..Default::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn contains(&self, flags: NodeFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn insert_flags(&mut self, flags: NodeFlags) {
        self.flags.insert(flags);
    }

    pub fn is_complete(&self) -> bool {
        !self.flags.contains(NodeFlags::INCOMPLETE)
    }

    pub fn is_do_not_encrypt(&self) -> bool {
        self.flags.contains(NodeFlags::DO_NOT_ENCRYPT)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn links(&self) -> &BTreeMap<u64, NodeHandle> {
        &self.links
    }

    /// Functions whose addresses this node holds.
    pub fn functions(&self) -> &BTreeSet<String> {
        &self.functions
    }

    pub fn add_function<S: Into<String>>(&mut self, function: S) {
        self.functions.insert(function.into());
    }

    /// Globals whose storage this node represents.
    pub fn globals(&self) -> &BTreeSet<String> {
        &self.globals
    }

    pub fn add_global<S: Into<String>>(&mut self, global: S) {
        self.globals.insert(global.into());
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn set_allocations(&mut self, allocations: u64) {
        self.allocations = allocations;
    }

    /// Why this node must not be encrypted.
    pub fn reasons(&self) -> &BTreeSet<String> {
        &self.reasons
    }

    pub fn add_reason<S: Into<String>>(&mut self, reason: S) {
        self.reasons.insert(reason.into());
    }
}

impl graph::Vertex for StorageNode {
    fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for StorageNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Node {} [{}] size {}", self.index, self.flags, self.size)?;
        if !self.globals.is_empty() {
            let globals: Vec<&str> = self.globals.iter().map(|g| g.as_str()).collect();
            write!(f, " globals {{{}}}", globals.join(", "))?;
        }
        if !self.functions.is_empty() {
            let functions: Vec<&str> = self.functions.iter().map(|g| g.as_str()).collect();
            write!(f, " functions {{{}}}", functions.join(", "))?;
        }
        for (offset, target) in &self.links {
            write!(f, " [{}]->{}", offset, target)?;
        }
        Ok(())
    }
}

/// An edge from a node to a node one of its fields points to.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NodeLink {
    head: usize,
    tail: usize,
}

impl graph::Edge for NodeLink {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }
}

/// Serialize maps with structured keys as lists of pairs.
pub(crate) mod pairs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(Vec::<(K, V)>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

#[derive(Deserialize, Serialize)]
struct Parts {
    nodes: Vec<StorageNode>,
    #[serde(default, with = "pairs")]
    globals_scalar_map: BTreeMap<ValueRef, NodeHandle>,
    #[serde(default, with = "pairs")]
    scalar_map: BTreeMap<ValueRef, NodeHandle>,
    #[serde(default)]
    global_ecs: Vec<BTreeSet<String>>,
}

/// The result of a whole-program points-to analysis.
///
/// The globals scalar map holds the mappings of the analysis' globals graph,
/// and the scalar map those of the final, bottom-up result graphs. Global
/// equivalence classes group globals and functions the analysis could not
/// tell apart, and therefore always share a node.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "Parts", into = "Parts")]
pub struct PointsToGraph {
    graph: graph::Graph<StorageNode, NodeLink>,
    globals_scalar_map: BTreeMap<ValueRef, NodeHandle>,
    scalar_map: BTreeMap<ValueRef, NodeHandle>,
    global_ecs: Vec<BTreeSet<String>>,
}

impl TryFrom<Parts> for PointsToGraph {
    type Error = Error;

    fn try_from(parts: Parts) -> Result<PointsToGraph, Error> {
        let mut graph = PointsToGraph::new();
        for node in &parts.nodes {
            graph.graph.insert_vertex(StorageNode {
                links: BTreeMap::new(),
                ..node.clone()
            })?;
        }
        for node in parts.nodes {
            for (offset, target) in node.links {
                graph.add_link(node.index, offset, target)?;
            }
        }
        graph.globals_scalar_map = parts.globals_scalar_map;
        graph.scalar_map = parts.scalar_map;
        graph.global_ecs = parts.global_ecs;
        Ok(graph)
    }
}

impl From<PointsToGraph> for Parts {
    fn from(graph: PointsToGraph) -> Parts {
        Parts {
            nodes: graph.graph.vertices().into_iter().cloned().collect(),
            globals_scalar_map: graph.globals_scalar_map,
            scalar_map: graph.scalar_map,
            global_ecs: graph.global_ecs,
        }
    }
}

impl PointsToGraph {
    pub fn new() -> PointsToGraph {
        PointsToGraph::default()
    }

    /// Add a node, returning its index.
    pub fn add_node(&mut self, flags: NodeFlags, size: u64) -> usize {
        let index = self.graph.num_vertices();
        let index = (index..)
            .find(|index| !self.graph.has_vertex(*index))
            .unwrap_or(index);
        // The index was just checked to be free.
        let _ = self
            .graph
            .insert_vertex(StorageNode::new(index, flags, size));
        index
    }

    pub fn node(&self, index: usize) -> Result<&StorageNode, Error> {
        self.graph
            .vertex(index)
            .map_err(|_| Error::NodeNotFound(index))
    }

    pub fn node_mut(&mut self, index: usize) -> Result<&mut StorageNode, Error> {
        self.graph
            .vertex_mut(index)
            .map_err(|_| Error::NodeNotFound(index))
    }

    pub fn nodes(&self) -> Vec<&StorageNode> {
        self.graph.vertices()
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn graph(&self) -> &graph::Graph<StorageNode, NodeLink> {
        &self.graph
    }

    /// Record that the pointer at `offset` within `head` points to `target`.
    pub fn add_link(&mut self, head: usize, offset: u64, target: NodeHandle) -> Result<(), Error> {
        self.node(target.node)?;
        self.node_mut(head)?.links.insert(offset, target);
        if !self.graph.has_edge(head, target.node) {
            self.graph.insert_edge(NodeLink {
                head,
                tail: target.node,
            })?;
        }
        Ok(())
    }

    /// Follow the link `offset` bytes past `handle`. Folded nodes only have a
    /// link at offset 0.
    pub fn link(&self, handle: NodeHandle, offset: u64) -> Option<NodeHandle> {
        let node = self.node(handle.node).ok()?;
        let offset = if node.contains(NodeFlags::FOLDED) {
            0
        } else {
            handle.offset + offset
        };
        node.links.get(&offset).cloned()
    }

    /// The nodes directly linked from `node`.
    pub fn children(&self, node: usize) -> Result<Vec<usize>, Error> {
        self.graph
            .successor_indices(node)
            .map_err(|_| Error::NodeNotFound(node))
    }

    /// Every node reachable from `roots`, including the roots.
    pub fn reachable<I>(&self, roots: I) -> Result<BTreeSet<usize>, Error>
    where
        I: IntoIterator<Item = usize>,
    {
        self.graph.reachable_from(roots)
    }

    pub fn map_global(&mut self, value: ValueRef, handle: NodeHandle) {
        self.globals_scalar_map.insert(value, handle);
    }

    pub fn map_scalar(&mut self, value: ValueRef, handle: NodeHandle) {
        self.scalar_map.insert(value, handle);
    }

    pub fn globals_scalar_map(&self) -> &BTreeMap<ValueRef, NodeHandle> {
        &self.globals_scalar_map
    }

    pub fn scalar_map(&self) -> &BTreeMap<ValueRef, NodeHandle> {
        &self.scalar_map
    }

    pub fn add_global_ec<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_ecs
            .push(members.into_iter().map(|member| member.into()).collect());
    }

    pub fn global_ecs(&self) -> &[BTreeSet<String>] {
        &self.global_ecs
    }

    /// The representative of the global equivalence class of `name`.
    pub fn leader_for_global<'a>(&'a self, name: &'a str) -> &'a str {
        self.global_ecs
            .iter()
            .find(|ec| ec.contains(name))
            .and_then(|ec| ec.iter().next())
            .map(|leader| leader.as_str())
            .unwrap_or(name)
    }

    /// The node of `name` in the globals graph.
    pub fn global_node(&self, name: &str) -> Option<NodeHandle> {
        self.globals_scalar_map
            .get(&ValueRef::global(name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folded_nodes_link_at_zero() {
        let mut graph = PointsToGraph::new();
        let object = graph.add_node(NodeFlags::empty(), 16);
        let folded = graph.add_node(NodeFlags::FOLDED, 16);
        let target = graph.add_node(NodeFlags::empty(), 8);
        graph.add_link(object, 8, NodeHandle::new(target, 0)).unwrap();
        graph.add_link(folded, 0, NodeHandle::new(target, 0)).unwrap();

        assert_eq!(graph.link(NodeHandle::new(object, 0), 8).map(|h| h.node), Some(target));
        assert_eq!(graph.link(NodeHandle::new(object, 0), 0), None);
        assert_eq!(graph.link(NodeHandle::new(folded, 4), 4).map(|h| h.node), Some(target));
        assert!(graph.add_link(object, 0, NodeHandle::new(99, 0)).is_err());
    }

    #[test]
    fn leaders_are_smallest_member() {
        let mut graph = PointsToGraph::new();
        graph.add_global_ec(vec!["zeta", "alpha", "mu"]);
        assert_eq!(graph.leader_for_global("mu"), "alpha");
        assert_eq!(graph.leader_for_global("other"), "other");
    }

    #[test]
    fn json_keeps_links_and_maps() {
        let mut graph = PointsToGraph::new();
        let a = graph.add_node(NodeFlags::HEAP, 8);
        graph.add_link(a, 0, NodeHandle::new(a, 0)).unwrap();
        graph.map_scalar(ValueRef::local("main", "p"), NodeHandle::new(a, 0));

        let json = serde_json::to_string(&graph).unwrap();
        let parsed: PointsToGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
        assert_eq!(parsed.children(a).unwrap(), vec![a]);
    }
}
