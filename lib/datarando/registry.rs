//! Assignment of masks to equivalence classes.

use crate::analysis::{NodeFlags, NodeHandle, PointsToGraph, ValueToNodeMap};
use crate::datarando::{LibraryWrapperCatalog, MaskGenerator, NULL_MASK};
use crate::il;
use crate::Error;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};

/// The mask of every equivalence class.
///
/// Classes receive a mask the first time one is requested for them. Classes
/// which may never be masked receive the null mask, so every node must be
/// classified before the registry is built.
#[derive(Clone, Debug)]
pub struct EquivalenceClassRegistry {
    graph: PointsToGraph,
    values: ValueToNodeMap,
    generator: MaskGenerator,
    masks: BTreeMap<usize, u64>,
    // Reasons for masks assigned by the registry itself
    reasons: BTreeMap<usize, BTreeSet<String>>,
    access_counts: BTreeMap<usize, u64>,
    unknown_nodes_used: BTreeSet<usize>,
    masks_issued: u64,
    heap_classes: u64,
}

impl EquivalenceClassRegistry {
    pub fn new(
        graph: PointsToGraph,
        values: ValueToNodeMap,
        generator: MaskGenerator,
    ) -> EquivalenceClassRegistry {
        EquivalenceClassRegistry {
            graph,
            values,
            generator,
            masks: BTreeMap::new(),
            reasons: BTreeMap::new(),
            access_counts: BTreeMap::new(),
            unknown_nodes_used: BTreeSet::new(),
            masks_issued: 0,
            heap_classes: 0,
        }
    }

    pub fn graph(&self) -> &PointsToGraph {
        &self.graph
    }

    pub fn values(&self) -> &ValueToNodeMap {
        &self.values
    }

    pub fn effective_mask_size(&self) -> u64 {
        self.generator.effective_mask_size()
    }

    fn assign(&mut self, node: usize, mask: u64) {
        let heap = self
            .graph
            .node(node)
            .map(|node| node.contains(NodeFlags::HEAP))
            .unwrap_or(false);
        if heap && !self.masks.contains_key(&node) {
            self.heap_classes += 1;
        }
        self.masks.insert(node, mask);
    }

    /// Give `node` the null mask, for `reason`.
    pub fn assign_null<S: Into<String>>(&mut self, node: usize, reason: S) {
        self.assign(node, NULL_MASK);
        self.reasons
            .entry(node)
            .or_insert_with(BTreeSet::new)
            .insert(reason.into());
    }

    /// The mask of the class of `handle`. Values without a node receive a
    /// fresh mask nobody else shares.
    pub fn mask_for_node(&mut self, handle: Option<NodeHandle>) -> u64 {
        let node = match handle {
            Some(handle) => handle.node,
            None => return self.generator.next_mask(),
        };

        let flags = self
            .graph
            .node(node)
            .map(|node| node.flags())
            .unwrap_or(NodeFlags::UNKNOWN);
        if flags.contains(NodeFlags::UNKNOWN) && self.unknown_nodes_used.insert(node) {
            warn!("Using node with unknown flag set, Node {}", node);
        }

        *self.access_counts.entry(node).or_insert(0) += 1;

        if let Some(mask) = self.masks.get(&node) {
            return *mask;
        }
        if flags.contains(NodeFlags::DO_NOT_ENCRYPT) {
            self.assign(node, NULL_MASK);
            return NULL_MASK;
        }
        let mask = self.generator.next_mask();
        self.assign(node, mask);
        self.masks_issued += 1;
        mask
    }

    /// The mask of the memory `value` points to.
    pub fn mask(&mut self, value: &il::ValueRef) -> u64 {
        let handle = self.values.get(value);
        self.mask_for_node(handle)
    }

    /// The mask of the memory the address `expression`, in `function`, points
    /// into.
    pub fn mask_for_expression(&mut self, function: &str, expression: &il::Expression) -> u64 {
        let handle = self.values.node_for_expression(function, expression);
        self.mask_for_node(handle)
    }

    /// `new` holds the value of `old`, and shares its class.
    pub fn replace(&mut self, old: &il::ValueRef, new: il::ValueRef) {
        self.values.replace(old, new);
    }

    /// Append one mask for every level of memory reachable through pointers
    /// from the value of `expression`.
    ///
    /// Struct pointees contribute the masks reachable from each of their
    /// fields, and each struct type is visited only once. Function pointers and
    /// types which cannot be encrypted contribute nothing.
    pub fn append_masks_for_reachable(
        &mut self,
        function: &str,
        expression: &il::Expression,
        layout: &il::Layout,
        catalog: &LibraryWrapperCatalog,
        masks: &mut Vec<u64>,
    ) -> Result<(), Error> {
        let handle = self.values.node_for_expression(function, expression);
        let mut visited = BTreeSet::new();
        self.append_masks_for_type(&expression.ty(), handle, layout, catalog, masks, &mut visited)
    }

    /// Append the masks reachable from a value of type `ty` pointing to
    /// `handle`.
    pub fn append_masks_for_type(
        &mut self,
        ty: &il::Type,
        handle: Option<NodeHandle>,
        layout: &il::Layout,
        catalog: &LibraryWrapperCatalog,
        masks: &mut Vec<u64>,
        visited: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        if !catalog.type_can_be_encrypted(ty, layout) {
            return Ok(());
        }
        let pointee = match ty.pointee() {
            Some(pointee) if !pointee.is_function() => pointee,
            _ => return Ok(()),
        };
        if let il::Type::Struct(ref name) = *pointee {
            if visited.contains(name) {
                return Ok(());
            }
        }

        masks.push(self.mask_for_node(handle));

        match *pointee {
            il::Type::Struct(ref name) => {
                visited.insert(name.clone());
                let struct_layout = layout.struct_layout(name)?;
                let fields = layout
                    .structs()
                    .get(name)
                    .and_then(|body| body.fields())
                    .map(|fields| fields.to_vec())
                    .unwrap_or_default();
                for (field, offset) in fields.iter().zip(struct_layout.offsets()) {
                    let child = handle.and_then(|handle| self.graph.link(handle, *offset));
                    self.append_masks_for_type(field, child, layout, catalog, masks, visited)?;
                }
            }
            il::Type::Pointer(_) => {
                let child = handle.and_then(|handle| self.graph.link(handle, 0));
                self.append_masks_for_type(pointee, child, layout, catalog, masks, visited)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// The mask shared by the variadic arguments of a call: that of the first
    /// variadic argument with a node.
    pub fn mask_for_varargs(&mut self, function: &str, varargs: &[il::Expression]) -> u64 {
        let handle = varargs
            .iter()
            .find_map(|argument| self.values.node_for_expression(function, argument));
        self.mask_for_node(handle)
    }

    /// The mask assigned to `node`, if any was requested.
    pub fn assigned_mask(&self, node: usize) -> Option<u64> {
        self.masks.get(&node).cloned()
    }

    pub fn masks(&self) -> &BTreeMap<usize, u64> {
        &self.masks
    }

    /// Every reason `node` was given the null mask.
    pub fn reasons(&self, node: usize) -> BTreeSet<String> {
        let mut reasons = self.reasons.get(&node).cloned().unwrap_or_default();
        if let Ok(node) = self.graph.node(node) {
            if node.is_do_not_encrypt() {
                reasons.extend(node.reasons().iter().cloned());
            }
        }
        reasons
    }

    pub fn access_counts(&self) -> &BTreeMap<usize, u64> {
        &self.access_counts
    }

    /// The number of random masks handed to classes.
    pub fn masks_issued(&self) -> u64 {
        self.masks_issued
    }

    /// The number of heap nodes which were assigned a mask, null or not.
    pub fn heap_classes(&self) -> u64 {
        self.heap_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn registry(graph: PointsToGraph) -> EquivalenceClassRegistry {
        let values = ValueToNodeMap::build(&graph);
        EquivalenceClassRegistry::new(graph, values, MaskGenerator::new(11, "test", 8))
    }

    #[test]
    fn masks_are_stable_per_class() {
        let mut graph = PointsToGraph::new();
        let a = graph.add_node(NodeFlags::empty(), 8);
        graph.map_scalar(ValueRef::local("f", "p"), NodeHandle::new(a, 0));
        graph.map_scalar(ValueRef::local("f", "q"), NodeHandle::new(a, 4));
        let mut registry = registry(graph);

        let p = registry.mask(&ValueRef::local("f", "p"));
        let q = registry.mask(&ValueRef::local("f", "q"));
        assert_ne!(p, NULL_MASK);
        assert_eq!(p, q);
        assert_eq!(registry.masks_issued(), 1);
        assert_eq!(registry.access_counts()[&a], 2);

        // Values without nodes get fresh masks every time
        let unmapped = ValueRef::local("f", "r");
        let first = registry.mask(&unmapped);
        assert_ne!(first, registry.mask(&unmapped));
    }

    #[test]
    fn do_not_encrypt_nodes_get_null_masks() {
        let mut graph = PointsToGraph::new();
        let a = graph.add_node(NodeFlags::DO_NOT_ENCRYPT, 8);
        graph.node_mut(a).unwrap().add_reason("External global variable: stdout");
        graph.map_global(ValueRef::global("stdout"), NodeHandle::new(a, 0));
        let mut registry = registry(graph);

        assert_eq!(registry.mask(&ValueRef::global("stdout")), NULL_MASK);
        assert_eq!(registry.masks_issued(), 0);
        assert!(registry
            .reasons(a)
            .contains("External global variable: stdout"));
    }

    #[test]
    fn reachable_masks_follow_pointer_levels() {
        let mut graph = PointsToGraph::new();
        let argv = graph.add_node(NodeFlags::empty(), 8);
        let strings = graph.add_node(NodeFlags::empty(), 1);
        graph.add_link(argv, 0, NodeHandle::new(strings, 0)).unwrap();
        graph.map_scalar(ValueRef::local("main", "argv"), NodeHandle::new(argv, 0));
        let mut registry = registry(graph);
        let catalog = LibraryWrapperCatalog::new().unwrap();

        let mut masks = Vec::new();
        let argv_expr = expr_scalar("argv", Type::pointer(Type::i8_pointer()));
        registry
            .append_masks_for_reachable("main", &argv_expr, &Layout::default(), &catalog, &mut masks)
            .unwrap();
        assert_eq!(masks.len(), 2);
        assert_eq!(masks[0], registry.assigned_mask(argv).unwrap());
        assert_eq!(masks[1], registry.assigned_mask(strings).unwrap());

        // Function pointers and plain integers have no reachable memory
        let mut masks = Vec::new();
        let callback = expr_scalar("cb", Type::parse("void (i32)*").unwrap());
        registry
            .append_masks_for_reachable("main", &callback, &Layout::default(), &catalog, &mut masks)
            .unwrap();
        registry
            .append_masks_for_reachable("main", &expr_const(1, 32), &Layout::default(), &catalog, &mut masks)
            .unwrap();
        assert!(masks.is_empty());
    }

    #[test]
    fn recursive_structs_are_visited_once() {
        let mut structs = StructTable::new();
        structs.insert(
            "struct.list".to_string(),
            StructBody::new(vec![
                Type::Int(64),
                Type::pointer(Type::structure("struct.list")),
                Type::i8_pointer(),
            ]),
        );
        let layout = Layout::new(DataLayout::default(), structs);

        let mut graph = PointsToGraph::new();
        let list = graph.add_node(NodeFlags::empty(), 24);
        let data = graph.add_node(NodeFlags::empty(), 1);
        graph.add_link(list, 8, NodeHandle::new(list, 0)).unwrap();
        graph.add_link(list, 16, NodeHandle::new(data, 0)).unwrap();
        graph.map_scalar(ValueRef::local("f", "head"), NodeHandle::new(list, 0));
        let mut registry = registry(graph);
        let catalog = LibraryWrapperCatalog::new().unwrap();

        let mut masks = Vec::new();
        let head = expr_scalar("head", Type::pointer(Type::structure("struct.list")));
        registry
            .append_masks_for_reachable("f", &head, &layout, &catalog, &mut masks)
            .unwrap();
        assert_eq!(masks.len(), 2);
        assert_eq!(masks[1], registry.assigned_mask(data).unwrap());
    }
}
