//! Diagnostics of a randomization run.

use crate::datarando::{EquivalenceClassRegistry, NULL_MASK};
use crate::Error;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Counters gathered while randomizing one module.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// Nodes with at least one value mapped to them.
    pub nodes: usize,
    pub heap_nodes: usize,
    pub heap_classes: u64,
    pub incomplete_nodes: usize,
    /// Classes which were asked for a mask.
    pub equivalence_classes: usize,
    pub equivalence_classes_accessed: usize,
    pub cant_encrypt_global: usize,
    pub cant_encrypt_type: usize,
    pub cant_encrypt_external_call: usize,
    pub cant_encrypt_va_list: usize,
    pub cant_encrypt_classes: usize,
    pub safe_classes: usize,
    /// Classes which share the null mask count as one.
    pub effective_equivalence_classes: usize,
    pub masks: u64,
    pub global_classes: usize,
    pub max_global_class: usize,
    pub not_encrypted: usize,
    pub fixed_point_iterations: usize,
    pub instrumented: usize,
    pub wrapped_calls: usize,
    pub encrypted_globals: usize,
}

impl Statistics {
    /// Fill in the counters kept by `registry`.
    pub fn gather(&mut self, registry: &EquivalenceClassRegistry) {
        self.equivalence_classes = registry.masks().len();
        self.equivalence_classes_accessed = registry.access_counts().len();
        self.not_encrypted = registry
            .masks()
            .values()
            .filter(|mask| **mask == NULL_MASK)
            .count();
        self.effective_equivalence_classes = self.equivalence_classes - self.not_encrypted
            + if self.not_encrypted > 0 { 1 } else { 0 };
        self.masks = registry.masks_issued();
        self.heap_classes = registry.heap_classes();
    }

    pub fn log(&self) {
        info!(
            "{} equivalence classes ({} effective, {} not encrypted), {} masks",
            self.equivalence_classes,
            self.effective_equivalence_classes,
            self.not_encrypted,
            self.masks
        );
        info!(
            "Unencryptable: {} global, {} type, {} external call, {} va_list",
            self.cant_encrypt_global,
            self.cant_encrypt_type,
            self.cant_encrypt_external_call,
            self.cant_encrypt_va_list
        );
        info!(
            "{} memory operations instrumented, {} library calls wrapped, {} globals encrypted",
            self.instrumented, self.wrapped_calls, self.encrypted_globals
        );
    }
}

/// The result of randomizing one module.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Report {
    pub statistics: Statistics,
    /// Mask of every class which was asked for one.
    pub masks: BTreeMap<usize, u64>,
    pub do_not_replace_address: BTreeSet<String>,
    pub fixed_point_reached: bool,
}

/// Write every equivalence class which received a mask.
pub fn write_equivalence_classes<W: Write>(
    registry: &EquivalenceClassRegistry,
    writer: &mut W,
) -> Result<(), Error> {
    for (&node_index, &mask) in registry.masks() {
        let node = registry.graph().node(node_index)?;
        if mask != NULL_MASK {
            writeln!(writer, "Mask = {:#018x}", mask)?;
        }
        writeln!(writer, "Mask reason:")?;
        for reason in registry.reasons(node_index) {
            writeln!(writer, "\t{}", reason)?;
        }
        writeln!(writer, "Node: {}", node)?;
        writeln!(writer, "Allocation count: {}", node.allocations())?;
        writeln!(writer, "Class members:")?;
        for value in registry.values().values_for_node(node_index) {
            writeln!(writer, "{}", value)?;
        }
        for function in node.functions() {
            writeln!(writer, "Function: {}", function)?;
        }
        writeln!(writer, "{}", "*".repeat(80))?;
    }
    Ok(())
}

/// Write the number of mask requests for each class as CSV.
pub fn write_usage_counts<W: Write>(
    registry: &EquivalenceClassRegistry,
    writer: &mut W,
) -> Result<(), Error> {
    writeln!(writer, "Node,Access count,Flags")?;
    for (&node, &count) in registry.access_counts() {
        let flags = registry
            .graph()
            .node(node)
            .map(|node| node.flags().to_string())
            .unwrap_or_default();
        writeln!(writer, "{},{},{}", node, count, flags)?;
    }
    Ok(())
}

/// Log the allocation count of every masked class which is accessed.
pub fn log_allocation_counts(registry: &EquivalenceClassRegistry) {
    for (&node, &mask) in registry.masks() {
        if mask == NULL_MASK || !registry.access_counts().contains_key(&node) {
            continue;
        }
        if let Ok(storage) = registry.graph().node(node) {
            info!("Node{},{},{:#x}", node, storage.allocations(), mask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::*;
    use crate::datarando::MaskGenerator;
    use crate::il::ValueRef;

    fn registry() -> EquivalenceClassRegistry {
        let mut graph = PointsToGraph::new();
        let masked = graph.add_node(NodeFlags::HEAP, 8);
        let plain = graph.add_node(NodeFlags::EXTERNAL | NodeFlags::DO_NOT_ENCRYPT, 8);
        graph.node_mut(plain).unwrap().add_reason("External global variable: environ");
        graph.node_mut(plain).unwrap().add_function("callback");
        graph.map_scalar(ValueRef::local("main", "buf"), NodeHandle::new(masked, 0));
        graph.map_global(ValueRef::global("environ"), NodeHandle::new(plain, 0));
        let values = ValueToNodeMap::build(&graph);
        let mut registry = EquivalenceClassRegistry::new(graph, values, MaskGenerator::new(0, "r", 8));
        registry.mask(&ValueRef::local("main", "buf"));
        registry.mask(&ValueRef::local("main", "buf"));
        registry.mask(&ValueRef::global("environ"));
        registry
    }

    #[test]
    fn class_dump_lists_reasons_and_members() {
        let registry = registry();
        let mut out = Vec::new();
        write_equivalence_classes(&registry, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(out.matches("Mask = ").count(), 1);
        assert!(out.contains("\tExternal global variable: environ\n"));
        assert!(out.contains("main:%buf\n"));
        assert!(out.contains("Function: callback\n"));
        assert_eq!(out.matches(&"*".repeat(80)).count(), 2);
    }

    #[test]
    fn usage_counts_and_statistics() {
        let registry = registry();
        let mut out = Vec::new();
        write_usage_counts(&registry, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Node,Access count,Flags");
        assert!(lines[1].starts_with("0,2,"));
        assert!(lines[2].starts_with("1,1,"));

        let mut statistics = Statistics::default();
        statistics.gather(&registry);
        assert_eq!(statistics.equivalence_classes, 2);
        assert_eq!(statistics.not_encrypted, 1);
        assert_eq!(statistics.effective_equivalence_classes, 2);
        assert_eq!(statistics.masks, 1);
    }
}
