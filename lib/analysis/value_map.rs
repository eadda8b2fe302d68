use crate::analysis::{NodeHandle, PointsToGraph};
use crate::il::{Expression, ValueRef};
use std::collections::BTreeMap;

/// Maps values of a module to the storage node they point to.
///
/// The map is many-to-one. It is built once from a points-to graph, and must
/// be told about every value the randomization pass replaces.
#[derive(Clone, Debug, Default)]
pub struct ValueToNodeMap {
    map: BTreeMap<ValueRef, NodeHandle>,
}

impl ValueToNodeMap {
    /// Build the map for `graph`.
    ///
    /// Mappings from the globals graph are entered first, then those of the
    /// result graphs, which take precedence. Members of a global equivalence
    /// class missing from both receive the node of a mapped member.
    pub fn build(graph: &PointsToGraph) -> ValueToNodeMap {
        let mut map = BTreeMap::new();
        for (value, handle) in graph.globals_scalar_map() {
            map.insert(value.clone(), *handle);
        }
        for (value, handle) in graph.scalar_map() {
            map.insert(value.clone(), *handle);
        }

        for ec in graph.global_ecs() {
            let handle = ec
                .iter()
                .filter_map(|member| map.get(&ValueRef::global(member.as_str())))
                .cloned()
                .next();
            if let Some(handle) = handle {
                for member in ec {
                    map.entry(ValueRef::global(member.as_str()))
                        .or_insert(handle);
                }
            }
        }

        ValueToNodeMap { map }
    }

    pub fn get(&self, value: &ValueRef) -> Option<NodeHandle> {
        self.map.get(value).cloned()
    }

    /// The node the value of `expression`, in `function`, points to.
    ///
    /// Addresses computed from a mapped value, through casts, pointer
    /// arithmetic, or constant offsets, point into the node of that value.
    pub fn node_for_expression(&self, function: &str, expression: &Expression) -> Option<NodeHandle> {
        match *expression {
            Expression::Scalar(ref scalar) => self.get(&ValueRef::local(function, scalar.name())),
            Expression::Global(ref name, _) => self.get(&ValueRef::global(name.as_str())),
            Expression::Gep(_, ref base, ref offset) => {
                let handle = self.node_for_expression(function, base)?;
                match offset.get_constant().and_then(|offset| offset.value_u64()) {
                    Some(offset) => Some(NodeHandle::new(handle.node, handle.offset + offset)),
                    None => Some(handle),
                }
            }
            Expression::Bitcast(_, ref src)
            | Expression::PtrToInt(_, ref src)
            | Expression::IntToPtr(_, ref src) => self.node_for_expression(function, src),
            Expression::Add(ref lhs, ref rhs) | Expression::Sub(ref lhs, ref rhs) => self
                .node_for_expression(function, lhs)
                .or_else(|| self.node_for_expression(function, rhs)),
            _ => None,
        }
    }

    pub fn insert(&mut self, value: ValueRef, handle: NodeHandle) {
        self.map.insert(value, handle);
    }

    /// `new` now holds the value of `old` as well. Both keep pointing at
    /// the node of `old`.
    pub fn replace(&mut self, old: &ValueRef, new: ValueRef) {
        if let Some(handle) = self.map.get(old).cloned() {
            self.map.insert(new, handle);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValueRef, &NodeHandle)> {
        self.map.iter()
    }

    /// Every value mapped to `node`.
    pub fn values_for_node(&self, node: usize) -> Vec<&ValueRef> {
        self.map
            .iter()
            .filter(|(_, handle)| handle.node == node)
            .map(|(value, _)| value)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
