//! A `ControlFlowGraph` is a directed `Graph` of `Block` and `Edge`.

use crate::il::*;
use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The position of an instruction within a `ControlFlowGraph`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstructionLocation {
    pub block: usize,
    pub instruction: usize,
}

impl InstructionLocation {
    pub fn new(block: usize, instruction: usize) -> InstructionLocation {
        InstructionLocation { block, instruction }
    }
}

impl fmt::Display for InstructionLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:X}:{:02X}", self.block, self.instruction)
    }
}

/// A directed graph of types `Block` and `Edge`, with a single entry.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, Default)]
pub struct ControlFlowGraph {
    // The internal graph used to store our blocks.
    graph: graph::Graph<Block, Edge>,
    // The next index to use when creating a basic block.
    #[serde(default)]
    next_index: usize,
    // The index for the next temp scalar to create.
    #[serde(default)]
    next_temp_index: u64,
    entry: Option<usize>,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph {
            graph: graph::Graph::new(),
            next_index: 0,
            next_temp_index: 0,
            entry: None,
        }
    }

    /// Returns the underlying graph
    pub fn graph(&self) -> &graph::Graph<Block, Edge> {
        &self.graph
    }

    /// Sets the entry point for this `ControlFlowGraph` to the given `Block` index.
    pub fn set_entry(&mut self, entry: usize) -> Result<(), Error> {
        if self.graph.has_vertex(entry) {
            self.entry = Some(entry);
            return Ok(());
        }
        Err(Error::GraphVertexNotFound(entry))
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

    /// Get every `Edge` in this `ControlFlowGraph`.
    pub fn edges(&self) -> Vec<&Edge> {
        self.graph.edges()
    }

    /// Get every outgoing edge from a block
    pub fn edges_out(&self, index: usize) -> Result<Vec<&Edge>, Error> {
        self.graph.edges_out(index)
    }

    /// Get the indices of every successor of a `Block` in this `ControlFlowGraph`.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.graph.successor_indices(index)
    }

    /// Get the instruction at `location`.
    pub fn instruction(&self, location: InstructionLocation) -> Result<&Instruction, Error> {
        self.block(location.block)?
            .instruction(location.instruction)
            .ok_or_else(|| {
                Error::Custom(format!("No instruction at location {}", location))
            })
    }

    /// The location of every instruction, in block order.
    pub fn locations(&self) -> Vec<InstructionLocation> {
        self.blocks()
            .into_iter()
            .flat_map(|block| {
                block
                    .instructions()
                    .iter()
                    .map(move |instruction| {
                        InstructionLocation::new(block.index(), instruction.index())
                    })
            })
            .collect()
    }

    /// Generates a temporary scalar unique to this control flow graph.
    pub fn temp(&mut self, ty: Type) -> Scalar {
        let next_index = self.next_temp_index;
        self.next_temp_index = next_index + 1;
        Scalar::new(format!("temp_{}", next_index), ty)
    }

    /// Advance the temporary counter past every `temp_N` scalar already in
    /// the graph, so graphs built elsewhere can safely receive new temps.
    pub fn reserve_temps(&mut self) {
        let next = self
            .blocks()
            .into_iter()
            .flat_map(|block| block.instructions())
            .flat_map(|instruction| {
                let mut names: Vec<&str> = instruction
                    .scalars_read()
                    .into_iter()
                    .map(|scalar| scalar.name())
                    .collect();
                if let Some(scalar) = instruction.scalar_written() {
                    names.push(scalar.name());
                }
                names
            })
            .filter_map(|name| name.strip_prefix("temp_"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .map(|index| index + 1)
            .max()
            .unwrap_or(0);
        self.next_temp_index = self.next_temp_index.max(next);
    }

    /// Creates a new basic block, adds it to the graph, and returns it
    pub fn new_block(&mut self) -> Result<&mut Block, Error> {
        let next_index = self
            .blocks()
            .into_iter()
            .map(|block| block.index() + 1)
            .max()
            .unwrap_or(0)
            .max(self.next_index);
        self.next_index = next_index + 1;
        let block = Block::new(next_index);
        self.graph.insert_vertex(block)?;
        self.graph.vertex_mut(next_index)
    }

    /// Creates an unconditional edge from one block to another block
    pub fn unconditional_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        let edge = Edge::new(head, tail, None);
        self.graph.insert_edge(edge)
    }

    /// Creates a conditional edge from one block to another block
    pub fn conditional_edge(
        &mut self,
        head: usize,
        tail: usize,
        condition: Expression,
    ) -> Result<(), Error> {
        let edge = Edge::new(head, tail, Some(condition));
        self.graph.insert_edge(edge)
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in self.blocks() {
            writeln!(f, "{}", block)?;
        }
        for edge in self.edges() {
            writeln!(f, "edge {}", edge)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temps_skip_existing_names() {
        let mut cfg = ControlFlowGraph::new();
        let block = cfg.new_block().unwrap();
        block.assign(scalar("temp_4", Type::Int(32)), expr_const(1, 32));
        cfg.reserve_temps();
        assert_eq!(cfg.temp(Type::Int(8)).name(), "temp_5");
    }
}
