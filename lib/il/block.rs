//! A `Block` is a linear sequence of `Instruction`s.

use crate::graph;
use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Block {
    // The index of the block.
    index: usize,
    // An internal counter for the next block-unique instruction.
    next_instruction_index: usize,
    // The instructions for this block.
    instructions: Vec<Instruction>,
}

impl Block {
    pub(crate) fn new(index: usize) -> Block {
        Block {
            index,
            next_instruction_index: 0,
            instructions: Vec::new(),
        }
    }

    fn new_instruction_index(&mut self) -> usize {
        let instruction_index = self.next_instruction_index;
        self.next_instruction_index = instruction_index + 1;
        instruction_index
    }

    /// Append an operation to the end of this block, returning the index of
    /// the new instruction.
    pub fn push(&mut self, operation: Operation) -> usize {
        let index = self.new_instruction_index();
        self.instructions.push(Instruction::new(index, operation));
        index
    }

    /// Insert an operation at `position` in this block's instruction list,
    /// returning the index of the new instruction.
    pub fn insert(&mut self, position: usize, operation: Operation) -> Result<usize, Error> {
        if position > self.instructions.len() {
            return Err(Error::Custom(format!(
                "Position {} out of range for block 0x{:X}",
                position, self.index
            )));
        }
        let index = self.new_instruction_index();
        self.instructions
            .insert(position, Instruction::new(index, operation));
        Ok(index)
    }

    /// Get the position of the instruction with the given index.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.index() == index)
    }

    /// Get the index of this `Block`
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get a reference to the `Instruction`s in this `Block`.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Get a mutable reference to the `Instruction`s in this `Block`.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns `true` if this `Block` has no `Instruction`s.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Get an `Instruction` by index.
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.index() == index)
    }

    /// Get a mutable reference to an `Instruction` by index.
    pub fn instruction_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|i| i.index() == index)
    }

    /// Remove an `Instruction` by index.
    pub fn remove_instruction(&mut self, index: usize) -> Result<Instruction, Error> {
        let position = self
            .position(index)
            .ok_or_else(|| Error::Custom(format!("No instruction with index {} found", index)))?;
        Ok(self.instructions.remove(position))
    }

    /// Adds an assign operation to the end of this block.
    pub fn assign(&mut self, dst: Scalar, src: Expression) -> usize {
        self.push(Operation::assign(dst, src))
    }

    /// Adds a load operation to the end of this block.
    pub fn load(&mut self, dst: Scalar, index: Expression, alignment: u64) -> usize {
        self.push(Operation::load(dst, index, alignment))
    }

    /// Adds a store operation to the end of this block.
    pub fn store(&mut self, index: Expression, src: Expression, alignment: u64) -> usize {
        self.push(Operation::store(index, src, alignment))
    }

    /// Adds a direct call to the end of this block.
    pub fn call<S: Into<String>>(
        &mut self,
        dst: Option<Scalar>,
        name: S,
        arguments: Vec<Expression>,
        function_type: FunctionType,
    ) -> usize {
        self.push(Operation::call(dst, name, arguments, function_type))
    }

    /// Adds a return to the end of this block.
    pub fn ret(&mut self, value: Option<Expression>) -> usize {
        self.push(Operation::Return { value })
    }
}

impl graph::Vertex for Block {
    fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: 0x{:X} ]", self.index)?;
        for instruction in self.instructions() {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

#[test]
fn insert_keeps_indices_unique() {
    let mut block = Block::new(0);
    let a = block.ret(None);
    let b = block.insert(0, Operation::Nop).unwrap();
    assert_ne!(a, b);
    assert_eq!(block.position(b), Some(0));
    assert_eq!(block.position(a), Some(1));
    assert!(block.insert(3, Operation::Nop).is_err());
    block.remove_instruction(b).unwrap();
    assert_eq!(block.instructions().len(), 1);
}
