use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An `Instruction` gives position to an `Operation` within a `Block`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Instruction {
    operation: Operation,
    index: usize,
}

impl Instruction {
    /// Create a new instruction with the given index and operation.
    ///
    /// # Warning
    /// You almost never want to call this function. You should use the
    /// methods on `il::Block` which correspond to the operation you wish to
    /// append to that block.
    pub(crate) fn new(index: usize, operation: Operation) -> Instruction {
        Instruction { operation, index }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    /// An `Instruction` index is assigned by its parent `Block` and uniquely
    /// identifies the `Instruction` within the `Block`. Indices are not
    /// ordered: an instruction inserted before another may have a larger
    /// index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The `Scalar` written by this `Instruction`, if any.
    pub fn scalar_written(&self) -> Option<&Scalar> {
        self.operation.scalar_written()
    }

    /// Every `Scalar` read by this `Instruction`.
    pub fn scalars_read(&self) -> Vec<&Scalar> {
        self.operation.scalars_read()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X} {}", self.index, self.operation)
    }
}
