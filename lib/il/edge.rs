//! An `Edge` is a directed edge between two `Block`s of a `ControlFlowGraph`.
//!
//! When an edge carries a condition, the condition is a 1-bit expression, and
//! the edge is taken when it evaluates to 1.

use crate::graph;
use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge between IL blocks
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Edge {
    head: usize,
    tail: usize,
    #[serde(default)]
    condition: Option<Expression>,
}

impl Edge {
    pub(crate) fn new(head: usize, tail: usize, condition: Option<Expression>) -> Edge {
        Edge {
            head,
            tail,
            condition,
        }
    }

    pub fn condition(&self) -> Option<&Expression> {
        self.condition.as_ref()
    }

    pub fn condition_mut(&mut self) -> Option<&mut Expression> {
        self.condition.as_mut()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.condition {
            Some(ref condition) => write!(
                f,
                "(0x{:X}->0x{:X}) ? ({})",
                self.head, self.tail, condition
            ),
            None => write!(f, "(0x{:X}->0x{:X})", self.head, self.tail),
        }
    }
}

impl graph::Edge for Edge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }
}
