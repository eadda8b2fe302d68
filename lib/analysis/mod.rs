//! The points-to analysis interface.
//!
//! Aliasing is not computed here. An `AliasOracle` provides a graph of
//! `StorageNode`s, each standing for an alias equivalence class of memory
//! objects, together with the nodes every value points to and resolution of
//! indirect calls.

mod call_graph;
mod oracle;
mod points_to;
mod value_map;

pub use self::call_graph::*;
pub use self::oracle::*;
pub use self::points_to::*;
pub use self::value_map::*;
