//! Datarando: Data randomization over a typed intermediate language.
//!
//! Datarando hardens a program against memory disclosure by storing every
//! value that passes through memory XOR-masked with a key unique to the alias
//! equivalence class of its storage. Loads decrypt, stores encrypt, and
//! library calls are redirected to mask-aware wrappers, so the program behaves
//! as before while raw memory is meaningless without the per-class masks.
//!
//! The crate is organized as:
//!
//! * `il` - A small typed intermediate language the randomization pass
//! operates over.
//! * `analysis` - The points-to oracle interface and its storage-node graph.
//! * `datarando` - The safety classifier deciding which equivalence classes
//! may never be masked, mask assignment, access instrumentation, library
//! wrappers, and the initialization of globals and `main` arguments.
//! * `executor` - A concrete interpreter for the IL, together with the
//! runtime helper routines randomized programs link against.
//!
//! A typical use:
//!
//! ```ignore
//! let oracle = analysis::PrecomputedOracle::new(points_to, call_graph);
//! let options = datarando::OptionsBuilder::default().seed(7).build();
//! let report = datarando::DataRando::new(options)?.run(&mut module, &oracle)?;
//! ```

pub mod analysis;
pub mod datarando;
mod error;
pub mod executor;
pub mod graph;
pub mod il;
#[cfg(test)]
mod tests;

pub use error::Error;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(feature = "thread_safe")]
use std::sync::Arc;

/// We use a configurable RC, defaulting to `Rc`, and switching to `Arc` with
/// the `thread_safe` feature.
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;
