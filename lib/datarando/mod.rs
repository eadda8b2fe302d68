//! The data randomization pass.
//!
//! Every storage node of the points-to graph stands for an equivalence class
//! of memory objects which may alias. Each class which is safe to mask
//! receives a random mask, and every access to memory of the class XORs the
//! value with the mask, adjusted for the alignment of the access. Memory
//! which escapes to code outside the module, or is laid out by such code,
//! receives the null mask and is left in plaintext.
//!
//! ```ignore
//! let options = OptionsBuilder::new().seed(0x5eed).safety_analysis(true).build();
//! let report = DataRando::new(options)?.run(&mut module, &oracle)?;
//! ```

pub mod catalog;
mod globals;
mod instrument;
mod mask;
mod options;
mod pass;
pub mod randomizer;
mod registry;
pub mod report;
pub mod safety;
mod wrappers;

pub use self::catalog::{LibraryWrapperCatalog, WrapperDescriptor};
pub use self::globals::*;
pub use self::instrument::AccessInstrumenter;
pub use self::mask::*;
pub use self::options::*;
pub use self::pass::*;
pub use self::registry::*;
pub use self::report::{Report, Statistics};
pub use self::safety::{Classification, SafetyClassifier};
pub use self::wrappers::*;
