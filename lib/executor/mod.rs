//! Concrete execution over the IL.
//!
//! The executor runs randomized modules against a byte-addressed memory, with
//! the runtime routines of the randomization pass implemented natively. It
//! lets tests observe masked bytes in memory alongside plaintext values in
//! scalars.

mod driver;
mod eval;
mod memory;
pub mod runtime;
mod state;
mod successor;

pub use self::driver::*;
pub use self::eval::*;
pub use self::memory::*;
pub use self::state::*;
pub use self::successor::*;
