//! A `Successor` is the result of executing an `Operation` over a `State`.

use crate::il;

/// The function a call transfers control to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Callee {
    Named(String),
    /// A call through a function pointer.
    Address(u64),
}

/// What the driver must do after an operation executes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Successor {
    /// Continue with the next operation.
    FallThrough,
    /// Leave the current function.
    Return(Option<il::Constant>),
    /// Call a function, placing its result in `dst`.
    Call {
        dst: Option<il::Scalar>,
        callee: Callee,
        arguments: Vec<il::Constant>,
    },
}
