//! Datarando Intermediate Language.
//!
//! # An Introduction
//!
//! The IL is a small, typed, expression-based intermediate language shaped
//! like a conventional compiler IR. It exists so the randomization pass has
//! something concrete to rewrite: every memory access is an explicit
//! `Operation`, and every value has a `Type` with a well-defined layout.
//!
//! ## Types and Layout
//!
//! `Type` covers sized integers, floats, pointers, vectors, arrays, named
//! structs and functions. Struct bodies live in the module's `StructTable`,
//! so structs may refer to themselves through pointers. `Layout` computes
//! store sizes, allocation sizes, ABI alignments and field offsets for a
//! 64-bit little-endian target.
//!
//! ## `Constant`, `Scalar` and `Expression`
//!
//! The terminals of the IL are `Constant`, `Scalar`, and the address of a
//! global (`Expression::Global`). Expressions implement integer arithmetic,
//! comparisons, and conversions between integers, pointers and vectors.
//! Integer operations apply lane-wise to vectors.
//!
//! It is an error to create an expression over operands of differing types.
//! This is checked when the expression is created, and a `Sort` error is
//! returned.
//!
//! ## `Operation`
//!
//! An `Operation` applies a transformation over some state. Besides
//! `Assign`, `Call` and `Return`, every operation touching memory has its
//! own variant: `Load`, `Store`, `CmpXchg`, `AtomicRmw`, `MemSet`,
//! `MemTransfer`, `VaStart`, `VaCopy`, `VaArg` and `Alloca`. Memory is
//! little-endian.
//!
//! ## `Instruction`, `Block`, `Edge` and `ControlFlowGraph`
//!
//! An instruction gives an operation a position within a `Block`. Blocks are
//! joined by `Edge`s, optionally guarded by 1-bit conditions, to form a
//! `ControlFlowGraph` with a single entry.
//!
//! You should not create an `Instruction` explicitly, but instead call the
//! methods over `Block` which append or insert operations.
//!
//! ## `Function`, `GlobalVariable` and `Module`
//!
//! A `Function` is either defined, holding a `ControlFlowGraph`, or declared.
//! A `Module` holds functions, global variables, struct types and the list of
//! constructors to run before `main`. `ValueRef` names a value of a module
//! so analyses can refer to it.

mod block;
mod constant;
mod control_flow_graph;
mod edge;
mod expression;
mod function;
mod global;
mod instruction;
mod layout;
mod module;
mod operation;
mod scalar;
mod types;
mod value;

pub use self::block::*;
pub use self::constant::*;
pub use self::control_flow_graph::*;
pub use self::edge::*;
pub use self::expression::*;
pub use self::function::*;
pub use self::global::*;
pub use self::instruction::*;
pub use self::layout::*;
pub use self::module::*;
pub use self::operation::*;
pub use self::scalar::*;
pub use self::types::*;
pub use self::value::*;

/// A convenience function to create a new constant.
///
/// This is the preferred way to create a `Constant`.
pub fn const_(value: u64, bits: usize) -> Constant {
    Constant::new(value, bits)
}

/// A convenience function to create a new constant expression.
///
/// This is the preferred way to create an `Expression::Constant`.
pub fn expr_const(value: u64, bits: usize) -> Expression {
    Expression::constant(Constant::new(value, bits))
}

/// A convenience function to create a new scalar.
///
/// This is the preferred way to create a `Scalar`.
pub fn scalar<S>(name: S, ty: Type) -> Scalar
where
    S: Into<String>,
{
    Scalar::new(name, ty)
}

/// A convenience function to create a new scalar expression.
///
/// This is the preferred way to create an `Expression::Scalar`.
pub fn expr_scalar<S>(name: S, ty: Type) -> Expression
where
    S: Into<String>,
{
    Expression::scalar(Scalar::new(name, ty))
}
