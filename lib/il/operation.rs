use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The read-modify-write performed by an `AtomicRmw` operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum RmwOp {
    Xchg,
    Add,
    Sub,
    And,
    Nand,
    Or,
    Xor,
    Max,
    Min,
    UMax,
    UMin,
}

impl fmt::Display for RmwOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            RmwOp::Xchg => "xchg",
            RmwOp::Add => "add",
            RmwOp::Sub => "sub",
            RmwOp::And => "and",
            RmwOp::Nand => "nand",
            RmwOp::Or => "or",
            RmwOp::Xor => "xor",
            RmwOp::Max => "max",
            RmwOp::Min => "min",
            RmwOp::UMax => "umax",
            RmwOp::UMin => "umin",
        };
        write!(f, "{}", s)
    }
}

/// Whether a bulk transfer may overlap.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TransferKind {
    Copy,
    Move,
}

/// The callee of a `Call` operation.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CallTarget {
    /// A call to the named function.
    Direct(String),
    /// A call through a function pointer.
    Indirect(Expression),
    /// Inline assembly.
    InlineAsm(String),
}

impl CallTarget {
    pub fn direct_name(&self) -> Option<&str> {
        match *self {
            CallTarget::Direct(ref name) => Some(name),
            _ => None,
        }
    }

    pub fn is_inline_asm(&self) -> bool {
        matches!(self, CallTarget::InlineAsm(_))
    }
}

/// An IL Operation updates some state.
///
/// Alignments are in bytes; an alignment of 0 means the ABI alignment of the
/// accessed type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operation {
    /// Assign the value given in expression to the scalar indicated.
    Assign { dst: Scalar, src: Expression },
    /// Load a value of the type of `dst` from the address `index`.
    Load {
        dst: Scalar,
        index: Expression,
        alignment: u64,
        /// Known bounds `[low, high)` of the loaded value.
        range: Option<(u64, u64)>,
    },
    /// Store the value given by `src` at the address `index`.
    Store {
        index: Expression,
        src: Expression,
        alignment: u64,
    },
    /// Atomically replace the value at `index` with `new` if it equals
    /// `compare`. `dst` receives the old value.
    CmpXchg {
        dst: Scalar,
        index: Expression,
        compare: Expression,
        new: Expression,
        alignment: u64,
    },
    /// Atomically combine `src` into the value at `index`. `dst` receives the
    /// old value.
    AtomicRmw {
        dst: Scalar,
        op: RmwOp,
        index: Expression,
        src: Expression,
        alignment: u64,
    },
    /// Fill `length` bytes at `dst` with the low byte of `value`.
    MemSet {
        dst: Expression,
        value: Expression,
        length: Expression,
        alignment: u64,
    },
    /// Copy `length` bytes from `src` to `dst`.
    MemTransfer {
        kind: TransferKind,
        dst: Expression,
        src: Expression,
        length: Expression,
        alignment: u64,
    },
    /// Initialize the variadic argument list at `list`.
    VaStart { list: Expression },
    /// Copy the variadic argument list at `src` to `dst`.
    VaCopy { dst: Expression, src: Expression },
    /// Read the next variadic argument from `list`.
    VaArg { dst: Scalar, list: Expression },
    /// Reserve stack memory for a value of type `ty`.
    Alloca { dst: Scalar, ty: Type, alignment: u64 },
    Call {
        dst: Option<Scalar>,
        target: CallTarget,
        arguments: Vec<Expression>,
        function_type: FunctionType,
    },
    Return { value: Option<Expression> },
    Nop,
}

impl Operation {
    pub fn assign(dst: Scalar, src: Expression) -> Operation {
        Operation::Assign { dst, src }
    }

    pub fn load(dst: Scalar, index: Expression, alignment: u64) -> Operation {
        Operation::Load {
            dst,
            index,
            alignment,
            range: None,
        }
    }

    pub fn store(index: Expression, src: Expression, alignment: u64) -> Operation {
        Operation::Store {
            index,
            src,
            alignment,
        }
    }

    pub fn call<S: Into<String>>(
        dst: Option<Scalar>,
        name: S,
        arguments: Vec<Expression>,
        function_type: FunctionType,
    ) -> Operation {
        Operation::Call {
            dst,
            target: CallTarget::Direct(name.into()),
            arguments,
            function_type,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Operation::Call { .. })
    }

    pub fn is_memory_operation(&self) -> bool {
        matches!(
            self,
            Operation::Load { .. }
                | Operation::Store { .. }
                | Operation::CmpXchg { .. }
                | Operation::AtomicRmw { .. }
                | Operation::MemSet { .. }
                | Operation::MemTransfer { .. }
                | Operation::VaArg { .. }
        )
    }

    /// Get each `Scalar` read by this `Operation`.
    pub fn scalars_read(&self) -> Vec<&Scalar> {
        self.expressions()
            .into_iter()
            .flat_map(|expression| expression.scalars())
            .collect()
    }

    /// Get the `Scalar` written by this `Operation`, if any.
    pub fn scalar_written(&self) -> Option<&Scalar> {
        match *self {
            Operation::Assign { ref dst, .. }
            | Operation::Load { ref dst, .. }
            | Operation::CmpXchg { ref dst, .. }
            | Operation::AtomicRmw { ref dst, .. }
            | Operation::VaArg { ref dst, .. }
            | Operation::Alloca { ref dst, .. } => Some(dst),
            Operation::Call { ref dst, .. } => dst.as_ref(),
            _ => None,
        }
    }

    /// Get every expression operand of this `Operation`.
    pub fn expressions(&self) -> Vec<&Expression> {
        match *self {
            Operation::Assign { ref src, .. } => vec![src],
            Operation::Load { ref index, .. } => vec![index],
            Operation::Store {
                ref index, ref src, ..
            } => vec![index, src],
            Operation::CmpXchg {
                ref index,
                ref compare,
                ref new,
                ..
            } => vec![index, compare, new],
            Operation::AtomicRmw {
                ref index, ref src, ..
            } => vec![index, src],
            Operation::MemSet {
                ref dst,
                ref value,
                ref length,
                ..
            } => vec![dst, value, length],
            Operation::MemTransfer {
                ref dst,
                ref src,
                ref length,
                ..
            } => vec![dst, src, length],
            Operation::VaStart { ref list } => vec![list],
            Operation::VaCopy { ref dst, ref src } => vec![dst, src],
            Operation::VaArg { ref list, .. } => vec![list],
            Operation::Alloca { .. } | Operation::Nop => Vec::new(),
            Operation::Call {
                ref target,
                ref arguments,
                ..
            } => {
                let mut expressions: Vec<&Expression> = arguments.iter().collect();
                if let CallTarget::Indirect(ref callee) = *target {
                    expressions.push(callee);
                }
                expressions
            }
            Operation::Return { ref value } => value.iter().collect(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operation::Assign { ref dst, ref src } => write!(f, "{} = {}", dst, src),
            Operation::Load {
                ref dst,
                ref index,
                alignment,
                ..
            } => write!(f, "{} = [{}], align {}", dst, index, alignment),
            Operation::Store {
                ref index,
                ref src,
                alignment,
            } => write!(f, "[{}] = {}, align {}", index, src, alignment),
            Operation::CmpXchg {
                ref dst,
                ref index,
                ref compare,
                ref new,
                ..
            } => write!(f, "{} = cmpxchg [{}], {}, {}", dst, index, compare, new),
            Operation::AtomicRmw {
                ref dst,
                op,
                ref index,
                ref src,
                ..
            } => write!(f, "{} = atomicrmw {} [{}], {}", dst, op, index, src),
            Operation::MemSet {
                ref dst,
                ref value,
                ref length,
                ..
            } => write!(f, "memset({}, {}, {})", dst, value, length),
            Operation::MemTransfer {
                kind,
                ref dst,
                ref src,
                ref length,
                ..
            } => {
                let name = match kind {
                    TransferKind::Copy => "memcpy",
                    TransferKind::Move => "memmove",
                };
                write!(f, "{}({}, {}, {})", name, dst, src, length)
            }
            Operation::VaStart { ref list } => write!(f, "va_start({})", list),
            Operation::VaCopy { ref dst, ref src } => write!(f, "va_copy({}, {})", dst, src),
            Operation::VaArg { ref dst, ref list } => write!(f, "{} = va_arg({})", dst, list),
            Operation::Alloca { ref dst, ref ty, .. } => write!(f, "{} = alloca {}", dst, ty),
            Operation::Call {
                ref dst,
                ref target,
                ref arguments,
                ..
            } => {
                if let Some(ref dst) = *dst {
                    write!(f, "{} = ", dst)?;
                }
                match *target {
                    CallTarget::Direct(ref name) => write!(f, "call @{}", name)?,
                    CallTarget::Indirect(ref callee) => write!(f, "call {}", callee)?,
                    CallTarget::InlineAsm(ref asm) => write!(f, "asm \"{}\"", asm)?,
                }
                let arguments: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "({})", arguments.join(", "))
            }
            Operation::Return { ref value } => match *value {
                Some(ref value) => write!(f, "ret {}", value),
                None => write!(f, "ret"),
            },
            Operation::Nop => write!(f, "nop"),
        }
    }
}
