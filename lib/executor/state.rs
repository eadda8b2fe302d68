//! A concrete state for execution over the IL.

use crate::executor::successor::*;
use crate::executor::*;
use crate::il;
use crate::{Error, RC};
use num_bigint::BigUint;
use num_traits::One;
use std::collections::BTreeMap;

/// The scalars of a suspended caller.
#[derive(Clone, Debug)]
pub struct Frame {
    scalars: BTreeMap<String, il::Constant>,
    varargs: Option<u64>,
}

/// A concrete `State`.
#[derive(Clone, Debug)]
pub struct State {
    scalars: BTreeMap<String, il::Constant>,
    memory: Memory,
    symbols: RC<BTreeMap<String, u64>>,
    layout: RC<il::Layout>,
    // The variadic argument area of the current function
    varargs: Option<u64>,
    output: Vec<String>,
}

impl State {
    /// Create a new `State` over `memory`, where `symbols` gives the address
    /// of every global variable and function.
    pub fn new(memory: Memory, symbols: BTreeMap<String, u64>, layout: il::Layout) -> State {
        State {
            scalars: BTreeMap::new(),
            memory,
            symbols: RC::new(symbols),
            layout: RC::new(layout),
            varargs: None,
            output: Vec::new(),
        }
    }

    /// Retrieve the `Memory` associated with this `State`.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Retrieve a mutable reference to the `Memory` associated with this
    /// `State`.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn layout(&self) -> &il::Layout {
        &self.layout
    }

    /// Set the value of the given scalar to a concrete value.
    pub fn set_scalar<S: Into<String>>(&mut self, name: S, value: il::Constant) {
        self.scalars.insert(name.into(), value);
    }

    /// Get the concrete value of the given scalar.
    pub fn get_scalar(&self, name: &str) -> Option<&il::Constant> {
        self.scalars.get(name)
    }

    /// The address of a global variable or function.
    pub fn symbol_address(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).cloned()
    }

    /// Lines written by the program.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn push_output(&mut self, line: String) {
        self.output.push(line);
    }

    /// Suspend the current function's scalars, starting a fresh set.
    pub fn enter_frame(&mut self, varargs: Option<u64>) -> Frame {
        Frame {
            scalars: std::mem::take(&mut self.scalars),
            varargs: std::mem::replace(&mut self.varargs, varargs),
        }
    }

    /// Resume a suspended caller.
    pub fn leave_frame(&mut self, frame: Frame) {
        self.scalars = frame.scalars;
        self.varargs = frame.varargs;
    }

    /// Evaluate an expression with the scalars of this state.
    pub fn eval(&self, expression: &il::Expression) -> Result<il::Constant, Error> {
        eval(expression, self)
    }

    fn address(&self, expression: &il::Expression) -> Result<u64, Error> {
        self.eval(expression)?.value_u64().ok_or(Error::Sort)
    }

    fn value_bits(ty: &il::Type) -> Result<usize, Error> {
        ty.primitive_bits()
            .ok_or_else(|| Error::Unsized(ty.to_string()))
    }

    fn signed_less(lhs: &il::Constant, rhs: &il::Constant) -> bool {
        let sign = BigUint::one() << (lhs.bits().max(1) - 1);
        (lhs.value() ^ &sign) < (rhs.value() ^ &sign)
    }

    fn read_modify_write(
        op: il::RmwOp,
        old: &il::Constant,
        src: &il::Constant,
    ) -> Result<il::Constant, Error> {
        Ok(match op {
            il::RmwOp::Xchg => src.clone(),
            il::RmwOp::Add => old.add(src)?,
            il::RmwOp::Sub => old.sub(src)?,
            il::RmwOp::And => old.and(src)?,
            il::RmwOp::Nand => {
                let ones = il::Constant::new_big((BigUint::one() << old.bits()) - 1u32, old.bits());
                old.and(src)?.xor(&ones)?
            }
            il::RmwOp::Or => old.or(src)?,
            il::RmwOp::Xor => old.xor(src)?,
            il::RmwOp::Max if State::signed_less(old, src) => src.clone(),
            il::RmwOp::Min if State::signed_less(src, old) => src.clone(),
            il::RmwOp::UMax if old.value() < src.value() => src.clone(),
            il::RmwOp::UMin if src.value() < old.value() => src.clone(),
            il::RmwOp::Max | il::RmwOp::Min | il::RmwOp::UMax | il::RmwOp::UMin => old.clone(),
        })
    }

    /// Execute an `il::Operation`, updating this `State`.
    pub fn execute(&mut self, operation: &il::Operation) -> Result<Successor, Error> {
        match *operation {
            il::Operation::Assign { ref dst, ref src } => {
                let src = self.eval(src)?;
                self.set_scalar(dst.name(), src);
            }
            il::Operation::Load {
                ref dst, ref index, ..
            } => {
                let address = self.address(index)?;
                let value = self.memory.load(address, State::value_bits(dst.ty())?)?;
                self.set_scalar(dst.name(), value);
            }
            il::Operation::Store {
                ref index, ref src, ..
            } => {
                let address = self.address(index)?;
                let src = self.eval(src)?;
                self.memory.store(address, &src);
            }
            il::Operation::CmpXchg {
                ref dst,
                ref index,
                ref compare,
                ref new,
                ..
            } => {
                let address = self.address(index)?;
                let compare = self.eval(compare)?;
                let new = self.eval(new)?;
                let old = self.memory.load(address, compare.bits())?;
                if old == compare {
                    self.memory.store(address, &new);
                }
                self.set_scalar(dst.name(), old);
            }
            il::Operation::AtomicRmw {
                ref dst,
                op,
                ref index,
                ref src,
                ..
            } => {
                let address = self.address(index)?;
                let src = self.eval(src)?;
                let old = self.memory.load(address, src.bits())?;
                let new = State::read_modify_write(op, &old, &src)?;
                self.memory.store(address, &new);
                self.set_scalar(dst.name(), old);
            }
            il::Operation::MemSet {
                ref dst,
                ref value,
                ref length,
                ..
            } => {
                let address = self.address(dst)?;
                let byte = self.eval(value)?.resize(8).value_u64().unwrap_or(0) as u8;
                let length = self.address(length)?;
                for offset in 0..length {
                    self.memory.store_u8(address + offset, byte);
                }
            }
            il::Operation::MemTransfer {
                ref dst,
                ref src,
                ref length,
                ..
            } => {
                let dst = self.address(dst)?;
                let src = self.address(src)?;
                let length = self.address(length)?;
                let bytes = self.memory.load_bytes(src, length)?;
                self.memory.store_bytes(dst, &bytes);
            }
            il::Operation::VaStart { ref list } => {
                let list = self.address(list)?;
                let area = self.varargs.unwrap_or(0);
                self.memory.store_u64(list, area);
            }
            il::Operation::VaCopy { ref dst, ref src } => {
                let dst = self.address(dst)?;
                let src = self.address(src)?;
                let area = self.memory.load_u64(src)?;
                self.memory.store_u64(dst, area);
            }
            il::Operation::VaArg { ref dst, ref list } => {
                let list = self.address(list)?;
                let next = self.memory.load_u64(list)?;
                let value = self.memory.load(next, State::value_bits(dst.ty())?)?;
                self.memory.store_u64(list, next + 8);
                self.set_scalar(dst.name(), value);
            }
            il::Operation::Alloca {
                ref dst,
                ref ty,
                alignment,
            } => {
                let size = self.layout.alloc_size(ty)?;
                let alignment = match alignment {
                    0 => self.layout.abi_alignment(ty)?,
                    alignment => alignment,
                };
                let address = self.memory.allocate(size, alignment);
                self.set_scalar(dst.name(), il::const_(address, il::POINTER_BITS));
            }
            il::Operation::Call {
                ref dst,
                ref target,
                ref arguments,
                ..
            } => {
                let callee = match *target {
                    il::CallTarget::Direct(ref name) => Callee::Named(name.clone()),
                    il::CallTarget::Indirect(ref callee) => Callee::Address(self.address(callee)?),
                    il::CallTarget::InlineAsm(ref asm) => {
                        return Err(Error::ExecutorUnhandledCall(format!("asm \"{}\"", asm)))
                    }
                };
                let arguments = arguments
                    .iter()
                    .map(|argument| self.eval(argument))
                    .collect::<Result<Vec<il::Constant>, Error>>()?;
                return Ok(Successor::Call {
                    dst: dst.clone(),
                    callee,
                    arguments,
                });
            }
            il::Operation::Return { ref value } => {
                let value = match *value {
                    Some(ref value) => Some(self.eval(value)?),
                    None => None,
                };
                return Ok(Successor::Return(value));
            }
            il::Operation::Nop => {}
        }
        Ok(Successor::FallThrough)
    }
}

impl Environment for State {
    fn scalar(&self, scalar: &il::Scalar) -> Result<il::Constant, Error> {
        self.scalars
            .get(scalar.name())
            .cloned()
            .ok_or_else(|| Error::ExecutorScalar(scalar.name().to_string()))
    }

    fn global(&self, name: &str) -> Result<il::Constant, Error> {
        self.symbol_address(name)
            .map(|address| il::const_(address, il::POINTER_BITS))
            .ok_or_else(|| Error::GlobalNotFound(name.to_string()))
    }
}
