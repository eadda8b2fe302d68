//! Building the expressions which mask and unmask values.
//!
//! Masks are laid over memory, not over values: the byte at address `a` of a
//! class with mask `m` is masked with byte `a % 8` of `m`. An access which
//! does not start on an effective mask boundary needs the mask rotated by
//! the misalignment.

use crate::il::*;
use crate::Error;
use num_bigint::BigUint;

/// Replicate `mask` until it covers `bits` bits, then truncate to `bits`.
pub fn replicate(mask: u64, bits: usize) -> Constant {
    let mut value = BigUint::from(mask);
    let mut width = 64;
    while width < bits {
        value = &value | (&value << width);
        width *= 2;
    }
    Constant::new_big(value, bits)
}

/// The expression `value ^ mask`, casting `value` to and from its integer
/// equivalent.
pub fn xor(value: Expression, mask: Expression) -> Result<Expression, Error> {
    let ty = value.ty();
    let int_ty = ty.int_type()?;
    let value = Expression::cast(int_ty, value)?;
    Expression::cast(ty, Expression::xor(value, mask)?)
}

/// Builds effective masks for accesses of one module.
#[derive(Clone, Debug)]
pub struct Randomizer<'a> {
    layout: &'a Layout,
    effective_mask_size: u64,
    always_emit_mask_alignment: bool,
}

impl<'a> Randomizer<'a> {
    pub fn new(
        layout: &'a Layout,
        effective_mask_size: u64,
        always_emit_mask_alignment: bool,
    ) -> Randomizer<'a> {
        Randomizer {
            layout,
            effective_mask_size,
            always_emit_mask_alignment,
        }
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    /// The mask to XOR with a value of type `ty` accessed at `address`.
    ///
    /// The result has the integer type of `ty`. An `alignment` of 0 is the
    /// ABI alignment of `ty`.
    pub fn effective_mask(
        &self,
        mask: u64,
        address: &Expression,
        ty: &Type,
        alignment: u64,
    ) -> Result<Expression, Error> {
        let alignment = if alignment == 0 {
            self.layout.abi_alignment(ty)?
        } else {
            alignment
        };
        let size = self.effective_mask_size;
        let int_ty = ty.int_type()?;
        let lane_bits = int_ty
            .scalar_type()
            .primitive_bits()
            .ok_or_else(|| Error::Unsized(ty.to_string()))?;
        let lanes = ty.lanes();
        let lane_size = match ty.vector_element() {
            Some(element) => self.layout.alloc_size(element)?,
            None => self.layout.store_size(ty)?,
        };

        let rotate = self.always_emit_mask_alignment
            || alignment % size != 0
            || (lanes.is_some() && lane_size % size != 0);
        if !rotate {
            let lane: Expression = replicate(mask, lane_bits).into();
            return match lanes {
                Some(lanes) => Expression::splat(lane, lanes),
                None => Ok(lane),
            };
        }

        // Whole multiples of the effective mask size keep the pattern periodic
        let period = (size * 8) as usize;
        let mask_bits = (lane_bits + period - 1) / period * period;
        let mask_lane: Expression = replicate(mask, mask_bits).into();
        let bits_lane = expr_const(mask_bits as u64 - 1, mask_bits);
        let zero_lane = expr_const(0, mask_bits);

        let (mask_expr, shift, bits, zero) = match lanes {
            None => (
                mask_lane,
                self.shift(address, None, mask_bits)?,
                bits_lane,
                zero_lane,
            ),
            Some(lanes) => {
                let offsets: Vec<u64> = (0..lanes as u64).map(|lane| lane * lane_size).collect();
                let shift = if alignment % size == 0 && !self.always_emit_mask_alignment {
                    Expression::vector(
                        offsets
                            .iter()
                            .map(|offset| expr_const((offset % size) * 8, mask_bits))
                            .collect(),
                    )?
                } else {
                    self.shift(address, Some(&offsets), mask_bits)?
                };
                (
                    Expression::splat(mask_lane, lanes)?,
                    shift,
                    Expression::splat(bits_lane, lanes)?,
                    Expression::splat(zero_lane, lanes)?,
                )
            }
        };

        let rotated = Expression::shr(mask_expr.clone(), shift.clone())?;
        let store_size = self.layout.store_size(ty)?;
        let wraps = lanes.is_some() || alignment < store_size || size % store_size != 0;
        let rotated = if wraps {
            let amount = Expression::and(Expression::sub(zero, shift)?, bits)?;
            Expression::or(rotated, Expression::shl(mask_expr, amount)?)?
        } else {
            rotated
        };

        Expression::zext_or_trun(int_ty, rotated)?.fold()
    }

    /// `(address % size) * 8`, per lane when `offsets` is given, as integers
    /// of `bits` bits.
    fn shift(
        &self,
        address: &Expression,
        offsets: Option<&[u64]>,
        bits: usize,
    ) -> Result<Expression, Error> {
        let address = Expression::ptr_to_int(Type::Int(POINTER_BITS), address.clone())?;
        let size = expr_const(self.effective_mask_size, POINTER_BITS);
        let three = expr_const(3, POINTER_BITS);
        let (address, size, three, ty) = match offsets {
            None => (address, size, three, Type::Int(bits)),
            Some(offsets) => {
                let lanes = offsets.len();
                let offsets = Expression::vector(
                    offsets
                        .iter()
                        .map(|offset| expr_const(*offset, POINTER_BITS))
                        .collect(),
                )?;
                (
                    Expression::add(Expression::splat(address, lanes)?, offsets)?,
                    Expression::splat(size, lanes)?,
                    Expression::splat(three, lanes)?,
                    Type::vector(Type::Int(bits), lanes),
                )
            }
        };
        let shift = Expression::shl(Expression::urem(address, size)?, three)?;
        Expression::zext_or_trun(ty, shift)
    }
}
