//! A `Constant` holds a single value.

use crate::il::*;
use crate::Error;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant value for the IL
///
/// The value is always truncated to `bits`. Vector values are held as one
/// wide constant, with lane `i` occupying bits `[i * w, (i + 1) * w)`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Constant {
    value: BigUint,
    bits: usize,
}

impl Constant {
    /// Create a new `Constant` with the given value and bitness.
    pub fn new(value: u64, bits: usize) -> Constant {
        Constant::new_big(BigUint::from(value), bits)
    }

    /// Create a new `Constant` from a `BigUint`, truncating it to `bits`.
    pub fn new_big(value: BigUint, bits: usize) -> Constant {
        let value = if value.bits() as usize > bits {
            value & Constant::mask_bits(bits)
        } else {
            value
        };
        Constant { value, bits }
    }

    /// Create a constant from little-endian bytes.
    pub fn from_le_bytes(bytes: &[u8]) -> Constant {
        Constant::new_big(BigUint::from_bytes_le(bytes), bytes.len() * 8)
    }

    fn mask_bits(bits: usize) -> BigUint {
        (BigUint::one() << bits) - BigUint::one()
    }

    /// Get the value of this `Constant` if it fits in 64 bits.
    pub fn value_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    /// Get the value of this `Constant` as a `BigUint`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Get the number of bits for this `Constant`.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    /// The little-endian bytes of this constant, padded to its width.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = self.value.to_bytes_le();
        bytes.resize((self.bits + 7) / 8, 0);
        bytes
    }

    /// Split this constant into `lanes` equally sized lanes.
    pub fn lanes(&self, lanes: usize) -> Vec<Constant> {
        let width = self.bits / lanes.max(1);
        (0..lanes)
            .map(|lane| Constant::new_big(&self.value >> (lane * width), width))
            .collect()
    }

    /// Join lanes back into a single constant.
    pub fn join(lanes: &[Constant]) -> Constant {
        let mut value = BigUint::zero();
        let mut bits = 0;
        for lane in lanes {
            value |= lane.value.clone() << bits;
            bits += lane.bits;
        }
        Constant::new_big(value, bits)
    }

    fn ensure_sort(&self, rhs: &Constant) -> Result<(), Error> {
        if self.bits != rhs.bits {
            Err(Error::Sort)
        } else {
            Ok(())
        }
    }

    fn bool(value: bool) -> Constant {
        Constant::new(value as u64, 1)
    }

    pub fn add(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value + &rhs.value, self.bits))
    }

    pub fn sub(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        let modulus = BigUint::one() << self.bits;
        Ok(Constant::new_big(
            (&self.value + &modulus) - &rhs.value,
            self.bits,
        ))
    }

    pub fn mul(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value * &rhs.value, self.bits))
    }

    pub fn urem(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        if rhs.is_zero() {
            return Err(Error::Arithmetic("Division by zero".to_string()));
        }
        Ok(Constant::new_big(&self.value % &rhs.value, self.bits))
    }

    pub fn and(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value & &rhs.value, self.bits))
    }

    pub fn or(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value | &rhs.value, self.bits))
    }

    pub fn xor(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value ^ &rhs.value, self.bits))
    }

    /// Shifting by the width of the constant or more yields zero.
    pub fn shl(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        match rhs.value.to_usize() {
            Some(shift) if shift < self.bits => {
                Ok(Constant::new_big(&self.value << shift, self.bits))
            }
            _ => Ok(Constant::new(0, self.bits)),
        }
    }

    /// A logical shift right. Shifting by the width of the constant or more
    /// yields zero.
    pub fn shr(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        match rhs.value.to_usize() {
            Some(shift) if shift < self.bits => {
                Ok(Constant::new_big(&self.value >> shift, self.bits))
            }
            _ => Ok(Constant::new(0, self.bits)),
        }
    }

    pub fn cmpeq(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::bool(self.value == rhs.value))
    }

    pub fn cmpneq(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::bool(self.value != rhs.value))
    }

    pub fn cmpltu(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::bool(self.value < rhs.value))
    }

    /// Zero-extend this constant to `bits`.
    pub fn zext(&self, bits: usize) -> Result<Constant, Error> {
        if bits < self.bits {
            return Err(Error::Sort);
        }
        Ok(Constant::new_big(self.value.clone(), bits))
    }

    /// Truncate this constant to `bits`.
    pub fn trun(&self, bits: usize) -> Result<Constant, Error> {
        if bits > self.bits {
            return Err(Error::Sort);
        }
        Ok(Constant::new_big(self.value.clone(), bits))
    }

    /// Zero-extend or truncate this constant to `bits`.
    pub fn resize(&self, bits: usize) -> Constant {
        Constant::new_big(self.value.clone(), bits)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:X}:{}", self.value, self.bits)
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Expression {
        Expression::Constant(constant)
    }
}

#[test]
fn constant_arithmetic_wraps() {
    let a = Constant::new(0xff, 8);
    let b = Constant::new(1, 8);
    assert_eq!(a.add(&b).unwrap(), Constant::new(0, 8));
    assert_eq!(b.sub(&a).unwrap(), Constant::new(2, 8));
    assert_eq!(Constant::new(0, 64).sub(&Constant::new(8, 64)).unwrap().value_u64(), Some(0xffff_ffff_ffff_fff8));
    assert!(a.add(&Constant::new(1, 16)).is_err());
}

#[test]
fn constant_shifts() {
    let a = Constant::new(0x8000_0000_0000_0001, 64);
    assert_eq!(a.shl(&Constant::new(1, 64)).unwrap().value_u64(), Some(2));
    assert_eq!(a.shr(&Constant::new(63, 64)).unwrap().value_u64(), Some(1));
    assert!(a.shl(&Constant::new(64, 64)).unwrap().is_zero());
}

#[test]
fn constant_lanes() {
    let v = Constant::new(0x4433_2211, 32);
    let lanes = v.lanes(4);
    assert_eq!(lanes[0], Constant::new(0x11, 8));
    assert_eq!(lanes[3], Constant::new(0x44, 8));
    assert_eq!(Constant::join(&lanes), v);
    assert_eq!(v.to_le_bytes(), vec![0x11, 0x22, 0x33, 0x44]);
    assert_eq!(Constant::from_le_bytes(&[0x11, 0x22]), Constant::new(0x2211, 16));
}
