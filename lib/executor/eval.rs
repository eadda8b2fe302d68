//! Concrete evaluation of IL expressions.
//!
//! Every value evaluates to a `Constant` as wide as the primitive width of
//! its type. Vectors are one wide constant with lane `i` in bits
//! `[i * w, (i + 1) * w)`, and pointers are 64-bit addresses.

use crate::il;
use crate::Error;

/// Supplies the values of the free terms of an expression.
pub trait Environment {
    /// The value of a scalar.
    fn scalar(&self, scalar: &il::Scalar) -> Result<il::Constant, Error>;
    /// The address of a global variable or function.
    fn global(&self, name: &str) -> Result<il::Constant, Error>;
}

/// An environment without any bindings, for expressions which have no
/// run-time operands.
pub struct Unbound;

impl Environment for Unbound {
    fn scalar(&self, scalar: &il::Scalar) -> Result<il::Constant, Error> {
        Err(Error::ExecutorScalar(scalar.name().to_string()))
    }

    fn global(&self, name: &str) -> Result<il::Constant, Error> {
        Err(Error::GlobalNotFound(name.to_string()))
    }
}

fn lanes_of(expression: &il::Expression) -> usize {
    expression.ty().lanes().unwrap_or(1)
}

fn lane_bits(ty: &il::Type) -> Result<usize, Error> {
    ty.scalar_type()
        .primitive_bits()
        .ok_or_else(|| Error::Unsized(ty.to_string()))
}

fn lanewise<E, F>(
    lhs: &il::Expression,
    rhs: &il::Expression,
    env: &E,
    f: F,
) -> Result<il::Constant, Error>
where
    E: Environment + ?Sized,
    F: Fn(&il::Constant, &il::Constant) -> Result<il::Constant, Error>,
{
    let lanes = lanes_of(lhs);
    let lhs = eval(lhs, env)?.lanes(lanes);
    let rhs = eval(rhs, env)?.lanes(lanes);
    let result = lhs
        .iter()
        .zip(rhs.iter())
        .map(|(lhs, rhs)| f(lhs, rhs))
        .collect::<Result<Vec<il::Constant>, Error>>()?;
    Ok(il::Constant::join(&result))
}

/// Resize every lane of `src` to the lane width of `ty`.
fn resize_lanes<E>(ty: &il::Type, src: &il::Expression, env: &E) -> Result<il::Constant, Error>
where
    E: Environment + ?Sized,
{
    let bits = lane_bits(ty)?;
    let lanes = eval(src, env)?
        .lanes(lanes_of(src))
        .into_iter()
        .map(|lane| lane.resize(bits))
        .collect::<Vec<il::Constant>>();
    Ok(il::Constant::join(&lanes))
}

/// Evaluate an expression to a constant.
pub fn eval<E>(expr: &il::Expression, env: &E) -> Result<il::Constant, Error>
where
    E: Environment + ?Sized,
{
    match *expr {
        il::Expression::Scalar(ref scalar) => {
            let value = env.scalar(scalar)?;
            Ok(value.resize(lane_bits(scalar.ty())? * scalar.ty().lanes().unwrap_or(1)))
        }
        il::Expression::Constant(ref constant) => Ok(constant.clone()),
        il::Expression::Global(ref name, _) => Ok(env.global(name)?.resize(il::POINTER_BITS)),
        il::Expression::Vector(ref elements) => {
            let lanes = elements
                .iter()
                .map(|element| eval(element, env))
                .collect::<Result<Vec<il::Constant>, Error>>()?;
            Ok(il::Constant::join(&lanes))
        }
        il::Expression::Add(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.add(b)),
        il::Expression::Sub(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.sub(b)),
        il::Expression::Mul(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.mul(b)),
        il::Expression::Urem(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.urem(b)),
        il::Expression::And(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.and(b)),
        il::Expression::Or(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.or(b)),
        il::Expression::Xor(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.xor(b)),
        il::Expression::Shl(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.shl(b)),
        il::Expression::Shr(ref lhs, ref rhs) => lanewise(lhs, rhs, env, |a, b| a.shr(b)),
        il::Expression::Cmpeq(ref lhs, ref rhs) => eval(lhs, env)?.cmpeq(&eval(rhs, env)?),
        il::Expression::Cmpneq(ref lhs, ref rhs) => eval(lhs, env)?.cmpneq(&eval(rhs, env)?),
        il::Expression::Cmpltu(ref lhs, ref rhs) => eval(lhs, env)?.cmpltu(&eval(rhs, env)?),
        il::Expression::Zext(ref ty, ref src)
        | il::Expression::Trun(ref ty, ref src)
        | il::Expression::PtrToInt(ref ty, ref src)
        | il::Expression::IntToPtr(ref ty, ref src) => resize_lanes(ty, src, env),
        il::Expression::Bitcast(ref ty, ref src) => {
            let bits = ty
                .primitive_bits()
                .ok_or_else(|| Error::Unsized(ty.to_string()))?;
            Ok(eval(src, env)?.resize(bits))
        }
        il::Expression::Gep(_, ref base, ref offset) => eval(base, env)?.add(&eval(offset, env)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    #[test]
    fn vector_operations_are_lanewise() {
        let a = Expression::vector(vec![expr_const(0xff, 8), expr_const(1, 8)]).unwrap();
        let b = Expression::splat(expr_const(1, 8), 2).unwrap();
        let sum = eval(&Expression::add(a, b).unwrap(), &Unbound).unwrap();
        assert_eq!(sum.lanes(2), vec![const_(0, 8), const_(2, 8)]);
    }

    #[test]
    fn conversions_resize_each_lane() {
        let v = Expression::vector(vec![expr_const(0x1234, 16), expr_const(0xabcd, 16)]).unwrap();
        let narrow = Expression::trun(Type::vector(Type::Int(8), 2), v).unwrap();
        let value = eval(&narrow, &Unbound).unwrap();
        assert_eq!(value, const_(0xcd34, 16));
    }

    #[test]
    fn free_scalars_are_errors() {
        let x = expr_scalar("x", Type::Int(64));
        assert!(eval(&x, &Unbound).is_err());
    }
}
