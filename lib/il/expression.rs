use crate::executor;
use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An IL Expression.
///
/// Expressions form the building blocks of operations, and always evaluate
/// some value. Integer operations apply lane-wise to vectors of integers.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Expression {
    Scalar(Scalar),
    Constant(Constant),
    /// The address of a global variable or function, with its pointer type.
    Global(String, Type),
    Vector(Vec<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mul(Box<Expression>, Box<Expression>),
    Urem(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Xor(Box<Expression>, Box<Expression>),
    Shl(Box<Expression>, Box<Expression>),
    Shr(Box<Expression>, Box<Expression>),

    Cmpeq(Box<Expression>, Box<Expression>),
    Cmpneq(Box<Expression>, Box<Expression>),
    Cmpltu(Box<Expression>, Box<Expression>),

    Zext(Type, Box<Expression>),
    Trun(Type, Box<Expression>),
    Bitcast(Type, Box<Expression>),
    PtrToInt(Type, Box<Expression>),
    IntToPtr(Type, Box<Expression>),
    /// A pointer of the given type, `offset` bytes past `base`.
    Gep(Type, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Return the type of this expression.
    pub fn ty(&self) -> Type {
        match *self {
            Expression::Scalar(ref scalar) => scalar.ty().clone(),
            Expression::Constant(ref constant) => Type::Int(constant.bits()),
            Expression::Global(_, ref ty) => ty.clone(),
            Expression::Vector(ref elements) => match elements.first() {
                Some(element) => Type::vector(element.ty(), elements.len()),
                None => Type::Void,
            },
            Expression::Add(ref lhs, _)
            | Expression::Sub(ref lhs, _)
            | Expression::Mul(ref lhs, _)
            | Expression::Urem(ref lhs, _)
            | Expression::And(ref lhs, _)
            | Expression::Or(ref lhs, _)
            | Expression::Xor(ref lhs, _)
            | Expression::Shl(ref lhs, _)
            | Expression::Shr(ref lhs, _) => lhs.ty(),
            Expression::Cmpeq(_, _) | Expression::Cmpneq(_, _) | Expression::Cmpltu(_, _) => {
                Type::Int(1)
            }
            Expression::Zext(ref ty, _)
            | Expression::Trun(ref ty, _)
            | Expression::Bitcast(ref ty, _)
            | Expression::PtrToInt(ref ty, _)
            | Expression::IntToPtr(ref ty, _)
            | Expression::Gep(ref ty, _, _) => ty.clone(),
        }
    }

    /// Returns the number of bits in the value of this expression.
    pub fn bits(&self) -> usize {
        self.ty().primitive_bits().unwrap_or(0)
    }

    fn ensure_int_sort(lhs: &Expression, rhs: &Expression) -> Result<(), Error> {
        let ty = lhs.ty();
        if ty != rhs.ty() || !ty.is_int_or_int_vector() {
            Err(Error::Sort)
        } else {
            Ok(())
        }
    }

    fn ensure_comparable(lhs: &Expression, rhs: &Expression) -> Result<(), Error> {
        let ty = lhs.ty();
        if ty != rhs.ty() || !(ty.is_integer() || ty.is_pointer()) {
            Err(Error::Sort)
        } else {
            Ok(())
        }
    }

    /// Returns true if `src` and `dst` have the same number of lanes.
    fn same_shape(src: &Type, dst: &Type) -> bool {
        src.lanes() == dst.lanes()
    }

    /// Returns all direct sub-expressions.
    pub fn children(&self) -> Vec<&Expression> {
        match *self {
            Expression::Scalar(_) | Expression::Constant(_) | Expression::Global(_, _) => Vec::new(),
            Expression::Vector(ref elements) => elements.iter().collect(),
            Expression::Add(ref lhs, ref rhs)
            | Expression::Sub(ref lhs, ref rhs)
            | Expression::Mul(ref lhs, ref rhs)
            | Expression::Urem(ref lhs, ref rhs)
            | Expression::And(ref lhs, ref rhs)
            | Expression::Or(ref lhs, ref rhs)
            | Expression::Xor(ref lhs, ref rhs)
            | Expression::Shl(ref lhs, ref rhs)
            | Expression::Shr(ref lhs, ref rhs)
            | Expression::Cmpeq(ref lhs, ref rhs)
            | Expression::Cmpneq(ref lhs, ref rhs)
            | Expression::Cmpltu(ref lhs, ref rhs)
            | Expression::Gep(_, ref lhs, ref rhs) => vec![lhs, rhs],
            Expression::Zext(_, ref src)
            | Expression::Trun(_, ref src)
            | Expression::Bitcast(_, ref src)
            | Expression::PtrToInt(_, ref src)
            | Expression::IntToPtr(_, ref src) => vec![src],
        }
    }

    /// Returns mutable references to all direct sub-expressions.
    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match *self {
            Expression::Scalar(_) | Expression::Constant(_) | Expression::Global(_, _) => Vec::new(),
            Expression::Vector(ref mut elements) => elements.iter_mut().collect(),
            Expression::Add(ref mut lhs, ref mut rhs)
            | Expression::Sub(ref mut lhs, ref mut rhs)
            | Expression::Mul(ref mut lhs, ref mut rhs)
            | Expression::Urem(ref mut lhs, ref mut rhs)
            | Expression::And(ref mut lhs, ref mut rhs)
            | Expression::Or(ref mut lhs, ref mut rhs)
            | Expression::Xor(ref mut lhs, ref mut rhs)
            | Expression::Shl(ref mut lhs, ref mut rhs)
            | Expression::Shr(ref mut lhs, ref mut rhs)
            | Expression::Cmpeq(ref mut lhs, ref mut rhs)
            | Expression::Cmpneq(ref mut lhs, ref mut rhs)
            | Expression::Cmpltu(ref mut lhs, ref mut rhs)
            | Expression::Gep(_, ref mut lhs, ref mut rhs) => vec![lhs, rhs],
            Expression::Zext(_, ref mut src)
            | Expression::Trun(_, ref mut src)
            | Expression::Bitcast(_, ref mut src)
            | Expression::PtrToInt(_, ref mut src)
            | Expression::IntToPtr(_, ref mut src) => vec![src],
        }
    }

    /// Returns all `Scalars` used in this `Expression`
    pub fn scalars(&self) -> Vec<&Scalar> {
        match *self {
            Expression::Scalar(ref scalar) => vec![scalar],
            _ => self
                .children()
                .into_iter()
                .flat_map(|child| child.scalars())
                .collect(),
        }
    }

    /// Returns the names of all globals whose address is used in this
    /// `Expression`.
    pub fn globals(&self) -> Vec<&str> {
        match *self {
            Expression::Global(ref name, _) => vec![name.as_str()],
            _ => self
                .children()
                .into_iter()
                .flat_map(|child| child.globals())
                .collect(),
        }
    }

    /// Returns true if this expression can be evaluated without knowing the
    /// value of any scalar or the address of any global.
    pub fn is_constant(&self) -> bool {
        self.scalars().is_empty() && self.globals().is_empty()
    }

    /// If this expression is a single scalar, return it.
    pub fn get_scalar(&self) -> Option<&Scalar> {
        match *self {
            Expression::Scalar(ref scalar) => Some(scalar),
            _ => None,
        }
    }

    /// If this expression is a single constant, return it.
    pub fn get_constant(&self) -> Option<&Constant> {
        match *self {
            Expression::Constant(ref constant) => Some(constant),
            _ => None,
        }
    }

    /// Follow bitcasts and zero-offset geps to the underlying value.
    pub fn strip_pointer_casts(&self) -> &Expression {
        match *self {
            Expression::Bitcast(_, ref src) if src.ty().is_pointer() => src.strip_pointer_casts(),
            Expression::Gep(_, ref base, ref offset)
                if offset.get_constant().map(|c| c.is_zero()).unwrap_or(false) =>
            {
                base.strip_pointer_casts()
            }
            _ => self,
        }
    }

    /// Evaluate every sub-expression which has no run-time operands.
    pub fn fold(self) -> Result<Expression, Error> {
        if self.is_constant() {
            let ty = self.ty();
            let value = executor::eval(&self, &executor::Unbound)?;
            return Expression::from_constant(value, &ty);
        }
        let mut expression = self;
        for child in expression.children_mut() {
            let folded = std::mem::replace(child, Expression::Constant(Constant::new(0, 1)));
            *child = folded.fold()?;
        }
        Ok(expression)
    }

    /// Create an expression of type `ty` holding the raw value `constant`.
    pub fn from_constant(constant: Constant, ty: &Type) -> Result<Expression, Error> {
        Ok(match *ty {
            Type::Int(bits) => Expression::Constant(constant.resize(bits)),
            Type::Float(bits) => {
                Expression::Bitcast(ty.clone(), Box::new(constant.resize(bits).into()))
            }
            Type::Pointer(_) => {
                Expression::IntToPtr(ty.clone(), Box::new(constant.resize(POINTER_BITS).into()))
            }
            Type::Vector(ref element, lanes) => Expression::Vector(
                constant
                    .lanes(lanes)
                    .into_iter()
                    .map(|lane| Expression::from_constant(lane, element))
                    .collect::<Result<Vec<Expression>, Error>>()?,
            ),
            _ => return Err(Error::Unsized(ty.to_string())),
        })
    }

    /// Create a new `Expression` from a `Scalar`.
    pub fn scalar(scalar: Scalar) -> Expression {
        Expression::Scalar(scalar)
    }

    /// Create a new `Expression` from a `Constant`.
    pub fn constant(constant: Constant) -> Expression {
        Expression::Constant(constant)
    }

    /// The address of the global `name`, which has pointer type `ty`.
    pub fn global<S: Into<String>>(name: S, ty: Type) -> Expression {
        Expression::Global(name.into(), ty)
    }

    /// Create a vector from its lanes.
    /// # Error
    /// The lanes must all have the same first class, non-vector type.
    pub fn vector(elements: Vec<Expression>) -> Result<Expression, Error> {
        let ty = elements.first().ok_or(Error::Sort)?.ty();
        if !ty.is_first_class() || ty.is_vector() || elements.iter().any(|e| e.ty() != ty) {
            return Err(Error::Sort);
        }
        Ok(Expression::Vector(elements))
    }

    /// Create a vector with `lanes` copies of `element`.
    pub fn splat(element: Expression, lanes: usize) -> Result<Expression, Error> {
        Expression::vector(vec![element; lanes])
    }

    /// Create an addition `Expression`.
    /// # Error
    /// The sort of the lhs and the rhs are not the same integer type.
    pub fn add(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Add(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a subtraction `Expression`.
    /// # Error
    /// The sort of the lhs and the rhs are not the same integer type.
    pub fn sub(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Sub(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a multiplication `Expression`.
    pub fn mul(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Mul(Box::new(lhs), Box::new(rhs)))
    }

    /// Create an unsigned remainder `Expression`.
    pub fn urem(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Urem(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a binary and `Expression`.
    pub fn and(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::And(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a binary or `Expression`.
    pub fn or(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Or(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a binary xor `Expression`.
    pub fn xor(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Xor(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a logical shift-left `Expression`.
    pub fn shl(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Shl(Box::new(lhs), Box::new(rhs)))
    }

    /// Create a logical shift-right `Expression`.
    pub fn shr(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_int_sort(&lhs, &rhs)?;
        Ok(Expression::Shr(Box::new(lhs), Box::new(rhs)))
    }

    /// Create an equals comparison `Expression`.
    pub fn cmpeq(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_comparable(&lhs, &rhs)?;
        Ok(Expression::Cmpeq(Box::new(lhs), Box::new(rhs)))
    }

    /// Create an not equals comparison `Expression`.
    pub fn cmpneq(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_comparable(&lhs, &rhs)?;
        Ok(Expression::Cmpneq(Box::new(lhs), Box::new(rhs)))
    }

    /// Create an unsigned less-than comparison `Expression`.
    pub fn cmpltu(lhs: Expression, rhs: Expression) -> Result<Expression, Error> {
        Expression::ensure_comparable(&lhs, &rhs)?;
        Ok(Expression::Cmpltu(Box::new(lhs), Box::new(rhs)))
    }

    /// Create an expression to zero-extend src to the type `ty`.
    /// # Error
    /// `src` is not an integer, or is wider than `ty`.
    pub fn zext(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if !src_ty.is_int_or_int_vector()
            || !ty.is_int_or_int_vector()
            || !Expression::same_shape(&src_ty, &ty)
            || src_ty.scalar_type().primitive_bits() > ty.scalar_type().primitive_bits()
        {
            return Err(Error::Sort);
        }
        Ok(Expression::Zext(ty, Box::new(src)))
    }

    /// Create an expression to truncate src to the type `ty`.
    /// # Error
    /// `src` is not an integer, or is narrower than `ty`.
    pub fn trun(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if !src_ty.is_int_or_int_vector()
            || !ty.is_int_or_int_vector()
            || !Expression::same_shape(&src_ty, &ty)
            || src_ty.scalar_type().primitive_bits() < ty.scalar_type().primitive_bits()
        {
            return Err(Error::Sort);
        }
        Ok(Expression::Trun(ty, Box::new(src)))
    }

    /// Zero-extend, truncate, or pass through `src` so it has type `ty`.
    pub fn zext_or_trun(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if src_ty == ty {
            Ok(src)
        } else if src_ty.scalar_type().primitive_bits() < ty.scalar_type().primitive_bits() {
            Expression::zext(ty, src)
        } else {
            Expression::trun(ty, src)
        }
    }

    /// Reinterpret the bits of `src` as type `ty`.
    /// # Error
    /// The types differ in width, or only one of them is a pointer.
    pub fn bitcast(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if src_ty == ty {
            return Ok(src);
        }
        if src_ty.primitive_bits().is_none()
            || src_ty.primitive_bits() != ty.primitive_bits()
            || src_ty.is_ptr_or_ptr_vector() != ty.is_ptr_or_ptr_vector()
        {
            return Err(Error::Sort);
        }
        Ok(Expression::Bitcast(ty, Box::new(src)))
    }

    /// Convert a pointer, or vector of pointers, to integers.
    pub fn ptr_to_int(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if !src_ty.is_ptr_or_ptr_vector()
            || !ty.is_int_or_int_vector()
            || !Expression::same_shape(&src_ty, &ty)
        {
            return Err(Error::Sort);
        }
        Ok(Expression::PtrToInt(ty, Box::new(src)))
    }

    /// Convert an integer, or vector of integers, to pointers.
    pub fn int_to_ptr(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if !src_ty.is_int_or_int_vector()
            || !ty.is_ptr_or_ptr_vector()
            || !Expression::same_shape(&src_ty, &ty)
        {
            return Err(Error::Sort);
        }
        Ok(Expression::IntToPtr(ty, Box::new(src)))
    }

    /// Convert between a value and its integer equivalent, using ptrtoint,
    /// inttoptr, or bitcast as appropriate.
    pub fn cast(ty: Type, src: Expression) -> Result<Expression, Error> {
        let src_ty = src.ty();
        if src_ty == ty {
            Ok(src)
        } else if src_ty.is_ptr_or_ptr_vector() && !ty.is_ptr_or_ptr_vector() {
            Expression::ptr_to_int(ty, src)
        } else if ty.is_ptr_or_ptr_vector() && !src_ty.is_ptr_or_ptr_vector() {
            Expression::int_to_ptr(ty, src)
        } else {
            Expression::bitcast(ty, src)
        }
    }

    /// A pointer of type `ty`, `offset` bytes past `base`.
    pub fn gep(ty: Type, base: Expression, offset: Expression) -> Result<Expression, Error> {
        if !ty.is_pointer() || !base.ty().is_pointer() || offset.ty() != Type::Int(POINTER_BITS) {
            return Err(Error::Sort);
        }
        Ok(Expression::Gep(ty, Box::new(base), Box::new(offset)))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Expression::Scalar(ref s) => s.fmt(f),
            Expression::Constant(ref c) => c.fmt(f),
            Expression::Global(ref name, _) => write!(f, "@{}", name),
            Expression::Vector(ref elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "<{}>", elements.join(", "))
            }
            Expression::Add(ref lhs, ref rhs) => write!(f, "({} + {})", lhs, rhs),
            Expression::Sub(ref lhs, ref rhs) => write!(f, "({} - {})", lhs, rhs),
            Expression::Mul(ref lhs, ref rhs) => write!(f, "({} * {})", lhs, rhs),
            Expression::Urem(ref lhs, ref rhs) => write!(f, "({} % {})", lhs, rhs),
            Expression::And(ref lhs, ref rhs) => write!(f, "({} & {})", lhs, rhs),
            Expression::Or(ref lhs, ref rhs) => write!(f, "({} | {})", lhs, rhs),
            Expression::Xor(ref lhs, ref rhs) => write!(f, "({} ^ {})", lhs, rhs),
            Expression::Shl(ref lhs, ref rhs) => write!(f, "({} << {})", lhs, rhs),
            Expression::Shr(ref lhs, ref rhs) => write!(f, "({} >> {})", lhs, rhs),
            Expression::Cmpeq(ref lhs, ref rhs) => write!(f, "({} == {})", lhs, rhs),
            Expression::Cmpneq(ref lhs, ref rhs) => write!(f, "({} != {})", lhs, rhs),
            Expression::Cmpltu(ref lhs, ref rhs) => write!(f, "({} <u {})", lhs, rhs),
            Expression::Zext(ref ty, ref src) => write!(f, "zext.{}({})", ty, src),
            Expression::Trun(ref ty, ref src) => write!(f, "trun.{}({})", ty, src),
            Expression::Bitcast(ref ty, ref src) => write!(f, "bitcast.{}({})", ty, src),
            Expression::PtrToInt(ref ty, ref src) => write!(f, "ptrtoint.{}({})", ty, src),
            Expression::IntToPtr(ref ty, ref src) => write!(f, "inttoptr.{}({})", ty, src),
            Expression::Gep(_, ref base, ref offset) => write!(f, "({} +p {})", base, offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_are_checked() {
        let a = expr_const(1, 32);
        let b = expr_const(1, 64);
        assert!(Expression::add(a.clone(), b).is_err());
        assert!(Expression::zext(Type::Int(16), a.clone()).is_err());
        assert!(Expression::trun(Type::Int(16), a.clone()).is_ok());
        assert!(Expression::bitcast(Type::Float(32), a.clone()).is_ok());
        assert!(Expression::bitcast(Type::i8_pointer(), a).is_err());
    }

    #[test]
    fn vector_lanes_must_agree() {
        assert!(Expression::vector(vec![expr_const(1, 8), expr_const(2, 8)]).is_ok());
        assert!(Expression::vector(vec![expr_const(1, 8), expr_const(2, 16)]).is_err());
        assert!(Expression::vector(Vec::new()).is_err());
    }

    #[test]
    fn fold_constant_subexpressions() {
        let x = expr_scalar("x", Type::Int(64));
        let shift = Expression::mul(
            Expression::urem(expr_const(13, 64), expr_const(8, 64)).unwrap(),
            expr_const(8, 64),
        )
        .unwrap();
        let expr = Expression::shr(x.clone(), shift).unwrap().fold().unwrap();
        assert_eq!(expr, Expression::shr(x, expr_const(40, 64)).unwrap());
    }

    #[test]
    fn fold_vectors() {
        let offsets = Expression::vector(vec![expr_const(0, 64), expr_const(4, 64)]).unwrap();
        let eight = Expression::splat(expr_const(8, 64), 2).unwrap();
        let expr = Expression::mul(
            Expression::urem(offsets, eight.clone()).unwrap(),
            eight,
        )
        .unwrap()
        .fold()
        .unwrap();
        assert_eq!(
            expr,
            Expression::Vector(vec![expr_const(0, 64), expr_const(32, 64)])
        );
    }
}
