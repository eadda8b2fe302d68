use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `Scalar` is a variable which holds a single value of a first class type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Scalar {
    name: String,
    ty: Type,
}

impl Scalar {
    /// Create a new `Scalar` with the given name and type.
    pub fn new<S>(name: S, ty: Type) -> Scalar
    where
        S: Into<String>,
    {
        Scalar {
            name: name.into(),
            ty,
        }
    }

    /// Gets the type of this `Scalar`.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Gets the name of this `Scalar`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}:{}", self.name, self.ty)
    }
}

impl From<Scalar> for Expression {
    fn from(scalar: Scalar) -> Expression {
        Expression::Scalar(scalar)
    }
}
