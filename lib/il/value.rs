use serde::{Deserialize, Serialize};
use std::fmt;

/// Names a value of a module: the address of a global variable or function,
/// or a scalar local to a function.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ValueRef {
    Global(String),
    Local { function: String, scalar: String },
}

impl ValueRef {
    pub fn global<S: Into<String>>(name: S) -> ValueRef {
        ValueRef::Global(name.into())
    }

    pub fn local<F: Into<String>, S: Into<String>>(function: F, scalar: S) -> ValueRef {
        ValueRef::Local {
            function: function.into(),
            scalar: scalar.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ValueRef::Global(_))
    }

    pub fn global_name(&self) -> Option<&str> {
        match *self {
            ValueRef::Global(ref name) => Some(name),
            ValueRef::Local { .. } => None,
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValueRef::Global(ref name) => write!(f, "@{}", name),
            ValueRef::Local {
                ref function,
                ref scalar,
            } => write!(f, "{}:%{}", function, scalar),
        }
    }
}
