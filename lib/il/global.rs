use crate::il::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The static contents of a global variable.
///
/// Relocations overwrite the pointer-sized word at their offset with the
/// address of the named global or function.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Initializer {
    bytes: Vec<u8>,
    #[serde(default)]
    relocations: BTreeMap<u64, String>,
}

impl Initializer {
    pub fn new(bytes: Vec<u8>) -> Initializer {
        Initializer {
            bytes,
            relocations: BTreeMap::new(),
        }
    }

    /// An initializer of `size` zero bytes.
    pub fn zeroed(size: usize) -> Initializer {
        Initializer::new(vec![0; size])
    }

    /// The little-endian bytes of a constant.
    pub fn from_constant(constant: &Constant) -> Initializer {
        Initializer::new(constant.to_le_bytes())
    }

    pub fn with_relocation<S: Into<String>>(mut self, offset: u64, symbol: S) -> Initializer {
        self.relocations.insert(offset, symbol.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn relocations(&self) -> &BTreeMap<u64, String> {
        &self.relocations
    }
}

/// A module-level variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct GlobalVariable {
    name: String,
    ty: Type,
    #[serde(default)]
    initializer: Option<Initializer>,
    #[serde(default)]
    constant: bool,
    #[serde(default)]
    alignment: u64,
    #[serde(default)]
    section: Option<String>,
}

impl GlobalVariable {
    /// A global defined elsewhere.
    pub fn declaration<S: Into<String>>(name: S, ty: Type) -> GlobalVariable {
        GlobalVariable {
            name: name.into(),
            ty,
            initializer: None,
            constant: false,
            alignment: 0,
            section: None,
        }
    }

    /// A global defined in this module with the given contents.
    pub fn new<S: Into<String>>(name: S, ty: Type, initializer: Initializer) -> GlobalVariable {
        GlobalVariable {
            initializer: Some(initializer),
            ..GlobalVariable::declaration(name, ty)
        }
    }

    pub fn with_constant(mut self, constant: bool) -> GlobalVariable {
        self.constant = constant;
        self
    }

    pub fn with_alignment(mut self, alignment: u64) -> GlobalVariable {
        self.alignment = alignment;
        self
    }

    pub fn with_section<S: Into<String>>(mut self, section: S) -> GlobalVariable {
        self.section = Some(section.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of the value held by this global.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The type of this global's address.
    pub fn pointer_type(&self) -> Type {
        Type::pointer(self.ty.clone())
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    pub fn is_declaration(&self) -> bool {
        self.initializer.is_none()
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn set_constant(&mut self, constant: bool) {
        self.constant = constant;
    }

    /// Alignment in bytes, 0 for the ABI alignment of the type.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }
}

impl fmt::Display for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.is_declaration() {
            "external global"
        } else if self.constant {
            "constant"
        } else {
            "global"
        };
        write!(f, "@{} = {} {}", self.name, kind, self.ty)
    }
}
