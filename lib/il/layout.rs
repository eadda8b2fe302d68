//! Sizes, alignments and struct layouts of IL types.
//!
//! Layout follows the conventions of a 64-bit little-endian target:
//! integers and floats are aligned to their size rounded up to a power of
//! two (at most 8 bytes), vectors to their size rounded up to a power of two,
//! and struct fields are laid out in order with natural padding unless the
//! struct is packed.

use crate::il::{StructTable, Type, POINTER_BITS};
use crate::Error;
use serde::{Deserialize, Serialize};

/// Target properties which are not carried by types themselves.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct DataLayout {
    /// The largest ABI alignment of a scalar integer or float, in bytes.
    max_scalar_alignment: u64,
}

impl Default for DataLayout {
    fn default() -> DataLayout {
        DataLayout {
            max_scalar_alignment: 8,
        }
    }
}

impl DataLayout {
    pub fn new(max_scalar_alignment: u64) -> DataLayout {
        DataLayout {
            max_scalar_alignment,
        }
    }

    pub fn max_scalar_alignment(&self) -> u64 {
        self.max_scalar_alignment
    }
}

/// The offsets of every field in a struct.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructLayout {
    offsets: Vec<u64>,
    size: u64,
    alignment: u64,
}

impl StructLayout {
    /// The byte offset of the field at `index`.
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).cloned()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// The allocation size of the struct, including tail padding.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }
}

/// Computes layout information for the types of one module.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    data_layout: DataLayout,
    structs: StructTable,
}

fn round_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        (value + alignment - 1) / alignment * alignment
    }
}

impl Layout {
    pub fn new(data_layout: DataLayout, structs: StructTable) -> Layout {
        Layout {
            data_layout,
            structs,
        }
    }

    pub fn structs(&self) -> &StructTable {
        &self.structs
    }

    /// Returns true if the type has a size. Opaque structs and functions are
    /// unsized.
    pub fn is_sized(&self, ty: &Type) -> bool {
        self.store_size(ty).is_ok()
    }

    /// Returns true if the type is, or points to, an opaque struct.
    pub fn is_opaque(&self, ty: &Type) -> bool {
        let ty = ty.pointee().unwrap_or(ty);
        match *ty {
            Type::Struct(ref name) => self
                .structs
                .get(name)
                .map(|body| body.is_opaque())
                .unwrap_or(true),
            _ => false,
        }
    }

    /// The number of bytes written when storing a value of this type.
    pub fn store_size(&self, ty: &Type) -> Result<u64, Error> {
        match *ty {
            Type::Int(_) | Type::Float(_) | Type::Pointer(_) | Type::Vector(_, _) => ty
                .primitive_bits()
                .map(|bits| (bits as u64 + 7) / 8)
                .ok_or_else(|| Error::Unsized(ty.to_string())),
            Type::Array(ref element, length) => Ok(self.alloc_size(element)? * length as u64),
            Type::Struct(ref name) => Ok(self.struct_layout(name)?.size),
            Type::Void | Type::Function(_) => Err(Error::Unsized(ty.to_string())),
        }
    }

    /// The number of bytes between successive values of this type in memory.
    pub fn alloc_size(&self, ty: &Type) -> Result<u64, Error> {
        Ok(round_up(self.store_size(ty)?, self.abi_alignment(ty)?))
    }

    /// The store size of a type, in bits.
    pub fn store_size_in_bits(&self, ty: &Type) -> Result<u64, Error> {
        Ok(self.store_size(ty)? * 8)
    }

    /// The ABI alignment of a type, in bytes.
    pub fn abi_alignment(&self, ty: &Type) -> Result<u64, Error> {
        match *ty {
            Type::Int(_) | Type::Float(_) => {
                let size = self.store_size(ty)?.next_power_of_two();
                Ok(size.min(self.data_layout.max_scalar_alignment))
            }
            Type::Pointer(_) => Ok(POINTER_BITS as u64 / 8),
            Type::Vector(_, _) => Ok(self.store_size(ty)?.next_power_of_two()),
            Type::Array(ref element, _) => self.abi_alignment(element),
            Type::Struct(ref name) => Ok(self.struct_layout(name)?.alignment),
            Type::Void | Type::Function(_) => Err(Error::Unsized(ty.to_string())),
        }
    }

    /// Lay out the named struct.
    pub fn struct_layout(&self, name: &str) -> Result<StructLayout, Error> {
        let body = self
            .structs
            .get(name)
            .ok_or_else(|| Error::UnknownStruct(name.to_string()))?;
        let fields = body
            .fields()
            .ok_or_else(|| Error::Unsized(format!("%{}", name)))?;

        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut alignment = 1;
        for field in fields {
            let field_alignment = if body.is_packed() {
                1
            } else {
                self.abi_alignment(field)?
            };
            offset = round_up(offset, field_alignment);
            offsets.push(offset);
            offset += self.alloc_size(field)?;
            alignment = alignment.max(field_alignment);
        }

        Ok(StructLayout {
            offsets,
            size: round_up(offset, alignment),
            alignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::StructBody;

    fn layout() -> Layout {
        let mut structs = StructTable::new();
        structs.insert(
            "struct.pair".to_string(),
            StructBody::new(vec![Type::Int(8), Type::Int(32), Type::i8_pointer()]),
        );
        structs.insert(
            "struct.packed".to_string(),
            StructBody::packed(vec![Type::Int(8), Type::Int(32)]),
        );
        structs.insert("struct._IO_FILE".to_string(), StructBody::opaque());
        Layout::new(DataLayout::default(), structs)
    }

    #[test]
    fn scalar_sizes() {
        let layout = layout();
        assert_eq!(layout.store_size(&Type::Int(1)).unwrap(), 1);
        assert_eq!(layout.store_size(&Type::Int(24)).unwrap(), 3);
        assert_eq!(layout.alloc_size(&Type::Int(24)).unwrap(), 4);
        assert_eq!(layout.abi_alignment(&Type::Int(128)).unwrap(), 8);
        assert_eq!(layout.store_size(&Type::vector(Type::Int(16), 3)).unwrap(), 6);
        assert_eq!(layout.abi_alignment(&Type::vector(Type::Int(16), 3)).unwrap(), 8);
    }

    #[test]
    fn struct_offsets() {
        let layout = layout();
        let pair = layout.struct_layout("struct.pair").unwrap();
        assert_eq!(pair.offsets(), &[0, 4, 8]);
        assert_eq!(pair.size(), 16);

        let packed = layout.struct_layout("struct.packed").unwrap();
        assert_eq!(packed.offsets(), &[0, 1]);
        assert_eq!(packed.size(), 5);

        assert_eq!(
            layout
                .alloc_size(&Type::array(Type::structure("struct.pair"), 3))
                .unwrap(),
            48
        );
    }

    #[test]
    fn opaque_types_are_unsized() {
        let layout = layout();
        let file = Type::pointer(Type::structure("struct._IO_FILE"));
        assert!(layout.is_opaque(&file));
        assert!(!layout.is_sized(file.pointee().unwrap()));
        assert!(layout.is_opaque(&Type::structure("struct.undefined")));
        assert!(!layout.is_opaque(&Type::i8_pointer()));
    }
}
