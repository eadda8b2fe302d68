//! A sparse, byte-addressed, little-endian memory model.

use crate::il;
use crate::Error;
use std::collections::BTreeMap;

/// Addresses handed out by `allocate` start here.
const HEAP_BASE: u64 = 0x2000_0000;

/// A concrete memory.
#[derive(Clone, Debug)]
pub struct Memory {
    cells: BTreeMap<u64, u8>,
    next_allocation: u64,
}

impl Default for Memory {
    fn default() -> Memory {
        Memory::new()
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            cells: BTreeMap::new(),
            next_allocation: HEAP_BASE,
        }
    }

    /// Reserve `size` zeroed bytes aligned to `alignment`.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> u64 {
        let alignment = alignment.max(1);
        let address = (self.next_allocation + alignment - 1) / alignment * alignment;
        self.next_allocation = address + size.max(1);
        for offset in 0..size {
            self.cells.insert(address + offset, 0);
        }
        address
    }

    pub fn store_u8(&mut self, address: u64, value: u8) {
        self.cells.insert(address, value);
    }

    pub fn load_u8(&self, address: u64) -> Result<u8, Error> {
        self.cells
            .get(&address)
            .cloned()
            .ok_or(Error::ExecutorInvalidAddress(address))
    }

    pub fn store_bytes(&mut self, address: u64, bytes: &[u8]) {
        for (offset, byte) in bytes.iter().enumerate() {
            self.cells.insert(address + offset as u64, *byte);
        }
    }

    pub fn load_bytes(&self, address: u64, length: u64) -> Result<Vec<u8>, Error> {
        (0..length)
            .map(|offset| self.load_u8(address + offset))
            .collect()
    }

    /// Store `value`, rounded up to whole bytes, at `address`.
    pub fn store(&mut self, address: u64, value: &il::Constant) {
        self.store_bytes(address, &value.to_le_bytes());
    }

    /// Load a value of `bits` bits from `address`.
    pub fn load(&self, address: u64, bits: usize) -> Result<il::Constant, Error> {
        let bytes = self.load_bytes(address, ((bits + 7) / 8) as u64)?;
        Ok(il::Constant::from_le_bytes(&bytes).resize(bits))
    }

    pub fn store_u64(&mut self, address: u64, value: u64) {
        self.store_bytes(address, &value.to_le_bytes());
    }

    pub fn load_u64(&self, address: u64) -> Result<u64, Error> {
        let bytes = self.load_bytes(address, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(word))
    }

    /// Read a NUL-terminated string, without the terminator.
    pub fn load_c_string(&self, address: u64) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        loop {
            match self.load_u8(address + bytes.len() as u64)? {
                0 => return Ok(bytes),
                byte => bytes.push(byte),
            }
        }
    }
}

#[test]
fn memory_is_little_endian() {
    let mut memory = Memory::new();
    memory.store(0x100, &il::const_(0x1122_3344, 32));
    assert_eq!(memory.load_u8(0x100).unwrap(), 0x44);
    assert_eq!(memory.load(0x102, 16).unwrap(), il::const_(0x1122, 16));
    assert!(memory.load(0x103, 16).is_err());
}

#[test]
fn allocations_are_aligned_and_zeroed() {
    let mut memory = Memory::new();
    let a = memory.allocate(3, 1);
    let b = memory.allocate(8, 8);
    assert_eq!(b % 8, 0);
    assert!(b >= a + 3);
    assert_eq!(memory.load_u64(b).unwrap(), 0);
}
