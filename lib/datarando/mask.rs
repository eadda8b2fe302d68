//! Random mask generation.

use crate::datarando::MASK_SIZE;
use log::warn;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// The mask of values which are stored in plaintext.
pub const NULL_MASK: u64 = 0;

/// Returns `size` if it is a valid effective mask size, else `MASK_SIZE`.
pub fn validate_effective_mask_size(size: u64) -> u64 {
    if size == 0 || size > MASK_SIZE || !size.is_power_of_two() {
        warn!(
            "Effective mask size {} is not a power of two no larger than {}, using {}",
            size, MASK_SIZE, MASK_SIZE
        );
        MASK_SIZE
    } else {
        size
    }
}

/// Replicate the low `size` bytes of `mask` across all `MASK_SIZE` bytes.
pub fn tile(mask: u64, size: u64) -> u64 {
    let mut mask = mask & (u64::MAX >> ((MASK_SIZE - size) * 8));
    let mut width = size;
    while width < MASK_SIZE {
        mask |= mask << (8 * width);
        width *= 2;
    }
    mask
}

/// Draws the masks assigned to equivalence classes.
#[derive(Clone, Debug)]
pub struct MaskGenerator {
    rng: ChaCha20Rng,
    effective_mask_size: u64,
}

impl MaskGenerator {
    /// A generator whose stream depends only on `seed`, `salt` and the
    /// effective mask size.
    pub fn new(seed: u64, salt: &str, effective_mask_size: u64) -> MaskGenerator {
        let mut hasher = FxHasher::default();
        salt.hash(&mut hasher);
        MaskGenerator {
            rng: ChaCha20Rng::seed_from_u64(seed ^ hasher.finish()),
            effective_mask_size: validate_effective_mask_size(effective_mask_size),
        }
    }

    pub fn effective_mask_size(&self) -> u64 {
        self.effective_mask_size
    }

    /// A fresh, non-zero mask.
    pub fn next_mask(&mut self) -> u64 {
        loop {
            let mask = tile(self.rng.next_u64(), self.effective_mask_size);
            if mask != NULL_MASK {
                return mask;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_tiled() {
        assert_eq!(tile(0x1234_5678_9abc_deaa, 1), 0xaaaa_aaaa_aaaa_aaaa);
        assert_eq!(tile(0x1234_5678_9abc_deaa, 2), 0xdeaa_deaa_deaa_deaa);
        assert_eq!(tile(0x1234_5678_9abc_deaa, 8), 0x1234_5678_9abc_deaa);

        let mut generator = MaskGenerator::new(3, "m", 2);
        for _ in 0..32 {
            let mask = generator.next_mask();
            assert_ne!(mask, NULL_MASK);
            assert_eq!((mask >> 16) & 0xffff, mask & 0xffff);
        }
    }

    #[test]
    fn streams_depend_on_salt() {
        let mut a = MaskGenerator::new(1, "a.c", 8);
        let mut again = MaskGenerator::new(1, "a.c", 8);
        let mut b = MaskGenerator::new(1, "b.c", 8);
        let first = a.next_mask();
        assert_eq!(first, again.next_mask());
        assert_ne!(first, b.next_mask());
    }

    #[test]
    fn invalid_sizes_fall_back() {
        assert_eq!(validate_effective_mask_size(3), MASK_SIZE);
        assert_eq!(validate_effective_mask_size(0), MASK_SIZE);
        assert_eq!(validate_effective_mask_size(16), MASK_SIZE);
        assert_eq!(validate_effective_mask_size(4), 4);
    }
}
