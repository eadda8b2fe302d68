use serde::{Deserialize, Serialize};
use std::default;
use std::path::{Path, PathBuf};

/// The width in bytes of a mask as stored in memory.
pub const MASK_SIZE: u64 = 8;

const DEFAULT_MAX_FIXED_POINT_ITERATIONS: usize = 100_000;

/// Options which change the behavior of the randomization pass.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Options {
    effective_mask_size: u64,
    safety_analysis: bool,
    always_emit_mask_alignment: bool,
    print_equivalence_classes_to: Option<PathBuf>,
    print_usage_counts_to: Option<PathBuf>,
    print_allocation_counts: bool,
    seed: u64,
    salt: Option<String>,
    max_fixed_point_iterations: usize,
}

impl default::Default for Options {
    fn default() -> Options {
        Options {
            effective_mask_size: MASK_SIZE,
            safety_analysis: false,
            always_emit_mask_alignment: false,
            print_equivalence_classes_to: None,
            print_usage_counts_to: None,
            print_allocation_counts: false,
            seed: 0,
            salt: None,
            max_fixed_point_iterations: DEFAULT_MAX_FIXED_POINT_ITERATIONS,
        }
    }
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// The number of random bytes in each mask.
    ///
    /// Masks are tiled from this many bytes up to `MASK_SIZE`. Values which
    /// are not a power of two no larger than `MASK_SIZE` are treated as
    /// `MASK_SIZE`.
    pub fn effective_mask_size(&self) -> u64 {
        self.effective_mask_size
    }

    pub fn set_effective_mask_size(&mut self, effective_mask_size: u64) {
        self.effective_mask_size = effective_mask_size;
    }

    /// Whether equivalence classes holding only constant addresses which
    /// never escape are left unmasked.
    pub fn safety_analysis(&self) -> bool {
        self.safety_analysis
    }

    pub fn set_safety_analysis(&mut self, safety_analysis: bool) {
        self.safety_analysis = safety_analysis;
    }

    /// Emit address-dependent mask rotation on every access, even when the
    /// alignment of the access makes it unnecessary.
    pub fn always_emit_mask_alignment(&self) -> bool {
        self.always_emit_mask_alignment
    }

    pub fn set_always_emit_mask_alignment(&mut self, always_emit_mask_alignment: bool) {
        self.always_emit_mask_alignment = always_emit_mask_alignment;
    }

    /// Write a description of every equivalence class to this file.
    pub fn print_equivalence_classes_to(&self) -> Option<&Path> {
        self.print_equivalence_classes_to.as_deref()
    }

    pub fn set_print_equivalence_classes_to(&mut self, path: Option<PathBuf>) {
        self.print_equivalence_classes_to = path;
    }

    /// Write the number of accesses to each equivalence class to this file,
    /// as CSV.
    pub fn print_usage_counts_to(&self) -> Option<&Path> {
        self.print_usage_counts_to.as_deref()
    }

    pub fn set_print_usage_counts_to(&mut self, path: Option<PathBuf>) {
        self.print_usage_counts_to = path;
    }

    /// Log the allocation count of every masked equivalence class.
    pub fn print_allocation_counts(&self) -> bool {
        self.print_allocation_counts
    }

    pub fn set_print_allocation_counts(&mut self, print_allocation_counts: bool) {
        self.print_allocation_counts = print_allocation_counts;
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Mixed into the seed, so every module draws different masks. The module
    /// name is used when no salt is given.
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }

    pub fn set_salt(&mut self, salt: Option<String>) {
        self.salt = salt;
    }

    /// Upper bound on the rounds spent finding functions whose addresses
    /// escape to code which cannot be masked.
    pub fn max_fixed_point_iterations(&self) -> usize {
        self.max_fixed_point_iterations
    }

    pub fn set_max_fixed_point_iterations(&mut self, max_fixed_point_iterations: usize) {
        self.max_fixed_point_iterations = max_fixed_point_iterations;
    }
}

/// A builder for `Options`.
#[derive(Clone, Debug)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    pub fn build(self) -> Options {
        self.options
    }

    pub fn effective_mask_size(mut self, effective_mask_size: u64) -> Self {
        self.options.set_effective_mask_size(effective_mask_size);
        self
    }

    pub fn safety_analysis(mut self, safety_analysis: bool) -> Self {
        self.options.set_safety_analysis(safety_analysis);
        self
    }

    pub fn always_emit_mask_alignment(mut self, always_emit_mask_alignment: bool) -> Self {
        self.options
            .set_always_emit_mask_alignment(always_emit_mask_alignment);
        self
    }

    pub fn print_equivalence_classes_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options
            .set_print_equivalence_classes_to(Some(path.into()));
        self
    }

    pub fn print_usage_counts_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.set_print_usage_counts_to(Some(path.into()));
        self
    }

    pub fn print_allocation_counts(mut self, print_allocation_counts: bool) -> Self {
        self.options
            .set_print_allocation_counts(print_allocation_counts);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.options.set_seed(seed);
        self
    }

    pub fn salt<S: Into<String>>(mut self, salt: S) -> Self {
        self.options.set_salt(Some(salt.into()));
        self
    }

    pub fn max_fixed_point_iterations(mut self, max_fixed_point_iterations: usize) -> Self {
        self.options
            .set_max_fixed_point_iterations(max_fixed_point_iterations);
        self
    }
}

impl default::Default for OptionsBuilder {
    fn default() -> OptionsBuilder {
        OptionsBuilder::new()
    }
}

#[test]
fn missing_fields_take_defaults() {
    let options: Options = serde_json::from_str(r#"{"seed": 9}"#).unwrap();
    assert_eq!(options.seed(), 9);
    assert_eq!(options.effective_mask_size(), MASK_SIZE);
    assert_eq!(options.max_fixed_point_iterations(), 100_000);
    assert!(!options.safety_analysis());
}
