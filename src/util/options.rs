//! Tuning knobs for a collector instance.
//!
//! Every option has a built-in default and can be overridden from the
//! environment (`TLGC_*` variables). An override that fails to parse or
//! fails its validity check is rejected with a warning and the default is
//! kept; tuning can never make a collector unsound, only slower.

use std::env;
use std::fmt::Debug;
use std::str::FromStr;

/// Prefix for environment-variable overrides, e.g. `TLGC_SWEEP_FACTOR=0.7`.
const ENV_VAR_PREFIX: &str = "TLGC_";

/// The default initial bucket count of the allocation index. Rounded up to a
/// prime on use.
pub const DEFAULT_CAPACITY: usize = 1024;
/// The default floor for the bucket count. Rounded up to a prime on use.
pub const DEFAULT_MIN_CAPACITY: usize = 1024;
/// The default automatic-sweep multiplier: a cycle triggers when the record
/// count reaches `sweep_factor * capacity`.
pub const DEFAULT_SWEEP_FACTOR: f64 = 0.5;
/// The default load factor below which the index shrinks.
pub const DEFAULT_DOWNSIZE_FACTOR: f64 = 0.2;
/// The default load factor above which the index grows.
pub const DEFAULT_UPSIZE_FACTOR: f64 = 0.8;

/// Tuning for one collector instance.
///
/// The factor fields are deliberately loose: the algorithm stays correct for
/// any non-negative finite values, and the test suite leans on degenerate
/// settings (a zero downsize factor, enormous upsize and sweep factors) to
/// pin table geometry. The validators only reject values that would wedge
/// the index, such as a negative or non-finite factor.
#[derive(Clone, Debug)]
pub struct Options {
    /// Initial bucket count for the allocation index.
    pub capacity: usize,
    /// Lower bound on the bucket count; the index never shrinks below this.
    pub min_capacity: usize,
    /// Automatic-sweep trigger multiplier.
    pub sweep_factor: f64,
    /// Load factor under which the index rehashes to a smaller prime.
    pub downsize_factor: f64,
    /// Load factor over which the index rehashes to a larger prime.
    pub upsize_factor: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            capacity: DEFAULT_CAPACITY,
            min_capacity: DEFAULT_MIN_CAPACITY,
            sweep_factor: DEFAULT_SWEEP_FACTOR,
            downsize_factor: DEFAULT_DOWNSIZE_FACTOR,
            upsize_factor: DEFAULT_UPSIZE_FACTOR,
        }
    }
}

impl Options {
    /// Create options from the built-in defaults, then apply any environment
    /// variable overrides.
    pub fn new() -> Self {
        let mut options = Self::new_no_env_vars();
        options.read_env_var_settings();
        options
    }

    /// Create options from the built-in defaults without reading environment
    /// variables. Tests use this so their geometry cannot be perturbed from
    /// outside.
    pub fn new_no_env_vars() -> Self {
        Self::default()
    }

    /// Apply `TLGC_*` environment variable overrides to this option set.
    pub fn read_env_var_settings(&mut self) {
        read_env_var("CAPACITY", &mut self.capacity, |v| *v > 0);
        read_env_var("MIN_CAPACITY", &mut self.min_capacity, |v| *v > 0);
        read_env_var("SWEEP_FACTOR", &mut self.sweep_factor, valid_factor);
        read_env_var("DOWNSIZE_FACTOR", &mut self.downsize_factor, valid_factor);
        read_env_var("UPSIZE_FACTOR", &mut self.upsize_factor, valid_factor);
    }
}

fn valid_factor(v: &f64) -> bool {
    v.is_finite() && *v >= 0.0
}

fn read_env_var<T: FromStr + Debug>(name: &str, slot: &mut T, validator: fn(&T) -> bool) {
    let var = format!("{}{}", ENV_VAR_PREFIX, name);
    let Ok(raw) = env::var(&var) else { return };
    match raw.parse::<T>() {
        Ok(value) if validator(&value) => *slot = value,
        Ok(value) => warn!("{} = {:?} is invalid, keeping {:?}", var, value, slot),
        Err(_) => warn!("{} = {:?} does not parse, keeping {:?}", var, raw, slot),
    }
}
