use std::num::NonZero;

use derive_more::Display;
use new_zealand::nz;

/// Which class of processor a task set prefers to execute on.
///
/// On systems where all processors belong to one class, the preference is ignored and every task
/// set is treated as [`CoreType::Any`].
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirroring the two-tier processor classification plus a wildcard"
)]
pub enum CoreType {
    /// Processors optimized for performance at the expense of energy efficiency.
    #[display("performance")]
    Performance,

    /// Processors optimized for energy efficiency at the expense of performance.
    #[display("efficiency")]
    Efficiency,

    /// No preference.
    #[default]
    #[display("any")]
    Any,
}

impl CoreType {
    pub(crate) const fn to_bits(self) -> u8 {
        match self {
            Self::Performance => 0,
            Self::Efficiency => 1,
            Self::Any => 2,
        }
    }

    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Performance,
            1 => Self::Efficiency,
            _ => Self::Any,
        }
    }

    /// Short label used in worker thread names.
    pub(crate) const fn thread_label(self) -> &'static str {
        match self {
            Self::Performance => "p",
            Self::Efficiency => "e",
            Self::Any => "any",
        }
    }
}

/// Default number of worker threads dedicated to affinity-agnostic task sets in
/// [`RoutingMode::ReserveAny`].
pub const DEFAULT_ANY_THREADS: NonZero<usize> = nz!(2);

/// How task sets are distributed between worker pools on a hybrid system.
///
/// The mode is chosen once when the scheduler is built. It has no effect on systems where all
/// processors belong to one class: those always use a single shared pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RoutingMode {
    /// All task sets execute on performance processors; efficiency processors are left idle.
    CoreOnly,

    /// One pool per processor class. Task sets without a preference go to the performance pool.
    Split,

    /// One pool per processor class plus a small pool for task sets without a preference,
    /// free to run on any processor.
    ReserveAny {
        /// Number of worker threads in the shared pool.
        any_threads: NonZero<usize>,
    },
}

impl Default for RoutingMode {
    fn default() -> Self {
        Self::ReserveAny {
            any_threads: DEFAULT_ANY_THREADS,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip_every_variant() {
        for core_type in [CoreType::Performance, CoreType::Efficiency, CoreType::Any] {
            assert_eq!(CoreType::from_bits(core_type.to_bits()), core_type);
        }
    }

    #[test]
    fn defaults_match_reserve_any_with_two_threads() {
        assert_eq!(CoreType::default(), CoreType::Any);
        assert_eq!(
            RoutingMode::default(),
            RoutingMode::ReserveAny {
                any_threads: nz!(2)
            }
        );
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(CoreType::Performance.to_string(), "performance");
        assert_eq!(CoreType::Efficiency.to_string(), "efficiency");
        assert_eq!(CoreType::Any.to_string(), "any");
    }
}
