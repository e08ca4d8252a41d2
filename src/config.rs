//! Analysis Configuration
//!
//! Process-wide tunables for the loop access analysis. The host's option
//! parser populates one [`AnalysisConfig`] at startup and passes it to every
//! analysis invocation; the analysis itself never mutates it.

/// Maximum SIMD width in bytes considered by the dependence checker.
pub const MAX_VECTOR_WIDTH: u64 = 64;

/// Tunables recognized by the analysis.
///
/// A zero value for the vector width or interleave factor means "autoselect":
/// the dependence checker substitutes 1 when computing the forced-distance
/// bound of a pair.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Forced SIMD width in elements. Zero is autoselect.
    pub force_vector_width: u32,

    /// Forced interleave (unroll) factor. Zero is autoselect.
    pub force_vector_interleave: u32,

    /// Upper bound on the number of pointer comparisons emitted for a
    /// runtime memory disambiguation check.
    pub runtime_memory_check_threshold: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            force_vector_width: 0,
            force_vector_interleave: 0,
            runtime_memory_check_threshold: 8,
        }
    }
}

impl AnalysisConfig {
    /// Check whether the interleave factor was forced by the user.
    #[inline]
    pub const fn is_interleave_forced(&self) -> bool {
        self.force_vector_interleave != 0
    }

    /// Effective vector factor for the forced-distance bound (1 if autoselect).
    #[inline]
    pub const fn effective_vector_factor(&self) -> u64 {
        if self.force_vector_width != 0 {
            self.force_vector_width as u64
        } else {
            1
        }
    }

    /// Effective interleave factor for the forced-distance bound (1 if autoselect).
    #[inline]
    pub const fn effective_interleave(&self) -> u64 {
        if self.force_vector_interleave != 0 {
            self.force_vector_interleave as u64
        } else {
            1
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
