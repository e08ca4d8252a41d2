//! Pair-Wise Memory Dependence Checking
//!
//! Decides whether the accesses inside one dependence-candidate class are
//! safe to execute in vectorized form, relying on the program order of the
//! accesses (the analysis never reorders them). A pair is safe for:
//!
//! - **Negative constant distance** in program order:
//!   `tmp = a[i + 1]; a[i] = tmp` reads before the overwrite.
//! - **Positive constant distance** larger than twice the access size (and
//!   any forced vectorization footprint): `a[i + 2] = a[i]` still has the
//!   old value available two elements ahead.
//! - **Zero distance** when both accesses have the same type.
//!
//! A non-constant distance is not necessarily fatal: the driver can retry
//! with a runtime overlap check, which is signalled by
//! [`DepVerdict::UnsafeRetryWithRuntime`].
//!
//! # Store-to-load forwarding
//!
//! Positive-distance flow dependences can also be rejected for performance:
//! if the store of one iteration feeds a load a few iterations later at a
//! distance that is not a multiple of a feasible vector width, the hardware
//! cannot forward the stored value and the vectorized loop stalls through
//! memory. `a[i] = a[i-3] ^ a[i-8]` is the canonical victim.

use std::mem;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::access::{AccessTag, CheckDeps, DepCandidates, TagSet};
use crate::config::{AnalysisConfig, MAX_VECTOR_WIDTH};
use crate::host::{DataLayout, IrQuery, LoopId, MemoryInst, ScevOracle};
use crate::stride::{stride_of, stride_rewritten_expr, SymbolicStrides};

// =============================================================================
// Verdicts
// =============================================================================

/// Outcome of a pair-wise dependence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepVerdict {
    /// The pair cannot form an unsafe dependence.
    Safe,
    /// The pair is unsafe and no runtime check can help.
    UnsafeFatal,
    /// The dependence distance is not a compile-time constant; a runtime
    /// overlap check can still prove independence.
    UnsafeRetryWithRuntime,
}

impl DepVerdict {
    #[inline]
    pub const fn is_safe(self) -> bool {
        matches!(self, DepVerdict::Safe)
    }
}

// =============================================================================
// Memory Dependence Checker
// =============================================================================

/// Checks memory dependences among accesses to the same underlying object.
///
/// Accesses are registered in program order with [`MemoryDepChecker::add_access`];
/// the classifier's union-find then tells which tags need pairing.
pub struct MemoryDepChecker<'a> {
    scev: &'a dyn ScevOracle,
    layout: &'a dyn DataLayout,
    ir: &'a dyn IrQuery,
    config: &'a AnalysisConfig,
    loop_id: LoopId,

    /// Program-order indices of every registered access, per tag.
    accesses: FxHashMap<AccessTag, SmallVec<[u32; 2]>>,
    /// Next program-order index.
    access_idx: u32,
    /// The maximum number of bytes that can be accessed in parallel safely.
    max_safe_dep_dist_bytes: u64,
}

impl<'a> MemoryDepChecker<'a> {
    pub fn new(
        scev: &'a dyn ScevOracle,
        layout: &'a dyn DataLayout,
        ir: &'a dyn IrQuery,
        config: &'a AnalysisConfig,
        loop_id: LoopId,
    ) -> Self {
        Self {
            scev,
            layout,
            ir,
            config,
            loop_id,
            accesses: FxHashMap::default(),
            access_idx: 0,
            max_safe_dep_dist_bytes: u64::MAX,
        }
    }

    /// Register the next access in program order.
    pub fn add_access(&mut self, inst: MemoryInst) {
        let tag = AccessTag {
            ptr: inst.ptr(),
            is_write: inst.is_write(),
        };
        self.accesses.entry(tag).or_default().push(self.access_idx);
        self.access_idx += 1;
    }

    /// The maximum dependence distance seen, in bytes.
    #[inline]
    pub fn max_safe_dep_dist_bytes(&self) -> u64 {
        self.max_safe_dep_dist_bytes
    }

    /// Check every pair inside the classes of the tags in `check_deps`.
    ///
    /// Stops at the first unsafe pair and returns its verdict.
    pub fn are_deps_safe(
        &mut self,
        tags: &TagSet,
        dep_cands: &mut DepCandidates,
        check_deps: &mut CheckDeps,
        strides: &SymbolicStrides,
    ) -> DepVerdict {
        self.max_safe_dep_dist_bytes = u64::MAX;

        while let Some(cur) = check_deps.first() {
            let leader = dep_cands.find(cur);
            let members = dep_cands.members(leader);

            for (pos, &a_id) in members.iter().enumerate() {
                check_deps.remove(a_id);
                let a = tags.get(a_id);
                let a_indices = self.indices_of(a);

                for &b_id in &members[pos + 1..] {
                    let b = tags.get(b_id);
                    let b_indices = self.indices_of(b);

                    // Check every accessing instruction pair in program order.
                    for &i1 in &a_indices {
                        for &i2 in &b_indices {
                            let verdict = if i1 < i2 {
                                self.is_dependent(a, i1, b, i2, strides)
                            } else {
                                self.is_dependent(b, i2, a, i1, strides)
                            };
                            if !verdict.is_safe() {
                                return verdict;
                            }
                        }
                    }
                }
            }
        }

        DepVerdict::Safe
    }

    fn indices_of(&self, tag: AccessTag) -> SmallVec<[u32; 2]> {
        self.accesses.get(&tag).cloned().unwrap_or_default()
    }

    // =========================================================================
    // Pair Check
    // =========================================================================

    /// Check whether there is a plausible unsafe dependence between two
    /// accesses. `a` must occur strictly before `b` in program order.
    fn is_dependent(
        &mut self,
        a: AccessTag,
        a_idx: u32,
        b: AccessTag,
        b_idx: u32,
        strides: &SymbolicStrides,
    ) -> DepVerdict {
        debug_assert!(a_idx < b_idx, "pair must be given in program order");

        let (mut a, mut b) = (a, b);

        // Two reads are independent.
        if !a.is_write && !b.is_write {
            return DepVerdict::Safe;
        }

        // Pointers in different address spaces cannot be compared.
        if self.layout.address_space(a.ptr) != self.layout.address_space(b.ptr) {
            return DepVerdict::UnsafeFatal;
        }

        let mut src = stride_rewritten_expr(self.scev, strides, a.ptr);
        let mut sink = stride_rewritten_expr(self.scev, strides, b.ptr);

        let mut stride_a = stride_of(self.scev, self.layout, self.ir, a.ptr, self.loop_id, strides);
        let mut stride_b = stride_of(self.scev, self.layout, self.ir, b.ptr, self.loop_id, strides);

        // If the induction steps downwards, invert source and sink of the
        // dependence (the later access in program order touches the lower
        // address).
        let (mut a_idx, mut b_idx) = (a_idx, b_idx);
        if stride_a < 0 {
            mem::swap(&mut a, &mut b);
            mem::swap(&mut src, &mut sink);
            mem::swap(&mut a_idx, &mut b_idx);
            mem::swap(&mut stride_a, &mut stride_b);
        }

        let dist = self.scev.minus(sink, src);
        debug!(a_idx, b_idx, ?src, ?sink, stride_a, ?dist, "dependence distance");

        // Consecutive accesses only: a non-strided pointer (a[b[i]] and the
        // like) or mismatched strides could overlap unpredictably.
        if stride_a == 0 || stride_b == 0 || stride_a != stride_b {
            debug!("non-consecutive pointer access");
            return DepVerdict::UnsafeFatal;
        }

        let Some(d) = self.scev.constant_value(dist) else {
            debug!("dependence because of non-constant distance");
            return DepVerdict::UnsafeRetryWithRuntime;
        };

        let a_ty = self.layout.pointee_type(a.ptr);
        let b_ty = self.layout.pointee_type(b.ptr);
        let type_size = self.layout.alloc_size(a_ty);

        // Negative distances are not plausible dependencies.
        if d < 0 {
            let is_true_data_dependence = a.is_write && !b.is_write;
            if is_true_data_dependence
                && (self.could_prevent_store_load_forward(d.unsigned_abs(), type_size)
                    || a_ty != b_ty)
            {
                return DepVerdict::UnsafeFatal;
            }
            debug!(distance = d, "dependence is negative: no dependence");
            return DepVerdict::Safe;
        }

        // Write to the same location with the same size.
        if d == 0 {
            if a_ty == b_ty {
                return DepVerdict::Safe;
            }
            debug!("zero dependence distance but different types");
            return DepVerdict::UnsafeFatal;
        }

        // Positive distance with different types: the accesses cannot form
        // the same-object overlap pattern the distance math assumes.
        if a_ty != b_ty {
            debug!("positive dependence distance with different types");
            return DepVerdict::Safe;
        }

        let distance = d as u64;

        let forced_factor = self.config.effective_vector_factor();
        let forced_unroll = self.config.effective_interleave();

        // The distance must exceed the footprint of one vectorized
        // operation, and that footprint must still fit the running maximum.
        if distance < 2 * type_size
            || 2 * type_size > self.max_safe_dep_dist_bytes
            || distance < type_size * forced_unroll * forced_factor
        {
            debug!(distance = d, "failure because of positive distance");
            return DepVerdict::UnsafeFatal;
        }

        self.max_safe_dep_dist_bytes = self.max_safe_dep_dist_bytes.min(distance);

        let is_true_data_dependence = !a.is_write && b.is_write;
        if is_true_data_dependence && self.could_prevent_store_load_forward(distance, type_size) {
            return DepVerdict::UnsafeFatal;
        }

        debug!(
            distance = d,
            max_vf = self.max_safe_dep_dist_bytes / type_size,
            "positive distance is safe"
        );
        DepVerdict::Safe
    }

    // =========================================================================
    // Store-to-Load Forwarding
    // =========================================================================

    /// Check whether a flow dependence at `distance` bytes would break
    /// store-to-load forwarding for every feasible vector width.
    ///
    /// Scans candidate widths `2T, 4T, 8T, ...`; a width whose remainder
    /// against the distance is non-zero within the forwarding cycle window
    /// caps the feasible width at its half. Returns true when no width of
    /// at least `2T` survives; otherwise clamps the running maximum safe
    /// distance to the surviving width.
    fn could_prevent_store_load_forward(&mut self, distance: u64, type_size: u64) -> bool {
        // Store-load forwarding window of the target, in accessed bytes.
        let forwarding_cycles = 8 * type_size;

        let mut max_vf_without_forwarding = MAX_VECTOR_WIDTH * type_size;
        if self.max_safe_dep_dist_bytes < max_vf_without_forwarding {
            max_vf_without_forwarding = self.max_safe_dep_dist_bytes;
        }

        let mut vf = 2 * type_size;
        while vf <= max_vf_without_forwarding {
            if distance % vf != 0 && distance / vf < forwarding_cycles {
                max_vf_without_forwarding = vf / 2;
                break;
            }
            vf *= 2;
        }

        if max_vf_without_forwarding < 2 * type_size {
            debug!(
                distance,
                "distance could cause a store-load forwarding conflict"
            );
            return true;
        }

        if max_vf_without_forwarding < self.max_safe_dep_dist_bytes
            && max_vf_without_forwarding != MAX_VECTOR_WIDTH * type_size
        {
            self.max_safe_dep_dist_bytes = max_vf_without_forwarding;
        }
        false
    }
}

// =============================================================================
// Tests
// =============================================================================
