//! Pointer Stride Analysis
//!
//! Determines the constant element stride of a pointer over the analyzed
//! loop, with wrap-safety checking. A stride of +1 or -1 is a consecutive
//! access; any other non-zero stride is strided but non-consecutive.
//!
//! # Wrap safety
//!
//! The address computation must not wrap the address space, or a dependence
//! direction could invert. Wrapping is ruled out when any of these hold:
//!
//! - the recurrence carries a no-wrap proof from the oracle,
//! - the pointer is an in-bounds element-address computation, or
//! - the pointer lives in address space 0, where wrapping would have to
//!   touch address zero (undefined behavior).
//!
//! If only one of the two fallbacks applies (no no-wrap proof), the stride
//! must additionally be a unit stride.
//!
//! # Symbolic strides
//!
//! Some frontends version a loop on a stride variable being 1 and record
//! that promise in a [`SymbolicStrides`] map. [`stride_rewritten_expr`]
//! substitutes the stride parameter by the constant 1 before any symbolic
//! query, so `a[i * n]` analyzes as consecutive under the `n == 1` promise.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::host::{DataLayout, ExprId, ExprKind, IrQuery, LoopId, ScevOracle, ValueId};

/// Map from a pointer value to the stride variable the frontend promises
/// equals 1 at runtime.
pub type SymbolicStrides = FxHashMap<ValueId, ValueId>;

// =============================================================================
// Symbolic Stride Rewrite
// =============================================================================

/// Symbolic expression for a pointer, with its declared symbolic stride
/// (if any) replaced by the constant 1.
///
/// Pointers absent from the map keep their original expression.
pub fn stride_rewritten_expr(
    scev: &dyn ScevOracle,
    strides: &SymbolicStrides,
    ptr: ValueId,
) -> ExprId {
    let orig = scev.expr_of(ptr);

    if let Some(&stride_val) = strides.get(&ptr) {
        let by_one = scev.substitute_param(orig, stride_val, 1);
        debug!(?ptr, ?orig, ?by_one, "replacing symbolic stride by one");
        return by_one;
    }

    orig
}

// =============================================================================
// Stride Verdict
// =============================================================================

/// Why a pointer has no usable stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideFailure {
    /// The pointer expression is not an affine add-recurrence over the loop.
    NotAffine,
    /// The address computation may wrap the address space.
    MayWrap,
    /// The recurrence step is not a compile-time constant.
    NonConstantStep,
    /// The step is not a multiple of the element allocation size.
    NonDivisibleStep,
    /// The pointee is an aggregate type.
    AggregateElement,
}

impl StrideFailure {
    /// Human-readable description for diagnostics.
    pub const fn description(self) -> &'static str {
        match self {
            StrideFailure::NotAffine => "pointer is not an affine add-recurrence",
            StrideFailure::MayWrap => "pointer may wrap in the address space",
            StrideFailure::NonConstantStep => "pointer step is not a constant",
            StrideFailure::NonDivisibleStep => "pointer step does not divide the element size",
            StrideFailure::AggregateElement => "pointer to an aggregate type",
        }
    }
}

// =============================================================================
// Stride Analyzer
// =============================================================================

/// Compute the constant element stride of `ptr` over loop `l`.
pub fn element_stride(
    scev: &dyn ScevOracle,
    layout: &dyn DataLayout,
    ir: &dyn IrQuery,
    ptr: ValueId,
    l: LoopId,
    strides: &SymbolicStrides,
) -> Result<i64, StrideFailure> {
    // Accesses into aggregates have no single element stride.
    let pointee = layout.pointee_type(ptr);
    if layout.is_aggregate(pointee) {
        debug!(?ptr, "bad stride: not a pointer to a scalar type");
        return Err(StrideFailure::AggregateElement);
    }

    let expr = stride_rewritten_expr(scev, strides, ptr);
    let ExprKind::AddRec {
        step,
        loop_id,
        no_wrap,
        ..
    } = scev.kind(expr)
    else {
        debug!(?ptr, ?expr, "bad stride: not an add-recurrence pointer");
        return Err(StrideFailure::NotAffine);
    };

    // The access function must stride over the analyzed loop.
    if loop_id != l {
        debug!(?ptr, ?expr, "bad stride: not striding over the analyzed loop");
    }

    let in_bounds = ir.is_inbounds_element_address(ptr);
    let in_address_space_zero = layout.address_space(ptr) == 0;
    if !no_wrap && !in_bounds && !in_address_space_zero {
        debug!(?ptr, ?expr, "bad stride: pointer may wrap in the address space");
        return Err(StrideFailure::MayWrap);
    }

    let Some(step_val) = scev.constant_value(step) else {
        debug!(?ptr, ?expr, "bad stride: not a constant strided pointer");
        return Err(StrideFailure::NonConstantStep);
    };

    let size = layout.alloc_size(pointee) as i64;
    let stride = step_val / size;
    if step_val % size != 0 {
        return Err(StrideFailure::NonDivisibleStep);
    }

    // Without a no-wrap proof, the fallback arguments (in-bounds address
    // computation, address space 0) only rule out wrapping for unit strides.
    if !no_wrap && (in_bounds || in_address_space_zero) && stride != 1 && stride != -1 {
        return Err(StrideFailure::MayWrap);
    }

    Ok(stride)
}

/// Like [`element_stride`] but collapsing all failures to stride 0.
#[inline]
pub fn stride_of(
    scev: &dyn ScevOracle,
    layout: &dyn DataLayout,
    ir: &dyn IrQuery,
    ptr: ValueId,
    l: LoopId,
    strides: &SymbolicStrides,
) -> i64 {
    element_stride(scev, layout, ir, ptr, l, strides).unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
