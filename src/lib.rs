//! Loop Memory-Dependence Analysis
//!
//! Decides whether the loads and stores of an innermost loop can safely
//! execute in vectorized or interleaved form, either unconditionally or
//! behind a runtime pointer-overlap check emitted into the function.
//!
//! - **Access Classification**: alias sets and dependence-candidate classes
//! - **Stride Analysis**: constant element strides with wrap-safety proofs
//! - **Dependence Checking**: pair-wise distance verdicts in program order
//! - **Runtime Checks**: per-pointer symbolic bounds and the pair list to
//!   compare at runtime
//!
//! # Architecture
//!
//! The driver ([`LoopAccessInfo`]) runs the pipeline for one loop:
//!
//! 1. **Loop shape**: innermost, one backedge, bottom-tested, computable
//!    backedge-taken count
//! 2. **Gather**: loads and stores in program order; everything else that
//!    touches memory rejects the loop
//! 3. **Classify**: alias sets from the oracle, union-find over underlying
//!    objects, read-only deferral
//! 4. **Runtime-check build**: symbolic start/end bounds per pointer
//! 5. **Dependence check**: pair verdicts; a non-constant distance retries
//!    with a unit-stride runtime check
//!
//! The host compiler's IR, loop info, scalar evolution, alias analysis,
//! data layout, dominator tree, and expression expander stay behind the
//! trait interfaces in [`host`]; per-loop results can be cached in
//! [`LoopAccessAnalysis`] under the pass manager's invalidation discipline.
//!
//! # Example
//!
//! ```text
//! for i in 0..n:
//!     a[i] = a[i] + b[i]
//! ```
//!
//! With unknown aliasing between `a` and `b` the analysis reports
//! `can_vectorize` with a runtime check of one pointer-range comparison;
//! the vectorizer emits the check in the preheader and branches to a
//! scalar fallback loop when the ranges overlap.

pub mod access;
pub mod analysis;
pub mod config;
pub mod dependence;
pub mod host;
pub mod rtcheck;
pub mod stride;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{AccessClassifier, AccessTag, CheckDeps, DepCandidates, TagId, TagSet};
pub use analysis::{AnalysisContext, LoopAccessAnalysis, LoopAccessInfo};
pub use config::{AnalysisConfig, MAX_VECTOR_WIDTH};
pub use dependence::{DepVerdict, MemoryDepChecker};
pub use host::{
    AliasOracle, BlockId, CheckBuilder, DataLayout, DomTree, ExprId, ExprKind, InstrKind,
    IrQuery, LoopId, LoopInspector, MemoryInst, MemoryLocation, ScevOracle, TbaaTag, TypeId,
    ValueId,
};
pub use rtcheck::{PointerBound, RuntimePointerCheck};
pub use stride::{element_stride, stride_of, stride_rewritten_expr, StrideFailure, SymbolicStrides};
