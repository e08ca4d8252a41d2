//! Loop Access Analysis Driver
//!
//! Orchestrates the whole analysis for one innermost loop:
//!
//! 1. Check the loop shape (single backedge, bottom-tested, computable
//!    backedge-taken count).
//! 2. Gather the loads and stores in program order, rejecting anything the
//!    vectorizer cannot handle (non-simple accesses, unknown memory
//!    writers, stores to uniform addresses).
//! 3. Classify accesses into alias sets and dependence-candidate classes.
//! 4. Build the runtime-check descriptor if the classifier asks for one.
//! 5. Pair-check the dependence candidates; on a non-constant distance,
//!    retry with a unit-stride-only runtime check.
//!
//! Rejections are reported, not thrown: the first failing reason is
//! recorded as the loop's diagnostic and the result is conservative.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::access::AccessClassifier;
use crate::config::AnalysisConfig;
use crate::dependence::{DepVerdict, MemoryDepChecker};
use crate::host::{
    AliasOracle, BlockId, CheckBuilder, DataLayout, DomTree, InstrKind, IrQuery, LoopId,
    LoopInspector, MemoryInst, MemoryLocation, ScevOracle, ValueId,
};
use crate::rtcheck::RuntimePointerCheck;
use crate::stride::{stride_of, SymbolicStrides};

// =============================================================================
// Analysis Context
// =============================================================================

/// The collaborator interfaces the analysis consumes from the host.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub ir: &'a dyn IrQuery,
    pub loops: &'a dyn LoopInspector,
    pub scev: &'a dyn ScevOracle,
    pub alias: &'a dyn AliasOracle,
    pub layout: &'a dyn DataLayout,
    pub domtree: &'a dyn DomTree,
}

// =============================================================================
// Loop Access Info
// =============================================================================

/// Result of the memory-access analysis of one loop.
pub struct LoopAccessInfo {
    loop_id: LoopId,
    can_vectorize: bool,
    rt_check: RuntimePointerCheck,
    max_safe_dep_dist_bytes: u64,
    num_loads: usize,
    num_stores: usize,
    report: Option<String>,
}

impl LoopAccessInfo {
    /// Analyze the memory accesses of `l`.
    pub fn analyze(
        ctx: &AnalysisContext<'_>,
        config: &AnalysisConfig,
        l: LoopId,
        strides: &SymbolicStrides,
    ) -> Self {
        let mut info = Self {
            loop_id: l,
            can_vectorize: false,
            rt_check: RuntimePointerCheck::new(),
            max_safe_dep_dist_bytes: u64::MAX,
            num_loads: 0,
            num_stores: 0,
            report: None,
        };
        if info.can_analyze_loop(ctx, l) {
            info.analyze_loop(ctx, config, l, strides);
        }
        info
    }

    /// Whether every memory access of the loop can execute vectorized
    /// (possibly behind the runtime check).
    #[inline]
    pub fn can_vectorize(&self) -> bool {
        self.can_vectorize
    }

    /// Whether vectorization requires the emitted runtime check.
    #[inline]
    pub fn needs_runtime_check(&self) -> bool {
        self.rt_check.need
    }

    /// The runtime-check descriptor.
    #[inline]
    pub fn runtime_check(&self) -> &RuntimePointerCheck {
        &self.rt_check
    }

    /// The maximum number of bytes accessible in parallel safely.
    #[inline]
    pub fn max_safe_dep_dist_bytes(&self) -> u64 {
        self.max_safe_dep_dist_bytes
    }

    #[inline]
    pub fn num_loads(&self) -> usize {
        self.num_loads
    }

    #[inline]
    pub fn num_stores(&self) -> usize {
        self.num_stores
    }

    /// Diagnostic for the earliest failing reason, if the loop was rejected.
    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    /// Whether the value's address is the same on every iteration.
    pub fn is_uniform(&self, ctx: &AnalysisContext<'_>, value: ValueId) -> bool {
        ctx.scev
            .is_loop_invariant(ctx.scev.expr_of(value), self.loop_id)
    }

    // =========================================================================
    // Loop-Shape Preconditions
    // =========================================================================

    fn can_analyze_loop(&mut self, ctx: &AnalysisContext<'_>, l: LoopId) -> bool {
        // We can only analyze innermost loops.
        if !ctx.loops.is_innermost(l) {
            self.emit_report("loop is not the innermost loop");
            return false;
        }

        // We must have a single backedge.
        if ctx.loops.backedge_count(l) != 1 {
            self.emit_report("loop control flow is not understood by analyzer");
            return false;
        }

        // We must have a single exiting block, and it must be the latch:
        // only bottom-tested loops run every instruction the same number of
        // times.
        let exiting = ctx.loops.unique_exiting_block(l);
        let latch = ctx.loops.latch(l);
        match (exiting, latch) {
            (Some(e), Some(lat)) if e == lat => {}
            _ => {
                self.emit_report("loop control flow is not understood by analyzer");
                return false;
            }
        }

        // The backedge-taken count must be computable.
        if ctx.scev.backedge_taken_count(l).is_none() {
            self.emit_report("could not determine number of loop iterations");
            return false;
        }

        true
    }

    // =========================================================================
    // Main Analysis
    // =========================================================================

    fn analyze_loop(
        &mut self,
        ctx: &AnalysisContext<'_>,
        config: &AnalysisConfig,
        l: LoopId,
        strides: &SymbolicStrides,
    ) {
        // Loads and stores with their blocks, in program order.
        let mut loads: Vec<(BlockId, MemoryInst)> = Vec::new();
        let mut stores: Vec<(BlockId, MemoryInst)> = Vec::new();

        let mut num_reads = 0usize;
        let mut num_read_writes = 0usize;

        self.rt_check.reset();

        let is_annotated_parallel = ctx.loops.is_annotated_parallel(l);
        let mut dep_checker = MemoryDepChecker::new(ctx.scev, ctx.layout, ctx.ir, config, l);

        for block in ctx.loops.blocks(l) {
            for inst in ctx.ir.block_instructions(block) {
                match inst {
                    // Known side-effect-free intrinsics only read state like
                    // the rounding mode; ignore them.
                    InstrKind::SafeIntrinsicCall | InstrKind::Other => {}

                    InstrKind::OtherMemRead => {
                        self.emit_report("read with atomic ordering or volatile read");
                        return;
                    }
                    InstrKind::OtherMemWrite => {
                        self.emit_report("instruction cannot be vectorized");
                        return;
                    }

                    InstrKind::Memory(mem @ MemoryInst::Load { simple, .. }) => {
                        if !simple && !is_annotated_parallel {
                            debug!("found a non-simple load");
                            self.emit_report("read with atomic ordering or volatile read");
                            return;
                        }
                        self.num_loads += 1;
                        loads.push((block, mem));
                        dep_checker.add_access(mem);
                    }

                    InstrKind::Memory(mem @ MemoryInst::Store { simple, .. }) => {
                        if !simple && !is_annotated_parallel {
                            debug!("found a non-simple store");
                            self.emit_report("write with atomic ordering or volatile write");
                            return;
                        }
                        self.num_stores += 1;
                        stores.push((block, mem));
                        dep_checker.add_access(mem);
                    }
                }
            }
        }

        // No stores: reads cannot conflict with anything.
        if stores.is_empty() {
            debug!("found a read-only loop");
            self.can_vectorize = true;
            return;
        }

        let mut accesses = AccessClassifier::new(ctx.scev, ctx.alias, ctx.layout, ctx.ir);
        let latch = ctx.loops.latch(l);

        // A pointer accessed both ways appears once, on the write list;
        // read-read conflicts do not exist, so that is enough.
        let mut seen: FxHashSet<ValueId> = FxHashSet::default();

        for &(block, store) in &stores {
            let ptr = store.ptr();

            // Writing to one address every iteration cannot be widened.
            if self.is_uniform(ctx, ptr) {
                debug!("found a store to a uniform address");
                self.emit_report("write to a loop invariant address could not be vectorized");
                return;
            }

            if seen.insert(ptr) {
                num_read_writes += 1;
                accesses.add_store(self.location_for(ctx, latch, block, ptr));
            }
        }

        if is_annotated_parallel {
            debug!("loop is annotated parallel, skipping memory dependency checks");
            self.can_vectorize = true;
            return;
        }

        for &(block, load) in &loads {
            let ptr = load.ptr();

            // A pointer never stored through is read-only. Non-consecutive
            // reads are also deferred with the read-only set so that
            // gathers like a[b[i]] get checked against the writes.
            let mut is_read_only = false;
            if seen.insert(ptr)
                || stride_of(ctx.scev, ctx.layout, ctx.ir, ptr, l, strides) == 0
            {
                num_reads += 1;
                is_read_only = true;
            }

            let loc = self.location_for(ctx, latch, block, ptr);
            accesses.add_load(loc, is_read_only);
        }

        // A single written pointer and no other reads cannot conflict.
        if num_read_writes == 1 && num_reads == 0 {
            debug!("found a write-only loop");
            self.can_vectorize = true;
            return;
        }

        accesses.build_dependence_sets();
        let mut need_rt_check = accesses.is_rt_check_needed();

        let mut num_comparisons = 0usize;
        let mut can_do_rt = false;
        if need_rt_check {
            (can_do_rt, num_comparisons) =
                accesses.can_check_at_runtime(&mut self.rt_check, l, strides, false);
        }
        debug!(num_comparisons, "pointer comparisons required");

        // A single dependence set needs no runtime check.
        if num_comparisons == 0 && need_rt_check {
            need_rt_check = false;
        }

        if !can_do_rt || num_comparisons > config.runtime_memory_check_threshold {
            self.rt_check.reset();
            can_do_rt = false;
        }

        if need_rt_check && !can_do_rt {
            debug!("cannot vectorize: array bounds not computable");
            self.emit_report("cannot identify array bounds");
            self.rt_check.reset();
            return;
        }

        self.rt_check.need = need_rt_check;
        self.can_vectorize = true;

        if accesses.is_dependency_check_needed() {
            debug!("checking memory dependencies");
            let verdict = {
                let (tags, dep_cands, check_deps) = accesses.dependence_state_mut();
                dep_checker.are_deps_safe(tags, dep_cands, check_deps, strides)
            };
            self.max_safe_dep_dist_bytes = dep_checker.max_safe_dep_dist_bytes();

            match verdict {
                DepVerdict::Safe => {}

                DepVerdict::UnsafeRetryWithRuntime => {
                    debug!("retrying with memory checks");

                    // The exact checks are replaced by the runtime check.
                    accesses.reset_dep_checks();
                    self.rt_check.reset();
                    self.rt_check.need = true;

                    let (can_do_rt, num_comparisons) =
                        accesses.can_check_at_runtime(&mut self.rt_check, l, strides, true);

                    if !can_do_rt || num_comparisons > config.runtime_memory_check_threshold {
                        if !can_do_rt && num_comparisons > 0 {
                            self.emit_report("cannot check memory dependencies at runtime");
                        } else {
                            self.emit_report(format!(
                                "{} exceeds limit of {} dependent memory operations checked at runtime",
                                num_comparisons, config.runtime_memory_check_threshold
                            ));
                        }
                        debug!("cannot vectorize with memory checks");
                        self.rt_check.reset();
                        self.can_vectorize = false;
                        return;
                    }

                    self.can_vectorize = true;
                }

                DepVerdict::UnsafeFatal => {
                    self.can_vectorize = false;
                }
            }
        }

        if !self.can_vectorize {
            self.emit_report("unsafe dependent memory operations in loop");
        }

        debug!(
            need_runtime_check = self.rt_check.need,
            can_vectorize = self.can_vectorize,
            "analysis complete"
        );
    }

    /// Memory location for an access, with TBAA metadata dropped when the
    /// block is only conditionally executed: predicated metadata cannot be
    /// trusted for whole-loop disambiguation.
    fn location_for(
        &self,
        ctx: &AnalysisContext<'_>,
        latch: Option<BlockId>,
        block: BlockId,
        ptr: ValueId,
    ) -> MemoryLocation {
        let mut tbaa = ctx.ir.tbaa_tag(ptr);
        if Self::block_needs_predication(ctx, latch, block) {
            tbaa = None;
        }
        MemoryLocation { ptr, tbaa }
    }

    /// Blocks that do not dominate the latch are conditionally executed.
    fn block_needs_predication(
        ctx: &AnalysisContext<'_>,
        latch: Option<BlockId>,
        block: BlockId,
    ) -> bool {
        match latch {
            Some(latch) => !ctx.domtree.dominates(block, latch),
            None => true,
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    fn emit_report(&mut self, message: impl Into<String>) {
        assert!(self.report.is_none(), "multiple reports generated");
        self.report = Some(message.into());
    }

    // =========================================================================
    // Runtime-Check Emission
    // =========================================================================

    /// Materialize the runtime overlap check through the host's builder.
    ///
    /// Emits the pair-wise `(start_i <= end_j) && (start_j <= end_i)`
    /// conflict predicate for every pair that needs checking, OR-reduces
    /// them, and ANDs the result with `true` so the check always anchors an
    /// instruction in the IR. Pointer arithmetic is done on byte-element
    /// pointer casts in each operand's address space.
    ///
    /// Returns `(first_new_instruction, conflict_flag)`, or `None` when no
    /// check is needed.
    pub fn emit_runtime_check(
        &self,
        ctx: &AnalysisContext<'_>,
        builder: &mut dyn CheckBuilder,
    ) -> Option<(ValueId, ValueId)> {
        if !self.rt_check.need {
            return None;
        }

        let n = self.rt_check.len();
        let mut starts: Vec<ValueId> = Vec::with_capacity(n);
        let mut ends: Vec<ValueId> = Vec::with_capacity(n);

        for bound in self.rt_check.bounds() {
            let expr = ctx.scev.expr_of(bound.ptr);
            if ctx.scev.is_loop_invariant(expr, self.loop_id) {
                // The range of an invariant pointer is the pointer itself.
                debug!(ptr = ?bound.ptr, "runtime check for a loop-invariant pointer");
                starts.push(bound.ptr);
                ends.push(bound.ptr);
            } else {
                let space = ctx.layout.address_space(bound.ptr);
                starts.push(builder.expand_bound(bound.start, space));
                ends.push(builder.expand_bound(bound.end, space));
            }
        }

        let mut conflict: Option<ValueId> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                if !self.rt_check.needs_checking(i, j) {
                    continue;
                }

                let space_i = ctx.layout.address_space(self.rt_check.bound(i).ptr);
                let space_j = ctx.layout.address_space(self.rt_check.bound(j).ptr);

                let start_i = builder.byte_ptr_cast(starts[i], space_i);
                let start_j = builder.byte_ptr_cast(starts[j], space_j);
                let end_i = builder.byte_ptr_cast(ends[i], space_j);
                let end_j = builder.byte_ptr_cast(ends[j], space_i);

                // The ranges overlap iff each one starts before the other ends.
                let cmp0 = builder.icmp_ule(start_i, end_j);
                let cmp1 = builder.icmp_ule(start_j, end_i);
                let pair_conflict = builder.and(cmp0, cmp1);

                conflict = Some(match conflict {
                    Some(prev) => builder.or(prev, pair_conflict),
                    None => pair_conflict,
                });
            }
        }
        let conflict = conflict?;

        // The OR chain might fold to a constant; AND with true forces an
        // instruction to anchor on.
        let true_const = builder.true_constant();
        let check = builder.and_anchor(conflict, true_const);

        let first = builder.first_instruction().unwrap_or(check);
        Some((first, check))
    }
}

impl fmt::Display for LoopAccessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.can_vectorize {
            if self.rt_check.is_empty() {
                writeln!(f, "memory dependences are safe")?;
            } else {
                writeln!(f, "memory dependences are safe with run-time checks")?;
            }
        }
        if let Some(report) = &self.report {
            writeln!(f, "report: {}", report)?;
        }
        write!(f, "{}", self.rt_check)
    }
}

// =============================================================================
// Per-Function Cache
// =============================================================================

struct CachedInfo {
    info: LoopAccessInfo,
    num_symbolic_strides: usize,
}

/// Per-function store of analysis results, keyed by loop identity.
///
/// The pass manager invalidates the cache whenever the IR changes.
#[derive(Default)]
pub struct LoopAccessAnalysis {
    cache: FxHashMap<LoopId, CachedInfo>,
}

impl LoopAccessAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// The analysis result for `l`, computing and caching it on first use.
    pub fn info(
        &mut self,
        ctx: &AnalysisContext<'_>,
        config: &AnalysisConfig,
        l: LoopId,
        strides: &SymbolicStrides,
    ) -> &LoopAccessInfo {
        let entry = self.cache.entry(l).or_insert_with(|| CachedInfo {
            info: LoopAccessInfo::analyze(ctx, config, l, strides),
            num_symbolic_strides: strides.len(),
        });
        debug_assert_eq!(
            entry.num_symbolic_strides,
            strides.len(),
            "symbolic strides changed for a cached loop"
        );
        &entry.info
    }

    /// Drop every cached result.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Number of cached loops.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
