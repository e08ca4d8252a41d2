//! Runtime Pointer Check Descriptor
//!
//! When exact dependence analysis cannot prove two pointer ranges disjoint,
//! the loop can still be vectorized behind a runtime overlap check. This
//! module holds the descriptor for that check: one entry per pointer with
//! its symbolic start and end bounds, plus the dependence-set and alias-set
//! ids that decide which pairs actually need comparing.
//!
//! The bounds stay symbolic; materializing them as IR is the job of the
//! host's expression expander via the emission helper.

use std::fmt;

use crate::host::{ExprId, ExprKind, ScevOracle, ValueId};

// =============================================================================
// Pointer Bounds
// =============================================================================

/// Symbolic access range of one pointer over the loop.
#[derive(Debug, Clone)]
pub struct PointerBound {
    /// The pointer value.
    pub ptr: ValueId,
    /// First accessed address: the recurrence base.
    pub start: ExprId,
    /// Last accessed address: the recurrence evaluated at the
    /// backedge-taken count.
    pub end: ExprId,
    /// Whether the pointer is written through.
    pub is_write: bool,
    /// Dependence-set id within the alias set (1-based).
    pub dependency_set_id: u32,
    /// Alias-set id (1-based).
    pub alias_set_id: u32,
}

// =============================================================================
// Runtime Pointer Check
// =============================================================================

/// The runtime-check descriptor for one loop.
#[derive(Debug, Default)]
pub struct RuntimePointerCheck {
    /// Whether the emitted check is required for vectorization.
    pub need: bool,
    bounds: Vec<PointerBound>,
}

impl RuntimePointerCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the bounds of a pointer whose stride-rewritten expression is
    /// the affine recurrence `addrec`.
    pub fn insert(
        &mut self,
        scev: &dyn ScevOracle,
        ptr: ValueId,
        addrec: ExprId,
        backedge_count: ExprId,
        is_write: bool,
        dependency_set_id: u32,
        alias_set_id: u32,
    ) {
        let ExprKind::AddRec { base, .. } = scev.kind(addrec) else {
            unreachable!("runtime check bounds require an add-recurrence");
        };
        let end = scev.evaluate_at(addrec, backedge_count);
        self.bounds.push(PointerBound {
            ptr,
            start: base,
            end,
            is_write,
            dependency_set_id,
            alias_set_id,
        });
    }

    /// Whether the pair `(i, j)` must be compared at runtime: at least one
    /// side writes, the dependence sets differ, and the alias sets match.
    pub fn needs_checking(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.bounds[i], &self.bounds[j]);

        // No need to check if two readonly pointers intersect.
        if !a.is_write && !b.is_write {
            return false;
        }
        if a.dependency_set_id == b.dependency_set_id {
            return false;
        }
        if a.alias_set_id != b.alias_set_id {
            return false;
        }
        true
    }

    /// All index pairs requiring a comparison, in canonical order.
    pub fn checking_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.bounds.len() {
            for j in (i + 1)..self.bounds.len() {
                if self.needs_checking(i, j) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    #[inline]
    pub fn bound(&self, i: usize) -> &PointerBound {
        &self.bounds[i]
    }

    #[inline]
    pub fn bounds(&self) -> &[PointerBound] {
        &self.bounds
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Drop all collected bounds and mark the check as not needed.
    pub fn reset(&mut self) {
        self.bounds.clear();
        self.need = false;
    }
}

impl fmt::Display for RuntimePointerCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounds.is_empty() {
            return Ok(());
        }
        writeln!(f, "run-time memory checks:")?;
        for (n, (i, j)) in self.checking_pairs().into_iter().enumerate() {
            writeln!(f, "  {}:", n)?;
            writeln!(f, "    {:?}", self.bounds[i].ptr)?;
            writeln!(f, "    {:?}", self.bounds[j].ptr)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
