//! Access Classification
//!
//! Partitions the memory accesses of a loop into alias sets and
//! dependence-candidate equivalence classes:
//!
//! - **Access tags**: a `(pointer, is_write)` pair. The same pointer read
//!   and written yields two distinct tags.
//! - **Alias sets**: the coarse partition produced by the alias oracle.
//!   No dependence can cross alias sets, so each set is handled
//!   independently.
//! - **Dependence candidates**: a union-find over tag indices; two tags are
//!   merged when they share an underlying object.
//!
//! The classifier walks each alias set twice: first the writes and
//! read-write pointers, then the deferred read-only pointers. Read-only
//! accesses only need a dependence check when their alias set contains a
//! write; this ordering also catches `a[i] = a[i] + x` without any
//! dependence check, because the single pointer collapses to a single
//! dependence set.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::host::{
    AliasOracle, DataLayout, ExprId, ExprKind, IrQuery, LoopId, MemoryLocation, ScevOracle,
    ValueId,
};
use crate::rtcheck::RuntimePointerCheck;
use crate::stride::{stride_of, stride_rewritten_expr, SymbolicStrides};

// =============================================================================
// Access Tags
// =============================================================================

/// A memory access location: the pointer and whether it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessTag {
    pub ptr: ValueId,
    pub is_write: bool,
}

impl AccessTag {
    /// A read through `ptr`.
    #[inline]
    pub const fn read(ptr: ValueId) -> Self {
        Self {
            ptr,
            is_write: false,
        }
    }

    /// A write through `ptr`.
    #[inline]
    pub const fn write(ptr: ValueId) -> Self {
        Self {
            ptr,
            is_write: true,
        }
    }
}

/// Index of an interned access tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(u32);

impl TagId {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Interning arena for access tags.
///
/// Tags are handed out in first-insertion order, which makes every
/// traversal over tag indices deterministic.
#[derive(Debug, Default)]
pub struct TagSet {
    tags: Vec<AccessTag>,
    index: FxHashMap<AccessTag, TagId>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a tag, returning its stable index.
    pub fn intern(&mut self, tag: AccessTag) -> TagId {
        if let Some(&id) = self.index.get(&tag) {
            return id;
        }
        let id = TagId(self.tags.len() as u32);
        self.tags.push(tag);
        self.index.insert(tag, id);
        id
    }

    /// Look up a tag without interning.
    #[inline]
    pub fn lookup(&self, tag: AccessTag) -> Option<TagId> {
        self.index.get(&tag).copied()
    }

    /// The tag behind an index.
    #[inline]
    pub fn get(&self, id: TagId) -> AccessTag {
        self.tags[id.as_usize()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All tags in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (TagId, AccessTag)> + '_ {
        self.tags
            .iter()
            .enumerate()
            .map(|(i, &t)| (TagId(i as u32), t))
    }
}

// =============================================================================
// Dependence Candidates (Union-Find)
// =============================================================================

/// Union-find over tag indices with path halving.
///
/// The leader of a class is its smallest tag index, which is deterministic
/// under any merge order.
#[derive(Debug, Default)]
pub struct DepCandidates {
    parent: Vec<u32>,
}

impl DepCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag as its own singleton class. Idempotent.
    pub fn insert(&mut self, id: TagId) {
        let idx = id.as_usize();
        while self.parent.len() <= idx {
            self.parent.push(self.parent.len() as u32);
        }
    }

    /// Leader of the class containing `id`.
    pub fn find(&mut self, id: TagId) -> TagId {
        let mut cur = id.as_usize();
        while self.parent[cur] as usize != cur {
            let grand = self.parent[self.parent[cur] as usize];
            self.parent[cur] = grand;
            cur = grand as usize;
        }
        TagId(cur as u32)
    }

    /// Merge the classes of `a` and `b`; the smaller root index wins.
    pub fn union(&mut self, a: TagId, b: TagId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[high.as_usize()] = low.0;
    }

    /// Whether two tags are in the same class.
    pub fn same_class(&mut self, a: TagId, b: TagId) -> bool {
        self.find(a) == self.find(b)
    }

    /// All members of the class led by `leader`, in tag-index order.
    pub fn members(&mut self, leader: TagId) -> SmallVec<[TagId; 8]> {
        let root = self.find(leader);
        let len = self.parent.len();
        let mut out = SmallVec::new();
        for i in 0..len {
            if self.find(TagId(i as u32)) == root {
                out.push(TagId(i as u32));
            }
        }
        out
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

// =============================================================================
// Check-Deps Set
// =============================================================================

/// Ordered set of tags whose equivalence class must be pair-checked.
#[derive(Debug, Default)]
pub struct CheckDeps {
    order: Vec<TagId>,
    set: FxHashSet<TagId>,
}

impl CheckDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TagId) {
        if self.set.insert(id) {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: TagId) {
        if self.set.remove(&id) {
            self.order.retain(|&t| t != id);
        }
    }

    /// The earliest-inserted tag still present.
    pub fn first(&self) -> Option<TagId> {
        self.order.first().copied()
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.set.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.set.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = TagId> + '_ {
        self.order.iter().copied()
    }
}

// =============================================================================
// Access Classifier
// =============================================================================

/// Analyses the memory accesses of one loop: builds the dependence-candidate
/// classes and decides whether runtime pointer checks are needed.
pub struct AccessClassifier<'a> {
    scev: &'a dyn ScevOracle,
    alias: &'a dyn AliasOracle,
    layout: &'a dyn DataLayout,
    ir: &'a dyn IrQuery,

    /// All distinct access tags, in registration order.
    tags: TagSet,
    /// One location per distinct pointer, in registration order.
    locations: Vec<MemoryLocation>,
    location_index: FxHashSet<ValueId>,
    /// Pointers registered as read-only.
    read_only: FxHashSet<ValueId>,

    dep_cands: DepCandidates,
    check_deps: CheckDeps,
    rt_check_needed: bool,

    /// Alias partition, computed once per analysis.
    alias_partition: Option<Vec<Vec<ValueId>>>,
}

impl<'a> AccessClassifier<'a> {
    pub fn new(
        scev: &'a dyn ScevOracle,
        alias: &'a dyn AliasOracle,
        layout: &'a dyn DataLayout,
        ir: &'a dyn IrQuery,
    ) -> Self {
        Self {
            scev,
            alias,
            layout,
            ir,
            tags: TagSet::new(),
            locations: Vec::new(),
            location_index: FxHashSet::default(),
            read_only: FxHashSet::default(),
            dep_cands: DepCandidates::new(),
            check_deps: CheckDeps::new(),
            rt_check_needed: false,
            alias_partition: None,
        }
    }

    /// Register a load and whether its pointer is only read from.
    pub fn add_load(&mut self, loc: MemoryLocation, is_read_only: bool) {
        self.add_location(loc);
        self.tags.intern(AccessTag::read(loc.ptr));
        if is_read_only {
            self.read_only.insert(loc.ptr);
        }
    }

    /// Register a store.
    pub fn add_store(&mut self, loc: MemoryLocation) {
        self.add_location(loc);
        self.tags.intern(AccessTag::write(loc.ptr));
    }

    fn add_location(&mut self, loc: MemoryLocation) {
        if self.location_index.insert(loc.ptr) {
            self.locations.push(loc);
        }
    }

    /// Whether a runtime pointer check is needed for this loop.
    #[inline]
    pub fn is_rt_check_needed(&self) -> bool {
        self.rt_check_needed
    }

    /// Whether any dependence-candidate class needs pair checking.
    #[inline]
    pub fn is_dependency_check_needed(&self) -> bool {
        !self.check_deps.is_empty()
    }

    /// Drop the pending dependence checks (used before the runtime-check
    /// retry, which assumes they are covered by the emitted check).
    pub fn reset_dep_checks(&mut self) {
        self.check_deps.clear();
    }

    /// The interned tags.
    #[inline]
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Split borrows for the dependence checker.
    pub fn dependence_state_mut(
        &mut self,
    ) -> (&TagSet, &mut DepCandidates, &mut CheckDeps) {
        (&self.tags, &mut self.dep_cands, &mut self.check_deps)
    }

    fn partition(&mut self) -> Vec<Vec<ValueId>> {
        if self.alias_partition.is_none() {
            self.alias_partition = Some(self.alias.alias_sets(&self.locations));
        }
        self.alias_partition.clone().unwrap_or_default()
    }

    // =========================================================================
    // Dependence-Set Construction
    // =========================================================================

    /// Walk every alias set and build the dependence-candidate classes,
    /// collecting the tags that need a pair-wise dependence check.
    pub fn build_dependence_sets(&mut self) {
        let partition = self.partition();
        debug!(
            accesses = self.tags.len(),
            alias_sets = partition.len(),
            "processing memory accesses"
        );

        for alias_set in &partition {
            let mut set_has_write = false;

            // Last access tag seen per underlying object.
            let mut obj_to_last_access: FxHashMap<ValueId, TagId> = FxHashMap::default();

            // Read-only accesses postponed until all writes were seen.
            let mut deferred: Vec<TagId> = Vec::new();

            // First iteration visits read-write pointers, the second visits
            // the deferred read-only pointers.
            for use_deferred in [false, true] {
                let candidates: Vec<TagId> = if use_deferred {
                    deferred.clone()
                } else {
                    self.tags.iter().map(|(id, _)| id).collect()
                };

                for &ptr in alias_set {
                    // A pointer both read and written contributes two tags;
                    // each needs classification.
                    for &tag_id in &candidates {
                        let tag = self.tags.get(tag_id);
                        if tag.ptr != ptr {
                            continue;
                        }

                        let is_read_only_ptr = !tag.is_write && self.read_only.contains(&ptr);
                        if use_deferred && !is_read_only_ptr {
                            continue;
                        }

                        self.dep_cands.insert(tag_id);

                        if !use_deferred && is_read_only_ptr {
                            deferred.push(tag_id);
                            continue;
                        }

                        // A write is checked against every other access in
                        // the set; a read-only access only against writes.
                        if (tag.is_write || is_read_only_ptr) && set_has_write {
                            self.check_deps.insert(tag_id);
                            self.rt_check_needed = true;
                        }

                        if tag.is_write {
                            set_has_write = true;
                        }

                        // Merge tags connected by a shared underlying object.
                        for obj in self.alias.underlying_objects(ptr) {
                            if let Some(&prev) = obj_to_last_access.get(&obj) {
                                self.dep_cands.union(tag_id, prev);
                            }
                            obj_to_last_access.insert(obj, tag_id);
                        }
                    }
                }
            }
        }
    }

    // =========================================================================
    // Runtime-Check Construction
    // =========================================================================

    /// Whether the pointer has bounds computable as an affine recurrence.
    fn computable_bounds(&self, ptr: ValueId, strides: &SymbolicStrides) -> Option<ExprId> {
        let expr = stride_rewritten_expr(self.scev, strides, ptr);
        match self.scev.kind(expr) {
            ExprKind::AddRec { .. } => Some(expr),
            _ => None,
        }
    }

    /// Collect per-pointer symbolic bounds into `rt_check` and count the
    /// comparisons the emitted check would perform.
    ///
    /// Returns `(can_do_rt, num_comparisons)`. In strict mode
    /// (`should_check_stride`) every pointer must additionally have element
    /// stride exactly +1, which rules out wrapping pointers after a failed
    /// dependence check.
    pub fn can_check_at_runtime(
        &mut self,
        rt_check: &mut RuntimePointerCheck,
        l: LoopId,
        strides: &SymbolicStrides,
        should_check_stride: bool,
    ) -> (bool, usize) {
        let Some(backedge_count) = self.scev.backedge_taken_count(l) else {
            return (false, 0);
        };

        let mut can_do_rt = true;
        let mut num_comparisons = 0usize;
        let is_dep_check_needed = self.is_dependency_check_needed();

        let partition = self.partition();

        // Alias sets get consecutive ids; pairs in different sets are never
        // compared.
        for (as_index, alias_set) in partition.iter().enumerate() {
            let alias_set_id = as_index as u32 + 1;

            let mut num_read_checks = 0usize;
            let mut num_write_checks = 0usize;

            // Dependence sets get consecutive ids within the alias set;
            // pairs inside one set are covered by exact dependence checking.
            let mut running_dep_id = 1u32;
            let mut dep_set_ids: FxHashMap<TagId, u32> = FxHashMap::default();

            for &ptr in alias_set {
                let is_write = self.tags.lookup(AccessTag::write(ptr)).is_some();
                if is_write {
                    num_write_checks += 1;
                } else {
                    num_read_checks += 1;
                }

                let bounds = self.computable_bounds(ptr, strides);
                let stride_ok = !should_check_stride
                    || stride_of(self.scev, self.layout, self.ir, ptr, l, strides) == 1;

                match bounds {
                    Some(addrec) if stride_ok => {
                        let dep_id = if is_dep_check_needed {
                            let tag = AccessTag { ptr, is_write };
                            let leader = match self.tags.lookup(tag) {
                                Some(id) => self.dep_cands.find(id),
                                None => {
                                    can_do_rt = false;
                                    continue;
                                }
                            };
                            *dep_set_ids.entry(leader).or_insert_with(|| {
                                let id = running_dep_id;
                                running_dep_id += 1;
                                id
                            })
                        } else {
                            // Each pointer is its own dependence set, so
                            // every pair is checked.
                            let id = running_dep_id;
                            running_dep_id += 1;
                            id
                        };

                        rt_check.insert(
                            self.scev,
                            ptr,
                            addrec,
                            backedge_count,
                            is_write,
                            dep_id,
                            alias_set_id,
                        );
                        debug!(?ptr, dep_id, alias_set_id, "found a runtime check pointer");
                    }
                    _ => {
                        can_do_rt = false;
                    }
                }
            }

            if is_dep_check_needed && can_do_rt && running_dep_id == 2 {
                // Only one dependence set: exact checking covers every pair.
            } else {
                num_comparisons +=
                    num_write_checks * (num_read_checks + num_write_checks).saturating_sub(1);
            }
        }

        // Bounds comparison needs the pointers to live in one address space.
        let n = rt_check.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (bi, bj) = (rt_check.bound(i), rt_check.bound(j));
                if bi.dependency_set_id == bj.dependency_set_id {
                    continue;
                }
                if bi.alias_set_id != bj.alias_set_id {
                    continue;
                }
                if self.layout.address_space(bi.ptr) != self.layout.address_space(bj.ptr) {
                    debug!(
                        "runtime check would compare pointers in different address spaces"
                    );
                    return (false, num_comparisons);
                }
            }
        }

        (can_do_rt, num_comparisons)
    }
}

// =============================================================================
// Tests
// =============================================================================
