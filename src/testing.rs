//! Mock Host for Tests
//!
//! A miniature typed IR plus structural implementations of every
//! collaborator trait, good enough to drive the analysis end-to-end:
//!
//! - values carry a pointee type, address space, in-bounds flag, optional
//!   TBAA tag, an underlying object, and a symbolic expression
//! - expressions are interned trees with just enough folding to produce
//!   constant differences for affine pointers
//! - the alias oracle partitions conservatively (one may-alias set) or by
//!   TBAA tag
//! - [`RecordingBuilder`] logs the instructions the emission helper creates

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::host::{
    AliasOracle, BlockId, CheckBuilder, DataLayout, DomTree, ExprId, ExprKind, InstrKind,
    IrQuery, LoopId, LoopInspector, MemoryLocation, ScevOracle, TbaaTag, TypeId, ValueId,
};

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Expr {
    Const(i64),
    Param(ValueId),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Mul(ExprId, ExprId),
    AddRec {
        base: ExprId,
        step: ExprId,
        loop_id: LoopId,
        no_wrap: bool,
    },
}

#[derive(Debug, Default)]
struct Interner {
    exprs: Vec<Expr>,
    dedup: FxHashMap<Expr, ExprId>,
}

impl Interner {
    fn intern(&mut self, e: Expr) -> ExprId {
        if let Some(&id) = self.dedup.get(&e) {
            return id;
        }
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(e);
        self.dedup.insert(e, id);
        id
    }

    fn get(&self, id: ExprId) -> Expr {
        self.exprs[id.0 as usize]
    }
}

// =============================================================================
// IR Pieces
// =============================================================================

#[derive(Debug, Clone)]
struct MockType {
    size: u64,
    aggregate: bool,
}

#[derive(Debug, Clone)]
struct MockValue {
    pointee: Option<TypeId>,
    address_space: u32,
    inbounds: bool,
    tbaa: Option<TbaaTag>,
    underlying: Option<ValueId>,
    expr: ExprId,
}

#[derive(Debug, Clone, Default)]
struct MockBlock {
    instrs: Vec<InstrKind>,
}

#[derive(Debug, Clone)]
struct MockLoop {
    blocks: Vec<BlockId>,
    innermost: bool,
    backedges: usize,
    latch: Option<BlockId>,
    exiting: Option<BlockId>,
    parallel: bool,
    backedge_taken: Option<ExprId>,
}

/// Alias-partition strategy of the mock oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMode {
    /// Everything may alias: one set in location order.
    SingleSet,
    /// Locations with different TBAA tags provably do not alias; untagged
    /// locations share one may-alias set.
    ByTbaa,
}

// =============================================================================
// Mock Host
// =============================================================================

pub struct MockHost {
    types: Vec<MockType>,
    values: Vec<MockValue>,
    blocks: Vec<MockBlock>,
    loops: Vec<MockLoop>,
    interner: RefCell<Interner>,
    alias_mode: AliasMode,
    predicated_blocks: FxHashSet<BlockId>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            loops: Vec::new(),
            interner: RefCell::new(Interner::default()),
            alias_mode: AliasMode::SingleSet,
            predicated_blocks: FxHashSet::default(),
        }
    }

    pub fn set_alias_mode(&mut self, mode: AliasMode) {
        self.alias_mode = mode;
    }

    // -------------------------------------------------------------------------
    // Types and Loops
    // -------------------------------------------------------------------------

    pub fn scalar_type(&mut self, size: u64) -> TypeId {
        self.types.push(MockType {
            size,
            aggregate: false,
        });
        TypeId(self.types.len() as u32 - 1)
    }

    pub fn aggregate_type(&mut self, size: u64) -> TypeId {
        self.types.push(MockType {
            size,
            aggregate: true,
        });
        TypeId(self.types.len() as u32 - 1)
    }

    /// A well-formed innermost loop whose backedge executes
    /// `backedge_taken` times.
    pub fn add_loop(&mut self, backedge_taken: i64) -> LoopId {
        let btc = self.mk_const(backedge_taken);
        self.loops.push(MockLoop {
            blocks: Vec::new(),
            innermost: true,
            backedges: 1,
            latch: None,
            exiting: None,
            parallel: false,
            backedge_taken: Some(btc),
        });
        LoopId(self.loops.len() as u32 - 1)
    }

    /// Append a block with the given instructions; the newest block becomes
    /// latch and unique exiting block.
    pub fn add_block(&mut self, l: LoopId, instrs: Vec<InstrKind>) -> BlockId {
        self.blocks.push(MockBlock { instrs });
        let b = BlockId(self.blocks.len() as u32 - 1);
        let lp = &mut self.loops[l.0 as usize];
        lp.blocks.push(b);
        lp.latch = Some(b);
        lp.exiting = Some(b);
        b
    }

    pub fn set_parallel(&mut self, l: LoopId) {
        self.loops[l.0 as usize].parallel = true;
    }

    pub fn set_not_innermost(&mut self, l: LoopId) {
        self.loops[l.0 as usize].innermost = false;
    }

    pub fn set_backedges(&mut self, l: LoopId, n: usize) {
        self.loops[l.0 as usize].backedges = n;
    }

    /// Model a loop with several exiting blocks.
    pub fn clear_unique_exit(&mut self, l: LoopId) {
        self.loops[l.0 as usize].exiting = None;
    }

    pub fn clear_backedge_count(&mut self, l: LoopId) {
        self.loops[l.0 as usize].backedge_taken = None;
    }

    /// Mark a block as not dominating the latch (conditionally executed).
    pub fn mark_predicated(&mut self, b: BlockId) {
        self.predicated_blocks.insert(b);
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    fn add_value(&mut self, v: MockValue) -> ValueId {
        self.values.push(v);
        ValueId(self.values.len() as u32 - 1)
    }

    /// An opaque array base (a pointer parameter).
    pub fn array_object(&mut self) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        let expr = self.mk_param(id);
        self.add_value(MockValue {
            pointee: None,
            address_space: 0,
            inbounds: false,
            tbaa: None,
            underlying: None,
            expr,
        })
    }

    /// `&obj[offset + i]`: an in-bounds consecutive pointer with a no-wrap
    /// recurrence.
    pub fn elem_ptr(&mut self, obj: ValueId, ty: TypeId, offset: i64, l: LoopId) -> ValueId {
        let size = self.types[ty.0 as usize].size as i64;
        self.strided_ptr_on(obj, ty, offset, size, l, true)
    }

    /// Like [`MockHost::elem_ptr`] but in a non-default address space.
    pub fn elem_ptr_in_space(
        &mut self,
        obj: ValueId,
        ty: TypeId,
        offset: i64,
        l: LoopId,
        address_space: u32,
    ) -> ValueId {
        let size = self.types[ty.0 as usize].size as i64;
        let ptr = self.strided_ptr_on(obj, ty, offset, size, l, true);
        self.values[ptr.0 as usize].address_space = address_space;
        ptr
    }

    /// A consecutive pointer over a fresh object.
    pub fn consecutive_ptr(&mut self, ty: TypeId, offset: i64, l: LoopId) -> ValueId {
        let obj = self.array_object();
        self.elem_ptr(obj, ty, offset, l)
    }

    /// A pointer recurrence with an arbitrary byte step over a fresh object.
    pub fn strided_ptr(
        &mut self,
        ty: TypeId,
        offset: i64,
        step_bytes: i64,
        l: LoopId,
        no_wrap: bool,
    ) -> ValueId {
        let obj = self.array_object();
        self.strided_ptr_on(obj, ty, offset, step_bytes, l, no_wrap)
    }

    /// A pointer recurrence with an arbitrary byte step over `obj`.
    /// `offset` is in elements of `ty`.
    pub fn strided_ptr_on(
        &mut self,
        obj: ValueId,
        ty: TypeId,
        offset: i64,
        step_bytes: i64,
        l: LoopId,
        no_wrap: bool,
    ) -> ValueId {
        let size = self.types[ty.0 as usize].size as i64;
        let base_obj = self.values[obj.0 as usize].expr;
        let off = self.mk_const(offset * size);
        let base = self.mk_add(base_obj, off);
        let step = self.mk_const(step_bytes);
        let expr = self.mk_addrec(base, step, l, no_wrap);
        self.add_value(MockValue {
            pointee: Some(ty),
            address_space: 0,
            inbounds: true,
            tbaa: None,
            underlying: Some(obj),
            expr,
        })
    }

    /// A recurrence with no wrap proof of any kind.
    pub fn wrapping_ptr(
        &mut self,
        ty: TypeId,
        step_bytes: i64,
        l: LoopId,
        address_space: u32,
    ) -> ValueId {
        let obj = self.array_object();
        let ptr = self.strided_ptr_on(obj, ty, 0, step_bytes, l, false);
        let v = &mut self.values[ptr.0 as usize];
        v.inbounds = false;
        v.address_space = address_space;
        ptr
    }

    /// A loop-invariant pointer (same address every iteration).
    pub fn invariant_ptr(&mut self, ty: TypeId) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        let expr = self.mk_param(id);
        self.add_value(MockValue {
            pointee: Some(ty),
            address_space: 0,
            inbounds: false,
            tbaa: None,
            underlying: None,
            expr,
        })
    }

    /// A pointer whose address is opaque to scalar evolution but is based
    /// on `obj` (an `a[b[i]]` gather).
    pub fn opaque_ptr_on(&mut self, obj: ValueId, ty: TypeId) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        let expr = self.mk_param(id);
        self.add_value(MockValue {
            pointee: Some(ty),
            address_space: 0,
            inbounds: false,
            tbaa: None,
            underlying: Some(obj),
            expr,
        })
    }

    /// A consecutive pointer whose base is `obj` plus a symbolic offset, so
    /// distances against other pointers on `obj` never fold to a constant.
    pub fn elem_ptr_symbolic_offset(&mut self, obj: ValueId, ty: TypeId, l: LoopId) -> ValueId {
        let size = self.types[ty.0 as usize].size as i64;
        self.symbolic_offset_ptr_with_step(obj, ty, l, size)
    }

    /// Like [`MockHost::elem_ptr_symbolic_offset`] with an explicit byte step.
    pub fn symbolic_offset_ptr_with_step(
        &mut self,
        obj: ValueId,
        ty: TypeId,
        l: LoopId,
        step_bytes: i64,
    ) -> ValueId {
        let offset_val = self.array_object();
        let base_obj = self.values[obj.0 as usize].expr;
        let offset = self.values[offset_val.0 as usize].expr;
        let base = self.mk_add(base_obj, offset);
        let step = self.mk_const(step_bytes);
        let expr = self.mk_addrec(base, step, l, true);
        self.add_value(MockValue {
            pointee: Some(ty),
            address_space: 0,
            inbounds: true,
            tbaa: None,
            underlying: Some(obj),
            expr,
        })
    }

    /// A pointer whose step is `stride_var * sizeof(ty)` for a symbolic
    /// stride variable. Returns `(ptr, stride_var)`.
    pub fn symbolic_stride_ptr(&mut self, ty: TypeId, l: LoopId) -> (ValueId, ValueId) {
        let size = self.types[ty.0 as usize].size as i64;
        let obj = self.array_object();
        let stride_var = self.array_object();
        let base = self.values[obj.0 as usize].expr;
        let stride_expr = self.values[stride_var.0 as usize].expr;
        let elem = self.mk_const(size);
        let step = self.mk_mul(stride_expr, elem);
        let expr = self.mk_addrec(base, step, l, true);
        let ptr = self.add_value(MockValue {
            pointee: Some(ty),
            address_space: 0,
            inbounds: true,
            tbaa: None,
            underlying: Some(obj),
            expr,
        });
        (ptr, stride_var)
    }

    pub fn set_tbaa(&mut self, ptr: ValueId, tag: TbaaTag) {
        self.values[ptr.0 as usize].tbaa = Some(tag);
    }

    // -------------------------------------------------------------------------
    // Expression Construction
    // -------------------------------------------------------------------------

    fn mk_const(&self, v: i64) -> ExprId {
        self.interner.borrow_mut().intern(Expr::Const(v))
    }

    fn mk_param(&self, v: ValueId) -> ExprId {
        self.interner.borrow_mut().intern(Expr::Param(v))
    }

    fn mk_add(&self, a: ExprId, b: ExprId) -> ExprId {
        let (ea, eb) = {
            let i = self.interner.borrow();
            (i.get(a), i.get(b))
        };
        match (ea, eb) {
            (Expr::Const(x), Expr::Const(y)) => self.mk_const(x + y),
            (Expr::Const(0), _) => b,
            (_, Expr::Const(0)) => a,
            _ => self.interner.borrow_mut().intern(Expr::Add(a, b)),
        }
    }

    fn mk_mul(&self, a: ExprId, b: ExprId) -> ExprId {
        let (ea, eb) = {
            let i = self.interner.borrow();
            (i.get(a), i.get(b))
        };
        match (ea, eb) {
            (Expr::Const(x), Expr::Const(y)) => self.mk_const(x * y),
            (Expr::Const(1), _) => b,
            (_, Expr::Const(1)) => a,
            (Expr::Const(0), _) | (_, Expr::Const(0)) => self.mk_const(0),
            _ => self.interner.borrow_mut().intern(Expr::Mul(a, b)),
        }
    }

    fn mk_addrec(&self, base: ExprId, step: ExprId, loop_id: LoopId, no_wrap: bool) -> ExprId {
        self.interner.borrow_mut().intern(Expr::AddRec {
            base,
            step,
            loop_id,
            no_wrap,
        })
    }

    /// Split an expression into a symbolic part and a constant addend.
    fn split_const(&self, e: ExprId) -> (Option<ExprId>, i64) {
        let expr = self.interner.borrow().get(e);
        match expr {
            Expr::Const(c) => (None, c),
            Expr::Add(x, y) => {
                let ey = self.interner.borrow().get(y);
                if let Expr::Const(c) = ey {
                    let (sym, c2) = self.split_const(x);
                    return (sym, c + c2);
                }
                let ex = self.interner.borrow().get(x);
                if let Expr::Const(c) = ex {
                    let (sym, c2) = self.split_const(y);
                    return (sym, c + c2);
                }
                (Some(e), 0)
            }
            _ => (Some(e), 0),
        }
    }

    fn subst(&self, e: ExprId, param: ValueId, constant: i64) -> ExprId {
        let expr = self.interner.borrow().get(e);
        match expr {
            Expr::Const(_) => e,
            Expr::Param(v) if v == param => self.mk_const(constant),
            Expr::Param(_) => e,
            Expr::Add(x, y) => {
                let (sx, sy) = (self.subst(x, param, constant), self.subst(y, param, constant));
                self.mk_add(sx, sy)
            }
            Expr::Sub(x, y) => {
                let (sx, sy) = (self.subst(x, param, constant), self.subst(y, param, constant));
                self.minus(sx, sy)
            }
            Expr::Mul(x, y) => {
                let (sx, sy) = (self.subst(x, param, constant), self.subst(y, param, constant));
                self.mk_mul(sx, sy)
            }
            Expr::AddRec {
                base,
                step,
                loop_id,
                no_wrap,
            } => {
                let (sb, ss) = (
                    self.subst(base, param, constant),
                    self.subst(step, param, constant),
                );
                self.mk_addrec(sb, ss, loop_id, no_wrap)
            }
        }
    }

    fn invariant_in(&self, e: ExprId, l: LoopId) -> bool {
        let expr = self.interner.borrow().get(e);
        match expr {
            Expr::Const(_) | Expr::Param(_) => true,
            Expr::Add(x, y) | Expr::Sub(x, y) | Expr::Mul(x, y) => {
                self.invariant_in(x, l) && self.invariant_in(y, l)
            }
            Expr::AddRec { base, step, loop_id, .. } => {
                loop_id != l && self.invariant_in(base, l) && self.invariant_in(step, l)
            }
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl ScevOracle for MockHost {
    fn expr_of(&self, value: ValueId) -> ExprId {
        self.values[value.0 as usize].expr
    }

    fn kind(&self, expr: ExprId) -> ExprKind {
        match self.interner.borrow().get(expr) {
            Expr::Const(v) => ExprKind::Constant(v),
            Expr::AddRec {
                base,
                step,
                loop_id,
                no_wrap,
            } => ExprKind::AddRec {
                base,
                step,
                loop_id,
                no_wrap,
            },
            _ => ExprKind::Opaque,
        }
    }

    fn backedge_taken_count(&self, l: LoopId) -> Option<ExprId> {
        self.loops[l.0 as usize].backedge_taken
    }

    fn substitute_param(&self, expr: ExprId, param: ValueId, constant: i64) -> ExprId {
        self.subst(expr, param, constant)
    }

    fn is_loop_invariant(&self, expr: ExprId, l: LoopId) -> bool {
        self.invariant_in(expr, l)
    }

    fn minus(&self, lhs: ExprId, rhs: ExprId) -> ExprId {
        if lhs == rhs {
            return self.mk_const(0);
        }
        let (el, er) = {
            let i = self.interner.borrow();
            (i.get(lhs), i.get(rhs))
        };
        match (el, er) {
            (Expr::Const(x), Expr::Const(y)) => self.mk_const(x - y),
            (
                Expr::AddRec {
                    base: bl,
                    step: sl,
                    loop_id: ll,
                    ..
                },
                Expr::AddRec {
                    base: br,
                    step: sr,
                    loop_id: lr,
                    ..
                },
            ) if ll == lr => {
                let step = self.minus(sl, sr);
                let base = self.minus(bl, br);
                if self.interner.borrow().get(step) == Expr::Const(0) {
                    base
                } else {
                    self.mk_addrec(base, step, ll, false)
                }
            }
            _ => {
                let (sym_l, cl) = self.split_const(lhs);
                let (sym_r, cr) = self.split_const(rhs);
                if sym_l == sym_r {
                    self.mk_const(cl - cr)
                } else {
                    self.interner.borrow_mut().intern(Expr::Sub(lhs, rhs))
                }
            }
        }
    }

    fn evaluate_at(&self, addrec: ExprId, count: ExprId) -> ExprId {
        let e = self.interner.borrow().get(addrec);
        match e {
            Expr::AddRec { base, step, .. } => {
                let advance = self.mk_mul(step, count);
                self.mk_add(base, advance)
            }
            _ => addrec,
        }
    }
}

impl AliasOracle for MockHost {
    fn alias_sets(&self, locations: &[MemoryLocation]) -> Vec<Vec<ValueId>> {
        match self.alias_mode {
            AliasMode::SingleSet => {
                if locations.is_empty() {
                    Vec::new()
                } else {
                    vec![locations.iter().map(|loc| loc.ptr).collect()]
                }
            }
            AliasMode::ByTbaa => {
                // An untagged location may alias everything, which collapses
                // the partition to a single set. Otherwise distinct tags
                // provably do not alias.
                if locations.is_empty() {
                    return Vec::new();
                }
                if locations.iter().any(|loc| loc.tbaa.is_none()) {
                    return vec![locations.iter().map(|loc| loc.ptr).collect()];
                }
                let mut order: Vec<TbaaTag> = Vec::new();
                let mut groups: FxHashMap<TbaaTag, Vec<ValueId>> = FxHashMap::default();
                for loc in locations {
                    let tag = loc.tbaa.expect("checked above");
                    if !groups.contains_key(&tag) {
                        order.push(tag);
                    }
                    groups.entry(tag).or_default().push(loc.ptr);
                }
                order.into_iter().map(|k| groups.remove(&k).unwrap()).collect()
            }
        }
    }

    fn underlying_objects(&self, ptr: ValueId) -> Vec<ValueId> {
        vec![self.values[ptr.0 as usize].underlying.unwrap_or(ptr)]
    }
}

impl DataLayout for MockHost {
    fn alloc_size(&self, ty: TypeId) -> u64 {
        self.types[ty.0 as usize].size
    }

    fn is_aggregate(&self, ty: TypeId) -> bool {
        self.types[ty.0 as usize].aggregate
    }

    fn pointee_type(&self, ptr: ValueId) -> TypeId {
        self.values[ptr.0 as usize]
            .pointee
            .expect("value is not an access pointer")
    }

    fn address_space(&self, ptr: ValueId) -> u32 {
        self.values[ptr.0 as usize].address_space
    }
}

impl IrQuery for MockHost {
    fn block_instructions(&self, block: BlockId) -> Vec<InstrKind> {
        self.blocks[block.0 as usize].instrs.clone()
    }

    fn is_inbounds_element_address(&self, ptr: ValueId) -> bool {
        self.values[ptr.0 as usize].inbounds
    }

    fn tbaa_tag(&self, ptr: ValueId) -> Option<TbaaTag> {
        self.values[ptr.0 as usize].tbaa
    }
}

impl LoopInspector for MockHost {
    fn blocks(&self, l: LoopId) -> Vec<BlockId> {
        self.loops[l.0 as usize].blocks.clone()
    }

    fn is_innermost(&self, l: LoopId) -> bool {
        self.loops[l.0 as usize].innermost
    }

    fn backedge_count(&self, l: LoopId) -> usize {
        self.loops[l.0 as usize].backedges
    }

    fn latch(&self, l: LoopId) -> Option<BlockId> {
        self.loops[l.0 as usize].latch
    }

    fn unique_exiting_block(&self, l: LoopId) -> Option<BlockId> {
        self.loops[l.0 as usize].exiting
    }

    fn is_annotated_parallel(&self, l: LoopId) -> bool {
        self.loops[l.0 as usize].parallel
    }
}

impl DomTree for MockHost {
    fn dominates(&self, a: BlockId, _b: BlockId) -> bool {
        !self.predicated_blocks.contains(&a)
    }
}

// =============================================================================
// Recording Builder
// =============================================================================

/// A check builder that records every operation it is asked to create.
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    next: u32,
    pub ops: Vec<String>,
    first: Option<ValueId>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_instr(&mut self, op: String) -> ValueId {
        let v = ValueId(0x4000_0000 + self.next);
        self.next += 1;
        self.ops.push(op);
        if self.first.is_none() {
            self.first = Some(v);
        }
        v
    }

    /// Number of operations of a kind, by prefix.
    pub fn count_of(&self, prefix: &str) -> usize {
        self.ops.iter().filter(|op| op.starts_with(prefix)).count()
    }
}

impl CheckBuilder for RecordingBuilder {
    fn expand_bound(&mut self, expr: ExprId, address_space: u32) -> ValueId {
        self.fresh_instr(format!("expand {:?} as{}", expr, address_space))
    }

    fn byte_ptr_cast(&mut self, value: ValueId, address_space: u32) -> ValueId {
        self.fresh_instr(format!("bitcast {:?} as{}", value, address_space))
    }

    fn icmp_ule(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.fresh_instr(format!("icmp.ule {:?} {:?}", lhs, rhs))
    }

    fn and(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.fresh_instr(format!("and {:?} {:?}", lhs, rhs))
    }

    fn or(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.fresh_instr(format!("or {:?} {:?}", lhs, rhs))
    }

    fn true_constant(&mut self) -> ValueId {
        // Constants are not instructions; do not disturb `first`.
        let v = ValueId(0x4000_0000 + self.next);
        self.next += 1;
        self.ops.push("const.true".to_string());
        v
    }

    fn and_anchor(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.fresh_instr(format!("and.anchor {:?} {:?}", lhs, rhs))
    }

    fn first_instruction(&self) -> Option<ValueId> {
        self.first
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minus_folds_constant_offsets() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let a = host.array_object();
        let p0 = host.elem_ptr(a, i32t, 0, l);
        let p2 = host.elem_ptr(a, i32t, 2, l);

        let d = host.minus(host.expr_of(p2), host.expr_of(p0));
        assert_eq!(host.constant_value(d), Some(8));

        let d = host.minus(host.expr_of(p0), host.expr_of(p2));
        assert_eq!(host.constant_value(d), Some(-8));
    }

    #[test]
    fn test_minus_of_distinct_objects_is_opaque() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let a = host.array_object();
        let b = host.array_object();
        let pa = host.elem_ptr(a, i32t, 0, l);
        let pb = host.elem_ptr(b, i32t, 0, l);

        let d = host.minus(host.expr_of(pb), host.expr_of(pa));
        assert_eq!(host.constant_value(d), None);
    }

    #[test]
    fn test_evaluate_at_advances_base() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let a = host.array_object();
        let p = host.elem_ptr(a, i32t, 0, l);

        let expr = host.expr_of(p);
        let ExprKind::AddRec { base, .. } = host.kind(expr) else {
            panic!("expected add-recurrence");
        };
        let count = host.mk_const(9);
        let end = host.evaluate_at(expr, count);
        let d = host.minus(end, base);
        assert_eq!(host.constant_value(d), Some(36));
    }

    #[test]
    fn test_substitution_folds_symbolic_stride() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let (ptr, stride_var) = host.symbolic_stride_ptr(i32t, l);

        let expr = host.expr_of(ptr);
        let rewritten = host.substitute_param(expr, stride_var, 1);
        let ExprKind::AddRec { step, .. } = host.kind(rewritten) else {
            panic!("expected add-recurrence");
        };
        assert_eq!(host.constant_value(step), Some(4));
    }

    #[test]
    fn test_loop_invariance() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let p = host.invariant_ptr(i32t);
        let a = host.array_object();
        let q = host.elem_ptr(a, i32t, 0, l);

        assert!(host.is_loop_invariant(host.expr_of(p), l));
        assert!(!host.is_loop_invariant(host.expr_of(q), l));
    }

    #[test]
    fn test_alias_by_tbaa_partitions() {
        let mut host = MockHost::new();
        let l = host.add_loop(10);
        let i32t = host.scalar_type(4);
        let a = host.array_object();
        let b = host.array_object();
        let pa = host.elem_ptr(a, i32t, 0, l);
        let pb = host.elem_ptr(b, i32t, 0, l);
        host.set_alias_mode(AliasMode::ByTbaa);

        let sets = host.alias_sets(&[
            MemoryLocation {
                ptr: pa,
                tbaa: Some(TbaaTag(1)),
            },
            MemoryLocation {
                ptr: pb,
                tbaa: Some(TbaaTag(2)),
            },
        ]);
        assert_eq!(sets.len(), 2);

        let sets = host.alias_sets(&[
            MemoryLocation { ptr: pa, tbaa: None },
            MemoryLocation { ptr: pb, tbaa: None },
        ]);
        assert_eq!(sets.len(), 1);
    }

    #[test]
    fn test_recording_builder_tracks_first() {
        let mut b = RecordingBuilder::new();
        assert_eq!(b.first_instruction(), None);
        let t = b.true_constant();
        assert_eq!(b.first_instruction(), None);
        let v = b.icmp_ule(t, t);
        assert_eq!(b.first_instruction(), Some(v));
    }
}
