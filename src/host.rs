//! Host Compiler Interfaces
//!
//! The analysis does not own an IR. Everything it needs from the host
//! compiler comes through the narrow collaborator traits in this module:
//!
//! - [`IrQuery`]: instruction enumeration and per-value queries
//! - [`LoopInspector`]: loop shape (blocks, latch, exits, annotations)
//! - [`ScevOracle`]: symbolic closed-form expressions for SSA values
//! - [`AliasOracle`]: coarse alias partitioning and underlying objects
//! - [`DataLayout`]: type sizes and address spaces
//! - [`DomTree`]: block dominance
//! - [`CheckBuilder`]: IR materialization for the emitted runtime check
//!
//! Handles (`ValueId`, `BlockId`, ...) are opaque `u32` newtypes minted by
//! the host; the analysis only compares them for identity.
//!
//! # Symbolic expression opacity
//!
//! Symbolic expressions are referred to by [`ExprId`] and observed only
//! through [`ExprKind`]: a compile-time constant, an affine add-recurrence
//! over a loop, or anything else (opaque). An `AddRec` handle is affine by
//! contract: its step must not itself recur over the same loop. Oracle
//! methods that produce new expressions (`minus`, `evaluate_at`,
//! `substitute_param`) take `&self`; implementations are expected to intern
//! internally.

// =============================================================================
// Handles
// =============================================================================

/// An SSA value in the host IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// A basic block in the host IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A natural loop in the host IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

/// A symbolic expression handle minted by the scalar-evolution oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// A type in the host IR. Identity comparison is type equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Type-based-aliasing metadata tag attached to a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TbaaTag(pub u32);

// =============================================================================
// Memory Instructions
// =============================================================================

/// A load or store delivered to the analysis.
///
/// `simple` is false for atomic or volatile accesses; those are only
/// admitted when the loop is annotated parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryInst {
    Load { ptr: ValueId, simple: bool },
    Store { ptr: ValueId, simple: bool },
}

impl MemoryInst {
    /// The pointer operand of the access.
    #[inline]
    pub const fn ptr(self) -> ValueId {
        match self {
            MemoryInst::Load { ptr, .. } | MemoryInst::Store { ptr, .. } => ptr,
        }
    }

    /// Whether the access writes memory.
    #[inline]
    pub const fn is_write(self) -> bool {
        matches!(self, MemoryInst::Store { .. })
    }

    /// Whether the access is simple (not atomic, not volatile).
    #[inline]
    pub const fn is_simple(self) -> bool {
        match self {
            MemoryInst::Load { simple, .. } | MemoryInst::Store { simple, .. } => simple,
        }
    }
}

/// Memory behavior of an instruction, as classified by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrKind {
    /// A load or store.
    Memory(MemoryInst),
    /// A call that may read memory but is a recognized side-effect-free
    /// intrinsic (e.g. reads only the rounding mode). Skipped.
    SafeIntrinsicCall,
    /// Reads memory and is not a load (unknown call, atomic rmw, ...).
    OtherMemRead,
    /// Writes memory and is not a store.
    OtherMemWrite,
    /// Touches no memory.
    Other,
}

/// A memory location handed to the alias oracle: the pointer plus whatever
/// aliasing metadata survived predication filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
    pub ptr: ValueId,
    pub tbaa: Option<TbaaTag>,
}

// =============================================================================
// Symbolic Expressions
// =============================================================================

/// Observable shape of a symbolic expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    /// A compile-time integer constant.
    Constant(i64),
    /// An affine add-recurrence `{base, +, step}` over `loop_id`.
    /// `no_wrap` carries the oracle's no-self-wrap/no-unsigned-wrap proof.
    AddRec {
        base: ExprId,
        step: ExprId,
        loop_id: LoopId,
        no_wrap: bool,
    },
    /// Anything else; the analysis treats it as opaque.
    Opaque,
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Instruction-level queries against the host IR.
pub trait IrQuery {
    /// The instructions of a block in program order.
    fn block_instructions(&self, block: BlockId) -> Vec<InstrKind>;

    /// Whether the pointer is defined by an in-bounds element-address
    /// computation (an inbounds GEP in LLVM terms).
    fn is_inbounds_element_address(&self, ptr: ValueId) -> bool;

    /// Type-based-aliasing metadata attached to accesses through `ptr`,
    /// if any.
    fn tbaa_tag(&self, ptr: ValueId) -> Option<TbaaTag>;
}

/// Loop-shape queries.
pub trait LoopInspector {
    /// Blocks of the loop. Any order; the driver imposes program order
    /// within each block via [`IrQuery::block_instructions`].
    fn blocks(&self, l: LoopId) -> Vec<BlockId>;

    /// Whether the loop has no children.
    fn is_innermost(&self, l: LoopId) -> bool;

    /// Number of backedges into the header.
    fn backedge_count(&self, l: LoopId) -> usize;

    /// The loop latch, if unique.
    fn latch(&self, l: LoopId) -> Option<BlockId>;

    /// The unique exiting block, if there is exactly one.
    fn unique_exiting_block(&self, l: LoopId) -> Option<BlockId>;

    /// Frontend promise that iterations carry no cross-iteration memory
    /// dependences.
    fn is_annotated_parallel(&self, l: LoopId) -> bool;
}

/// Scalar-evolution oracle.
///
/// Implementations may intern new expressions on `minus`, `evaluate_at`,
/// and `substitute_param`; these take `&self` and are expected to use
/// interior mutability for the expression table.
pub trait ScevOracle {
    /// Symbolic expression for an SSA value.
    fn expr_of(&self, value: ValueId) -> ExprId;

    /// Observable shape of an expression.
    fn kind(&self, expr: ExprId) -> ExprKind;

    /// Number of times the loop backedge executes, if computable.
    fn backedge_taken_count(&self, l: LoopId) -> Option<ExprId>;

    /// Rewrite `expr`, substituting every occurrence of the parameter
    /// `param` by the integer `constant`.
    fn substitute_param(&self, expr: ExprId, param: ValueId, constant: i64) -> ExprId;

    /// Whether the expression is invariant in the loop.
    fn is_loop_invariant(&self, expr: ExprId, l: LoopId) -> bool;

    /// `lhs - rhs`.
    fn minus(&self, lhs: ExprId, rhs: ExprId) -> ExprId;

    /// Value of an add-recurrence after `count` iterations.
    fn evaluate_at(&self, addrec: ExprId, count: ExprId) -> ExprId;

    /// Convenience: the constant value of an expression, if it is one.
    fn constant_value(&self, expr: ExprId) -> Option<i64> {
        match self.kind(expr) {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }
}

/// Coarse alias partitioning.
pub trait AliasOracle {
    /// Partition the locations into alias sets: locations in different sets
    /// provably do not overlap. Each inner vector lists the distinct
    /// pointers of one set. Enumeration order must be deterministic and
    /// preserve the order locations were presented in.
    fn alias_sets(&self, locations: &[MemoryLocation]) -> Vec<Vec<ValueId>>;

    /// The underlying allocated objects a pointer may be based on.
    fn underlying_objects(&self, ptr: ValueId) -> Vec<ValueId>;
}

/// Data-layout queries.
pub trait DataLayout {
    /// Allocation size of a type in bytes.
    fn alloc_size(&self, ty: TypeId) -> u64;

    /// Whether the type is an aggregate (struct or array).
    fn is_aggregate(&self, ty: TypeId) -> bool;

    /// The pointee type of a pointer value.
    fn pointee_type(&self, ptr: ValueId) -> TypeId;

    /// Address space of a pointer value.
    fn address_space(&self, ptr: ValueId) -> u32;
}

/// Block dominance.
pub trait DomTree {
    /// Whether `a` dominates `b`.
    fn dominates(&self, a: BlockId, b: BlockId) -> bool;
}

/// IR builder used by the runtime-check emission helper.
///
/// An implementation is constructed at an insertion point (typically the
/// loop preheader) and appends instructions there. Values created by the
/// builder may fold to constants; [`CheckBuilder::and_anchor`] must always
/// materialize an instruction so the emitted check has an anchor in the IR.
pub trait CheckBuilder {
    /// Materialize a symbolic expression as a byte-element pointer in the
    /// given address space.
    fn expand_bound(&mut self, expr: ExprId, address_space: u32) -> ValueId;

    /// Cast a value to a byte-element pointer in the given address space.
    fn byte_ptr_cast(&mut self, value: ValueId, address_space: u32) -> ValueId;

    /// Unsigned `lhs <= rhs`.
    fn icmp_ule(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;

    /// Bitwise and (may fold).
    fn and(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;

    /// Bitwise or (may fold).
    fn or(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;

    /// The boolean constant `true`.
    fn true_constant(&mut self) -> ValueId;

    /// Bitwise and that is guaranteed to be inserted as an instruction,
    /// never folded.
    fn and_anchor(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;

    /// The first instruction this builder inserted, if any.
    fn first_instruction(&self) -> Option<ValueId>;
}

// =============================================================================
// Tests
// =============================================================================
