//! Instruction kinds, per-kind predicates, and instruction storage.
//!
//! The instruction set is a closed sum: passes match on [`InstKind`]
//! directly instead of downcasting through a class hierarchy. Block
//! references (branch targets, phi predecessors, guard handlers) are kept in
//! a separate `block_args` array on the instruction — blocks are not values
//! and carry no use links.

use std::fmt;
use std::sync::Arc;

use crate::ir::value::{UseLink, UseList};
use crate::ir::{BlockId, InstId, Value};
use crate::types::{FieldDesc, MethodDesc, Type};

/// Binary arithmetic and logic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Signed division; may fault on zero divisor.
    Div,
    /// Unsigned division.
    DivUn,
    /// Signed remainder.
    Rem,
    /// Unsigned remainder.
    RemUn,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    ShrUn,
}

impl BinOp {
    /// Returns the printer mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::DivUn => "div.un",
            BinOp::Rem => "rem",
            BinOp::RemUn => "rem.un",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::ShrUn => "shr.un",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed less than.
    Lt,
    /// Signed greater than.
    Gt,
    /// Signed less or equal.
    Le,
    /// Signed greater or equal.
    Ge,
    /// Unsigned/unordered less than.
    LtUn,
    /// Unsigned/unordered greater than.
    GtUn,
    /// Unsigned/unordered less or equal.
    LeUn,
    /// Unsigned/unordered greater or equal.
    GeUn,
}

impl CmpOp {
    /// Returns the printer mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Gt => "gt",
            CmpOp::Le => "le",
            CmpOp::Ge => "ge",
            CmpOp::LtUn => "lt.un",
            CmpOp::GtUn => "gt.un",
            CmpOp::LeUn => "le.un",
            CmpOp::GeUn => "ge.un",
        }
    }

    /// Returns the operator testing the negated condition.
    #[must_use]
    pub const fn negated(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::LtUn => CmpOp::GeUn,
            CmpOp::GtUn => CmpOp::LeUn,
            CmpOp::LeUn => CmpOp::GtUn,
            CmpOp::GeUn => CmpOp::LtUn,
        }
    }
}

/// The kind of protection a guard establishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Typed catch handler (also used for filter handlers, which carry a
    /// filter block).
    Catch,
    /// Finally handler.
    Finally,
    /// Fault handler (finally that runs only on exception).
    Fault,
}

/// Opaque builtins with bytecode-level semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum CilIntrinsic {
    /// Array length; operand: `[array]`.
    ArrayLen,
    /// Size of a type in bytes; no operands.
    SizeOf(Type),
    /// Single-dimensional array allocation; operand: `[length]`.
    NewArray(Type),
}

impl fmt::Display for CilIntrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CilIntrinsic::ArrayLen => write!(f, "arrlen"),
            CilIntrinsic::SizeOf(ty) => write!(f, "sizeof {ty}"),
            CilIntrinsic::NewArray(ty) => write!(f, "newarr {ty}"),
        }
    }
}

/// The closed sum of instruction kinds.
///
/// Operand layout and `block_args` layout per kind are documented on each
/// variant; the layouts are invariants the editing APIs preserve.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Binary operator; operands `[left, right]`.
    Bin(BinOp),
    /// Comparison; operands `[left, right]`, result `bool`-as-`int32`.
    Cmp(CmpOp),
    /// Numeric conversion; operands `[value]`.
    Conv,
    /// Branch. Unconditional: no operands, `block_args = [then]`.
    /// Conditional: operands `[cond]`, `block_args = [then, else]`.
    Branch,
    /// Switch; operands `[value]`, `block_args = [default, target0, ..]`.
    Switch,
    /// Return; operands `[]` or `[value]`.
    Return,
    /// Throw; operands `[exception]`.
    Throw,
    /// Rethrow inside a handler; no operands.
    Rethrow,
    /// Exit a protected region; `block_args = [target]`.
    Leave,
    /// Terminate a finally/fault handler; continuation is runtime-chosen.
    EndFinally,
    /// Terminate a filter block; operands `[decision]`.
    EndFilter,
    /// SSA merge; operands are incoming values, `block_args` the matching
    /// predecessors, index-parallel.
    Phi,
    /// Marks the start of a protected region. `block_args = [handler]` or
    /// `[handler, filter]`. The guard's result is the caught exception as
    /// delivered on the handler's entry stack.
    Guard {
        /// Handler kind.
        kind: GuardKind,
        /// Caught exception type for catch handlers.
        catch_type: Option<Type>,
    },
    /// Indirect load; operands `[addr]`.
    Load,
    /// Indirect store; operands `[addr, value]`.
    Store,
    /// Address of an array element; operands `[array, index]`.
    ArrayAddr,
    /// Address of a field; operands `[obj]`, or `[]` for statics.
    FieldAddr(Arc<FieldDesc>),
    /// Read a field out of a struct value; operands `[obj]`.
    ExtractField(Arc<FieldDesc>),
    /// Read a memory-backed variable; operands `[var]`.
    LoadVar,
    /// Write a memory-backed variable; operands `[var, value]`.
    StoreVar,
    /// Address of a memory-backed variable; operands `[var]`. The variable
    /// must be exposed.
    VarAddr,
    /// Method call; operands are the arguments (receiver first for
    /// instance methods).
    Call(Arc<MethodDesc>),
    /// Object allocation + constructor call; operands are the constructor
    /// arguments without the receiver.
    NewObj(Arc<MethodDesc>),
    /// Opaque builtin.
    Intrinsic(CilIntrinsic),
    /// Multi-dimensional array accessor; operands follow the synthesized
    /// method signature with the receiver first.
    MDArrayOp(Arc<MethodDesc>),
}

impl InstKind {
    /// Returns `true` if this kind ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Branch
                | InstKind::Switch
                | InstKind::Return
                | InstKind::Throw
                | InstKind::Rethrow
                | InstKind::Leave
                | InstKind::EndFinally
                | InstKind::EndFilter
        )
    }

    /// Returns `true` if this kind must precede all non-header instructions.
    #[must_use]
    pub fn is_header(&self) -> bool {
        matches!(self, InstKind::Phi | InstKind::Guard { .. })
    }

    /// Returns `true` if removing an unused instance would change program
    /// behavior.
    ///
    /// Guards are side-effecting: they pin the protected-region structure.
    /// Loads and address computations may fault, but those exceptions are
    /// treated as commuting and do not pin the instruction.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.is_terminator()
            || matches!(
                self,
                InstKind::Store
                    | InstKind::StoreVar
                    | InstKind::Call(_)
                    | InstKind::NewObj(_)
                    | InstKind::Guard { .. }
                    | InstKind::MDArrayOp(_)
            )
    }

    /// Returns `true` if this kind may read from memory.
    #[must_use]
    pub fn may_read_memory(&self) -> bool {
        matches!(
            self,
            InstKind::Load
                | InstKind::LoadVar
                | InstKind::Call(_)
                | InstKind::NewObj(_)
                | InstKind::Intrinsic(CilIntrinsic::ArrayLen)
                | InstKind::MDArrayOp(_)
        )
    }

    /// Returns `true` if this kind may write to memory.
    #[must_use]
    pub fn may_write_memory(&self) -> bool {
        matches!(
            self,
            InstKind::Store | InstKind::StoreVar | InstKind::Call(_) | InstKind::NewObj(_)
        ) || matches!(self, InstKind::MDArrayOp(m) if m.sig.ret.is_void())
    }

    /// Returns `true` if an unused instance may be swept by dead-code
    /// elimination.
    #[must_use]
    pub fn safe_to_remove(&self) -> bool {
        !self.has_side_effects()
    }
}

/// Storage for one instruction inside a [`crate::ir::MethodBody`].
///
/// The operand array and the use-link array are index-parallel: slot `i` of
/// `links` chains operand `i` into that operand's use list.
#[derive(Debug, Clone)]
pub struct InstData {
    pub(crate) kind: InstKind,
    pub(crate) ty: Type,
    pub(crate) operands: Vec<Value>,
    pub(crate) links: Vec<UseLink>,
    pub(crate) block_args: Vec<BlockId>,
    pub(crate) block: Option<BlockId>,
    pub(crate) prev: Option<InstId>,
    pub(crate) next: Option<InstId>,
    pub(crate) uses: UseList,
}

impl InstData {
    /// Returns the instruction kind.
    #[must_use]
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// Returns the result type. Void-typed instructions produce no value.
    #[must_use]
    pub fn result_type(&self) -> &Type {
        &self.ty
    }

    /// Returns the operand array.
    #[must_use]
    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    /// Returns the referenced blocks (branch targets, phi predecessors,
    /// guard handler/filter).
    #[must_use]
    pub fn block_args(&self) -> &[BlockId] {
        &self.block_args
    }

    /// Returns the owning block, or `None` when detached.
    #[must_use]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Returns the previous instruction in the owning block.
    #[must_use]
    pub fn prev(&self) -> Option<InstId> {
        self.prev
    }

    /// Returns the next instruction in the owning block.
    #[must_use]
    pub fn next(&self) -> Option<InstId> {
        self.next
    }

    /// Returns the number of uses of this instruction's result.
    #[must_use]
    pub fn num_uses(&self) -> u32 {
        self.uses.count
    }

    /// Returns `true` if this instruction ends its block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    /// Returns `true` if this is a phi or guard.
    #[must_use]
    pub fn is_header(&self) -> bool {
        self.kind.is_header()
    }

    /// Returns the control-flow successors this instruction names.
    ///
    /// Only terminators name successors; guard handler edges are exception
    /// edges and intentionally excluded.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        if self.kind.is_terminator() {
            &self.block_args
        } else {
            &[]
        }
    }

    /// For a phi, returns the incoming `(predecessor, value)` pairs.
    #[must_use]
    pub fn phi_args(&self) -> impl Iterator<Item = (BlockId, &Value)> {
        debug_assert!(matches!(self.kind, InstKind::Phi));
        self.block_args.iter().copied().zip(self.operands.iter())
    }

    /// For a phi, returns the incoming value for `pred`, if any.
    #[must_use]
    pub fn phi_value_for(&self, pred: BlockId) -> Option<&Value> {
        self.phi_args().find(|(p, _)| *p == pred).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_classification() {
        assert!(InstKind::Branch.is_terminator());
        assert!(InstKind::Return.is_terminator());
        assert!(InstKind::Leave.is_terminator());
        assert!(InstKind::EndFinally.is_terminator());
        assert!(!InstKind::Phi.is_terminator());
        assert!(!InstKind::Load.is_terminator());
    }

    #[test]
    fn test_header_classification() {
        assert!(InstKind::Phi.is_header());
        assert!(InstKind::Guard {
            kind: GuardKind::Finally,
            catch_type: None
        }
        .is_header());
        assert!(!InstKind::Load.is_header());
    }

    #[test]
    fn test_side_effects() {
        assert!(InstKind::Store.has_side_effects());
        assert!(InstKind::StoreVar.has_side_effects());
        assert!(!InstKind::Load.has_side_effects());
        assert!(!InstKind::Bin(BinOp::Add).has_side_effects());
        assert!(!InstKind::Phi.has_side_effects());

        assert!(InstKind::Load.safe_to_remove());
        assert!(!InstKind::Store.safe_to_remove());
        assert!(!InstKind::Return.safe_to_remove());
    }

    #[test]
    fn test_memory_predicates() {
        assert!(InstKind::Load.may_read_memory());
        assert!(!InstKind::Load.may_write_memory());
        assert!(InstKind::Store.may_write_memory());
        assert!(!InstKind::Bin(BinOp::Add).may_read_memory());
        assert!(InstKind::Intrinsic(CilIntrinsic::ArrayLen).may_read_memory());
    }

    #[test]
    fn test_cmp_negation() {
        assert_eq!(CmpOp::Eq.negated(), CmpOp::Ne);
        assert_eq!(CmpOp::Lt.negated(), CmpOp::Ge);
        assert_eq!(CmpOp::GeUn.negated(), CmpOp::LtUn);
    }
}
