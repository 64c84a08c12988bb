//! Values, constants, and the intrusive use-list storage.
//!
//! A [`Value`] is anything that can appear as an instruction operand.
//! Constants are untracked; arguments, variables and instruction results are
//! *tracked values* that maintain a use list. The list's link cells live in
//! the user instruction's operand storage (see [`UseLink`]), so the only
//! per-value state is a head pointer and a count.

use std::fmt;
use std::sync::Arc;

use crate::ir::{ArgId, InstId, VarId};
use crate::types::{StackType, Type};

/// A compile-time constant operand.
///
/// Constants are compared structurally and carry their own result type;
/// they do not maintain use lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Integer constant of the given (integral) type.
    Int {
        /// Result type; determines the stack category.
        ty: Type,
        /// Value, sign-extended to 64 bits.
        value: i64,
    },
    /// Floating-point constant of the given type.
    Float {
        /// Result type (`F32` or `F64`).
        ty: Type,
        /// Value, widened to 64 bits.
        value: f64,
    },
    /// The null object reference.
    Null,
    /// A string literal.
    Str(Arc<str>),
}

impl Const {
    /// Integer constant of type `int32`.
    #[must_use]
    pub fn i32(value: i32) -> Self {
        Const::Int {
            ty: Type::I32,
            value: i64::from(value),
        }
    }

    /// Integer constant of type `int64`.
    #[must_use]
    pub fn i64(value: i64) -> Self {
        Const::Int {
            ty: Type::I64,
            value,
        }
    }

    /// Returns the constant's result type.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Const::Int { ty, .. } | Const::Float { ty, .. } => ty.clone(),
            Const::Null => Type::Object,
            Const::Str(_) => Type::String,
        }
    }

    /// Returns the evaluation-stack category of this constant.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        self.ty().stack_type()
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int { value, .. } => write!(f, "{value}"),
            Const::Float { value, .. } => write!(f, "{value}"),
            Const::Null => write!(f, "null"),
            Const::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Anything that can appear as an instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A constant; untracked.
    Const(Const),
    /// An incoming argument.
    Arg(ArgId),
    /// A memory-backed variable slot.
    Var(VarId),
    /// The result of another instruction.
    Inst(InstId),
}

impl Value {
    /// Returns `true` if this value maintains a use list.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Value::Const(_))
    }

    /// Returns the instruction handle if this value is an instruction result.
    #[must_use]
    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the constant if this value is one.
    #[must_use]
    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Const> for Value {
    fn from(c: Const) -> Self {
        Value::Const(c)
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}

/// Identifies one use: which instruction, and which operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseRef {
    /// The using instruction.
    pub user: InstId,
    /// Index into the user's operand array.
    pub index: u32,
}

impl UseRef {
    /// Creates a use reference.
    #[must_use]
    pub const fn new(user: InstId, index: u32) -> Self {
        Self { user, index }
    }
}

/// Intrusive use-list link cell.
///
/// One cell lives in the user instruction's link array per operand slot,
/// parallel to the operand array. The cell chains this use into the used
/// value's list.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseLink {
    /// Previous use of the same value, if any.
    pub prev: Option<UseRef>,
    /// Next use of the same value, if any.
    pub next: Option<UseRef>,
}

/// Head of a tracked value's use list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UseList {
    /// First use, or `None` when unused.
    pub first: Option<UseRef>,
    /// Number of uses; always equals the list length.
    pub count: u32,
}

/// Storage for an incoming argument.
#[derive(Debug, Clone)]
pub struct ArgData {
    pub(crate) name: Arc<str>,
    pub(crate) ty: Type,
    pub(crate) uses: UseList,
}

impl ArgData {
    /// Returns the argument's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the argument's declared type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

/// Storage for a memory-backed variable slot.
///
/// Variables exist for locals that cannot be promoted to SSA values: their
/// address escapes, or their uses span protected regions. `is_exposed`
/// records the former.
#[derive(Debug, Clone)]
pub struct VarData {
    pub(crate) name: Arc<str>,
    pub(crate) ty: Type,
    pub(crate) is_exposed: bool,
    pub(crate) uses: UseList,
}

impl VarData {
    /// Returns the variable's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variable's declared type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Returns `true` if the variable's address escapes.
    #[must_use]
    pub fn is_exposed(&self) -> bool {
        self.is_exposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_types() {
        assert_eq!(Const::i32(7).ty(), Type::I32);
        assert_eq!(Const::i64(7).ty(), Type::I64);
        assert_eq!(Const::Null.ty(), Type::Object);
        assert_eq!(Const::Str("hi".into()).ty(), Type::String);
    }

    #[test]
    fn test_const_stack_types() {
        assert_eq!(Const::i32(0).stack_type(), StackType::Int32);
        assert_eq!(
            Const::Float {
                ty: Type::F64,
                value: 1.5
            }
            .stack_type(),
            StackType::Float
        );
        assert_eq!(Const::Null.stack_type(), StackType::Object);
    }

    #[test]
    fn test_tracked_values() {
        assert!(!Value::Const(Const::i32(1)).is_tracked());
        assert!(Value::Arg(ArgId::from_index(0)).is_tracked());
        assert!(Value::Var(VarId::from_index(0)).is_tracked());
        assert!(Value::Inst(InstId::from_index(0)).is_tracked());
    }

    #[test]
    fn test_const_display() {
        assert_eq!(Const::i32(42).to_string(), "42");
        assert_eq!(Const::Null.to_string(), "null");
        assert_eq!(Const::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
    }
}
