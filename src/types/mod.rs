//! Type model for CIL-style managed bytecode.
//!
//! This module provides the type representation consumed by every other
//! component of the optimizer: the IR stores a [`Type`] on every value, the
//! importer derives evaluation-stack categories from it, and the printer
//! renders its postfix textual form.
//!
//! # Design Rationale
//!
//! The [`Type`] enum is designed to be:
//! - **Structurally comparable**: equality and hashing are derived, no
//!   metadata context is needed to compare two types
//! - **Cheap to clone**: compound variants hold [`Arc`]s, so a clone is a
//!   reference-count bump
//! - **Interned**: compound types built through the [`TypeFactory`] are
//!   deduplicated by equality, keeping repeated comparisons fast
//!
//! # Type Categories
//!
//! - **Primitives**: fixed-size numerics, `bool`, `char`
//! - **References**: `object`, `string`, arrays, user-defined reference types
//! - **Compounds**: byrefs, pointers, pinned types, function pointers,
//!   generic instantiations

mod factory;
mod members;

pub use factory::{PrimitiveCode, TypeFactory, TypeProvider};
pub use members::{
    md_array_method, FieldDesc, MDArrayMethodKind, MethodDesc, MethodSig, ParamDesc,
};

use std::fmt;
use std::sync::Arc;

/// Whether a type behaves as a value class or a reference class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Stored inline; copied on assignment.
    Value,
    /// Stored on the heap; assignment copies the reference.
    Ref,
}

/// How a value of a given type appears on the evaluation stack.
///
/// The bytecode standard collapses small integers to `Int32` on the stack and
/// tracks native-sized integers separately. Merges at phi points must agree
/// on this category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackType {
    /// 32-bit integer (also `bool`, `char` and the 8/16-bit integers).
    Int32,
    /// 64-bit integer.
    Int64,
    /// Native-sized integer (also unmanaged pointers).
    NInt,
    /// Floating point (the stack does not distinguish widths).
    Float,
    /// Object reference.
    Object,
    /// Managed reference (byref).
    ByRef,
    /// Value type larger than a stack primitive.
    Struct,
    /// No value.
    Void,
}

/// Handle to a user-defined type resolved from a module's metadata.
///
/// Two handles are equal iff they name the same row in the same module; the
/// external metadata reader guarantees referential transparency, so derived
/// structural equality is sufficient.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDef {
    /// Metadata token value of the definition row.
    pub token: u32,
    /// Namespace, empty for the global namespace.
    pub namespace: Arc<str>,
    /// Simple name.
    pub name: Arc<str>,
    /// Whether the definition is a value class.
    pub is_value_class: bool,
}

/// A generic instantiation: an open definition plus its type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSpec {
    /// The open generic definition.
    pub def: Arc<TypeDef>,
    /// Type arguments, one per generic parameter.
    pub args: Vec<Type>,
}

/// Shape of a multi-dimensional array.
///
/// Equality compares element type, rank, lower bounds and sizes, per the
/// bytecode standard's array-type identity rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MDArrayShape {
    /// Element type.
    pub elem: Type,
    /// Number of dimensions (always >= 1).
    pub rank: u32,
    /// Declared lower bounds, possibly shorter than `rank`.
    pub lower_bounds: Vec<i32>,
    /// Declared sizes, possibly shorter than `rank`.
    pub sizes: Vec<u32>,
}

/// Whether a generic parameter belongs to a type or a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericParamKind {
    /// Type parameter, printed `!N`.
    Type,
    /// Method parameter, printed `!!N`.
    Method,
}

/// A CIL type.
///
/// Types are compared structurally. Compound variants should be constructed
/// through a [`TypeFactory`] so equal types share their allocations.
///
/// # Examples
///
/// ```rust
/// use cilopt::types::{StackType, Type, TypeFactory};
///
/// let factory = TypeFactory::new();
/// let ints = factory.get_array(Type::I32);
///
/// assert_eq!(ints.stack_type(), StackType::Object);
/// assert_eq!(ints.to_string(), "int32[]");
/// assert_eq!(ints, factory.get_array(Type::I32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Type {
    /// No value.
    #[default]
    Void,
    /// System.Boolean.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// Native-sized signed integer.
    IntPtr,
    /// Native-sized unsigned integer.
    UIntPtr,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// Unicode character.
    Char,
    /// System.String.
    String,
    /// System.Object.
    Object,
    /// User-defined type.
    Def(Arc<TypeDef>),
    /// Generic instantiation of a user-defined type.
    Spec(Arc<TypeSpec>),
    /// Single-dimensional, zero-based array.
    Array(Arc<Type>),
    /// Multi-dimensional array.
    MDArray(Arc<MDArrayShape>),
    /// Managed reference.
    Byref(Arc<Type>),
    /// Unmanaged pointer.
    Ptr(Arc<Type>),
    /// Pinned local type modifier.
    Pinned(Arc<Type>),
    /// Function pointer with the given signature.
    FuncPtr(Arc<MethodSig>),
    /// Unsubstituted generic parameter.
    GenericParam(GenericParamKind, u32),
}

impl Type {
    /// Returns whether this type is a value class or a reference class.
    ///
    /// Byrefs and pointers are value classes (the referent may not be);
    /// unsubstituted generic parameters are conservatively treated as
    /// reference classes.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::String
            | Type::Object
            | Type::Array(_)
            | Type::MDArray(_)
            | Type::GenericParam(..) => TypeKind::Ref,
            Type::Def(def) => {
                if def.is_value_class {
                    TypeKind::Value
                } else {
                    TypeKind::Ref
                }
            }
            Type::Spec(spec) => {
                if spec.def.is_value_class {
                    TypeKind::Value
                } else {
                    TypeKind::Ref
                }
            }
            Type::Pinned(inner) => inner.kind(),
            _ => TypeKind::Value,
        }
    }

    /// Returns how a value of this type appears on the evaluation stack.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        match self {
            Type::Void => StackType::Void,
            Type::Bool
            | Type::Char
            | Type::I8
            | Type::U8
            | Type::I16
            | Type::U16
            | Type::I32
            | Type::U32 => StackType::Int32,
            Type::I64 | Type::U64 => StackType::Int64,
            Type::IntPtr | Type::UIntPtr | Type::Ptr(_) | Type::FuncPtr(_) => StackType::NInt,
            Type::F32 | Type::F64 => StackType::Float,
            Type::String
            | Type::Object
            | Type::Array(_)
            | Type::MDArray(_)
            | Type::GenericParam(..) => StackType::Object,
            Type::Def(_) | Type::Spec(_) => {
                if self.kind() == TypeKind::Value {
                    StackType::Struct
                } else {
                    StackType::Object
                }
            }
            Type::Byref(_) => StackType::ByRef,
            Type::Pinned(inner) => inner.stack_type(),
        }
    }

    /// Returns `true` iff this type carries no value.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Returns the element type for arrays, byrefs, pointers and pinned
    /// types, or `None` for everything else.
    #[must_use]
    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) | Type::Byref(elem) | Type::Ptr(elem) | Type::Pinned(elem) => {
                Some(elem)
            }
            Type::MDArray(shape) => Some(&shape.elem),
            _ => None,
        }
    }

    /// Returns `true` iff this is a single- or multi-dimensional array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_) | Type::MDArray(_))
    }
}

impl fmt::Display for Type {
    /// Renders the postfix textual form: `int32[]`, `int32&`, `Foo<string>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::I8 => write!(f, "int8"),
            Type::U8 => write!(f, "uint8"),
            Type::I16 => write!(f, "int16"),
            Type::U16 => write!(f, "uint16"),
            Type::I32 => write!(f, "int32"),
            Type::U32 => write!(f, "uint32"),
            Type::I64 => write!(f, "int64"),
            Type::U64 => write!(f, "uint64"),
            Type::IntPtr => write!(f, "nint"),
            Type::UIntPtr => write!(f, "nuint"),
            Type::F32 => write!(f, "float32"),
            Type::F64 => write!(f, "float64"),
            Type::Char => write!(f, "char"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Def(def) => {
                if def.namespace.is_empty() {
                    write!(f, "{}", def.name)
                } else {
                    write!(f, "{}.{}", def.namespace, def.name)
                }
            }
            Type::Spec(spec) => {
                if spec.def.namespace.is_empty() {
                    write!(f, "{}", spec.def.name)?;
                } else {
                    write!(f, "{}.{}", spec.def.namespace, spec.def.name)?;
                }
                write!(f, "<")?;
                for (i, arg) in spec.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Type::Array(elem) => write!(f, "{elem}[]"),
            Type::MDArray(shape) => {
                write!(f, "{}[", shape.elem)?;
                for _ in 1..shape.rank {
                    write!(f, ",")?;
                }
                write!(f, "]")
            }
            Type::Byref(elem) => write!(f, "{elem}&"),
            Type::Ptr(elem) => write!(f, "{elem}*"),
            Type::Pinned(elem) => write!(f, "{elem} pinned"),
            Type::FuncPtr(sig) => {
                write!(f, "method {} *(", sig.ret)?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            Type::GenericParam(GenericParamKind::Type, idx) => write!(f, "!{idx}"),
            Type::GenericParam(GenericParamKind::Method, idx) => write!(f, "!!{idx}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_def() -> Arc<TypeDef> {
        Arc::new(TypeDef {
            token: 0x0200_0004,
            namespace: "Geometry".into(),
            name: "Point".into(),
            is_value_class: true,
        })
    }

    #[test]
    fn test_stack_type_collapses_small_ints() {
        for ty in [Type::Bool, Type::Char, Type::I8, Type::U16, Type::I32] {
            assert_eq!(ty.stack_type(), StackType::Int32);
        }
        assert_eq!(Type::I64.stack_type(), StackType::Int64);
        assert_eq!(Type::IntPtr.stack_type(), StackType::NInt);
        assert_eq!(Type::F32.stack_type(), StackType::Float);
        assert_eq!(Type::F64.stack_type(), StackType::Float);
    }

    #[test]
    fn test_stack_type_value_class() {
        let point = Type::Def(point_def());
        assert_eq!(point.kind(), TypeKind::Value);
        assert_eq!(point.stack_type(), StackType::Struct);

        let byref = Type::Byref(Arc::new(point));
        assert_eq!(byref.stack_type(), StackType::ByRef);
    }

    #[test]
    fn test_structural_equality() {
        let a = Type::Array(Arc::new(Type::I32));
        let b = Type::Array(Arc::new(Type::I32));
        assert_eq!(a, b);
        assert_ne!(a, Type::Array(Arc::new(Type::I64)));
    }

    #[test]
    fn test_mdarray_equality_includes_shape() {
        let a = Type::MDArray(Arc::new(MDArrayShape {
            elem: Type::I32,
            rank: 2,
            lower_bounds: vec![0, 0],
            sizes: vec![],
        }));
        let b = Type::MDArray(Arc::new(MDArrayShape {
            elem: Type::I32,
            rank: 2,
            lower_bounds: vec![0, 1],
            sizes: vec![],
        }));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_postfix_forms() {
        assert_eq!(Type::Array(Arc::new(Type::I32)).to_string(), "int32[]");
        assert_eq!(Type::Byref(Arc::new(Type::F64)).to_string(), "float64&");
        assert_eq!(Type::Ptr(Arc::new(Type::U8)).to_string(), "uint8*");
        assert_eq!(
            Type::GenericParam(GenericParamKind::Method, 1).to_string(),
            "!!1"
        );

        let md = Type::MDArray(Arc::new(MDArrayShape {
            elem: Type::I32,
            rank: 3,
            lower_bounds: vec![],
            sizes: vec![],
        }));
        assert_eq!(md.to_string(), "int32[,,]");
    }

    #[test]
    fn test_display_generic_instantiation() {
        let list = Arc::new(TypeDef {
            token: 0x0100_0010,
            namespace: "System.Collections.Generic".into(),
            name: "List`1".into(),
            is_value_class: false,
        });
        let spec = Type::Spec(Arc::new(TypeSpec {
            def: list,
            args: vec![Type::String],
        }));
        assert_eq!(
            spec.to_string(),
            "System.Collections.Generic.List`1<string>"
        );
        assert_eq!(spec.stack_type(), StackType::Object);
    }
}
