//! Member descriptors: methods, fields, parameters, and the synthesized
//! multi-dimensional array intrinsics.
//!
//! Descriptors are immutable handles produced by the external metadata
//! reader (or synthesized here for MD-array accessors) and shared by `Arc`.
//! The IR references them from call and field-access instructions; the core
//! only ever reads them.

use std::fmt;
use std::sync::Arc;

use crate::types::{Type, TypeFactory};

/// A method parameter: name plus declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamDesc {
    /// Parameter name, synthesized as `arg<N>` when metadata omits one.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: Type,
}

/// A method signature: return type and parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Return type, `Type::Void` for no result.
    pub ret: Type,
    /// Parameter types, excluding the implicit `this`.
    pub params: Vec<Type>,
    /// Declared generic parameter count (zero for non-generic methods).
    pub generic_param_count: u32,
}

impl MethodSig {
    /// Creates a non-generic signature.
    #[must_use]
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self {
            ret,
            params,
            generic_param_count: 0,
        }
    }
}

/// Handle identifying a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDesc {
    /// Simple name.
    pub name: Arc<str>,
    /// Declaring type.
    pub decl_type: Type,
    /// Signature.
    pub sig: MethodSig,
    /// Whether the method takes an implicit `this`.
    pub is_instance: bool,
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.decl_type, self.name)
    }
}

/// Handle identifying a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDesc {
    /// Simple name.
    pub name: Arc<str>,
    /// Declaring type.
    pub decl_type: Type,
    /// Field type.
    pub ty: Type,
    /// Whether the field is static.
    pub is_static: bool,
}

impl fmt::Display for FieldDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.decl_type, self.name)
    }
}

/// The five intrinsic accessors every multi-dimensional array type exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MDArrayMethodKind {
    /// `.ctor(size0, .., sizeN)`
    SizeCtor,
    /// `.ctor(lo0, size0, .., loN, sizeN)`
    RangeCtor,
    /// `Get(i0, .., iN) -> elem`
    Get,
    /// `Set(i0, .., iN, value)`
    Set,
    /// `Address(i0, .., iN) -> elem&`
    Address,
}

/// Synthesizes one of the intrinsic methods of a multi-dimensional array
/// type, with the signature derived from rank and element type per the
/// bytecode standard (II.14.2).
///
/// # Panics
///
/// Panics if `array_type` is not a [`Type::MDArray`]; callers resolve the
/// receiver type before asking for its accessors.
#[must_use]
pub fn md_array_method(
    factory: &TypeFactory,
    array_type: &Type,
    kind: MDArrayMethodKind,
) -> Arc<MethodDesc> {
    let Type::MDArray(shape) = array_type else {
        panic!("md_array_method called on non-MD-array type {array_type}");
    };
    let rank = shape.rank as usize;
    let index_params = |n: usize| vec![Type::I32; n];

    let (name, sig) = match kind {
        MDArrayMethodKind::SizeCtor => (
            ".ctor",
            MethodSig::new(Type::Void, index_params(rank)),
        ),
        MDArrayMethodKind::RangeCtor => (
            ".ctor",
            MethodSig::new(Type::Void, index_params(rank * 2)),
        ),
        MDArrayMethodKind::Get => (
            "Get",
            MethodSig::new(shape.elem.clone(), index_params(rank)),
        ),
        MDArrayMethodKind::Set => {
            let mut params = index_params(rank);
            params.push(shape.elem.clone());
            ("Set", MethodSig::new(Type::Void, params))
        }
        MDArrayMethodKind::Address => (
            "Address",
            MethodSig::new(factory.get_byref(shape.elem.clone()), index_params(rank)),
        ),
    };

    Arc::new(MethodDesc {
        name: name.into(),
        decl_type: array_type.clone(),
        sig,
        is_instance: true,
    })
}
