//! Compound-type construction, interning, and the provider surface.
//!
//! The [`TypeFactory`] is the single place compound types are built. It
//! interns by structural equality, so two requests for `int32[]` return
//! types whose inner [`std::sync::Arc`]s are shared. The factory is the
//! shared-immutable component of the core: many method bodies may query it
//! concurrently while being transformed on different threads.
//!
//! The [`TypeProvider`] trait is the callback surface the external metadata
//! reader drives while decoding signatures. Implementations must be
//! referentially transparent: equal inputs produce equal types.

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::{MDArrayShape, MethodSig, Type, TypeDef, TypeSpec};
use crate::{Error, Result};

/// Primitive type codes as they appear in signature blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveCode {
    /// `void`
    Void = 0x01,
    /// `bool`
    Bool = 0x02,
    /// `char`
    Char = 0x03,
    /// `int8`
    I8 = 0x04,
    /// `uint8`
    U8 = 0x05,
    /// `int16`
    I16 = 0x06,
    /// `uint16`
    U16 = 0x07,
    /// `int32`
    I32 = 0x08,
    /// `uint32`
    U32 = 0x09,
    /// `int64`
    I64 = 0x0A,
    /// `uint64`
    U64 = 0x0B,
    /// `float32`
    F32 = 0x0C,
    /// `float64`
    F64 = 0x0D,
    /// `string`
    String = 0x0E,
    /// `nint`
    IntPtr = 0x18,
    /// `nuint`
    UIntPtr = 0x19,
    /// `object`
    Object = 0x1C,
}

/// Interning factory for compound types.
///
/// All compound constructors return canonical instances: calling
/// [`TypeFactory::get_array`] twice with equal element types yields types
/// that share their inner allocation, making repeated equality checks cheap.
///
/// # Thread Safety
///
/// The factory is `Send + Sync`; interning uses a concurrent map so distinct
/// method bodies can be imported in parallel against one shared factory.
#[derive(Debug, Default)]
pub struct TypeFactory {
    interned: DashMap<Type, Type>,
}

impl TypeFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interned: DashMap::new(),
        }
    }

    /// Returns the canonical instance of `ty`, interning it on first sight.
    fn intern(&self, ty: Type) -> Type {
        if let Some(existing) = self.interned.get(&ty) {
            return existing.value().clone();
        }
        self.interned
            .entry(ty.clone())
            .or_insert(ty)
            .value()
            .clone()
    }

    /// Looks up a primitive type by its signature code.
    #[must_use]
    pub fn get_primitive(&self, code: PrimitiveCode) -> Type {
        match code {
            PrimitiveCode::Void => Type::Void,
            PrimitiveCode::Bool => Type::Bool,
            PrimitiveCode::Char => Type::Char,
            PrimitiveCode::I8 => Type::I8,
            PrimitiveCode::U8 => Type::U8,
            PrimitiveCode::I16 => Type::I16,
            PrimitiveCode::U16 => Type::U16,
            PrimitiveCode::I32 => Type::I32,
            PrimitiveCode::U32 => Type::U32,
            PrimitiveCode::I64 => Type::I64,
            PrimitiveCode::U64 => Type::U64,
            PrimitiveCode::F32 => Type::F32,
            PrimitiveCode::F64 => Type::F64,
            PrimitiveCode::String => Type::String,
            PrimitiveCode::IntPtr => Type::IntPtr,
            PrimitiveCode::UIntPtr => Type::UIntPtr,
            PrimitiveCode::Object => Type::Object,
        }
    }

    /// Returns the single-dimensional, zero-based array of `elem`.
    #[must_use]
    pub fn get_array(&self, elem: Type) -> Type {
        self.intern(Type::Array(Arc::new(elem)))
    }

    /// Returns the multi-dimensional array with the given shape.
    #[must_use]
    pub fn get_md_array(
        &self,
        elem: Type,
        rank: u32,
        lower_bounds: Vec<i32>,
        sizes: Vec<u32>,
    ) -> Type {
        self.intern(Type::MDArray(Arc::new(MDArrayShape {
            elem,
            rank,
            lower_bounds,
            sizes,
        })))
    }

    /// Returns the managed reference to `elem`.
    #[must_use]
    pub fn get_byref(&self, elem: Type) -> Type {
        self.intern(Type::Byref(Arc::new(elem)))
    }

    /// Returns the unmanaged pointer to `elem`.
    #[must_use]
    pub fn get_pointer(&self, elem: Type) -> Type {
        self.intern(Type::Ptr(Arc::new(elem)))
    }

    /// Returns the pinned variant of `elem`.
    #[must_use]
    pub fn get_pinned(&self, elem: Type) -> Type {
        self.intern(Type::Pinned(Arc::new(elem)))
    }

    /// Returns a function-pointer type for `sig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the signature declares generic
    /// parameters; generic function pointers are outside the supported
    /// surface.
    pub fn get_func_ptr(&self, sig: MethodSig) -> Result<Type> {
        if sig.generic_param_count != 0 {
            return Err(Error::Unsupported(format!(
                "function pointer with {} generic parameters",
                sig.generic_param_count
            )));
        }
        Ok(self.intern(Type::FuncPtr(Arc::new(sig))))
    }

    /// Returns the instantiation of `def` with `args`.
    #[must_use]
    pub fn get_generic_instantiation(&self, def: Arc<TypeDef>, args: Vec<Type>) -> Type {
        self.intern(Type::Spec(Arc::new(TypeSpec { def, args })))
    }

    /// Returns the type with a custom modifier applied.
    ///
    /// Modifiers are currently transparent: the unmodified type is returned
    /// and the modifier is discarded.
    // TODO: record (modifier, required) pairs on a side table once a
    // downstream consumer needs to distinguish modified signatures.
    #[must_use]
    pub fn get_modified_type(&self, _modifier: Type, unmodified: Type, _is_required: bool) -> Type {
        unmodified
    }
}

/// Callback surface invoked by the external metadata reader during signature
/// decoding.
///
/// `R` is the reader's own context type; the core never inspects it.
/// Implementations are required to be referentially transparent for equal
/// inputs.
pub trait TypeProvider<R> {
    /// Looks up a primitive type by signature code.
    fn get_primitive_type(&self, code: PrimitiveCode) -> Type;

    /// Resolves a `TypeDef` row handle.
    fn get_type_from_definition(&self, reader: &R, handle: u32, raw_kind: u8) -> Result<Type>;

    /// Resolves a `TypeRef` row handle.
    fn get_type_from_reference(&self, reader: &R, handle: u32, raw_kind: u8) -> Result<Type>;

    /// Resolves a `TypeSpec` row handle.
    fn get_type_from_specification(&self, reader: &R, handle: u32, raw_kind: u8) -> Result<Type>;

    /// Builds a single-dimensional array type.
    fn get_sz_array_type(&self, elem: Type) -> Type;

    /// Builds a multi-dimensional array type from the decoded shape.
    fn get_array_type(&self, elem: Type, rank: u32, lower_bounds: Vec<i32>, sizes: Vec<u32>)
        -> Type;

    /// Builds a managed reference type.
    fn get_by_reference_type(&self, elem: Type) -> Type;

    /// Builds an unmanaged pointer type.
    fn get_pointer_type(&self, elem: Type) -> Type;

    /// Builds a pinned type.
    fn get_pinned_type(&self, elem: Type) -> Type;

    /// Builds a function-pointer type.
    fn get_function_pointer_type(&self, signature: MethodSig) -> Result<Type>;

    /// Builds a generic instantiation.
    fn get_generic_instantiation(&self, generic_def: Arc<TypeDef>, type_args: Vec<Type>) -> Type;

    /// Returns the generic method parameter `!!index`.
    fn get_generic_method_parameter(&self, index: u32) -> Type;

    /// Returns the generic type parameter `!index`.
    fn get_generic_type_parameter(&self, index: u32) -> Type;

    /// Applies a custom modifier.
    fn get_modified_type(&self, modifier: Type, unmodified: Type, required: bool) -> Type;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_returns_shared_instances() {
        let factory = TypeFactory::new();
        let a = factory.get_array(Type::I32);
        let b = factory.get_array(Type::I32);
        assert_eq!(a, b);

        let (Type::Array(ea), Type::Array(eb)) = (&a, &b) else {
            panic!("expected array types");
        };
        assert!(Arc::ptr_eq(ea, eb));
    }

    #[test]
    fn test_nested_compounds_intern() {
        let factory = TypeFactory::new();
        let a = factory.get_byref(factory.get_array(Type::F64));
        let b = factory.get_byref(factory.get_array(Type::F64));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "float64[]&");
    }

    #[test]
    fn test_generic_func_ptr_rejected() {
        let factory = TypeFactory::new();
        let sig = MethodSig {
            ret: Type::Void,
            params: vec![Type::I32],
            generic_param_count: 1,
        };
        assert!(matches!(
            factory.get_func_ptr(sig),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_modified_type_is_transparent() {
        let factory = TypeFactory::new();
        let modified = factory.get_modified_type(Type::Object, Type::I32, true);
        assert_eq!(modified, Type::I32);
    }

    #[test]
    fn test_primitive_lookup() {
        let factory = TypeFactory::new();
        assert_eq!(factory.get_primitive(PrimitiveCode::I32), Type::I32);
        assert_eq!(factory.get_primitive(PrimitiveCode::Object), Type::Object);
    }
}
