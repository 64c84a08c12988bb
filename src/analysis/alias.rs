//! May-alias oracle for memory accesses.
//!
//! The Forest analysis asks one question when it considers moving a load
//! past another memory operation: can the two accesses touch the same
//! location? The answer comes from an [`AliasAnalysis`] implementation so
//! callers can substitute a stronger oracle; the built-in
//! [`TypeBasedAlias`] distinguishes locations by their access path shape.

use crate::ir::{InstData, InstKind, MethodBody, Value, VarId};

/// The access-path shape of a memory operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MemLoc {
    /// A memory-backed variable slot.
    Var(VarId),
    /// A field, identified by its descriptor.
    Field(std::sync::Arc<crate::types::FieldDesc>),
    /// Some array element.
    ArrayElem,
    /// An array's length word (written only at allocation).
    ArrayLen,
    /// Anything: unresolvable addresses, calls.
    Unknown,
}

/// Answers may-alias queries between two memory-touching instructions.
pub trait AliasAnalysis {
    /// Returns `true` if the memory accessed by `a` may overlap the memory
    /// accessed by `b`. Both instructions belong to `body`.
    fn may_alias(&self, body: &MethodBody, a: crate::ir::InstId, b: crate::ir::InstId) -> bool;
}

/// Classifies the location an instruction touches.
///
/// Addresses are traced one step: a load through a `FieldAddr` result is a
/// field access, through a `VarAddr` a variable access, and so on. Anything
/// deeper (phis of addresses, byref arguments) is `Unknown`.
#[must_use]
pub fn access_location(body: &MethodBody, inst: &InstData) -> MemLoc {
    fn addr_location(body: &MethodBody, addr: &Value) -> MemLoc {
        let Some(id) = addr.as_inst() else {
            return MemLoc::Unknown;
        };
        match body.inst(id).kind() {
            InstKind::VarAddr => match &body.inst(id).operands()[0] {
                Value::Var(v) => MemLoc::Var(*v),
                _ => MemLoc::Unknown,
            },
            InstKind::FieldAddr(field) => MemLoc::Field(field.clone()),
            InstKind::ArrayAddr => MemLoc::ArrayElem,
            _ => MemLoc::Unknown,
        }
    }

    match inst.kind() {
        InstKind::Load | InstKind::Store => addr_location(body, &inst.operands()[0]),
        InstKind::LoadVar | InstKind::StoreVar | InstKind::VarAddr => match &inst.operands()[0] {
            Value::Var(v) => MemLoc::Var(*v),
            _ => MemLoc::Unknown,
        },
        InstKind::Intrinsic(crate::ir::CilIntrinsic::ArrayLen) => MemLoc::ArrayLen,
        _ => MemLoc::Unknown,
    }
}


/// Conservative shape-based alias analysis.
///
/// Distinct fields never alias; variable slots alias only themselves unless
/// exposed; array elements conservatively alias all array elements;
/// `Unknown` aliases everything except unexposed variables.
#[derive(Debug, Default)]
pub struct TypeBasedAlias;

impl TypeBasedAlias {
    /// Creates the analysis.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn locations_alias(body: &MethodBody, a: &MemLoc, b: &MemLoc) -> bool {
        match (a, b) {
            (MemLoc::Var(x), MemLoc::Var(y)) => x == y,
            (MemLoc::Var(v), MemLoc::Unknown) | (MemLoc::Unknown, MemLoc::Var(v)) => {
                body.var(*v).is_exposed()
            }
            (MemLoc::Var(_), _) | (_, MemLoc::Var(_)) => false,
            (MemLoc::Field(f), MemLoc::Field(g)) => f == g,
            (MemLoc::Field(_), MemLoc::ArrayElem | MemLoc::ArrayLen)
            | (MemLoc::ArrayElem | MemLoc::ArrayLen, MemLoc::Field(_)) => false,
            (MemLoc::ArrayElem, MemLoc::ArrayElem) => true,
            (MemLoc::ArrayElem, MemLoc::ArrayLen) | (MemLoc::ArrayLen, MemLoc::ArrayElem) => false,
            (MemLoc::ArrayLen, MemLoc::ArrayLen) => false,
            (MemLoc::Unknown, _) | (_, MemLoc::Unknown) => true,
        }
    }
}

impl AliasAnalysis for TypeBasedAlias {
    fn may_alias(&self, body: &MethodBody, a: crate::ir::InstId, b: crate::ir::InstId) -> bool {
        let loc_a = access_location(body, body.inst(a));
        let loc_b = access_location(body, body.inst(b));
        Self::locations_alias(body, &loc_a, &loc_b)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ir::BodyBuilder;
    use crate::types::{FieldDesc, Type};

    fn field(name: &str) -> Arc<FieldDesc> {
        Arc::new(FieldDesc {
            name: name.into(),
            decl_type: Type::Object,
            ty: Type::I32,
            is_static: false,
        })
    }

    #[test]
    fn test_distinct_fields_never_alias() {
        let mut loads = Vec::new();
        let body = BodyBuilder::new(&[("o", Type::Object)]).build_with(|f| {
            f.block(0, |b| {
                let o = b.arg(0);
                let fa = b.field_addr(field("x"), Some(o.clone()));
                let ga = b.field_addr(field("y"), Some(o));
                let l1 = b.load(Type::I32, fa);
                let l2 = b.load(Type::I32, ga);
                loads.push(l1.as_inst().unwrap());
                loads.push(l2.as_inst().unwrap());
                b.ret();
            });
        });

        let alias = TypeBasedAlias::new();
        assert!(!alias.may_alias(&body, loads[0], loads[1]));
        assert!(alias.may_alias(&body, loads[0], loads[0]));
    }

    #[test]
    fn test_unexposed_var_never_aliases_unknown() {
        let mut insts = Vec::new();
        let body = BodyBuilder::new(&[("p", Type::Byref(Arc::new(Type::I32)))]).build_with(|f| {
            let v = f.var("t", Type::I32, false);
            f.block(0, |b| {
                let p = b.arg(0);
                let lv = b.load_var(v);
                let unknown = b.load(Type::I32, p);
                insts.push(lv.as_inst().unwrap());
                insts.push(unknown.as_inst().unwrap());
                b.ret();
            });
        });

        let alias = TypeBasedAlias::new();
        assert!(!alias.may_alias(&body, insts[0], insts[1]));
    }

    #[test]
    fn test_exposed_var_aliases_unknown() {
        let mut insts = Vec::new();
        let body = BodyBuilder::new(&[("p", Type::Byref(Arc::new(Type::I32)))]).build_with(|f| {
            let v = f.var("t", Type::I32, true);
            f.block(0, |b| {
                let p = b.arg(0);
                let lv = b.load_var(v);
                let unknown = b.load(Type::I32, p);
                insts.push(lv.as_inst().unwrap());
                insts.push(unknown.as_inst().unwrap());
                b.ret();
            });
        });

        let alias = TypeBasedAlias::new();
        assert!(alias.may_alias(&body, insts[0], insts[1]));
    }

    #[test]
    fn test_array_elements_alias_conservatively() {
        let mut insts = Vec::new();
        let arr_ty = Type::Array(Arc::new(Type::I32));
        let body = BodyBuilder::new(&[("a", arr_ty.clone()), ("b", arr_ty)]).build_with(|f| {
            f.block(0, |b| {
                let a = b.arg(0);
                let b_arr = b.arg(1);
                let i = b.const_i32(0);
                let ea = b.array_addr(Type::I32, a, i.clone());
                let eb = b.array_addr(Type::I32, b_arr, i);
                let l1 = b.load(Type::I32, ea);
                let l2 = b.load(Type::I32, eb);
                insts.push(l1.as_inst().unwrap());
                insts.push(l2.as_inst().unwrap());
                b.ret();
            });
        });

        let alias = TypeBasedAlias::new();
        assert!(alias.may_alias(&body, insts[0], insts[1]));
    }
}
