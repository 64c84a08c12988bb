//! Forest analysis: reconstructing expression trees from linear SSA.
//!
//! Code generation wants to emit `b = mul (add x, y), z` as one expression
//! instead of two statements with a temporary. This analysis decides, per
//! instruction, whether it can be emitted inline inside its user (*leaf*)
//! or must become its own statement (*root*).
//!
//! # Algorithm
//!
//! Each block is walked in reverse. An operand of the current instruction
//! becomes a leaf when it is an instruction defined in the same block, is
//! not a phi, and is either single-use or cheap to rematerialize (field
//! addresses, struct field extracts, the `arrlen`/`sizeof` intrinsics).
//! Inlining moves the operand's evaluation down to its use point, so every
//! instruction strictly between definition and use is checked for hazards:
//! a side-effecting or memory-writing instruction that may alias the
//! candidate blocks the move. Already-marked leaves are skipped during the
//! hazard walk since they too will be emitted past the definition. Two
//! non-writing accesses commute, exceptions included.
//!
//! # Known limitation
//!
//! Trees whose operands interleave across statements, such as
//! `store (r2 = arraddr ..), (r1 = call ..)`, are not recovered; `r1` stays
//! a root even when inlining would be legal.

use rustc_hash::FxHashSet;

use crate::analysis::alias::AliasAnalysis;
use crate::ir::{BlockId, CilIntrinsic, InstId, InstKind, MethodBody, Value};

/// Leaf/root classification of every instruction in one method body.
///
/// # Invariants
///
/// - phi and guard instructions are never leaves
/// - a single-use leaf is defined in the same block as its sole user
#[derive(Debug, Default)]
pub struct Forest {
    leaves: FxHashSet<InstId>,
}

impl Forest {
    /// Computes the classification for `body` against the given alias
    /// oracle.
    #[must_use]
    pub fn compute(body: &MethodBody, alias: &dyn AliasAnalysis) -> Self {
        let mut forest = Self::default();
        for block in body.blocks() {
            forest.compute_block(body, alias, block);
        }
        forest
    }

    /// Returns `true` if `inst` will be emitted inline inside its user.
    #[must_use]
    pub fn is_leaf(&self, inst: InstId) -> bool {
        self.leaves.contains(&inst)
    }

    /// Returns `true` if `inst` will be emitted as its own statement.
    #[must_use]
    pub fn is_tree_root(&self, inst: InstId) -> bool {
        !self.is_leaf(inst)
    }

    /// Overrides the classification of one instruction.
    pub fn set_leaf(&mut self, inst: InstId, leaf: bool) {
        if leaf {
            self.leaves.insert(inst);
        } else {
            self.leaves.remove(&inst);
        }
    }

    fn compute_block(&mut self, body: &MethodBody, alias: &dyn AliasAnalysis, block: BlockId) {
        let insts: Vec<InstId> = body.block_insts(block).collect();
        for &user in insts.iter().rev() {
            // Codegen cannot inline into phis or guards.
            if body.inst(user).is_header() {
                continue;
            }
            // A rematerialized leaf is re-emitted at each use site; its own
            // operands stay roots.
            if self.is_leaf(user) && body.inst(user).num_uses() != 1 {
                continue;
            }
            for operand in body.inst(user).operands() {
                let Some(def) = operand.as_inst() else {
                    continue;
                };
                self.try_mark_leaf(body, alias, block, def, user);
            }
        }
    }

    fn try_mark_leaf(
        &mut self,
        body: &MethodBody,
        alias: &dyn AliasAnalysis,
        block: BlockId,
        def: InstId,
        user: InstId,
    ) {
        if self.is_leaf(def) {
            return;
        }
        let data = body.inst(def);
        if data.block() != Some(block) || data.is_header() || data.result_type().is_void() {
            return;
        }

        let single_use = data.num_uses() == 1;
        if single_use {
            if self.has_hazard(body, alias, def, user) {
                return;
            }
        } else {
            if !Self::is_cheap_to_rematerialize(data.kind()) {
                return;
            }
            // Codegen cannot inline into phis, and rematerialization must
            // be legal at every use site.
            for use_ref in body.uses(&Value::Inst(def)) {
                let u = body.inst(use_ref.user);
                if matches!(u.kind(), InstKind::Phi) || u.block() != Some(block) {
                    return;
                }
                if self.has_hazard(body, alias, def, use_ref.user) {
                    return;
                }
            }
        }
        self.leaves.insert(def);
    }

    fn is_cheap_to_rematerialize(kind: &InstKind) -> bool {
        matches!(
            kind,
            InstKind::FieldAddr(_)
                | InstKind::ExtractField(_)
                | InstKind::Intrinsic(CilIntrinsic::ArrayLen | CilIntrinsic::SizeOf(_))
        )
    }

    /// Walks the instructions strictly between `def` and `use_site`,
    /// checking whether any of them forbids delaying `def`'s evaluation.
    fn has_hazard(
        &self,
        body: &MethodBody,
        alias: &dyn AliasAnalysis,
        def: InstId,
        use_site: InstId,
    ) -> bool {
        let def_touches_memory =
            body.inst(def).kind().may_read_memory() || body.inst(def).kind().may_write_memory();
        if !def_touches_memory {
            return false;
        }

        let mut cur = body.inst(def).next();
        while let Some(id) = cur {
            if id == use_site {
                return false;
            }
            // Marked leaves are emitted later, past the definition.
            if !self.is_leaf(id) {
                let kind = body.inst(id).kind();
                if (kind.may_write_memory() || kind.has_side_effects())
                    && alias.may_alias(body, def, id)
                {
                    return true;
                }
            }
            cur = body.inst(id).next();
        }
        // The walk should always reach the use; treat a broken chain as a
        // hazard.
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::alias::TypeBasedAlias;
    use crate::ir::{BodyBuilder, MethodBody, Value};
    use crate::types::{FieldDesc, Type};

    fn compute(body: &MethodBody) -> Forest {
        Forest::compute(body, &TypeBasedAlias::new())
    }

    #[test]
    fn test_single_use_chain_becomes_leaves() {
        // a = add x, y; b = mul a, z; ret b
        let mut ids = Vec::new();
        let body = BodyBuilder::new(&[
            ("x", Type::I32),
            ("y", Type::I32),
            ("z", Type::I32),
        ])
        .build_with(|f| {
            f.block(0, |b| {
                let a = b.add(b.arg(0), b.arg(1));
                let prod = b.mul(a.clone(), b.arg(2));
                ids.push(a.as_inst().unwrap());
                ids.push(prod.as_inst().unwrap());
                b.ret_val(prod);
            });
        });

        let forest = compute(&body);
        assert!(forest.is_leaf(ids[0]), "add feeds one user inline");
        // The mul feeds the return, which consumes it as a statement operand.
        assert!(forest.is_leaf(ids[1]));
    }

    #[test]
    fn test_second_user_blocks_leaf() {
        // a = add x, y; b = mul a, z; c = mul a, z  — a has two users
        let mut a_id = None;
        let body = BodyBuilder::new(&[("x", Type::I32), ("y", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let a = b.add(b.arg(0), b.arg(1));
                a_id = a.as_inst();
                let p1 = b.mul(a.clone(), b.arg(0));
                let p2 = b.mul(a, b.arg(1));
                let sum = b.add(p1, p2);
                b.ret_val(sum);
            });
        });

        let forest = compute(&body);
        assert!(
            forest.is_tree_root(a_id.unwrap()),
            "multi-use add is not on the rematerialize list"
        );
    }

    #[test]
    fn test_multi_use_field_addr_rematerializes() {
        let field = Arc::new(FieldDesc {
            name: "x".into(),
            decl_type: Type::Object,
            ty: Type::I32,
            is_static: false,
        });
        let mut addr_id = None;
        let body = BodyBuilder::new(&[("o", Type::Object)]).build_with(|f| {
            f.block(0, |b| {
                let addr = b.field_addr(field, Some(b.arg(0)));
                addr_id = addr.as_inst();
                let v1 = b.load(Type::I32, addr.clone());
                let v2 = b.load(Type::I32, addr);
                let sum = b.add(v1, v2);
                b.ret_val(sum);
            });
        });

        let forest = compute(&body);
        assert!(forest.is_leaf(addr_id.unwrap()));
    }

    #[test]
    fn test_phi_never_leaf() {
        let mut phi_id = None;
        let body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| b.branch(b.arg(0), 1, 2));
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let merged = b.phi(Type::I32, &[(1, one), (2, two)]);
                phi_id = merged.as_inst();
                let doubled = b.add(merged.clone(), merged);
                b.ret_val(doubled);
            });
        });

        let forest = compute(&body);
        assert!(forest.is_tree_root(phi_id.unwrap()));
    }

    #[test]
    fn test_store_hazard_blocks_load_leaf() {
        // a = load p; store q, v; b = add a, 1 — p and q may alias
        let byref_i32 = Type::Byref(Arc::new(Type::I32));
        let mut load_id = None;
        let body = BodyBuilder::new(&[
            ("p", byref_i32.clone()),
            ("q", byref_i32),
            ("v", Type::I32),
        ])
        .build_with(|f| {
            f.block(0, |b| {
                let loaded = b.load(Type::I32, b.arg(0));
                load_id = loaded.as_inst();
                b.store(b.arg(1), b.arg(2));
                let one = b.const_i32(1);
                let sum = b.add(loaded, one);
                b.ret_val(sum);
            });
        });

        let forest = compute(&body);
        // Both addresses are unresolvable byref arguments: may alias.
        assert!(forest.is_tree_root(load_id.unwrap()));
    }

    #[test]
    fn test_disjoint_fields_allow_load_leaf() {
        // a = load o.x; store o.y, v; b = add a, 1 — fields cannot alias
        let field_x = Arc::new(FieldDesc {
            name: "x".into(),
            decl_type: Type::Object,
            ty: Type::I32,
            is_static: false,
        });
        let field_y = Arc::new(FieldDesc {
            name: "y".into(),
            decl_type: Type::Object,
            ty: Type::I32,
            is_static: false,
        });
        let mut load_id = None;
        let body = BodyBuilder::new(&[("o", Type::Object), ("v", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let xa = b.field_addr(field_x, Some(b.arg(0)));
                let loaded = b.load(Type::I32, xa);
                load_id = loaded.as_inst();
                let ya = b.field_addr(field_y, Some(b.arg(0)));
                b.store(ya, b.arg(1));
                let one = b.const_i32(1);
                let sum = b.add(loaded, one);
                b.ret_val(sum);
            });
        });

        let forest = compute(&body);
        assert!(forest.is_leaf(load_id.unwrap()));
    }

    #[test]
    fn test_two_loads_commute() {
        let byref_i32 = Type::Byref(Arc::new(Type::I32));
        let mut first_load = None;
        let body =
            BodyBuilder::new(&[("p", byref_i32.clone()), ("q", byref_i32)]).build_with(|f| {
                f.block(0, |b| {
                    let a = b.load(Type::I32, b.arg(0));
                    first_load = a.as_inst();
                    let c = b.load(Type::I32, b.arg(1));
                    let sum = b.add(a, c);
                    b.ret_val(sum);
                });
            });

        let forest = compute(&body);
        assert!(
            forest.is_leaf(first_load.unwrap()),
            "a non-writing access between load and use is no hazard"
        );
    }

    #[test]
    fn test_cross_block_operand_stays_root() {
        let mut def_id = None;
        let body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let a = b.add(b.arg(0), b.arg(0));
                def_id = a.as_inst();
                b.jump(1);
            });
            f.block(1, |b| {
                let one = b.const_i32(1);
                // `a` flows in from block 0.
                let sum = b.add(Value::Inst(def_id.unwrap()), one);
                b.ret_val(sum);
            });
        });

        let forest = compute(&body);
        assert!(forest.is_tree_root(def_id.unwrap()));
    }
}
