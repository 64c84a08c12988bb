//! Dead code elimination.
//!
//! The pass performs three steps:
//!
//! 1. **Unreachable-block removal.** A depth-first traversal from the entry
//!    block follows successor edges; guards in visited blocks root their
//!    handler and filter blocks, which are reachable only through exception
//!    edges. Conditional branches on constants are folded during the
//!    traversal, so blocks only reachable through a never-taken edge count
//!    as unreachable. Unvisited blocks are removed, their phi contributions
//!    first.
//! 2. **Useless-instruction removal.** Mark-and-sweep over the use-def
//!    graph, seeded with every instruction that is not safe to remove.
//! 3. **Trivial-phi peeling.** Phis whose arguments all resolve to one
//!    value (ignoring self-references) are replaced by that value,
//!    iteratively following phi chains.
//!
//! Running the pass a second time on its own output changes nothing.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, Const, InstId, InstKind, MethodBody, Value};
use crate::passes::{Invalidations, Pass};
use crate::Result;

/// Dead code elimination pass.
#[derive(Debug, Default)]
pub struct DeadCodePass;

impl DeadCodePass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when a constant condition takes the first target.
    fn const_cond_taken(cond: &Const) -> Option<bool> {
        match cond {
            Const::Int { value, .. } => Some(*value != 0),
            Const::Null => Some(false),
            _ => None,
        }
    }

    /// DFS from the entry block, folding constant conditional branches as
    /// they are visited. Returns the visited set and whether any branch was
    /// folded.
    fn find_reachable(body: &mut MethodBody) -> (FxHashSet<BlockId>, bool) {
        let mut visited = FxHashSet::default();
        let mut folded = false;
        let mut stack = vec![body.entry_block()];

        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }

            if let Some(term) = body.terminator(block) {
                let data = body.inst(term);
                if matches!(data.kind(), InstKind::Branch) && data.operands().len() == 1 {
                    if let Some(taken) = data.operands()[0]
                        .as_const()
                        .and_then(Self::const_cond_taken)
                    {
                        let target = data.block_args()[usize::from(!taken)];
                        body.set_branch(block, target);
                        folded = true;
                        log::debug!("folded constant branch in {block}");
                    }
                }
            }

            for succ in body.block(block).succs() {
                stack.push(*succ);
            }
            // Handler and filter blocks are reachable through exception
            // edges rooted at the guards of this block.
            let mut cur = body.block(block).first();
            while let Some(id) = cur {
                let data = body.inst(id);
                if !data.is_header() {
                    break;
                }
                if matches!(data.kind(), InstKind::Guard { .. }) {
                    stack.extend(data.block_args().iter().copied());
                }
                cur = data.next();
            }
        }

        (visited, folded)
    }

    /// Mark-and-sweep over the use-def graph. Returns the number of
    /// instructions removed.
    fn sweep_dead_insts(body: &mut MethodBody) -> usize {
        let mut live: FxHashSet<InstId> = FxHashSet::default();
        let mut worklist: Vec<InstId> = Vec::new();

        for inst in body.iter_insts() {
            if !body.inst(inst).kind().safe_to_remove() {
                if live.insert(inst) {
                    worklist.push(inst);
                }
            }
        }
        while let Some(inst) = worklist.pop() {
            for operand in body.inst(inst).operands() {
                if let Some(def) = operand.as_inst() {
                    if live.insert(def) {
                        worklist.push(def);
                    }
                }
            }
        }

        let dead: Vec<InstId> = body.iter_insts().filter(|i| !live.contains(i)).collect();
        // Dead instructions may use each other: drop all their operand uses
        // before detaching any of them.
        for &inst in &dead {
            body.clear_operands(inst);
        }
        for &inst in &dead {
            body.remove_inst(inst);
        }
        dead.len()
    }

    /// Replaces phis whose arguments all resolve to one value, following
    /// chains until nothing changes. Returns the number of phis peeled.
    fn peel_trivial_phis(body: &mut MethodBody) -> usize {
        let mut peeled = 0;
        loop {
            let mut changed = false;
            let phis: Vec<InstId> = body
                .blocks()
                .flat_map(|b| body.block_phis(b).collect::<Vec<_>>())
                .collect();

            for phi in phis {
                let this = Value::Inst(phi);
                let mut unique: Option<Value> = None;
                let mut trivial = true;
                for (_, value) in body.inst(phi).phi_args() {
                    if *value == this {
                        continue;
                    }
                    match &unique {
                        None => unique = Some(value.clone()),
                        Some(u) if u == value => {}
                        Some(_) => {
                            trivial = false;
                            break;
                        }
                    }
                }
                if !trivial {
                    continue;
                }
                match unique {
                    Some(value) => {
                        body.replace_with(phi, value);
                        peeled += 1;
                        changed = true;
                    }
                    None => {
                        // Every argument is the phi itself; the value is
                        // undefined and can only feed itself.
                        let external_uses = body
                            .uses(&this)
                            .filter(|u| u.user != phi)
                            .count();
                        if external_uses == 0 {
                            body.clear_operands(phi);
                            body.remove_inst(phi);
                            peeled += 1;
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                return peeled;
            }
        }
    }
}

impl Pass for DeadCodePass {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn run(&self, body: &mut MethodBody) -> Result<Invalidations> {
        let mut invalidations = Invalidations::empty();

        let (reachable, folded) = Self::find_reachable(body);
        if folded {
            invalidations |= Invalidations::ALL;
        }

        let unreachable: Vec<BlockId> = body.blocks().filter(|b| !reachable.contains(b)).collect();
        for block in &unreachable {
            body.remove_block(*block);
        }
        if !unreachable.is_empty() {
            invalidations |= Invalidations::ALL;
        }

        let mut removed = Self::sweep_dead_insts(body);
        let peeled = Self::peel_trivial_phis(body);
        if peeled > 0 {
            // Peeling drops the phi's operand uses; definitions may now be
            // dead.
            removed += Self::sweep_dead_insts(body);
        }
        if removed + peeled > 0 {
            invalidations |= Invalidations::INSTRUCTIONS;
        }

        Ok(invalidations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify, BodyBuilder};
    use crate::types::Type;

    fn run(body: &mut MethodBody) -> Invalidations {
        DeadCodePass::new().run(body).unwrap()
    }

    #[test]
    fn test_fold_constant_conditional() {
        // br (true ? B1 : B2); B1 returns 1, B2 returns 2
        let mut body = BodyBuilder::new(&[]).build_with(|f| {
            f.block(0, |b| {
                let t = b.const_i32(1);
                b.branch(t, 1, 2);
            });
            f.block(1, |b| {
                let one = b.const_i32(1);
                b.ret_val(one);
            });
            f.block(2, |b| {
                let two = b.const_i32(2);
                b.ret_val(two);
            });
        });

        let inv = run(&mut body);
        assert!(inv.contains(Invalidations::CONTROL_FLOW));
        assert_eq!(body.num_blocks(), 2);

        let entry = body.entry_block();
        let term = body.terminator(entry).unwrap();
        assert!(body.inst(term).operands().is_empty(), "branch is now a jump");
        assert_eq!(body.block(entry).num_succs(), 1);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_trivial_phi_peel() {
        // phi [P1 -> 7, P2 -> 7] peels to the constant
        let mut body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| b.branch(b.arg(0), 1, 2));
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let x1 = b.const_i32(7);
                let x2 = b.const_i32(7);
                let merged = b.phi(Type::I32, &[(1, x1), (2, x2)]);
                b.ret_val(merged);
            });
        });

        run(&mut body);

        let merge = body
            .blocks()
            .find(|b| body.block(*b).num_preds() == 2)
            .unwrap();
        assert_eq!(body.block_phis(merge).count(), 0);
        let term = body.terminator(merge).unwrap();
        assert_eq!(
            body.inst(term).operands()[0],
            Value::Const(Const::i32(7))
        );
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_cascading_dead_code() {
        // v1 = add x, y; v2 = mul v1, x; nothing uses v2 — both die
        let mut body = BodyBuilder::new(&[("x", Type::I32), ("y", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let v1 = b.add(b.arg(0), b.arg(1));
                let _v2 = b.mul(v1, b.arg(0));
                b.ret();
            });
        });

        run(&mut body);

        let entry = body.entry_block();
        assert_eq!(body.block_insts(entry).count(), 1, "only the return survives");
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_side_effects_survive() {
        let mut body = BodyBuilder::new(&[("p", Type::Byref(std::sync::Arc::new(Type::I32)))])
            .build_with(|f| {
                f.block(0, |b| {
                    let v = b.const_i32(3);
                    b.store(b.arg(0), v);
                    b.ret();
                });
            });

        run(&mut body);
        let entry = body.entry_block();
        assert_eq!(body.block_insts(entry).count(), 2, "store and return remain");
    }

    #[test]
    fn test_unreachable_block_contributions_pruned() {
        // Entry jumps straight to the merge; the side block is unreachable
        // but contributes a phi argument that must be deleted first.
        let mut body = BodyBuilder::new(&[]).build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let merged = b.phi(Type::I32, &[(0, one), (1, two)]);
                b.ret_val(merged);
            });
        });

        run(&mut body);

        assert_eq!(body.num_blocks(), 2);
        let merge = body.blocks().nth(1).unwrap();
        // The phi became trivial after pruning and was peeled.
        assert_eq!(body.block_phis(merge).count(), 0);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_idempotent() {
        let mut body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| {
                let t = b.const_i32(0);
                b.branch(t, 1, 2);
            });
            f.block(1, |b| {
                let one = b.const_i32(1);
                b.ret_val(one);
            });
            f.block(2, |b| {
                let two = b.const_i32(2);
                b.ret_val(two);
            });
        });

        run(&mut body);
        let after_first = body.to_string();
        let inv = run(&mut body);
        assert_eq!(inv, Invalidations::empty());
        assert_eq!(body.to_string(), after_first);
    }

    #[test]
    fn test_phi_chain_peels() {
        // p1 = phi [B0 -> 7]; p2 = phi [B1 -> p1] — both peel to 7
        let mut p1 = None;
        let mut body = BodyBuilder::new(&[]).build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                let seven = b.const_i32(7);
                p1 = Some(b.phi(Type::I32, &[(0, seven)]));
                b.jump(2);
            });
            f.block(2, |b| {
                let p2 = b.phi(Type::I32, &[(1, p1.clone().unwrap())]);
                b.ret_val(p2);
            });
        });

        run(&mut body);
        for block in body.blocks().collect::<Vec<_>>() {
            assert_eq!(body.block_phis(block).count(), 0);
            let term = body.terminator(block).unwrap();
            if matches!(body.inst(term).kind(), crate::ir::InstKind::Return) {
                assert_eq!(body.inst(term).operands()[0], Value::Const(Const::i32(7)));
            }
        }
        assert_eq!(verify::verify(&body), Ok(()));
    }
}
