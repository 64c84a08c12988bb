//! Control-flow graph simplification.
//!
//! Two rewrites run to a fixpoint:
//!
//! 1. **Compare-to-zero inversion.** `br (x == 0 ? T : F)` becomes
//!    `br (x ? F : T)` and `br (x != 0 ? T : F)` becomes `br (x ? T : F)`;
//!    the compare is deleted when nothing else uses it.
//! 2. **Single-predecessor merge.** A block ending in an unconditional
//!    jump to a successor with exactly one predecessor and no header
//!    instructions absorbs that successor: its instructions are spliced in,
//!    its successors' phis are rewired to name the absorbing block, and the
//!    empty block is removed.
//!
//! Every iteration either merges a block or rewrites a branch, so the
//! fixpoint is reached in a number of iterations linear in the block count.

use crate::ir::{BlockId, CmpOp, Const, InstId, InstKind, MethodBody, Value};
use crate::passes::{Invalidations, Pass};
use crate::Result;

/// Control-flow simplification pass.
#[derive(Debug, Default)]
pub struct SimplifyCfgPass;

impl SimplifyCfgPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_zero(value: &Value) -> bool {
        matches!(
            value.as_const(),
            Some(Const::Int { value: 0, .. } | Const::Null)
        )
    }

    /// Rewrites one conditional branch whose condition compares against
    /// zero. Returns `true` on change.
    fn invert_compare_to_zero(body: &mut MethodBody, block: BlockId, term: InstId) -> bool {
        let data = body.inst(term);
        if !matches!(data.kind(), InstKind::Branch) || data.operands().len() != 1 {
            return false;
        }
        let Some(cmp) = data.operands()[0].as_inst() else {
            return false;
        };
        let op = match body.inst(cmp).kind() {
            InstKind::Cmp(op @ (CmpOp::Eq | CmpOp::Ne)) => *op,
            _ => return false,
        };

        let (left, right) = {
            let ops = body.inst(cmp).operands();
            (ops[0].clone(), ops[1].clone())
        };
        let scrutinee = if Self::is_zero(&right) {
            left
        } else if Self::is_zero(&left) {
            right
        } else {
            return false;
        };

        body.set_operand(term, 0, scrutinee);
        if op == CmpOp::Eq {
            // `x == 0 ? T : F` tests the negation of x: swap the targets.
            let then_b = body.inst(term).block_args()[0];
            let else_b = body.inst(term).block_args()[1];
            body.set_branch_target(term, 0, else_b);
            body.set_branch_target(term, 1, then_b);
        }
        if body.num_uses(&Value::Inst(cmp)) == 0 {
            body.remove_inst(cmp);
        }
        log::debug!("inverted compare-to-zero branch in {block}");
        true
    }

    /// Absorbs `succ` into `block`. Returns `true` on change.
    fn merge_into(body: &mut MethodBody, block: BlockId, succ: BlockId) -> bool {
        let Some(jump) = body.terminator(block) else {
            return false;
        };
        let Some(first) = body.block(succ).first() else {
            return false;
        };
        let last = body.block(succ).last().expect("nonempty block has a last");

        body.remove_inst(jump);
        let splice_after = body.block(block).last();
        body.move_range(block, splice_after, first, last);
        body.redirect_succ_phis(block, succ);
        body.remove_block(succ);
        log::debug!("merged {succ} into {block}");
        true
    }

    /// Finds a merge candidate: `block` ends in an unconditional jump to a
    /// single-predecessor, headerless block other than itself.
    fn merge_candidate(body: &MethodBody, block: BlockId) -> Option<BlockId> {
        let term = body.terminator(block)?;
        let data = body.inst(term);
        if !matches!(data.kind(), InstKind::Branch) || !data.operands().is_empty() {
            return None;
        }
        let succ = data.block_args()[0];
        if succ == block || body.has_header(succ) {
            return None;
        }
        let preds = body.block(succ).preds();
        if preds.len() != 1 || preds[0] != block {
            return None;
        }
        Some(succ)
    }

    fn run_iteration(body: &mut MethodBody) -> bool {
        let blocks: Vec<BlockId> = body.blocks().collect();
        let mut changed = false;
        for block in blocks {
            if body.block(block).is_removed() {
                continue;
            }
            if let Some(term) = body.terminator(block) {
                changed |= Self::invert_compare_to_zero(body, block, term);
            }
            if let Some(succ) = Self::merge_candidate(body, block) {
                changed |= Self::merge_into(body, block, succ);
            }
        }
        changed
    }
}

impl Pass for SimplifyCfgPass {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(&self, body: &mut MethodBody) -> Result<Invalidations> {
        let mut changed = false;
        // Each productive iteration removes a block or finishes a branch
        // rewrite; the block count bounds the fixpoint.
        let max_iterations = body.num_blocks() + 1;
        for _ in 0..max_iterations {
            if !Self::run_iteration(body) {
                break;
            }
            changed = true;
        }
        Ok(if changed {
            Invalidations::ALL
        } else {
            Invalidations::empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify, BodyBuilder};
    use crate::types::Type;

    fn run(body: &mut MethodBody) -> Invalidations {
        SimplifyCfgPass::new().run(body).unwrap()
    }

    #[test]
    fn test_compare_ne_zero_inversion() {
        // br (x != 0 ? T : F) → br (x ? T : F), compare deleted
        let mut body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let zero = b.const_i32(0);
                let cond = b.cmp(CmpOp::Ne, b.arg(0), zero);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });

        run(&mut body);

        let entry = body.entry_block();
        let term = body.terminator(entry).unwrap();
        assert_eq!(
            body.inst(term).operands()[0],
            crate::ir::Value::Arg(crate::ir::ArgId::from_index(0))
        );
        // The dead compare is gone: only the branch remains.
        assert_eq!(body.block_insts(entry).count(), 1);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_compare_eq_zero_swaps_targets() {
        let mut body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let zero = b.const_i32(0);
                let cond = b.cmp(CmpOp::Eq, b.arg(0), zero);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });

        let then_before = {
            let term = body.terminator(body.entry_block()).unwrap();
            body.inst(term).block_args()[0]
        };
        run(&mut body);
        let term = body.terminator(body.entry_block()).unwrap();
        assert_eq!(body.inst(term).block_args()[1], then_before);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_compare_with_other_users_survives() {
        let mut body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let zero = b.const_i32(0);
                let cond = b.cmp(CmpOp::Ne, b.arg(0), zero);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });

        // Give the compare a second user before running the pass.
        let entry = body.entry_block();
        let cmp = body.block_insts(entry).next().unwrap();
        let extra = body.create_inst(
            InstKind::Return,
            Type::Void,
            vec![Value::Inst(cmp)],
            vec![],
        );
        let side = body.create_block(None);
        body.append(side, extra);

        run(&mut body);
        assert_eq!(body.num_uses(&Value::Inst(cmp)), 1, "compare kept one user");
    }

    #[test]
    fn test_single_pred_merge() {
        // B0: ..; jmp B1. B1 has only B0 as pred — absorbed.
        let mut phi_val = None;
        let mut body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let v = b.add(b.arg(0), b.arg(0));
                let _ = v;
                b.jump(1);
            });
            f.block(1, |b| {
                let w = b.mul(b.arg(0), b.arg(0));
                phi_val = Some(w.clone());
                b.jump(2);
            });
            f.block(2, |b| {
                let merged = b.phi(Type::I32, &[(1, phi_val.clone().unwrap())]);
                b.ret_val(merged);
            });
        });

        run(&mut body);

        // B1 was absorbed into B0; B2's phi now names B0. The phi is
        // single-argument but peeling it is dead-code's job, not ours.
        let entry = body.entry_block();
        let succ_phi = body
            .blocks()
            .flat_map(|b| body.block_phis(b).collect::<Vec<_>>())
            .next()
            .unwrap();
        assert_eq!(body.inst(succ_phi).block_args(), &[entry]);
        assert_eq!(body.num_blocks(), 2);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_no_merge_with_headers() {
        // The successor has a phi, so it keeps its own block.
        let mut body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| b.branch(b.arg(0), 1, 2));
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let merged = b.phi(Type::I32, &[(1, one), (2, two)]);
                b.ret_val(merged);
            });
        });

        run(&mut body);
        assert_eq!(body.num_blocks(), 4, "nothing merges across the phi");
    }

    #[test]
    fn test_jump_chain_collapses() {
        let mut body = BodyBuilder::new(&[]).build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });

        let inv = run(&mut body);
        assert!(inv.contains(Invalidations::CONTROL_FLOW));
        assert_eq!(body.num_blocks(), 1);
        let entry = body.entry_block();
        assert_eq!(body.block_insts(entry).count(), 1);
        assert_eq!(verify::verify(&body), Ok(()));
    }

    #[test]
    fn test_self_loop_not_merged() {
        let mut body = BodyBuilder::new(&[]).build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.jump(1));
        });

        run(&mut body);
        // The self-loop block cannot absorb itself.
        assert!(body.num_blocks() >= 1);
    }
}
