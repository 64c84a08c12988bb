//! Structural invariant checking for method bodies.
//!
//! The checker re-derives every bookkept quantity from scratch — use counts
//! from operand slots, edges from terminators — and reports all mismatches
//! instead of stopping at the first. Tests run it after every import and
//! every pass; it is debug tooling, not part of any hot path.

use rustc_hash::FxHashMap;

use crate::ir::inst::InstKind;
use crate::ir::{ArgId, InstId, MethodBody, Value, VarId};

/// Hashable identity of a tracked value (constants carry no use lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TrackedKey {
    Arg(ArgId),
    Var(VarId),
    Inst(InstId),
}

impl TrackedKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Const(_) => None,
            Value::Arg(a) => Some(TrackedKey::Arg(*a)),
            Value::Var(v) => Some(TrackedKey::Var(*v)),
            Value::Inst(i) => Some(TrackedKey::Inst(*i)),
        }
    }

    fn value(self) -> Value {
        match self {
            TrackedKey::Arg(a) => Value::Arg(a),
            TrackedKey::Var(v) => Value::Var(v),
            TrackedKey::Inst(i) => Value::Inst(i),
        }
    }
}

/// Checks the body's structural invariants, returning every violation
/// found.
///
/// Checked:
/// - the entry block has zero predecessors
/// - every block's last instruction is a terminator, and no terminator
///   appears mid-block
/// - header instructions precede all non-header instructions
/// - each phi has exactly one argument per predecessor of its block
/// - for every tracked value, `num_uses` equals the number of operand slots
///   referencing it, and the use list walk visits exactly those slots
///
/// # Errors
///
/// Returns the list of violation descriptions when any invariant fails.
pub fn verify(body: &MethodBody) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if body.block(body.entry_block()).num_preds() != 0 {
        errors.push(format!(
            "entry block {} has {} predecessors",
            body.entry_block(),
            body.block(body.entry_block()).num_preds()
        ));
    }

    for block in body.blocks() {
        let mut seen_non_header = false;
        let mut seen_terminator = false;
        for inst in body.block_insts(block) {
            let data = body.inst(inst);
            if seen_terminator {
                errors.push(format!("{block}: instruction {inst} follows a terminator"));
            }
            if data.is_header() {
                if seen_non_header {
                    errors.push(format!(
                        "{block}: header {inst} follows a non-header instruction"
                    ));
                }
            } else {
                seen_non_header = true;
            }
            if data.is_terminator() {
                seen_terminator = true;
            }

            if let InstKind::Phi = data.kind() {
                let preds = body.block(block).preds();
                if data.operands().len() != preds.len() {
                    errors.push(format!(
                        "{block}: phi {inst} has {} arguments for {} predecessors",
                        data.operands().len(),
                        preds.len()
                    ));
                }
                for pred in preds {
                    if data.phi_value_for(*pred).is_none() {
                        errors.push(format!(
                            "{block}: phi {inst} is missing an argument for predecessor {pred}"
                        ));
                    }
                }
            }
        }
        if body.terminator(block).is_none() {
            errors.push(format!("{block}: last instruction is not a terminator"));
        }
    }

    // Re-derive use counts from operand slots.
    let mut expected: FxHashMap<TrackedKey, u32> = FxHashMap::default();
    for inst in body.iter_insts() {
        for op in body.inst(inst).operands() {
            if let Some(key) = TrackedKey::of(op) {
                *expected.entry(key).or_insert(0) += 1;
            }
        }
    }
    for (key, &want) in &expected {
        let value = &key.value();
        let have = body.num_uses(value);
        if have != want {
            errors.push(format!(
                "use count of {value:?} is {have}, but {want} operand slots reference it"
            ));
        }
        let walked = body.uses(value).count();
        if walked != want as usize {
            errors.push(format!(
                "use list of {value:?} walks {walked} entries, expected {want}"
            ));
        }
        for use_ref in body.uses(value) {
            let slot = &body.inst(use_ref.user).operands()[use_ref.index as usize];
            if slot != value {
                errors.push(format!(
                    "use list of {value:?} points at slot ({}, {}) holding {slot:?}",
                    use_ref.user, use_ref.index
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BodyBuilder;
    use crate::types::Type;

    #[test]
    fn test_well_formed_body_passes() {
        let body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let merged = b.phi(Type::I32, &[(1, one), (2, two)]);
                b.ret_val(merged);
            });
        });
        assert_eq!(verify(&body), Ok(()));
    }

    #[test]
    fn test_missing_terminator_reported() {
        let body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let x = b.arg(0);
                let _ = b.add(x.clone(), x);
                // no terminator
            });
        });
        let errors = verify(&body).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("not a terminator")));
    }

    #[test]
    fn test_phi_arity_mismatch_reported() {
        let body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let one = b.const_i32(1);
                // Only one argument for two predecessors.
                let merged = b.phi(Type::I32, &[(1, one)]);
                b.ret_val(merged);
            });
        });
        let errors = verify(&body).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("phi")));
    }
}
