//! Textual printing of method bodies.
//!
//! Blocks print in body order with a `B<N>:` label line followed by indented
//! instructions, headers first and the terminator last. Value names are
//! issued by a [`SymbolTable`] scoped to the body: instruction results get
//! `v<N>` in iteration order, arguments print by name, variables as
//! `$<name>`. Naming is deterministic, so two structurally isomorphic bodies
//! print identically.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ir::inst::InstKind;
use crate::ir::{BlockId, InstId, MethodBody, Value};

/// Per-body symbol table assigning stable names to blocks and instruction
/// results.
#[derive(Debug, Default)]
pub struct SymbolTable {
    inst_names: FxHashMap<InstId, u32>,
    block_names: FxHashMap<BlockId, u32>,
}

impl SymbolTable {
    /// Builds the table for `body` in iteration order.
    #[must_use]
    pub fn build(body: &MethodBody) -> Self {
        let mut table = Self::default();
        for (i, block) in body.blocks().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            table.block_names.insert(block, i as u32);
        }
        let mut next = 0u32;
        for inst in body.iter_insts() {
            if !body.inst(inst).result_type().is_void() {
                table.inst_names.insert(inst, next);
                next += 1;
            }
        }
        table
    }

    /// Returns the display name for a block.
    #[must_use]
    pub fn block_name(&self, block: BlockId) -> String {
        self.block_names
            .get(&block)
            .map_or_else(|| format!("B?{}", block.index()), |n| format!("B{n}"))
    }

    /// Returns the display name for an instruction result.
    #[must_use]
    pub fn inst_name(&self, inst: InstId) -> String {
        self.inst_names
            .get(&inst)
            .map_or_else(|| format!("v?{}", inst.index()), |n| format!("v{n}"))
    }

    fn value_name(&self, body: &MethodBody, value: &Value) -> String {
        match value {
            Value::Const(c) => c.to_string(),
            Value::Arg(a) => body.arg(*a).name().to_string(),
            Value::Var(v) => format!("${}", body.var(*v).name()),
            Value::Inst(i) => self.inst_name(*i),
        }
    }
}

fn write_operand_list(
    f: &mut fmt::Formatter<'_>,
    body: &MethodBody,
    table: &SymbolTable,
    operands: &[Value],
) -> fmt::Result {
    for (i, op) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", table.value_name(body, op))?;
    }
    Ok(())
}

fn write_inst(
    f: &mut fmt::Formatter<'_>,
    body: &MethodBody,
    table: &SymbolTable,
    id: InstId,
) -> fmt::Result {
    let inst = body.inst(id);
    if !inst.result_type().is_void() {
        write!(f, "{} = ", table.inst_name(id))?;
    }
    let ops = inst.operands();
    let blocks = inst.block_args();
    match inst.kind() {
        InstKind::Bin(op) => {
            write!(f, "{} ", op.mnemonic())?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Cmp(op) => {
            write!(f, "cmp.{} ", op.mnemonic())?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Conv => {
            write!(f, "conv {}, ", inst.result_type())?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Branch => {
            if ops.is_empty() {
                write!(f, "br {}", table.block_name(blocks[0]))
            } else {
                write!(
                    f,
                    "br {}, {}, {}",
                    table.value_name(body, &ops[0]),
                    table.block_name(blocks[0]),
                    table.block_name(blocks[1])
                )
            }
        }
        InstKind::Switch => {
            write!(f, "switch {}, [", table.value_name(body, &ops[0]))?;
            for (i, b) in blocks.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", table.block_name(*b))?;
            }
            write!(f, "]")
        }
        InstKind::Return => {
            write!(f, "ret")?;
            if !ops.is_empty() {
                write!(f, " {}", table.value_name(body, &ops[0]))?;
            }
            Ok(())
        }
        InstKind::Throw => {
            write!(f, "throw ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Rethrow => write!(f, "rethrow"),
        InstKind::Leave => write!(f, "leave {}", table.block_name(blocks[0])),
        InstKind::EndFinally => write!(f, "endfinally"),
        InstKind::EndFilter => {
            write!(f, "endfilter ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Phi => {
            write!(f, "phi [")?;
            for (i, (pred, value)) in inst.phi_args().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(
                    f,
                    "{} -> {}",
                    table.block_name(pred),
                    table.value_name(body, value)
                )?;
            }
            write!(f, "]")
        }
        InstKind::Guard { kind, catch_type } => {
            let kind_name = match kind {
                crate::ir::GuardKind::Catch => "catch",
                crate::ir::GuardKind::Finally => "finally",
                crate::ir::GuardKind::Fault => "fault",
            };
            write!(f, "guard {kind_name}")?;
            if let Some(ty) = catch_type {
                write!(f, "({ty})")?;
            }
            write!(f, ", handler {}", table.block_name(blocks[0]))?;
            if let Some(filter) = blocks.get(1) {
                write!(f, ", filter {}", table.block_name(*filter))?;
            }
            Ok(())
        }
        InstKind::Load => {
            write!(f, "load ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Store => {
            write!(f, "store ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::ArrayAddr => {
            write!(f, "arraddr ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::FieldAddr(field) => {
            write!(f, "fldaddr {field}")?;
            if !ops.is_empty() {
                write!(f, ", ")?;
                write_operand_list(f, body, table, ops)?;
            }
            Ok(())
        }
        InstKind::ExtractField(field) => {
            write!(f, "extractfld {field}, ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::LoadVar => {
            write!(f, "ldvar ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::StoreVar => {
            write!(f, "stvar ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::VarAddr => {
            write!(f, "varaddr ")?;
            write_operand_list(f, body, table, ops)
        }
        InstKind::Call(method) => {
            write!(f, "call {method}(")?;
            write_operand_list(f, body, table, ops)?;
            write!(f, ")")
        }
        InstKind::NewObj(method) => {
            write!(f, "newobj {method}(")?;
            write_operand_list(f, body, table, ops)?;
            write!(f, ")")
        }
        InstKind::Intrinsic(intrinsic) => {
            write!(f, "intrinsic {intrinsic}")?;
            if !ops.is_empty() {
                write!(f, ", ")?;
                write_operand_list(f, body, table, ops)?;
            }
            Ok(())
        }
        InstKind::MDArrayOp(method) => {
            write!(f, "mdarr {method}(")?;
            write_operand_list(f, body, table, ops)?;
            write!(f, ")")
        }
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = SymbolTable::build(self);
        for block in self.blocks() {
            write!(f, "{}:", table.block_name(block))?;
            let preds = self.block(block).preds();
            if !preds.is_empty() {
                let mut names: Vec<String> =
                    preds.iter().map(|p| table.block_name(*p)).collect();
                names.sort_unstable();
                write!(f, "  // preds: {}", names.join(" "))?;
            }
            writeln!(f)?;
            for inst in self.block_insts(block) {
                write!(f, "  ")?;
                write_inst(f, self, &table, inst)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::BodyBuilder;
    use crate::types::Type;

    #[test]
    fn test_print_simple_block() {
        let body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
            f.block(0, |b| {
                let x = b.arg(0);
                let seven = b.const_i32(7);
                let sum = b.add(x, seven);
                b.ret_val(sum);
            });
        });

        let text = body.to_string();
        assert_eq!(text, "B0:\n  v0 = add x, 7\n  ret v0\n");
    }

    #[test]
    fn test_print_branch_and_phi() {
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

        let text = body.to_string();
        assert!(text.contains("br c, B1, B2"));
        assert!(text.contains("v0 = phi [B1 -> 1, B2 -> 2]"));
        assert!(text.contains("// preds: B1 B2"));
    }
}
