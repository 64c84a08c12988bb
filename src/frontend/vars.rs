//! Variable analysis: one linear pass over the instruction stream that
//! classifies every argument and local slot before SSA construction.
//!
//! The flags decide how each slot is materialized: a slot whose address is
//! taken or whose uses span distinct protected regions must live in memory
//! (an exposed [`crate::ir::VarData`]); a slot confined to one block with a
//! store before every load can be resolved to plain SSA values.

use bitflags::bitflags;

use crate::frontend::code::{MethodCode, OpCode, Operand};
use crate::regions::RegionTree;
use crate::{Error, Result};

bitflags! {
    /// Per-slot facts gathered by [`analyze_vars`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u16 {
        /// The slot is read at least once.
        const LOADED = 1 << 0;
        /// The slot is written at least once.
        const STORED = 1 << 1;
        /// The slot's address is taken.
        const ADDR_TAKEN = 1 << 2;
        /// The slot is an argument.
        const IS_ARG = 1 << 3;
        /// The slot is a local.
        const IS_LOCAL = 1 << 4;
        /// Accesses occur in more than one basic block.
        const CROSSES_BLOCK = 1 << 5;
        /// Accesses span distinct protected regions.
        const CROSSES_REGIONS = 1 << 6;
        /// The slot is stored more than once.
        const MULTIPLE_STORES = 1 << 7;
        /// A load occurs before any store in program order.
        const LOAD_BEFORE_STORE = 1 << 8;
    }
}

impl VarFlags {
    /// Returns `true` if the slot must be materialized as a memory-backed,
    /// exposed variable.
    #[must_use]
    pub fn is_exposed(self) -> bool {
        self.intersects(VarFlags::ADDR_TAKEN | VarFlags::CROSSES_REGIONS)
    }

    /// Returns `true` if loads of this slot can resolve through SSA: the
    /// slot is unexposed, confined to one block, and stored before it is
    /// ever loaded.
    #[must_use]
    pub fn is_ssa_eligible(self) -> bool {
        !self.is_exposed()
            && !self.intersects(VarFlags::CROSSES_BLOCK | VarFlags::LOAD_BEFORE_STORE)
    }
}

/// Flags for every slot of a method: arguments first, then locals.
#[derive(Debug)]
pub struct VarAnalysis {
    flags: Vec<VarFlags>,
    num_args: usize,
}

impl VarAnalysis {
    /// Returns the flags for argument `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> VarFlags {
        self.flags[index]
    }

    /// Returns the flags for local `index`.
    #[must_use]
    pub fn local(&self, index: usize) -> VarFlags {
        self.flags[self.num_args + index]
    }
}

struct SlotState {
    first_offset: Option<u32>,
    first_leader: Option<u32>,
}

/// Runs the variable analysis.
///
/// `is_leader` reports whether a byte offset starts a basic block; the
/// region tree answers protected-context queries.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when an instruction names a slot outside
/// the method's declared arguments or locals.
pub fn analyze_vars(
    code: &MethodCode,
    is_leader: impl Fn(u32) -> bool,
    regions: &RegionTree,
) -> Result<VarAnalysis> {
    let num_args = code.args.len();
    let num_slots = num_args + code.locals.len();
    let mut flags = vec![VarFlags::empty(); num_slots];
    for (i, f) in flags.iter_mut().enumerate() {
        f.insert(if i < num_args {
            VarFlags::IS_ARG
        } else {
            VarFlags::IS_LOCAL
        });
    }
    let mut states: Vec<SlotState> = (0..num_slots)
        .map(|_| SlotState {
            first_offset: None,
            first_leader: None,
        })
        .collect();

    let mut current_leader = 0u32;
    for instr in &code.instrs {
        if is_leader(instr.offset) {
            current_leader = instr.offset;
        }

        let (slot, access) = match (instr.opcode, &instr.operand) {
            (OpCode::Ldarg, Operand::Argument(i)) => (*i as usize, VarFlags::LOADED),
            (OpCode::Starg, Operand::Argument(i)) => (*i as usize, VarFlags::STORED),
            (OpCode::Ldarga, Operand::Argument(i)) => (*i as usize, VarFlags::ADDR_TAKEN),
            (OpCode::Ldloc, Operand::Local(i)) => (num_args + *i as usize, VarFlags::LOADED),
            (OpCode::Stloc, Operand::Local(i)) => (num_args + *i as usize, VarFlags::STORED),
            (OpCode::Ldloca, Operand::Local(i)) => (num_args + *i as usize, VarFlags::ADDR_TAKEN),
            _ => continue,
        };
        if slot >= num_slots {
            return Err(invalid_input!(
                instr.offset,
                "instruction names slot {slot}, but the method declares {num_args} arguments and {} locals",
                code.locals.len()
            ));
        }

        let state = &mut states[slot];
        if access == VarFlags::STORED && flags[slot].contains(VarFlags::STORED) {
            flags[slot].insert(VarFlags::MULTIPLE_STORES);
        }
        if access == VarFlags::LOADED && !flags[slot].contains(VarFlags::STORED) {
            flags[slot].insert(VarFlags::LOAD_BEFORE_STORE);
        }
        flags[slot].insert(access);

        match state.first_leader {
            None => state.first_leader = Some(current_leader),
            Some(leader) if leader != current_leader => {
                flags[slot].insert(VarFlags::CROSSES_BLOCK);
            }
            Some(_) => {}
        }
        match state.first_offset {
            None => state.first_offset = Some(instr.offset),
            Some(first) if !regions.are_on_same_region(first, instr.offset) => {
                flags[slot].insert(VarFlags::CROSSES_REGIONS);
            }
            Some(_) => {}
        }
    }

    Ok(VarAnalysis { flags, num_args })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::frontend::code::CilInstr;
    use crate::regions::{ExceptionRegion, RegionKind, RegionTree};
    use crate::types::Type;

    fn args(n: usize) -> Vec<(Arc<str>, Type)> {
        (0..n).map(|i| (format!("a{i}").into(), Type::I32)).collect()
    }

    fn no_regions() -> RegionTree {
        RegionTree::build(vec![])
    }

    #[test]
    fn test_simple_local_flags() {
        // stloc 0; ldloc 0 — stored before loaded, one block
        let code = MethodCode {
            args: args(1),
            locals: vec![Type::I32],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Ldarg, 0, Operand::Argument(0)),
                CilInstr::with_operand(OpCode::Stloc, 1, Operand::Local(0)),
                CilInstr::with_operand(OpCode::Ldloc, 2, Operand::Local(0)),
                CilInstr::new(OpCode::Ret, 3),
            ],
            regions: vec![],
        };
        let analysis = analyze_vars(&code, |o| o == 0, &no_regions()).unwrap();

        let local = analysis.local(0);
        assert!(local.contains(VarFlags::STORED | VarFlags::LOADED | VarFlags::IS_LOCAL));
        assert!(!local.contains(VarFlags::LOAD_BEFORE_STORE));
        assert!(!local.contains(VarFlags::CROSSES_BLOCK));
        assert!(local.is_ssa_eligible());

        let arg = analysis.arg(0);
        assert!(arg.contains(VarFlags::LOADED | VarFlags::IS_ARG));
        assert!(arg.contains(VarFlags::LOAD_BEFORE_STORE));
    }

    #[test]
    fn test_cross_block_detection() {
        let code = MethodCode {
            args: args(0),
            locals: vec![Type::I32],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Stloc, 0, Operand::Local(0)),
                CilInstr::with_operand(OpCode::Ldloc, 4, Operand::Local(0)),
                CilInstr::new(OpCode::Ret, 5),
            ],
            regions: vec![],
        };
        // Offset 4 starts a new block.
        let analysis = analyze_vars(&code, |o| o == 0 || o == 4, &no_regions()).unwrap();
        assert!(analysis.local(0).contains(VarFlags::CROSSES_BLOCK));
        assert!(!analysis.local(0).is_ssa_eligible());
    }

    #[test]
    fn test_addr_taken_is_exposed() {
        let code = MethodCode {
            args: args(0),
            locals: vec![Type::I32],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Ldloca, 0, Operand::Local(0)),
                CilInstr::new(OpCode::Ret, 1),
            ],
            regions: vec![],
        };
        let analysis = analyze_vars(&code, |o| o == 0, &no_regions()).unwrap();
        assert!(analysis.local(0).contains(VarFlags::ADDR_TAKEN));
        assert!(analysis.local(0).is_exposed());
    }

    #[test]
    fn test_crossing_regions_is_exposed() {
        let code = MethodCode {
            args: args(0),
            locals: vec![Type::I32],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Stloc, 0, Operand::Local(0)),
                CilInstr::with_operand(OpCode::Ldloc, 6, Operand::Local(0)),
                CilInstr::new(OpCode::Ret, 7),
            ],
            regions: vec![ExceptionRegion {
                kind: RegionKind::Finally,
                try_start: 0,
                try_end: 4,
                handler_start: 4,
                handler_end: 7,
                filter_start: None,
                catch_type: None,
            }],
        };
        let regions = RegionTree::build(code.regions.clone());
        let analysis = analyze_vars(&code, |o| o == 0 || o == 4, &regions).unwrap();

        let local = analysis.local(0);
        assert!(local.contains(VarFlags::CROSSES_REGIONS));
        assert!(local.is_exposed());
    }

    #[test]
    fn test_multiple_stores() {
        let code = MethodCode {
            args: args(0),
            locals: vec![Type::I32],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Stloc, 0, Operand::Local(0)),
                CilInstr::with_operand(OpCode::Stloc, 1, Operand::Local(0)),
                CilInstr::new(OpCode::Ret, 2),
            ],
            regions: vec![],
        };
        let analysis = analyze_vars(&code, |o| o == 0, &no_regions()).unwrap();
        assert!(analysis.local(0).contains(VarFlags::MULTIPLE_STORES));
    }

    #[test]
    fn test_out_of_range_slot_rejected() {
        let code = MethodCode {
            args: args(0),
            locals: vec![],
            ret: Type::Void,
            instrs: vec![
                CilInstr::with_operand(OpCode::Ldloc, 0, Operand::Local(3)),
                CilInstr::new(OpCode::Ret, 1),
            ],
            regions: vec![],
        };
        assert!(matches!(
            analyze_vars(&code, |o| o == 0, &no_regions()),
            Err(Error::InvalidInput { offset: 0, .. })
        ));
    }
}
