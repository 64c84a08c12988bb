//! Import of stack-based bytecode into SSA form.
//!
//! The importer runs six stages over a [`MethodCode`]:
//!
//! 1. **Leader discovery** — branch targets, post-terminator fallthroughs
//!    and region boundaries, collected in a bit set indexed by byte offset
//! 2. **Variable analysis** — [`crate::frontend::vars::analyze_vars`]
//! 3. **Block creation** — one block per leader; a synthetic entry block is
//!    added when offset 0 is a branch target, so the entry provably has no
//!    predecessors
//! 4. **Guard materialization** — one guard per clause, splitting off a
//!    dominating block when a nested region already owns the try entry
//! 5. **Argument slot materialization** — stored or address-taken arguments
//!    get a memory-backed `a_<name>` slot written at the top of the entry
//! 6. **Per-block abstract interpretation** — each opcode pops typed stack
//!    entries and pushes SSA instructions; merge points materialize phis
//!
//! The evaluation-stack state lives in a local `Vec<Value>` handed through
//! the dispatch loop; nothing about the interpretation is global.

use rustc_hash::FxHashMap;

use crate::frontend::code::{CilInstr, FlowKind, MethodCode, OpCode, Operand};
use crate::frontend::vars::{analyze_vars, VarAnalysis, VarFlags};
use crate::ir::{
    BinOp, BlockId, CilIntrinsic, CmpOp, Const, GuardKind, InstId, InstKind, MethodBody, Value,
    VarId,
};
use crate::regions::{RegionKind, RegionTree};
use crate::types::{MDArrayMethodKind, MethodDesc, StackType, Type, TypeFactory};
use crate::{Error, Result};

/// Bit set over bytecode offsets.
#[derive(Debug, Default)]
struct OffsetBitSet {
    bits: Vec<u64>,
}

impl OffsetBitSet {
    fn with_capacity(max_offset: u32) -> Self {
        Self {
            bits: vec![0; (max_offset as usize / 64) + 1],
        }
    }

    fn insert(&mut self, offset: u32) {
        let word = offset as usize / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1 << (offset % 64);
    }

    fn contains(&self, offset: u32) -> bool {
        self.bits
            .get(offset as usize / 64)
            .is_some_and(|w| w & (1 << (offset % 64)) != 0)
    }
}

/// How a block's incoming evaluation stack was established.
#[derive(Debug)]
enum EntryState {
    /// Multi-predecessor merge: one phi per slot, extended per edge.
    Phis(Vec<InstId>),
    /// Single predecessor delivered these values directly.
    Inherited { pred: BlockId, values: Vec<Value> },
    /// Pinned state: handler entries (the guard value) and try entries
    /// (empty, per the standard); later deliveries must match exactly.
    Fixed(Vec<Value>),
}

/// Imports a method's bytecode into a fully populated SSA [`MethodBody`].
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for malformed bytecode (stack underflow,
/// bad branch target, unknown opcode/operand pairing) and
/// [`Error::StackMismatch`] when predecessors disagree about a block's
/// entry stack.
pub fn import_body(code: &MethodCode, factory: &TypeFactory) -> Result<MethodBody> {
    Importer::new(code, factory)?.run()
}

struct Importer<'a> {
    code: &'a MethodCode,
    factory: &'a TypeFactory,
    tree: RegionTree,
    body: MethodBody,
    /// Instruction index by byte offset.
    offset_index: FxHashMap<u32, usize>,
    leaders: OffsetBitSet,
    leader_offsets: Vec<u32>,
    /// Where branches to an offset land (head of any guard chain).
    target_block: FxHashMap<u32, BlockId>,
    /// Where the code at an offset is imported (tail of any guard chain).
    code_block: FxHashMap<u32, BlockId>,
    /// Incoming edge count per leader offset, counting the synthetic entry.
    pred_count: FxHashMap<u32, u32>,
    /// Leader offset a block stands for (guard-chain heads included).
    block_offset: FxHashMap<BlockId, u32>,
    vars: VarAnalysis,
    /// Materialized variable per slot (arguments first, then locals).
    slot_vars: Vec<Option<VarId>>,
    entry_states: FxHashMap<BlockId, EntryState>,
    /// Try range of the guards already placed in a block.
    guard_ranges: FxHashMap<BlockId, (u32, u32)>,
    needs_synthetic_entry: bool,
}

impl<'a> Importer<'a> {
    fn new(code: &'a MethodCode, factory: &'a TypeFactory) -> Result<Self> {
        if code.instrs.is_empty() {
            return Err(invalid_input!(0, "method body has no instructions"));
        }

        let mut offset_index = FxHashMap::default();
        for (index, instr) in code.instrs.iter().enumerate() {
            offset_index.insert(instr.offset, index);
        }

        let (leaders, needs_synthetic_entry) = Self::find_leaders(code, &offset_index)?;
        let mut leader_offsets: Vec<u32> = code
            .instrs
            .iter()
            .map(|i| i.offset)
            .filter(|o| leaders.contains(*o))
            .collect();
        leader_offsets.sort_unstable();

        let tree = RegionTree::build(code.regions.clone());
        let vars = analyze_vars(code, |o| leaders.contains(o), &tree)?;

        let num_slots = code.args.len() + code.locals.len();
        Ok(Self {
            code,
            factory,
            tree,
            body: MethodBody::new(code.args.clone()),
            offset_index,
            leaders,
            leader_offsets,
            target_block: FxHashMap::default(),
            code_block: FxHashMap::default(),
            pred_count: FxHashMap::default(),
            block_offset: FxHashMap::default(),
            vars,
            slot_vars: vec![None; num_slots],
            entry_states: FxHashMap::default(),
            guard_ranges: FxHashMap::default(),
            needs_synthetic_entry,
        })
    }

    fn run(mut self) -> Result<MethodBody> {
        self.count_preds();
        self.create_blocks();
        self.materialize_guards()?;
        self.wire_synthetic_entry()?;
        self.materialize_slots();

        for offset in self.leader_offsets.clone() {
            self.import_block(offset)?;
        }
        Ok(self.body)
    }

    // ===== stage 1: leaders =====

    fn branch_targets(instr: &CilInstr) -> &[u32] {
        match &instr.operand {
            Operand::Target(t) => std::slice::from_ref(t),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    fn find_leaders(
        code: &MethodCode,
        offset_index: &FxHashMap<u32, usize>,
    ) -> Result<(OffsetBitSet, bool)> {
        let mut leaders = OffsetBitSet::with_capacity(code.end_offset());
        leaders.insert(code.instrs[0].offset);
        let mut back_to_entry = false;

        for (index, instr) in code.instrs.iter().enumerate() {
            let flow = instr.opcode.flow();
            if matches!(flow, FlowKind::Branch | FlowKind::CondBranch) {
                for &target in Self::branch_targets(instr) {
                    if !offset_index.contains_key(&target) {
                        return Err(invalid_input!(
                            instr.offset,
                            "branch target IL_{target:04x} is not an instruction boundary"
                        ));
                    }
                    leaders.insert(target);
                    if target == 0 {
                        back_to_entry = true;
                    }
                }
            }
            if flow != FlowKind::Next {
                if let Some(next) = code.instrs.get(index + 1) {
                    leaders.insert(next.offset);
                }
            }
        }

        for region in &code.regions {
            for offset in [region.try_start, region.handler_start]
                .into_iter()
                .chain(region.filter_start)
            {
                if !offset_index.contains_key(&offset) {
                    return Err(invalid_input!(
                        offset,
                        "exception region boundary is not an instruction boundary"
                    ));
                }
                leaders.insert(offset);
            }
        }

        Ok((leaders, back_to_entry))
    }

    fn count_preds(&mut self) {
        for (index, instr) in self.code.instrs.iter().enumerate() {
            let flow = instr.opcode.flow();
            if matches!(flow, FlowKind::Branch | FlowKind::CondBranch) {
                let mut seen = Vec::new();
                for &target in Self::branch_targets(instr) {
                    if !seen.contains(&target) {
                        seen.push(target);
                        *self.pred_count.entry(target).or_insert(0) += 1;
                    }
                }
            }
            // Fallthrough edge into a following leader.
            if flow != FlowKind::Branch && flow != FlowKind::Terminate {
                if let Some(next) = self.code.instrs.get(index + 1) {
                    if self.leaders.contains(next.offset) {
                        *self.pred_count.entry(next.offset).or_insert(0) += 1;
                    }
                }
            }
        }
        if self.needs_synthetic_entry {
            *self.pred_count.entry(0).or_insert(0) += 1;
        }
    }

    // ===== stage 3: blocks =====

    fn create_blocks(&mut self) {
        for &offset in &self.leader_offsets {
            let block = if offset == 0 && !self.needs_synthetic_entry {
                self.body.entry_block()
            } else {
                self.body.create_block(None)
            };
            self.target_block.insert(offset, block);
            self.code_block.insert(offset, block);
            self.block_offset.insert(block, offset);
        }
    }

    // ===== stage 4: guards =====

    fn materialize_guards(&mut self) -> Result<()> {
        for region in self.tree.regions().to_vec() {
            let range = (region.try_start, region.try_end);
            let head = self.target_block[&region.try_start];

            let guard_block = match self.guard_ranges.get(&head) {
                Some(existing) if *existing != range => self.split_guard_entry(head),
                _ => head,
            };
            self.guard_ranges.insert(guard_block, range);
            self.target_block.insert(region.try_start, guard_block);
            self.block_offset.insert(guard_block, region.try_start);
            self.entry_states
                .entry(guard_block)
                .or_insert_with(|| EntryState::Fixed(Vec::new()));

            let handler = self.target_block[&region.handler_start];
            let (kind, ty) = match region.kind {
                RegionKind::Catch => {
                    let ty = region.catch_type.clone().unwrap_or(Type::Object);
                    (GuardKind::Catch, ty)
                }
                RegionKind::Filter => (GuardKind::Catch, Type::Object),
                RegionKind::Finally => (GuardKind::Finally, Type::Void),
                RegionKind::Fault => (GuardKind::Fault, Type::Void),
            };
            let mut blocks = vec![handler];
            if let Some(filter_start) = region.filter_start {
                blocks.push(self.target_block[&filter_start]);
            }
            let guard = self.body.create_inst(
                InstKind::Guard {
                    kind,
                    catch_type: region.catch_type.clone(),
                },
                ty,
                vec![],
                blocks.clone(),
            );
            self.body.insert_header(guard_block, guard);

            // Exception delivery: catch/filter handlers start with the
            // guard value on the stack; finally/fault start empty.
            let delivered = match region.kind {
                RegionKind::Catch | RegionKind::Filter => vec![Value::Inst(guard)],
                RegionKind::Finally | RegionKind::Fault => vec![],
            };
            self.entry_states
                .insert(handler, EntryState::Fixed(delivered));
            if let Some(filter_start) = region.filter_start {
                let filter_block = self.target_block[&filter_start];
                self.entry_states
                    .insert(filter_block, EntryState::Fixed(vec![Value::Inst(guard)]));
            }
        }
        Ok(())
    }

    /// Splits a fresh dominating block off `inner` for an outer region's
    /// guard, redirecting every predecessor of `inner` to it.
    fn split_guard_entry(&mut self, inner: BlockId) -> BlockId {
        let outer = self.body.create_block_before(inner);

        for pred in self.body.block(inner).preds().to_vec() {
            if let Some(term) = self.body.terminator(pred) {
                let targets = self.body.inst(term).block_args().to_vec();
                for (pos, target) in targets.iter().enumerate() {
                    if *target == inner {
                        self.body.set_branch_target(term, pos, outer);
                    }
                }
            }
            self.body.redirect_phis(inner, pred, None);
        }

        let jump = self
            .body
            .create_inst(InstKind::Branch, Type::Void, vec![], vec![inner]);
        self.body.append(outer, jump);

        if inner == self.body.entry_block() {
            self.body.set_entry_block(outer);
        }
        self.entry_states
            .insert(inner, EntryState::Fixed(Vec::new()));
        outer
    }

    fn wire_synthetic_entry(&mut self) -> Result<()> {
        if !self.needs_synthetic_entry {
            return Ok(());
        }
        let entry = self.body.entry_block();
        let target = self.target_block[&0];
        let jump = self
            .body
            .create_inst(InstKind::Branch, Type::Void, vec![], vec![target]);
        self.body.append(entry, jump);
        self.propagate(entry, target, &[], 0)
    }

    // ===== stage 5: slot materialization =====

    fn materialize_slots(&mut self) {
        let num_args = self.code.args.len();
        for i in 0..num_args {
            let flags = self.vars.arg(i);
            if flags.intersects(VarFlags::ADDR_TAKEN | VarFlags::STORED) {
                let (name, ty) = &self.code.args[i];
                let var = self.body.new_var(
                    format!("a_{name}").into(),
                    ty.clone(),
                    flags.contains(VarFlags::ADDR_TAKEN),
                );
                self.slot_vars[i] = Some(var);

                let entry = self.body.entry_block();
                let store = self.body.create_inst(
                    InstKind::StoreVar,
                    Type::Void,
                    vec![Value::Var(var), Value::Arg(crate::ir::ArgId::from_index(i))],
                    vec![],
                );
                self.body.insert_ante_last(entry, store);
            }
        }
        for (i, ty) in self.code.locals.iter().enumerate() {
            let flags = self.vars.local(i);
            if !flags.is_empty() && !flags.is_ssa_eligible() {
                let var = self.body.new_var(
                    format!("l{i}").into(),
                    ty.clone(),
                    flags.is_exposed(),
                );
                self.slot_vars[num_args + i] = Some(var);
            }
        }
    }

    // ===== stage 6: abstract interpretation =====

    fn pop(&self, stack: &mut Vec<Value>, offset: u32) -> Result<Value> {
        stack
            .pop()
            .ok_or_else(|| invalid_input!(offset, "evaluation stack underflow"))
    }

    fn emit(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: Type,
        operands: Vec<Value>,
        blocks: Vec<BlockId>,
    ) -> Value {
        let id = self.body.create_inst(kind, ty, operands, blocks);
        self.body.append(block, id);
        Value::Inst(id)
    }

    fn stack_type_of(&self, value: &Value) -> StackType {
        self.body.value_type(value).stack_type()
    }

    fn byref(&self, ty: Type) -> Type {
        self.factory.get_byref(ty)
    }

    /// Delivers `stack` along the edge `pred -> target`.
    fn propagate(
        &mut self,
        pred: BlockId,
        target: BlockId,
        stack: &[Value],
        offset: u32,
    ) -> Result<()> {
        match self.entry_states.get(&target) {
            None => {
                let multi_pred = self
                    .block_offset
                    .get(&target)
                    .and_then(|o| self.pred_count.get(o))
                    .copied()
                    .unwrap_or(0)
                    > 1;
                let state = if multi_pred {
                    let mut phis = Vec::with_capacity(stack.len());
                    for value in stack {
                        let ty = self.body.value_type(value);
                        let phi = self.body.create_inst(
                            InstKind::Phi,
                            ty,
                            vec![value.clone()],
                            vec![pred],
                        );
                        self.body.insert_header(target, phi);
                        phis.push(phi);
                    }
                    EntryState::Phis(phis)
                } else {
                    EntryState::Inherited {
                        pred,
                        values: stack.to_vec(),
                    }
                };
                self.entry_states.insert(target, state);
                Ok(())
            }
            Some(EntryState::Phis(phis)) => {
                if phis.len() != stack.len() {
                    return Err(Error::StackMismatch {
                        offset,
                        message: format!(
                            "predecessors deliver stacks of depth {} and {}",
                            phis.len(),
                            stack.len()
                        ),
                    });
                }
                let phis = phis.clone();
                for (phi, value) in phis.into_iter().zip(stack.iter()) {
                    if let Some(existing) = self.body.inst(phi).phi_value_for(pred) {
                        if existing != value {
                            return Err(Error::StackMismatch {
                                offset,
                                message: "one predecessor delivers two different stacks"
                                    .to_string(),
                            });
                        }
                        continue;
                    }
                    let phi_sty = self.body.inst(phi).result_type().stack_type();
                    let value_sty = self.stack_type_of(value);
                    if phi_sty != value_sty {
                        return Err(Error::StackMismatch {
                            offset,
                            message: format!(
                                "merge disagrees on stack type: {phi_sty:?} vs {value_sty:?}"
                            ),
                        });
                    }
                    self.body.phi_add_arg(phi, pred, value.clone());
                }
                Ok(())
            }
            Some(EntryState::Inherited { pred: p, values }) => {
                if *p == pred && values == stack {
                    return Ok(());
                }
                Err(Error::StackMismatch {
                    offset,
                    message: "unexpected second predecessor at merge point".to_string(),
                })
            }
            Some(EntryState::Fixed(values)) => {
                if values.as_slice() == stack {
                    return Ok(());
                }
                Err(Error::StackMismatch {
                    offset,
                    message: "branch delivers a stack the target cannot accept".to_string(),
                })
            }
        }
    }

    fn entry_stack(&mut self, block: BlockId) -> Vec<Value> {
        match self.entry_states.get(&block) {
            Some(EntryState::Phis(phis)) => phis.iter().map(|p| Value::Inst(*p)).collect(),
            Some(EntryState::Inherited { values, .. }) | Some(EntryState::Fixed(values)) => {
                values.clone()
            }
            None => {
                // Never delivered to (unreachable, or entered only through
                // exception edges): the stack starts empty, and any late
                // delivery must agree.
                self.entry_states
                    .insert(block, EntryState::Fixed(Vec::new()));
                Vec::new()
            }
        }
    }

    fn arith_result_type(&self, left: &Type, right: &Type, offset: u32) -> Result<Type> {
        use StackType::{ByRef, Float, Int32, Int64, NInt};
        match (left.stack_type(), right.stack_type()) {
            (Int32, Int32) => Ok(Type::I32),
            (Int64, Int64) => Ok(Type::I64),
            (NInt, Int32 | NInt) | (Int32, NInt) => Ok(Type::IntPtr),
            (Float, Float) => Ok(if *left == Type::F32 && *right == Type::F32 {
                Type::F32
            } else {
                Type::F64
            }),
            (ByRef, Int32 | NInt) => Ok(left.clone()),
            (Int32 | NInt, ByRef) => Ok(right.clone()),
            _ => Err(invalid_input!(
                offset,
                "invalid operand types {left} and {right} for arithmetic"
            )),
        }
    }

    fn shift_result_type(&self, left: &Type, offset: u32) -> Result<Type> {
        match left.stack_type() {
            StackType::Int32 => Ok(Type::I32),
            StackType::Int64 => Ok(Type::I64),
            StackType::NInt => Ok(Type::IntPtr),
            _ => Err(invalid_input!(offset, "invalid shift operand type {left}")),
        }
    }

    fn zero_of(ty: &Type) -> Result<Const> {
        match ty.stack_type() {
            StackType::Int32 => Ok(Const::i32(0)),
            StackType::Int64 => Ok(Const::i64(0)),
            StackType::NInt => Ok(Const::Int {
                ty: Type::IntPtr,
                value: 0,
            }),
            StackType::Float => Ok(Const::Float {
                ty: ty.clone(),
                value: 0.0,
            }),
            _ => Err(Error::Unsupported(format!("negation of {ty}"))),
        }
    }

    fn all_ones_of(ty: &Type) -> Result<Const> {
        match ty.stack_type() {
            StackType::Int32 => Ok(Const::i32(-1)),
            StackType::Int64 => Ok(Const::i64(-1)),
            StackType::NInt => Ok(Const::Int {
                ty: Type::IntPtr,
                value: -1,
            }),
            _ => Err(Error::Unsupported(format!("bitwise complement of {ty}"))),
        }
    }

    fn slot_var(&self, slot: usize, offset: u32) -> Result<VarId> {
        self.slot_vars[slot].ok_or_else(|| {
            Error::InvariantViolation(format!(
                "slot {slot} at IL_{offset:04x} has no materialized variable"
            ))
        })
    }

    fn md_array_kind(method: &MethodDesc) -> Option<MDArrayMethodKind> {
        let Type::MDArray(shape) = &method.decl_type else {
            return None;
        };
        match &*method.name {
            "Get" => Some(MDArrayMethodKind::Get),
            "Set" => Some(MDArrayMethodKind::Set),
            "Address" => Some(MDArrayMethodKind::Address),
            ".ctor" => {
                if method.sig.params.len() == shape.rank as usize {
                    Some(MDArrayMethodKind::SizeCtor)
                } else {
                    Some(MDArrayMethodKind::RangeCtor)
                }
            }
            _ => None,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn import_block(&mut self, leader: u32) -> Result<()> {
        let block = self.code_block[&leader];
        let mut stack = self.entry_stack(block);
        // Reaching definitions of SSA-eligible slots, local to this block.
        let mut defs: FxHashMap<usize, Value> = FxHashMap::default();
        let num_args = self.code.args.len();

        let start = self.offset_index[&leader];
        let mut index = start;
        loop {
            let Some(instr) = self.code.instrs.get(index).cloned() else {
                return Err(invalid_input!(
                    self.code.instrs[index - 1].offset,
                    "control falls off the end of the method"
                ));
            };
            if index != start && self.leaders.contains(instr.offset) {
                // Implicit fallthrough into the next block.
                let target = self.target_block[&instr.offset];
                let jump =
                    self.body
                        .create_inst(InstKind::Branch, Type::Void, vec![], vec![target]);
                self.body.append(block, jump);
                self.propagate(block, target, &stack, instr.offset)?;
                return Ok(());
            }
            let offset = instr.offset;
            let next_offset = self.code.instrs.get(index + 1).map(|i| i.offset);

            match (instr.opcode, &instr.operand) {
                (OpCode::Nop, _) => {}
                (OpCode::Dup, _) => {
                    let top = self.pop(&mut stack, offset)?;
                    stack.push(top.clone());
                    stack.push(top);
                }
                (OpCode::Pop, _) => {
                    self.pop(&mut stack, offset)?;
                }

                // ===== constants =====
                (OpCode::Ldc, Operand::I32(v)) => stack.push(Value::Const(Const::i32(*v))),
                (OpCode::Ldc, Operand::I64(v)) => stack.push(Value::Const(Const::i64(*v))),
                (OpCode::Ldc, Operand::F32(v)) => stack.push(Value::Const(Const::Float {
                    ty: Type::F32,
                    value: f64::from(*v),
                })),
                (OpCode::Ldc, Operand::F64(v)) => stack.push(Value::Const(Const::Float {
                    ty: Type::F64,
                    value: *v,
                })),
                (OpCode::Ldnull, _) => stack.push(Value::Const(Const::Null)),
                (OpCode::Ldstr, Operand::Str(s)) => {
                    stack.push(Value::Const(Const::Str(s.clone())));
                }

                // ===== argument and local slots =====
                (OpCode::Ldarg, Operand::Argument(i)) => {
                    let slot = *i as usize;
                    if let Some(var) = self.slot_vars[slot] {
                        let ty = self.body.var(var).ty().clone();
                        let value =
                            self.emit(block, InstKind::LoadVar, ty, vec![Value::Var(var)], vec![]);
                        stack.push(value);
                    } else {
                        stack.push(Value::Arg(crate::ir::ArgId::from_index(slot)));
                    }
                }
                (OpCode::Starg, Operand::Argument(i)) => {
                    let value = self.pop(&mut stack, offset)?;
                    let var = self.slot_var(*i as usize, offset)?;
                    self.emit(
                        block,
                        InstKind::StoreVar,
                        Type::Void,
                        vec![Value::Var(var), value],
                        vec![],
                    );
                }
                (OpCode::Ldarga, Operand::Argument(i)) => {
                    let var = self.slot_var(*i as usize, offset)?;
                    let ty = self.byref(self.body.var(var).ty().clone());
                    let value =
                        self.emit(block, InstKind::VarAddr, ty, vec![Value::Var(var)], vec![]);
                    stack.push(value);
                }
                (OpCode::Ldloc, Operand::Local(i)) => {
                    let slot = num_args + *i as usize;
                    if self.vars.local(*i as usize).is_ssa_eligible() {
                        let value = defs.get(&slot).cloned().ok_or_else(|| {
                            Error::InvariantViolation(format!(
                                "SSA-eligible local {i} read before any store at IL_{offset:04x}"
                            ))
                        })?;
                        stack.push(value);
                    } else {
                        let var = self.slot_var(slot, offset)?;
                        let ty = self.body.var(var).ty().clone();
                        let value =
                            self.emit(block, InstKind::LoadVar, ty, vec![Value::Var(var)], vec![]);
                        stack.push(value);
                    }
                }
                (OpCode::Stloc, Operand::Local(i)) => {
                    let slot = num_args + *i as usize;
                    let value = self.pop(&mut stack, offset)?;
                    if self.vars.local(*i as usize).is_ssa_eligible() {
                        defs.insert(slot, value);
                    } else {
                        let var = self.slot_var(slot, offset)?;
                        self.emit(
                            block,
                            InstKind::StoreVar,
                            Type::Void,
                            vec![Value::Var(var), value],
                            vec![],
                        );
                    }
                }
                (OpCode::Ldloca, Operand::Local(i)) => {
                    let var = self.slot_var(num_args + *i as usize, offset)?;
                    let ty = self.byref(self.body.var(var).ty().clone());
                    let value =
                        self.emit(block, InstKind::VarAddr, ty, vec![Value::Var(var)], vec![]);
                    stack.push(value);
                }

                // ===== arithmetic and logic =====
                (
                    OpCode::Add
                    | OpCode::Sub
                    | OpCode::Mul
                    | OpCode::Div
                    | OpCode::DivUn
                    | OpCode::Rem
                    | OpCode::RemUn
                    | OpCode::And
                    | OpCode::Or
                    | OpCode::Xor,
                    _,
                ) => {
                    let right = self.pop(&mut stack, offset)?;
                    let left = self.pop(&mut stack, offset)?;
                    let op = match instr.opcode {
                        OpCode::Add => BinOp::Add,
                        OpCode::Sub => BinOp::Sub,
                        OpCode::Mul => BinOp::Mul,
                        OpCode::Div => BinOp::Div,
                        OpCode::DivUn => BinOp::DivUn,
                        OpCode::Rem => BinOp::Rem,
                        OpCode::RemUn => BinOp::RemUn,
                        OpCode::And => BinOp::And,
                        OpCode::Or => BinOp::Or,
                        _ => BinOp::Xor,
                    };
                    let lty = self.body.value_type(&left);
                    let rty = self.body.value_type(&right);
                    let ty = self.arith_result_type(&lty, &rty, offset)?;
                    let value = self.emit(block, InstKind::Bin(op), ty, vec![left, right], vec![]);
                    stack.push(value);
                }
                (OpCode::Shl | OpCode::Shr | OpCode::ShrUn, _) => {
                    let right = self.pop(&mut stack, offset)?;
                    let left = self.pop(&mut stack, offset)?;
                    let op = match instr.opcode {
                        OpCode::Shl => BinOp::Shl,
                        OpCode::Shr => BinOp::Shr,
                        _ => BinOp::ShrUn,
                    };
                    let lty = self.body.value_type(&left);
                    let ty = self.shift_result_type(&lty, offset)?;
                    let value = self.emit(block, InstKind::Bin(op), ty, vec![left, right], vec![]);
                    stack.push(value);
                }
                (OpCode::Neg, _) => {
                    let value = self.pop(&mut stack, offset)?;
                    let ty = self.body.value_type(&value);
                    let zero = Value::Const(Self::zero_of(&ty)?);
                    let result =
                        self.emit(block, InstKind::Bin(BinOp::Sub), ty, vec![zero, value], vec![]);
                    stack.push(result);
                }
                (OpCode::Not, _) => {
                    let value = self.pop(&mut stack, offset)?;
                    let ty = self.body.value_type(&value);
                    let ones = Value::Const(Self::all_ones_of(&ty)?);
                    let result =
                        self.emit(block, InstKind::Bin(BinOp::Xor), ty, vec![value, ones], vec![]);
                    stack.push(result);
                }

                // ===== conversions =====
                (
                    OpCode::ConvI1
                    | OpCode::ConvU1
                    | OpCode::ConvI2
                    | OpCode::ConvU2
                    | OpCode::ConvI4
                    | OpCode::ConvU4
                    | OpCode::ConvI8
                    | OpCode::ConvU8
                    | OpCode::ConvR4
                    | OpCode::ConvR8
                    | OpCode::ConvI
                    | OpCode::ConvU,
                    _,
                ) => {
                    let value = self.pop(&mut stack, offset)?;
                    let to = match instr.opcode {
                        OpCode::ConvI1 => Type::I8,
                        OpCode::ConvU1 => Type::U8,
                        OpCode::ConvI2 => Type::I16,
                        OpCode::ConvU2 => Type::U16,
                        OpCode::ConvI4 => Type::I32,
                        OpCode::ConvU4 => Type::U32,
                        OpCode::ConvI8 => Type::I64,
                        OpCode::ConvU8 => Type::U64,
                        OpCode::ConvR4 => Type::F32,
                        OpCode::ConvR8 => Type::F64,
                        OpCode::ConvI => Type::IntPtr,
                        _ => Type::UIntPtr,
                    };
                    let result = self.emit(block, InstKind::Conv, to, vec![value], vec![]);
                    stack.push(result);
                }

                // ===== comparisons =====
                (OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn, _) => {
                    let right = self.pop(&mut stack, offset)?;
                    let left = self.pop(&mut stack, offset)?;
                    let op = match instr.opcode {
                        OpCode::Ceq => CmpOp::Eq,
                        OpCode::Cgt => CmpOp::Gt,
                        OpCode::CgtUn => CmpOp::GtUn,
                        OpCode::Clt => CmpOp::Lt,
                        _ => CmpOp::LtUn,
                    };
                    let value =
                        self.emit(block, InstKind::Cmp(op), Type::Bool, vec![left, right], vec![]);
                    stack.push(value);
                }

                // ===== branches =====
                (OpCode::Br, Operand::Target(target)) => {
                    let target_b = self.target_block[target];
                    self.emit(block, InstKind::Branch, Type::Void, vec![], vec![target_b]);
                    self.propagate(block, target_b, &stack, offset)?;
                    return Ok(());
                }
                (OpCode::Brtrue | OpCode::Brfalse, Operand::Target(target)) => {
                    let cond = self.pop(&mut stack, offset)?;
                    let fall = next_offset.ok_or_else(|| {
                        invalid_input!(offset, "conditional branch at the end of the method")
                    })?;
                    let target_b = self.target_block[target];
                    let fall_b = self.target_block[&fall];
                    let (then_b, else_b) = if instr.opcode == OpCode::Brtrue {
                        (target_b, fall_b)
                    } else {
                        (fall_b, target_b)
                    };
                    self.emit(
                        block,
                        InstKind::Branch,
                        Type::Void,
                        vec![cond],
                        vec![then_b, else_b],
                    );
                    self.propagate(block, target_b, &stack, offset)?;
                    self.propagate(block, fall_b, &stack, offset)?;
                    return Ok(());
                }
                (
                    OpCode::Beq
                    | OpCode::Bge
                    | OpCode::BgeUn
                    | OpCode::Bgt
                    | OpCode::BgtUn
                    | OpCode::Ble
                    | OpCode::BleUn
                    | OpCode::Blt
                    | OpCode::BltUn
                    | OpCode::BneUn,
                    Operand::Target(target),
                ) => {
                    let right = self.pop(&mut stack, offset)?;
                    let left = self.pop(&mut stack, offset)?;
                    let op = match instr.opcode {
                        OpCode::Beq => CmpOp::Eq,
                        OpCode::Bge => CmpOp::Ge,
                        OpCode::BgeUn => CmpOp::GeUn,
                        OpCode::Bgt => CmpOp::Gt,
                        OpCode::BgtUn => CmpOp::GtUn,
                        OpCode::Ble => CmpOp::Le,
                        OpCode::BleUn => CmpOp::LeUn,
                        OpCode::Blt => CmpOp::Lt,
                        OpCode::BltUn => CmpOp::LtUn,
                        _ => CmpOp::Ne,
                    };
                    let cond =
                        self.emit(block, InstKind::Cmp(op), Type::Bool, vec![left, right], vec![]);
                    let fall = next_offset.ok_or_else(|| {
                        invalid_input!(offset, "conditional branch at the end of the method")
                    })?;
                    let target_b = self.target_block[target];
                    let fall_b = self.target_block[&fall];
                    self.emit(
                        block,
                        InstKind::Branch,
                        Type::Void,
                        vec![cond],
                        vec![target_b, fall_b],
                    );
                    self.propagate(block, target_b, &stack, offset)?;
                    self.propagate(block, fall_b, &stack, offset)?;
                    return Ok(());
                }
                (OpCode::Switch, Operand::Switch(targets)) => {
                    let value = self.pop(&mut stack, offset)?;
                    let fall = next_offset.ok_or_else(|| {
                        invalid_input!(offset, "switch at the end of the method")
                    })?;
                    let mut blocks = vec![self.target_block[&fall]];
                    for target in targets.iter() {
                        blocks.push(self.target_block[target]);
                    }
                    self.emit(
                        block,
                        InstKind::Switch,
                        Type::Void,
                        vec![value],
                        blocks.clone(),
                    );
                    let mut seen = Vec::new();
                    for target_b in blocks {
                        if !seen.contains(&target_b) {
                            seen.push(target_b);
                            self.propagate(block, target_b, &stack, offset)?;
                        }
                    }
                    return Ok(());
                }
                (OpCode::Ret, _) => {
                    let operands = if self.code.ret.is_void() {
                        vec![]
                    } else {
                        vec![self.pop(&mut stack, offset)?]
                    };
                    if !stack.is_empty() {
                        log::warn!(
                            "return at IL_{offset:04x} leaves {} values on the stack",
                            stack.len()
                        );
                    }
                    self.emit(block, InstKind::Return, Type::Void, operands, vec![]);
                    return Ok(());
                }
                (OpCode::Throw, _) => {
                    let exception = self.pop(&mut stack, offset)?;
                    self.emit(block, InstKind::Throw, Type::Void, vec![exception], vec![]);
                    return Ok(());
                }
                (OpCode::Rethrow, _) => {
                    self.emit(block, InstKind::Rethrow, Type::Void, vec![], vec![]);
                    return Ok(());
                }
                (OpCode::Leave, Operand::Target(target)) => {
                    // leave empties the evaluation stack.
                    let target_b = self.target_block[target];
                    self.emit(block, InstKind::Leave, Type::Void, vec![], vec![target_b]);
                    self.propagate(block, target_b, &[], offset)?;
                    return Ok(());
                }
                (OpCode::Endfinally, _) => {
                    self.emit(block, InstKind::EndFinally, Type::Void, vec![], vec![]);
                    return Ok(());
                }
                (OpCode::Endfilter, _) => {
                    let decision = self.pop(&mut stack, offset)?;
                    self.emit(block, InstKind::EndFilter, Type::Void, vec![decision], vec![]);
                    return Ok(());
                }

                // ===== calls =====
                (OpCode::Call | OpCode::Callvirt, Operand::Method(method)) => {
                    let argc = method.sig.params.len() + usize::from(method.is_instance);
                    let mut operands = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        operands.push(self.pop(&mut stack, offset)?);
                    }
                    operands.reverse();
                    let ret = method.sig.ret.clone();
                    let kind = if Self::md_array_kind(method).is_some() {
                        InstKind::MDArrayOp(method.clone())
                    } else {
                        InstKind::Call(method.clone())
                    };
                    let value = self.emit(block, kind, ret.clone(), operands, vec![]);
                    if !ret.is_void() {
                        stack.push(value);
                    }
                }
                (OpCode::Newobj, Operand::Method(ctor)) => {
                    let argc = ctor.sig.params.len();
                    let mut operands = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        operands.push(self.pop(&mut stack, offset)?);
                    }
                    operands.reverse();
                    let ty = ctor.decl_type.clone();
                    let kind = if Self::md_array_kind(ctor).is_some() {
                        InstKind::MDArrayOp(ctor.clone())
                    } else {
                        InstKind::NewObj(ctor.clone())
                    };
                    let value = self.emit(block, kind, ty, operands, vec![]);
                    stack.push(value);
                }

                // ===== fields =====
                (OpCode::Ldfld, Operand::Field(field)) => {
                    let obj = self.pop(&mut stack, offset)?;
                    let value = if self.stack_type_of(&obj) == StackType::Struct {
                        self.emit(
                            block,
                            InstKind::ExtractField(field.clone()),
                            field.ty.clone(),
                            vec![obj],
                            vec![],
                        )
                    } else {
                        let addr_ty = self.byref(field.ty.clone());
                        let addr = self.emit(
                            block,
                            InstKind::FieldAddr(field.clone()),
                            addr_ty,
                            vec![obj],
                            vec![],
                        );
                        self.emit(block, InstKind::Load, field.ty.clone(), vec![addr], vec![])
                    };
                    stack.push(value);
                }
                (OpCode::Ldflda, Operand::Field(field)) => {
                    let obj = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(field.ty.clone());
                    let value = self.emit(
                        block,
                        InstKind::FieldAddr(field.clone()),
                        addr_ty,
                        vec![obj],
                        vec![],
                    );
                    stack.push(value);
                }
                (OpCode::Stfld, Operand::Field(field)) => {
                    let value = self.pop(&mut stack, offset)?;
                    let obj = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(field.ty.clone());
                    let addr = self.emit(
                        block,
                        InstKind::FieldAddr(field.clone()),
                        addr_ty,
                        vec![obj],
                        vec![],
                    );
                    self.emit(block, InstKind::Store, Type::Void, vec![addr, value], vec![]);
                }
                (OpCode::Ldsfld, Operand::Field(field)) => {
                    let addr_ty = self.byref(field.ty.clone());
                    let addr = self.emit(
                        block,
                        InstKind::FieldAddr(field.clone()),
                        addr_ty,
                        vec![],
                        vec![],
                    );
                    let value =
                        self.emit(block, InstKind::Load, field.ty.clone(), vec![addr], vec![]);
                    stack.push(value);
                }
                (OpCode::Ldsflda, Operand::Field(field)) => {
                    let addr_ty = self.byref(field.ty.clone());
                    let value = self.emit(
                        block,
                        InstKind::FieldAddr(field.clone()),
                        addr_ty,
                        vec![],
                        vec![],
                    );
                    stack.push(value);
                }
                (OpCode::Stsfld, Operand::Field(field)) => {
                    let value = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(field.ty.clone());
                    let addr = self.emit(
                        block,
                        InstKind::FieldAddr(field.clone()),
                        addr_ty,
                        vec![],
                        vec![],
                    );
                    self.emit(block, InstKind::Store, Type::Void, vec![addr, value], vec![]);
                }

                // ===== arrays =====
                (OpCode::Ldelem, Operand::Type(elem)) => {
                    let index_v = self.pop(&mut stack, offset)?;
                    let array = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(elem.clone());
                    let addr = self.emit(
                        block,
                        InstKind::ArrayAddr,
                        addr_ty,
                        vec![array, index_v],
                        vec![],
                    );
                    let value = self.emit(block, InstKind::Load, elem.clone(), vec![addr], vec![]);
                    stack.push(value);
                }
                (OpCode::Ldelema, Operand::Type(elem)) => {
                    let index_v = self.pop(&mut stack, offset)?;
                    let array = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(elem.clone());
                    let value = self.emit(
                        block,
                        InstKind::ArrayAddr,
                        addr_ty,
                        vec![array, index_v],
                        vec![],
                    );
                    stack.push(value);
                }
                (OpCode::Stelem, Operand::Type(elem)) => {
                    let value = self.pop(&mut stack, offset)?;
                    let index_v = self.pop(&mut stack, offset)?;
                    let array = self.pop(&mut stack, offset)?;
                    let addr_ty = self.byref(elem.clone());
                    let addr = self.emit(
                        block,
                        InstKind::ArrayAddr,
                        addr_ty,
                        vec![array, index_v],
                        vec![],
                    );
                    self.emit(block, InstKind::Store, Type::Void, vec![addr, value], vec![]);
                }
                (OpCode::Ldlen, _) => {
                    let array = self.pop(&mut stack, offset)?;
                    let value = self.emit(
                        block,
                        InstKind::Intrinsic(CilIntrinsic::ArrayLen),
                        Type::UIntPtr,
                        vec![array],
                        vec![],
                    );
                    stack.push(value);
                }
                (OpCode::Newarr, Operand::Type(elem)) => {
                    let length = self.pop(&mut stack, offset)?;
                    let array_ty = self.factory.get_array(elem.clone());
                    let value = self.emit(
                        block,
                        InstKind::Intrinsic(CilIntrinsic::NewArray(elem.clone())),
                        array_ty,
                        vec![length],
                        vec![],
                    );
                    stack.push(value);
                }

                // ===== indirect access =====
                (OpCode::LdindI4 | OpCode::LdindI8 | OpCode::LdindR8 | OpCode::LdindRef, _) => {
                    let addr = self.pop(&mut stack, offset)?;
                    let ty = match instr.opcode {
                        OpCode::LdindI4 => Type::I32,
                        OpCode::LdindI8 => Type::I64,
                        OpCode::LdindR8 => Type::F64,
                        _ => match self.body.value_type(&addr) {
                            Type::Byref(inner) => (*inner).clone(),
                            _ => Type::Object,
                        },
                    };
                    let value = self.emit(block, InstKind::Load, ty, vec![addr], vec![]);
                    stack.push(value);
                }
                (OpCode::StindI4 | OpCode::StindI8 | OpCode::StindR8 | OpCode::StindRef, _) => {
                    let value = self.pop(&mut stack, offset)?;
                    let addr = self.pop(&mut stack, offset)?;
                    self.emit(block, InstKind::Store, Type::Void, vec![addr, value], vec![]);
                }

                (OpCode::Sizeof, Operand::Type(ty)) => {
                    let value = self.emit(
                        block,
                        InstKind::Intrinsic(CilIntrinsic::SizeOf(ty.clone())),
                        Type::U32,
                        vec![],
                        vec![],
                    );
                    stack.push(value);
                }

                (opcode, operand) => {
                    return Err(invalid_input!(
                        offset,
                        "unsupported opcode {opcode:?} with operand {operand:?}"
                    ));
                }
            }

            index += 1;
        }
    }
}
