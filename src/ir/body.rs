//! The method body arena and every structural mutation on it.
//!
//! All edits to blocks, instructions and use lists go through
//! [`MethodBody`]: cross-references are index handles into its arenas, so
//! only the body can resolve them. The editing primitives keep three things
//! consistent at all times:
//!
//! - the intrusive instruction chain of each block (`first`/`last`,
//!   per-instruction `prev`/`next`)
//! - the predecessor/successor edge sets, derived from terminators
//! - the use lists of every tracked value
//!
//! Iterators returned by this module assume no structural mutation while
//! they are live; passes collect handles first and then mutate.

use std::sync::Arc;

use crate::ir::inst::{InstData, InstKind};
use crate::ir::value::{ArgData, UseLink, UseList, UseRef, VarData, Value};
use crate::ir::{ArgId, BasicBlock, BlockId, InstId, VarId};
use crate::types::Type;

/// A method body: the arena owning all blocks, instructions, arguments and
/// variables, plus the distinguished entry block.
///
/// # Invariants
///
/// - the entry block has zero predecessors
/// - every complete block ends in a terminator
/// - header instructions (phis, guards) precede all others in their block
/// - for every tracked value, `num_uses` equals the number of operand slots
///   referencing it
#[derive(Debug)]
pub struct MethodBody {
    insts: Vec<InstData>,
    blocks: Vec<BasicBlock>,
    args: Vec<ArgData>,
    vars: Vec<VarData>,
    block_order: Vec<BlockId>,
    entry: BlockId,
}

impl MethodBody {
    /// Creates a body with the given arguments and a fresh, empty entry
    /// block.
    #[must_use]
    pub fn new(args: Vec<(Arc<str>, Type)>) -> Self {
        let mut body = Self {
            insts: Vec::new(),
            blocks: Vec::new(),
            args: args
                .into_iter()
                .map(|(name, ty)| ArgData {
                    name,
                    ty,
                    uses: UseList::default(),
                })
                .collect(),
            vars: Vec::new(),
            block_order: Vec::new(),
            entry: BlockId::from_index(0),
        };
        body.entry = body.create_block(None);
        body
    }

    // ===== blocks =====

    /// Returns the entry block.
    #[must_use]
    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Makes `block` the entry block.
    ///
    /// The new entry must have zero predecessors; debug builds assert.
    pub fn set_entry_block(&mut self, block: BlockId) {
        debug_assert!(
            self.block(block).num_preds() == 0,
            "entry block {block} must have no predecessors"
        );
        self.entry = block;
    }

    /// Creates an empty block, placed after `insert_after` in the body's
    /// block order (or last when `None`).
    pub fn create_block(&mut self, insert_after: Option<BlockId>) -> BlockId {
        let id = BlockId::from_index(self.blocks.len());
        self.blocks.push(BasicBlock::default());
        match insert_after.and_then(|a| self.block_order.iter().position(|b| *b == a)) {
            Some(pos) => self.block_order.insert(pos + 1, id),
            None => self.block_order.push(id),
        }
        id
    }

    /// Creates an empty block placed immediately before `before` in the
    /// body's block order.
    pub fn create_block_before(&mut self, before: BlockId) -> BlockId {
        let id = BlockId::from_index(self.blocks.len());
        self.blocks.push(BasicBlock::default());
        let pos = self
            .block_order
            .iter()
            .position(|b| *b == before)
            .expect("reference block is live");
        self.block_order.insert(pos, id);
        id
    }

    /// Returns a block by handle.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Iterates live blocks in body order. The entry block comes first only
    /// if no block was inserted before it; printing uses this order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.block_order.iter().copied()
    }

    /// Returns the number of live blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }

    /// Removes a block: deletes its phi contributions from successors,
    /// clears and detaches every instruction, and drops its edges.
    ///
    /// Instructions of the removed block must not be referenced from live
    /// blocks (unreachable definitions cannot dominate reachable uses);
    /// references from other blocks being removed in the same sweep are
    /// fine.
    pub fn remove_block(&mut self, id: BlockId) {
        debug_assert!(id != self.entry, "cannot remove the entry block");

        for succ in self.blocks[id.index()].succs.clone() {
            self.redirect_phis(succ, id, None);
        }

        let ids: Vec<InstId> = self.block_insts(id).collect();
        for inst in &ids {
            self.clear_operands(*inst);
        }
        for inst in &ids {
            self.detach(*inst);
        }

        for pred in self.blocks[id.index()].preds.clone() {
            self.blocks[pred.index()].succs.retain(|s| *s != id);
        }
        let block = &mut self.blocks[id.index()];
        block.preds.clear();
        block.succs.clear();
        block.removed = true;
        self.block_order.retain(|b| *b != id);
    }

    // ===== arguments and variables =====

    /// Returns the number of arguments.
    #[must_use]
    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    /// Returns an argument by handle.
    #[must_use]
    pub fn arg(&self, id: ArgId) -> &ArgData {
        &self.args[id.index()]
    }

    /// Iterates argument handles.
    pub fn arg_ids(&self) -> impl Iterator<Item = ArgId> {
        (0..self.args.len()).map(ArgId::from_index)
    }

    /// Creates a memory-backed variable slot.
    pub fn new_var(&mut self, name: Arc<str>, ty: Type, is_exposed: bool) -> VarId {
        let id = VarId::from_index(self.vars.len());
        self.vars.push(VarData {
            name,
            ty,
            is_exposed,
            uses: UseList::default(),
        });
        id
    }

    /// Returns a variable by handle.
    #[must_use]
    pub fn var(&self, id: VarId) -> &VarData {
        &self.vars[id.index()]
    }

    // ===== instructions =====

    /// Creates a detached instruction and registers its operand uses.
    ///
    /// The instruction belongs to no block until inserted with one of the
    /// placement primitives.
    pub fn create_inst(
        &mut self,
        kind: InstKind,
        ty: Type,
        operands: Vec<Value>,
        block_args: Vec<BlockId>,
    ) -> InstId {
        let id = InstId::from_index(self.insts.len());
        let links = vec![UseLink::default(); operands.len()];
        self.insts.push(InstData {
            kind,
            ty,
            operands,
            links,
            block_args,
            block: None,
            prev: None,
            next: None,
            uses: UseList::default(),
        });
        for index in 0..self.insts[id.index()].operands.len() {
            let value = self.insts[id.index()].operands[index].clone();
            #[allow(clippy::cast_possible_truncation)]
            self.add_use(&value, UseRef::new(id, index as u32));
        }
        id
    }

    /// Returns an instruction by handle.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    /// Returns the result type of any value.
    #[must_use]
    pub fn value_type(&self, value: &Value) -> Type {
        match value {
            Value::Const(c) => c.ty(),
            Value::Arg(a) => self.args[a.index()].ty.clone(),
            Value::Var(v) => self.vars[v.index()].ty.clone(),
            Value::Inst(i) => self.insts[i.index()].ty.clone(),
        }
    }

    // ===== use lists =====

    fn use_list(&self, value: &Value) -> Option<&UseList> {
        match value {
            Value::Const(_) => None,
            Value::Arg(a) => Some(&self.args[a.index()].uses),
            Value::Var(v) => Some(&self.vars[v.index()].uses),
            Value::Inst(i) => Some(&self.insts[i.index()].uses),
        }
    }

    fn use_list_mut(&mut self, value: &Value) -> Option<&mut UseList> {
        match value {
            Value::Const(_) => None,
            Value::Arg(a) => Some(&mut self.args[a.index()].uses),
            Value::Var(v) => Some(&mut self.vars[v.index()].uses),
            Value::Inst(i) => Some(&mut self.insts[i.index()].uses),
        }
    }

    /// Returns the number of uses of `value`; zero for constants.
    #[must_use]
    pub fn num_uses(&self, value: &Value) -> u32 {
        self.use_list(value).map_or(0, |l| l.count)
    }

    /// Iterates the uses of `value` as `(user, operand index)` pairs.
    ///
    /// The iterator is invalidated by any structural mutation.
    #[must_use]
    pub fn uses(&self, value: &Value) -> UseIter<'_> {
        UseIter {
            body: self,
            cur: self.use_list(value).and_then(|l| l.first),
        }
    }

    /// Iterates the instructions using `value`; an instruction using it in
    /// several operand slots appears once per slot.
    pub fn users(&self, value: &Value) -> impl Iterator<Item = InstId> + '_ {
        self.uses(value).map(|u| u.user)
    }

    /// Returns the single using instruction, if `value` has exactly one use.
    #[must_use]
    pub fn sole_user(&self, value: &Value) -> Option<InstId> {
        let list = self.use_list(value)?;
        if list.count == 1 {
            list.first.map(|u| u.user)
        } else {
            None
        }
    }

    fn add_use(&mut self, value: &Value, use_ref: UseRef) {
        let Some(list) = self.use_list_mut(value) else {
            return;
        };
        let old_first = list.first;
        list.first = Some(use_ref);
        list.count += 1;

        self.insts[use_ref.user.index()].links[use_ref.index as usize] = UseLink {
            prev: None,
            next: old_first,
        };
        if let Some(next) = old_first {
            self.insts[next.user.index()].links[next.index as usize].prev = Some(use_ref);
        }
    }

    fn remove_use(&mut self, value: &Value, use_ref: UseRef) {
        if !value.is_tracked() {
            return;
        }
        let link = self.insts[use_ref.user.index()].links[use_ref.index as usize];
        if let Some(prev) = link.prev {
            self.insts[prev.user.index()].links[prev.index as usize].next = link.next;
        }
        if let Some(next) = link.next {
            self.insts[next.user.index()].links[next.index as usize].prev = link.prev;
        }
        let list = self
            .use_list_mut(value)
            .expect("tracked value has a use list");
        if list.first == Some(use_ref) {
            list.first = link.next;
        }
        list.count -= 1;
        self.insts[use_ref.user.index()].links[use_ref.index as usize] = UseLink::default();
    }

    /// Redirects every use of `old` to `new` and merges the use list into
    /// `new` in one pass over `old`'s uses, allocating nothing.
    ///
    /// No-op when `old == new`, when `old` is untracked, or when `old` has
    /// no uses.
    pub fn replace_uses(&mut self, old: &Value, new: &Value) {
        if old == new {
            return;
        }
        let Some(first) = self.use_list(old).and_then(|l| l.first) else {
            return;
        };

        let mut cur = Some(first);
        let mut tail = first;
        while let Some(u) = cur {
            self.insts[u.user.index()].operands[u.index as usize] = new.clone();
            tail = u;
            cur = self.insts[u.user.index()].links[u.index as usize].next;
        }

        let count = {
            let list = self.use_list_mut(old).expect("old is tracked");
            let count = list.count;
            list.first = None;
            list.count = 0;
            count
        };

        if let Some(list) = self.use_list_mut(new) {
            let spliced = list.first;
            list.first = Some(first);
            list.count += count;
            self.insts[tail.user.index()].links[tail.index as usize].next = spliced;
            if let Some(next) = spliced {
                self.insts[next.user.index()].links[next.index as usize].prev = Some(tail);
            }
        }
    }

    /// Rewrites one operand slot, maintaining both use lists.
    pub fn set_operand(&mut self, user: InstId, index: u32, value: Value) {
        let old = self.insts[user.index()].operands[index as usize].clone();
        if old == value {
            return;
        }
        self.remove_use(&old, UseRef::new(user, index));
        self.insts[user.index()].operands[index as usize] = value.clone();
        self.add_use(&value, UseRef::new(user, index));
    }

    pub(crate) fn clear_operands(&mut self, id: InstId) {
        for index in 0..self.insts[id.index()].operands.len() {
            let value = self.insts[id.index()].operands[index].clone();
            #[allow(clippy::cast_possible_truncation)]
            self.remove_use(&value, UseRef::new(id, index as u32));
        }
        let inst = &mut self.insts[id.index()];
        inst.operands.clear();
        inst.links.clear();
        inst.block_args.clear();
    }

    // ===== placement =====

    fn link_between(
        &mut self,
        block: BlockId,
        id: InstId,
        prev: Option<InstId>,
        next: Option<InstId>,
    ) {
        debug_assert!(
            self.insts[id.index()].block.is_none(),
            "instruction {id} is already placed"
        );
        {
            let inst = &mut self.insts[id.index()];
            inst.block = Some(block);
            inst.prev = prev;
            inst.next = next;
        }
        match prev {
            Some(p) => self.insts[p.index()].next = Some(id),
            None => self.blocks[block.index()].first = Some(id),
        }
        match next {
            Some(n) => self.insts[n.index()].prev = Some(id),
            None => self.blocks[block.index()].last = Some(id),
        }
        if next.is_none() && self.insts[id.index()].is_terminator() {
            self.recompute_succs(block);
        }
    }

    /// Appends `id` at the end of `block`.
    pub fn append(&mut self, block: BlockId, id: InstId) {
        let last = self.blocks[block.index()].last;
        self.link_between(block, id, last, None);
    }

    /// Inserts `id` immediately before `before`.
    pub fn insert_before(&mut self, id: InstId, before: InstId) {
        let block = self.insts[before.index()]
            .block
            .expect("insertion point is detached");
        let prev = self.insts[before.index()].prev;
        self.link_between(block, id, prev, Some(before));
    }

    /// Inserts `id` immediately after `after`.
    pub fn insert_after(&mut self, id: InstId, after: InstId) {
        let block = self.insts[after.index()]
            .block
            .expect("insertion point is detached");
        let next = self.insts[after.index()].next;
        self.link_between(block, id, Some(after), next);
    }

    /// Inserts `id` immediately before `block`'s terminator, or at the end
    /// when the block has none yet.
    pub fn insert_ante_last(&mut self, block: BlockId, id: InstId) {
        match self.blocks[block.index()].last {
            Some(last) if self.insts[last.index()].is_terminator() => {
                self.insert_before(id, last);
            }
            _ => self.append(block, id),
        }
    }

    /// Inserts a header instruction after the block's existing headers.
    pub fn insert_header(&mut self, block: BlockId, id: InstId) {
        debug_assert!(self.insts[id.index()].is_header());
        match self.first_non_header(block) {
            Some(first) => self.insert_before(id, first),
            None => self.append(block, id),
        }
    }

    fn detach(&mut self, id: InstId) {
        let Some(block) = self.insts[id.index()].block else {
            return;
        };
        let prev = self.insts[id.index()].prev;
        let next = self.insts[id.index()].next;
        let was_terminator = next.is_none() && self.insts[id.index()].is_terminator();

        match prev {
            Some(p) => self.insts[p.index()].next = next,
            None => self.blocks[block.index()].first = next,
        }
        match next {
            Some(n) => self.insts[n.index()].prev = prev,
            None => self.blocks[block.index()].last = prev,
        }
        let inst = &mut self.insts[id.index()];
        inst.block = None;
        inst.prev = None;
        inst.next = None;

        if was_terminator {
            self.recompute_succs(block);
        }
    }

    /// Removes an instruction: detaches it from its block and clears its
    /// operands (dropping it from every operand's use list).
    ///
    /// Removing an instruction whose result is still used is a contract
    /// violation: debug builds assert; release builds proceed, leaving the
    /// instruction in the detached state with its operands cleared.
    pub fn remove_inst(&mut self, id: InstId) {
        debug_assert!(
            self.insts[id.index()].uses.count == 0,
            "removing instruction {id} with {} remaining uses",
            self.insts[id.index()].uses.count
        );
        self.detach(id);
        self.clear_operands(id);
    }

    /// Replaces all uses of `id`'s result with `value`, then removes `id`.
    pub fn replace_with(&mut self, id: InstId, value: Value) {
        self.replace_uses(&Value::Inst(id), &value);
        self.remove_inst(id);
    }

    /// Splices the contiguous range `[first, last]` out of its block and
    /// into `dest` after `after` (`None` places it at the head).
    ///
    /// `first` and `last` must belong to the same block with `first`
    /// preceding `last`.
    pub fn move_range(
        &mut self,
        dest: BlockId,
        after: Option<InstId>,
        first: InstId,
        last: InstId,
    ) {
        let src = self.insts[first.index()]
            .block
            .expect("move_range source is detached");
        debug_assert_eq!(self.insts[last.index()].block, Some(src));

        // Unlink from the source block.
        let before = self.insts[first.index()].prev;
        let after_src = self.insts[last.index()].next;
        let moved_terminator = after_src.is_none()
            && self.insts[last.index()].is_terminator();
        match before {
            Some(p) => self.insts[p.index()].next = after_src,
            None => self.blocks[src.index()].first = after_src,
        }
        match after_src {
            Some(n) => self.insts[n.index()].prev = before,
            None => self.blocks[src.index()].last = before,
        }

        // Re-home the chain.
        let mut cur = Some(first);
        while let Some(id) = cur {
            self.insts[id.index()].block = Some(dest);
            if id == last {
                break;
            }
            cur = self.insts[id.index()].next;
        }

        // Link into the destination.
        let (prev, next) = match after {
            Some(a) => {
                debug_assert_eq!(self.insts[a.index()].block, Some(dest));
                (Some(a), self.insts[a.index()].next)
            }
            None => (None, self.blocks[dest.index()].first),
        };
        self.insts[first.index()].prev = prev;
        self.insts[last.index()].next = next;
        match prev {
            Some(p) => self.insts[p.index()].next = Some(first),
            None => self.blocks[dest.index()].first = Some(first),
        }
        match next {
            Some(n) => self.insts[n.index()].prev = Some(last),
            None => self.blocks[dest.index()].last = Some(last),
        }

        if moved_terminator {
            self.recompute_succs(src);
        }
        if next.is_none() && self.insts[last.index()].is_terminator() {
            self.recompute_succs(dest);
        }
    }

    /// Rewrites `block`'s terminator to an unconditional jump to `target`,
    /// deleting successor-phi arguments for every dropped edge.
    pub fn set_branch(&mut self, block: BlockId, target: BlockId) {
        for succ in self.blocks[block.index()].succs.clone() {
            if succ != target {
                self.redirect_phis(succ, block, None);
            }
        }
        if let Some(last) = self.blocks[block.index()].last {
            if self.insts[last.index()].is_terminator() {
                self.remove_inst(last);
            }
        }
        let jump = self.create_inst(InstKind::Branch, Type::Void, vec![], vec![target]);
        self.append(block, jump);
    }

    /// For every phi in `block`, rewrites the incoming edge from `from` to
    /// `new_pred`, deleting the argument when `new_pred` is `None`.
    pub fn redirect_phis(&mut self, block: BlockId, from: BlockId, new_pred: Option<BlockId>) {
        let phis: Vec<InstId> = self
            .block_insts(block)
            .take_while(|id| self.insts[id.index()].is_header())
            .filter(|id| matches!(self.insts[id.index()].kind, InstKind::Phi))
            .collect();
        for phi in phis {
            let Some(pos) = self.insts[phi.index()]
                .block_args
                .iter()
                .position(|p| *p == from)
            else {
                continue;
            };
            match new_pred {
                Some(pred) => self.insts[phi.index()].block_args[pos] = pred,
                None => self.phi_remove_arg(phi, pos),
            }
        }
    }

    /// For every successor of `block`, rewrites phi edges naming `from` to
    /// name `block` instead.
    pub fn redirect_succ_phis(&mut self, block: BlockId, from: BlockId) {
        for succ in self.blocks[block.index()].succs.clone() {
            self.redirect_phis(succ, from, Some(block));
        }
    }

    /// Appends an incoming `(pred, value)` argument to a phi.
    pub fn phi_add_arg(&mut self, phi: InstId, pred: BlockId, value: Value) {
        debug_assert!(matches!(self.insts[phi.index()].kind, InstKind::Phi));
        let index = self.insts[phi.index()].operands.len();
        self.insts[phi.index()].operands.push(value.clone());
        self.insts[phi.index()].links.push(UseLink::default());
        self.insts[phi.index()].block_args.push(pred);
        #[allow(clippy::cast_possible_truncation)]
        self.add_use(&value, UseRef::new(phi, index as u32));
    }

    fn phi_remove_arg(&mut self, phi: InstId, pos: usize) {
        let last = self.insts[phi.index()].operands.len() - 1;
        let removed = self.insts[phi.index()].operands[pos].clone();
        #[allow(clippy::cast_possible_truncation)]
        self.remove_use(&removed, UseRef::new(phi, pos as u32));

        if pos != last {
            let moved = self.insts[phi.index()].operands[last].clone();
            #[allow(clippy::cast_possible_truncation)]
            self.remove_use(&moved, UseRef::new(phi, last as u32));
            let inst = &mut self.insts[phi.index()];
            inst.operands.swap_remove(pos);
            inst.links.swap_remove(pos);
            inst.block_args.swap_remove(pos);
            inst.links[pos] = UseLink::default();
            #[allow(clippy::cast_possible_truncation)]
            self.add_use(&moved, UseRef::new(phi, pos as u32));
        } else {
            let inst = &mut self.insts[phi.index()];
            inst.operands.pop();
            inst.links.pop();
            inst.block_args.pop();
        }
    }

    // ===== edges =====

    fn recompute_succs(&mut self, block: BlockId) {
        for succ in self.blocks[block.index()].succs.clone() {
            self.blocks[succ.index()].remove_pred(block);
        }
        self.blocks[block.index()].succs.clear();

        let Some(last) = self.blocks[block.index()].last else {
            return;
        };
        if !self.insts[last.index()].is_terminator() {
            return;
        }
        for target in self.insts[last.index()].block_args.clone() {
            self.blocks[block.index()].add_succ(target);
            self.blocks[target.index()].add_pred(block);
        }
    }

    /// Rewrites a terminator's block argument at `pos` and refreshes edges.
    pub fn set_branch_target(&mut self, term: InstId, pos: usize, target: BlockId) {
        debug_assert!(self.insts[term.index()].is_terminator());
        self.insts[term.index()].block_args[pos] = target;
        if let Some(block) = self.insts[term.index()].block {
            self.recompute_succs(block);
        }
    }

    // ===== traversal =====

    /// Returns the first non-header instruction of `block`.
    #[must_use]
    pub fn first_non_header(&self, block: BlockId) -> Option<InstId> {
        let mut cur = self.blocks[block.index()].first;
        while let Some(id) = cur {
            if !self.insts[id.index()].is_header() {
                return Some(id);
            }
            cur = self.insts[id.index()].next;
        }
        None
    }

    /// Returns `true` if `block` starts with at least one header
    /// instruction.
    #[must_use]
    pub fn has_header(&self, block: BlockId) -> bool {
        self.blocks[block.index()]
            .first
            .is_some_and(|id| self.insts[id.index()].is_header())
    }

    /// Returns `block`'s terminator, if its last instruction is one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.blocks[block.index()]
            .last
            .filter(|id| self.insts[id.index()].is_terminator())
    }

    /// Iterates the instructions of `block` in order.
    #[must_use]
    pub fn block_insts(&self, block: BlockId) -> InstIter<'_> {
        InstIter {
            body: self,
            cur: self.blocks[block.index()].first,
        }
    }

    /// Iterates the phis of `block`.
    pub fn block_phis(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        self.block_insts(block)
            .take_while(|id| self.inst(*id).is_header())
            .filter(|id| matches!(self.inst(*id).kind, InstKind::Phi))
    }

    /// Iterates every instruction of the body, blocks in body order.
    pub fn iter_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.block_order
            .iter()
            .flat_map(move |block| self.block_insts(*block))
    }
}

/// Iterator over a block's instruction chain.
///
/// Invalidated by structural mutation of the chain it walks.
pub struct InstIter<'a> {
    body: &'a MethodBody,
    cur: Option<InstId>,
}

impl Iterator for InstIter<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<InstId> {
        let id = self.cur?;
        self.cur = self.body.inst(id).next();
        Some(id)
    }
}

/// Iterator over a tracked value's uses.
///
/// Invalidated by structural mutation of the use list it walks.
pub struct UseIter<'a> {
    body: &'a MethodBody,
    cur: Option<UseRef>,
}

impl Iterator for UseIter<'_> {
    type Item = UseRef;

    fn next(&mut self) -> Option<UseRef> {
        let use_ref = self.cur?;
        self.cur = self.body.inst(use_ref.user).links[use_ref.index as usize].next;
        Some(use_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Const};

    fn empty_body() -> MethodBody {
        MethodBody::new(vec![("x".into(), Type::I32), ("y".into(), Type::I32)])
    }

    fn add_inst(body: &mut MethodBody, left: Value, right: Value) -> InstId {
        body.create_inst(InstKind::Bin(BinOp::Add), Type::I32, vec![left, right], vec![])
    }

    #[test]
    fn test_use_counts_match_operand_slots() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let x = Value::Arg(ArgId::from_index(0));

        // x used twice by the same instruction, once by another
        let a = add_inst(&mut body, x.clone(), x.clone());
        body.append(entry, a);
        let b = add_inst(&mut body, x.clone(), Value::Inst(a));
        body.append(entry, b);

        assert_eq!(body.num_uses(&x), 3);
        assert_eq!(body.num_uses(&Value::Inst(a)), 1);
        assert_eq!(body.uses(&x).count(), 3);
        assert_eq!(body.sole_user(&Value::Inst(a)), Some(b));
    }

    #[test]
    fn test_replace_uses_moves_all_users() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let x = Value::Arg(ArgId::from_index(0));
        let y = Value::Arg(ArgId::from_index(1));

        let a = add_inst(&mut body, x.clone(), x.clone());
        body.append(entry, a);
        let b = add_inst(&mut body, x.clone(), y.clone());
        body.append(entry, b);

        body.replace_uses(&x, &y);

        assert_eq!(body.num_uses(&x), 0);
        assert_eq!(body.num_uses(&y), 4);
        assert_eq!(body.inst(a).operands(), &[y.clone(), y.clone()]);
        assert_eq!(body.inst(b).operands(), &[y.clone(), y.clone()]);
        // List is walkable across the splice point.
        assert_eq!(body.uses(&y).count(), 4);
    }

    #[test]
    fn test_replace_uses_no_op_cases() {
        let mut body = empty_body();
        let x = Value::Arg(ArgId::from_index(0));
        let y = Value::Arg(ArgId::from_index(1));

        // No uses: nothing to do.
        body.replace_uses(&x, &y);
        assert_eq!(body.num_uses(&y), 0);

        // Same value: nothing to do.
        let entry = body.entry_block();
        let a = add_inst(&mut body, x.clone(), x.clone());
        body.append(entry, a);
        body.replace_uses(&x, &x);
        assert_eq!(body.num_uses(&x), 2);
    }

    #[test]
    fn test_replace_uses_with_constant() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let x = Value::Arg(ArgId::from_index(0));

        let a = add_inst(&mut body, x.clone(), Value::Const(Const::i32(1)));
        body.append(entry, a);

        body.replace_uses(&x, &Value::Const(Const::i32(7)));
        assert_eq!(body.num_uses(&x), 0);
        assert_eq!(body.inst(a).operands()[0], Value::Const(Const::i32(7)));
    }

    #[test]
    fn test_remove_inst_clears_operand_uses() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let x = Value::Arg(ArgId::from_index(0));

        let a = add_inst(&mut body, x.clone(), x.clone());
        body.append(entry, a);
        assert_eq!(body.num_uses(&x), 2);

        body.remove_inst(a);
        assert_eq!(body.num_uses(&x), 0);
        assert_eq!(body.inst(a).block(), None);
        assert!(body.block_insts(entry).next().is_none());
    }

    #[test]
    fn test_insert_ordering() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let x = Value::Arg(ArgId::from_index(0));

        let a = add_inst(&mut body, x.clone(), x.clone());
        body.append(entry, a);
        let ret = body.create_inst(InstKind::Return, Type::Void, vec![], vec![]);
        body.append(entry, ret);

        let b = add_inst(&mut body, x.clone(), x.clone());
        body.insert_before(b, ret);
        let c = add_inst(&mut body, x.clone(), x.clone());
        body.insert_after(c, a);
        let d = add_inst(&mut body, x.clone(), x.clone());
        body.insert_ante_last(entry, d);

        let order: Vec<InstId> = body.block_insts(entry).collect();
        assert_eq!(order, vec![a, c, b, d, ret]);
    }

    #[test]
    fn test_edges_follow_terminators() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let other = body.create_block(Some(entry));

        let jump = body.create_inst(InstKind::Branch, Type::Void, vec![], vec![other]);
        body.append(entry, jump);

        assert_eq!(body.block(entry).succs(), &[other]);
        assert_eq!(body.block(other).preds(), &[entry]);
        assert_eq!(body.block(entry).num_preds(), 0);

        body.remove_inst(jump);
        assert!(body.block(entry).succs().is_empty());
        assert!(body.block(other).preds().is_empty());
    }

    #[test]
    fn test_set_branch_updates_phis() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let then_b = body.create_block(Some(entry));
        let else_b = body.create_block(Some(then_b));
        let merge = body.create_block(Some(else_b));

        let cond = Value::Arg(ArgId::from_index(0));
        let br = body.create_inst(
            InstKind::Branch,
            Type::Void,
            vec![cond],
            vec![then_b, else_b],
        );
        body.append(entry, br);

        let j1 = body.create_inst(InstKind::Branch, Type::Void, vec![], vec![merge]);
        body.append(then_b, j1);
        let j2 = body.create_inst(InstKind::Branch, Type::Void, vec![], vec![merge]);
        body.append(else_b, j2);

        let phi = body.create_inst(
            InstKind::Phi,
            Type::I32,
            vec![Value::Const(Const::i32(1)), Value::Const(Const::i32(2))],
            vec![then_b, else_b],
        );
        body.insert_header(merge, phi);

        // Rewire else_b away from merge; its phi argument must disappear.
        let dead_end = body.create_block(Some(merge));
        body.set_branch(else_b, dead_end);

        assert_eq!(body.inst(phi).operands().len(), 1);
        assert_eq!(body.inst(phi).block_args(), &[then_b]);
        assert_eq!(body.block(else_b).succs(), &[dead_end]);
    }

    #[test]
    fn test_move_range_splices_chain() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let dest = body.create_block(Some(entry));
        let x = Value::Arg(ArgId::from_index(0));

        let a = add_inst(&mut body, x.clone(), x.clone());
        let b = add_inst(&mut body, Value::Inst(a), x.clone());
        let c = add_inst(&mut body, Value::Inst(b), x.clone());
        body.append(entry, a);
        body.append(entry, b);
        body.append(entry, c);

        body.move_range(dest, None, a, b);

        let entry_insts: Vec<InstId> = body.block_insts(entry).collect();
        let dest_insts: Vec<InstId> = body.block_insts(dest).collect();
        assert_eq!(entry_insts, vec![c]);
        assert_eq!(dest_insts, vec![a, b]);
        assert_eq!(body.inst(a).block(), Some(dest));
        assert_eq!(body.inst(b).block(), Some(dest));
    }

    #[test]
    fn test_remove_block_prunes_succ_phis() {
        let mut body = empty_body();
        let entry = body.entry_block();
        let side = body.create_block(Some(entry));
        let merge = body.create_block(Some(side));

        let j0 = body.create_inst(InstKind::Branch, Type::Void, vec![], vec![merge]);
        body.append(entry, j0);
        let v = add_inst(
            &mut body,
            Value::Arg(ArgId::from_index(0)),
            Value::Arg(ArgId::from_index(1)),
        );
        body.append(side, v);
        let j1 = body.create_inst(InstKind::Branch, Type::Void, vec![], vec![merge]);
        body.append(side, j1);

        let phi = body.create_inst(
            InstKind::Phi,
            Type::I32,
            vec![Value::Const(Const::i32(0)), Value::Inst(v)],
            vec![entry, side],
        );
        body.insert_header(merge, phi);

        body.remove_block(side);

        assert_eq!(body.inst(phi).operands().len(), 1);
        assert_eq!(body.inst(phi).block_args(), &[entry]);
        assert!(body.block(side).is_removed());
        assert_eq!(body.num_blocks(), 2);
        assert_eq!(body.block(merge).preds(), &[entry]);
    }

    #[test]
    fn test_entry_block_has_no_preds() {
        let body = empty_body();
        assert_eq!(body.block(body.entry_block()).num_preds(), 0);
    }
}
