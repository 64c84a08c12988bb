//! Basic-block storage: instruction list cursors and CFG edge sets.
//!
//! A block owns an intrusive doubly-linked list of instructions (the links
//! live in the instructions themselves). Header instructions — phis and
//! guards — must precede all others; the last instruction is always the
//! terminator once the block is complete.

use crate::ir::{BlockId, InstId};

/// A basic block inside a [`crate::ir::MethodBody`].
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub(crate) first: Option<InstId>,
    pub(crate) last: Option<InstId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) removed: bool,
}

impl BasicBlock {
    /// Returns the first instruction, or `None` for an empty block.
    #[must_use]
    pub fn first(&self) -> Option<InstId> {
        self.first
    }

    /// Returns the last instruction (the terminator once complete).
    #[must_use]
    pub fn last(&self) -> Option<InstId> {
        self.last
    }

    /// Returns the predecessor set.
    ///
    /// Guard handler edges are exception edges and are not part of this set.
    #[must_use]
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// Returns the successor set.
    #[must_use]
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    /// Returns the number of predecessors.
    #[must_use]
    pub fn num_preds(&self) -> usize {
        self.preds.len()
    }

    /// Returns the number of successors.
    #[must_use]
    pub fn num_succs(&self) -> usize {
        self.succs.len()
    }

    /// Returns `true` if this block has been removed from its body.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Adds an edge endpoint, keeping the set property.
    pub(crate) fn add_pred(&mut self, pred: BlockId) {
        if !self.preds.contains(&pred) {
            self.preds.push(pred);
        }
    }

    pub(crate) fn remove_pred(&mut self, pred: BlockId) {
        self.preds.retain(|p| *p != pred);
    }

    pub(crate) fn add_succ(&mut self, succ: BlockId) {
        if !self.succs.contains(&succ) {
            self.succs.push(succ);
        }
    }
}
