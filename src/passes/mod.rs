//! Built-in simplification passes.
//!
//! Each pass operates on one [`MethodBody`](crate::ir::MethodBody) and
//! returns an [`Invalidations`] mask describing which analyses it may have
//! broken. Passes never fail for data-dependent reasons: they transform or
//! report no change.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`DeadCodePass`] | Removes unreachable blocks, unused definitions, and trivial phis |
//! | [`SimplifyCfgPass`] | Inverts compare-to-zero branches and merges single-predecessor jump chains |

mod deadcode;
mod simplifycfg;

pub use deadcode::DeadCodePass;
pub use simplifycfg::SimplifyCfgPass;

use bitflags::bitflags;

use crate::ir::MethodBody;
use crate::Result;

bitflags! {
    /// Analyses a pass may have invalidated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Invalidations: u32 {
        /// Block structure or edges changed.
        const CONTROL_FLOW = 1 << 0;
        /// Instructions were added, removed or rewritten.
        const INSTRUCTIONS = 1 << 1;
        /// Everything.
        const ALL = Self::CONTROL_FLOW.bits() | Self::INSTRUCTIONS.bits();
    }
}

/// A transformation over one method body.
pub trait Pass {
    /// Short stable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Runs the pass. Returns the empty mask when nothing changed.
    fn run(&self, body: &mut MethodBody) -> Result<Invalidations>;
}
