//! Analyses over SSA method bodies.
//!
//! - [`alias`] — the may-alias oracle memory hazards are checked against
//! - [`forest`] — expression-tree reconstruction: classifies every
//!   instruction as a leaf (emitted inline inside its user's expression) or
//!   a root (emitted as its own statement)

pub mod alias;
pub mod forest;

pub use alias::{AliasAnalysis, MemLoc, TypeBasedAlias};
pub use forest::Forest;
