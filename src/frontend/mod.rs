//! Frontend: importing stack-based bytecode into the SSA IR.
//!
//! The entry point is [`import_body`], which consumes a decoded
//! [`MethodCode`] and produces a [`crate::ir::MethodBody`] with guard
//! instructions attached to protected regions. The submodules split the
//! work:
//!
//! - [`code`] — the decoded instruction/operand input model
//! - [`vars`] — the pre-SSA variable analysis ([`VarFlags`])
//! - the importer itself — leaders, blocks, guards, and the per-block
//!   abstract interpretation of the evaluation stack

pub mod code;
mod importer;
pub mod vars;

pub use code::{CilInstr, FlowKind, MethodCode, OpCode, Operand};
pub use importer::import_body;
pub use vars::{analyze_vars, VarAnalysis, VarFlags};
