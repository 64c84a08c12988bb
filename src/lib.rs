#![doc(html_no_source)]
#![deny(missing_docs)]

//! # cilopt
//!
//! The core of a static optimizer for CIL-style managed bytecode: an SSA
//! intermediate representation, a frontend that imports stack-based
//! bytecode into it, and the analyses and simplification passes everything
//! else builds on.
//!
//! # Architecture
//!
//! The crate is organized into layers, leaves first:
//!
//! - **Type model** ([`types`]) — immutable, structurally compared type and
//!   member handles with an interning factory; shared read-only between
//!   method bodies
//! - **IR core** ([`ir`]) — [`ir::MethodBody`] arena owning blocks,
//!   instructions, variables and arguments; intrusive use lists; the
//!   editing primitives every pass is written against
//! - **Region tree** ([`regions`]) — nesting queries over the
//!   exception-handling table
//! - **Frontend** ([`frontend`]) — abstract interpretation of the
//!   evaluation stack producing SSA, with guards attached to protected
//!   regions
//! - **Analyses & passes** ([`analysis`], [`passes`]) — expression-forest
//!   reconstruction, dead-code elimination and control-flow simplification
//!
//! # Usage
//!
//! ```rust
//! use cilopt::frontend::{import_body, CilInstr, MethodCode, OpCode, Operand};
//! use cilopt::types::{Type, TypeFactory};
//!
//! // int32 f(int32 x, int32 y) => x + y
//! let code = MethodCode {
//!     args: vec![("x".into(), Type::I32), ("y".into(), Type::I32)],
//!     locals: vec![],
//!     ret: Type::I32,
//!     instrs: vec![
//!         CilInstr::with_operand(OpCode::Ldarg, 0, Operand::Argument(0)),
//!         CilInstr::with_operand(OpCode::Ldarg, 1, Operand::Argument(1)),
//!         CilInstr::new(OpCode::Add, 2),
//!         CilInstr::new(OpCode::Ret, 3),
//!     ],
//!     regions: vec![],
//! };
//!
//! let factory = TypeFactory::new();
//! let body = import_body(&code, &factory)?;
//! assert_eq!(body.to_string(), "B0:\n  v0 = add x, y\n  ret v0\n");
//! # Ok::<(), cilopt::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Malformed input surfaces as [`Error::InvalidInput`] or
//! [`Error::StackMismatch`] carrying the offending byte offset. API
//! contract violations assert in debug builds and leave the IR in a
//! well-defined detached state.
//!
//! # Thread Safety
//!
//! A [`ir::MethodBody`] and everything it owns belong to one thread at a
//! time. The [`types::TypeFactory`] is shared and thread-safe.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod frontend;
pub mod ir;
pub mod passes;
pub mod regions;
pub mod types;

pub use error::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
