//! In-memory intermediate representation in SSA form.
//!
//! The IR is a two-layer ownership model: a [`MethodBody`] arena owns every
//! block, instruction, variable and argument slot; all cross-references are
//! typed index handles whose validity is tied to the body. Operands never
//! own their referents.
//!
//! # Use Lists
//!
//! Every tracked value (instruction result, argument, variable) maintains an
//! intrusive doubly-linked list of its uses. A use is a `(user, operand
//! index)` pair; the forward/back pointers of the list live inside the user
//! instruction's operand storage, parallel to the operand array, so no list
//! nodes are ever separately allocated.
//!
//! # Structure
//!
//! ```text
//! MethodBody
//!   ├── BasicBlock*      ordered, with a distinguished entry block
//!   │     └── Instruction*   intrusive prev/next chain, terminator last
//!   ├── Argument*        incoming parameters
//!   └── Variable*        memory-backed local slots
//! ```
//!
//! # Thread Safety
//!
//! A body and everything it owns is accessed by at most one thread at a
//! time. Distinct bodies may be transformed concurrently.

mod block;
mod body;
mod builder;
mod inst;
mod print;
mod value;
pub mod verify;

pub use block::BasicBlock;
pub use body::{InstIter, MethodBody, UseIter};
pub use builder::{BlockBuilder, BodyBuilder};
pub use inst::{BinOp, CilIntrinsic, CmpOp, GuardKind, InstData, InstKind};
pub use print::SymbolTable;
pub use value::{ArgData, Const, UseLink, UseRef, Value, VarData};

use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Creates a handle from a raw index.
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            /// Returns the raw index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id! {
    /// Handle to an instruction owned by a [`MethodBody`].
    InstId, "v"
}
define_id! {
    /// Handle to a basic block owned by a [`MethodBody`].
    BlockId, "B"
}
define_id! {
    /// Handle to a memory-backed variable owned by a [`MethodBody`].
    VarId, "$"
}
define_id! {
    /// Handle to an incoming argument of a [`MethodBody`].
    ArgId, "a"
}
