use thiserror::Error;

macro_rules! invalid_input {
    // Single string version
    ($offset:expr, $msg:expr) => {
        crate::Error::InvalidInput {
            offset: $offset,
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($offset:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidInput {
            offset: $offset,
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, covering every failure this library can report.
///
/// Data-dependent failures (`InvalidInput`, `StackMismatch`, `Unsupported`)
/// carry the byte offset of the offending bytecode instruction so callers can
/// point at the input. `InvariantViolation` is a programmer error: the APIs
/// that detect one `debug_assert!` first and return this variant in release
/// builds.
///
/// # Examples
///
/// ```rust,ignore
/// match cilopt::frontend::import_body(&code, &types) {
///     Ok(body) => println!("{body}"),
///     Err(cilopt::Error::StackMismatch { offset, message }) => {
///         eprintln!("bad merge at IL_{offset:04x}: {message}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input bytecode is malformed.
    ///
    /// Covers stack underflow, invalid branch targets, unknown opcodes, and
    /// bad exception tables. Includes the source location where the problem
    /// was detected for debugging purposes.
    #[error("Invalid input at IL_{offset:04x} - {file}:{line}: {message}")]
    InvalidInput {
        /// Byte offset of the offending bytecode instruction.
        offset: u32,
        /// Description of what was malformed.
        message: String,
        /// The source file in which this error was raised.
        file: &'static str,
        /// The source line in which this error was raised.
        line: u32,
    },

    /// A block merge disagreed on evaluation stack depth or stack type.
    ///
    /// Raised when two predecessors deliver incompatible stacks to the same
    /// successor block during import.
    #[error("Stack mismatch at IL_{offset:04x}: {message}")]
    StackMismatch {
        /// Byte offset of the merge point.
        offset: u32,
        /// Description of the disagreement.
        message: String,
    },

    /// The input uses a construct the core explicitly does not handle.
    ///
    /// For example a non-zero generic parameter count on a function-pointer
    /// signature.
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    /// An API precondition failed.
    ///
    /// These are contract violations, not data errors. Debug builds assert
    /// before this is returned; the IR is left in a well-defined detached
    /// state.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
