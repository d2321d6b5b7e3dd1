use thiserror::Error;

use crate::instrument::Signature;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use malformed_error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups. Pass-time errors are precondition violations detected
/// while planning or emitting instrumentation for a function; they abort instrumentation of
/// that function and leave it untouched. Execution errors are raised by the
/// [`crate::emulation`] interpreter when the program under test cannot be executed at all.
///
/// Control-flow integrity violations are *not* errors: they are the expected output of the
/// instrumentation and are reported through [`crate::emulation::FaultHandler`] and
/// [`crate::emulation::ExecutionOutcome::Faulted`].
///
/// # Error Categories
///
/// ## Pass-time Errors
/// - [`Error::Malformed`] - The function or module violates a structural precondition
/// - [`Error::GraphError`] - The control flow graph could not be constructed
/// - [`Error::DuplicateSignature`] - Two blocks were given the same signature
/// - [`Error::SignatureSpace`] - Signatures cannot be assigned within the 32-bit space
/// - [`Error::RegisterConflict`] - The signature registers would alias program storage
///
/// ## Execution Errors
/// - [`Error::Execution`] - The interpreter hit an unexecutable construct
/// - [`Error::StepLimit`] - The configured step budget was exhausted
///
/// # Examples
///
/// ```rust
/// use cfcss::{ir::FunctionBuilder, Error};
///
/// let mut builder = FunctionBuilder::new("no_terminator", 0);
/// builder.block("entry");
/// match builder.build() {
///     Ok(_) => println!("built"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed function: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The function is malformed and cannot be instrumented.
    ///
    /// Raised for blocks without a terminator, reused block labels, signature tables that do
    /// not match the function and similar structural defects. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The control flow graph could not be built.
    ///
    /// Occurs when a terminator references a block index outside the function or an edge
    /// refers to a node that does not exist.
    #[error("{0}")]
    GraphError(String),

    /// Two blocks of the same function carry the same signature.
    ///
    /// Signatures must be unique within a function, otherwise a jump between the two blocks
    /// would be indistinguishable from a valid transition.
    #[error("Signature {signature} is assigned to both block {first} and block {second}")]
    DuplicateSignature {
        /// The signature value that collides
        signature: Signature,
        /// The first block carrying the signature
        first: usize,
        /// The second block carrying the signature
        second: usize,
    },

    /// Signatures could not be assigned.
    ///
    /// Either the configured first signature is the reserved value 0, or the function has
    /// more blocks than the remaining 32-bit signature space can hold.
    #[error("Cannot assign {blocks} signatures starting at {first}")]
    SignatureSpace {
        /// The first signature requested
        first: u32,
        /// The number of blocks that need a signature
        blocks: usize,
    },

    /// A signature register would alias program storage.
    ///
    /// The module already defines a program global with the configured register name. The
    /// registers must be disjoint from every program variable.
    #[error("Register '{0}' conflicts with an existing program global")]
    RegisterConflict(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// The interpreter could not execute the program.
    ///
    /// Covers calls to undefined functions, reads of unbound registers, out of range
    /// storage accesses and arithmetic faults such as division by zero.
    #[error("Execution error - {0}")]
    Execution(String),

    /// The interpreter exhausted its step budget.
    ///
    /// The associated value is the limit that was reached.
    #[error("Reached the maximum number of execution steps - {0}")]
    StepLimit(u64),
}
