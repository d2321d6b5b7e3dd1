//! Execution of IR modules.
//!
//! The [`Interpreter`] runs functions of an [`crate::ir::Module`] and is how the effect of
//! instrumentation is observed: it executes the inserted `G`/`D` updates like any other
//! instruction and reports failed signature checks through a [`FaultHandler`].
//!
//! # Key Components
//!
//! - [`Interpreter`] - Executes functions with a step budget and call-depth limit
//! - [`FaultHandler`] - Decides between [`FaultAction::Abort`] and [`FaultAction::Resume`]
//! - [`JumpFault`] - Injects one corrupted jump, the fault model CFCSS detects
//! - [`ExecutionOutcome`] - A normal return or the [`ControlFlowViolation`] that stopped execution
//!
//! # Storage model
//!
//! Globals are shared by all activations and survive across [`Interpreter::run`] calls.
//! Frame slots, variables and temporaries are zeroed for every activation. Stores are
//! truncated to the width of their location, so the 32-bit signature registers wrap the
//! way they would in machine code.

mod fault;
mod interpreter;

pub use fault::{
    AbortHandler, ControlFlowViolation, ExecutionOutcome, FaultAction, FaultHandler, JumpFault,
    RecordingHandler,
};
pub use interpreter::Interpreter;
