//! Control-flow checking by signatures.
//!
//! The instrumentation runs in two passes over a function. First the
//! [`SignatureAssigner`] gives every block a unique non-zero [`Signature`]. Then the
//! [`Planner`] classifies each block by its predecessors and produces an
//! [`InstrumentationPlan`], which the [`Emitter`] lowers into the function.
//!
//! At runtime two registers carry the state: the running signature `G`, which equals the
//! signature of the current block whenever control followed a legal edge, and the adjusting
//! signature `D`, which predecessors of merge blocks set so that every legal path into the
//! merge block produces the same `G`. A `check` after each update traps to the fault
//! handler when `G` is wrong. With module-wide registers every instrumented function
//! clears `G` and `D` before it returns, so each call starts from zero.
//!
//! [`CfcssPass`] ties the pieces together as a [`crate::compiler::FunctionPass`].
//! [`PlanSimulator`] executes a plan without touching the IR, which is how the protocol
//! itself is tested.

mod emit;
mod pass;
mod plan;
mod registers;
mod signature;

pub use emit::Emitter;
pub use pass::{CfcssPass, FunctionReport};
pub use plan::{
    BlockPlan, EdgeAdjustment, InstrumentationPlan, PlanOp, Planner, PredecessorKind, Reference,
    SignatureRegister,
};
pub use registers::{CheckFailure, PlanSimulator, RegisterLayout, SignatureRegisters};
pub use signature::{Signature, SignatureAssigner, SignatureTable};
