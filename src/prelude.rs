//! # cfcss Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the cfcss library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cfcss operations
pub use crate::Error;

/// The result type used throughout cfcss
pub use crate::Result;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

pub use crate::ir::{
    BinaryOp, Block, BlockId, Function, FunctionBuilder, Global, Instruction, Module, Operand,
    Reg, Storage, Terminator,
};

// ================================================================================================
// Analysis
// ================================================================================================

pub use crate::analysis::{ControlFlowGraph, FunctionStats};

// ================================================================================================
// Instrumentation
// ================================================================================================

pub use crate::{
    compiler::{FunctionPass, ModuleReport, PassManager},
    config::{CfcssConfig, RegisterScope, SignatureOrder},
    instrument::{CfcssPass, Signature, SignatureAssigner, SignatureTable},
};

// ================================================================================================
// Emulation
// ================================================================================================

pub use crate::emulation::{
    ControlFlowViolation, ExecutionOutcome, FaultAction, FaultHandler, Interpreter, JumpFault,
    RecordingHandler,
};
