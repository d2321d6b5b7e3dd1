//! Pass infrastructure for IR transformations.
//!
//! This module sits between analysis and instrumentation:
//!
//! - [`crate::analysis`] builds control-flow graphs and statistics
//! - [`compiler`](self) defines the pass interface and runs passes over modules
//! - [`crate::instrument`] implements the CFCSS pass on top of it
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Pass Pipeline                        │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  PassManager            Sequential over passes           │
//! │    ├─ initialize()      Module-level setup, once         │
//! │    └─ run_on_function() Parallel over functions (rayon)  │
//! │                                                          │
//! │  FunctionPass trait     Interface for all passes         │
//! │                                                          │
//! │  ModuleReport           Per-function outcome records     │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod manager;
mod pass;

pub use manager::{FunctionOutcome, FunctionRecord, ModuleReport, PassManager};
pub use pass::FunctionPass;
