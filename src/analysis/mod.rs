//! Program analysis over the IR.
//!
//! This module builds upon the generic graph infrastructure in [`crate::utils::graph`] to
//! provide the views the instrumentation needs.
//!
//! # Architecture
//!
//! - [`cfg`] - Control Flow Graph construction, traversal orders and DOT export
//! - [`stats`] - Block counts, instruction counts and fan-in/fan-out per function
//!
//! # Usage
//!
//! ```rust
//! use cfcss::analysis::{ControlFlowGraph, FunctionStats};
//! use cfcss::ir::FunctionBuilder;
//!
//! let mut b = FunctionBuilder::new("f", 1);
//! let entry = b.block("entry");
//! let exit = b.block("exit");
//! b.branch(entry, b.param(0), exit, exit);
//! b.ret(exit, None);
//! let function = b.build()?;
//!
//! let cfg = ControlFlowGraph::new(&function)?;
//! let stats = FunctionStats::from_cfg(&cfg);
//! assert_eq!(stats.max_successors, 1);
//! # Ok::<(), cfcss::Error>(())
//! ```

pub mod cfg;
pub mod stats;

pub use cfg::{BlockFlags, CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use stats::{module_stats, BlockStats, FunctionStats};
