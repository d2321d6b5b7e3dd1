//! Control Flow Graph (CFG) construction.
//!
//! This module provides a read-only graph view over one [`crate::ir::Function`].
//!
//! # Architecture
//!
//! The CFG builds upon the generic [`crate::utils::graph::DirectedGraph`] infrastructure.
//! Nodes carry the [`crate::ir::BlockId`] of the block they stand for and edges carry a
//! [`CfgEdgeKind`] describing which part of the terminator produced them.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - The CFG of one function
//! - [`CfgEdge`] - Edge representation with control flow semantics
//! - [`CfgEdgeKind`] - Classification of edge types (unconditional, conditional, switch)
//! - [`BlockFlags`] - Entry/exit/merge/branch classification of a block
//!
//! # Examples
//!
//! ```rust
//! use cfcss::analysis::ControlFlowGraph;
//! use cfcss::ir::FunctionBuilder;
//!
//! let mut b = FunctionBuilder::new("f", 0);
//! let entry = b.block("entry");
//! b.ret(entry, None);
//! let function = b.build()?;
//!
//! let cfg = ControlFlowGraph::new(&function)?;
//! for node in cfg.reverse_postorder() {
//!     println!("{node}: {:?}", cfg.flags(node));
//! }
//! # Ok::<(), cfcss::Error>(())
//! ```

mod edge;
mod graph;

pub use edge::{CfgEdge, CfgEdgeKind};
pub use graph::{BlockFlags, ControlFlowGraph};
