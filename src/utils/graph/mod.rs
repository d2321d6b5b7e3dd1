//! Generic directed graph infrastructure.
//!
//! The control flow graph in [`crate::analysis::cfg`] is a thin domain wrapper around
//! [`DirectedGraph`]. Blocks are stored in a flat arena and referenced by [`NodeId`], never
//! by pointer, so analysis results can be kept in vectors indexed by node.

pub mod algorithms;
mod directed;
mod edge;
mod node;

pub use directed::{DirectedGraph, Predecessors, Successors};
pub use edge::EdgeId;
pub use node::NodeId;
