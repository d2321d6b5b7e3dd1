//! Shared utilities: graph infrastructure and DOT escaping.

mod dot;
pub mod graph;

pub use dot::escape_dot;
