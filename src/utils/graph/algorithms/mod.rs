//! Graph algorithms used by the control flow analysis.
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | [`dfs`] | O(V + E) | Reachability |
//! | [`postorder`] | O(V + E) | Backward orders |
//! | [`reverse_postorder`] | O(V + E) | Signature assignment order |

mod traversal;

pub use traversal::{dfs, postorder, reverse_postorder, DfsIterator};
