//! Node identifier for directed graphs.
//!
//! [`NodeId`] is the dense index of a node inside a [`DirectedGraph`](crate::utils::graph::DirectedGraph).
//! Control flow graphs use the same index as the block they describe, so a `NodeId` can be
//! converted to and from a [`BlockId`](crate::ir::BlockId) without a lookup table.

use std::fmt;

/// A strongly-typed identifier for nodes within a directed graph.
///
/// Node IDs are handed out sequentially from 0 by
/// [`DirectedGraph::add_node`](crate::utils::graph::DirectedGraph::add_node) and are used to
/// index per-node analysis results stored in plain vectors.
///
/// # Examples
///
/// ```rust
/// use cfcss::utils::graph::{DirectedGraph, NodeId};
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// assert_eq!(entry, NodeId::new(0));
/// assert_eq!(entry.index(), 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_roundtrip_usize() {
        let node: NodeId = 123usize.into();
        assert_eq!(node.index(), 123);
        let raw: usize = node.into();
        assert_eq!(raw, 123);
    }

    #[test]
    fn test_node_id_ordering_follows_index() {
        let mut nodes = vec![NodeId::new(3), NodeId::new(1), NodeId::new(2)];
        nodes.sort();
        assert_eq!(nodes, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
    }

    #[test]
    fn test_node_id_hash_dedup() {
        let set: HashSet<NodeId> = [NodeId::new(1), NodeId::new(2), NodeId::new(1)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node:?}"), "NodeId(42)");
        assert_eq!(format!("{node}"), "n42");
    }
}
