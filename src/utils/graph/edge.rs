//! Edge identifier for directed graphs.

use std::fmt;

/// A strongly-typed identifier for edges within a directed graph.
///
/// Edge IDs are assigned sequentially by
/// [`DirectedGraph::add_edge`](crate::utils::graph::DirectedGraph::add_edge). In a control
/// flow graph every edge is a possible transfer of control, and CFCSS attaches its adjusting
/// values to these edges.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates a new `EdgeId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw index value of this edge identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<usize> for EdgeId {
    #[inline]
    fn from(index: usize) -> Self {
        EdgeId(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_formatting() {
        let edge = EdgeId::new(7);
        assert_eq!(format!("{edge:?}"), "EdgeId(7)");
        assert_eq!(format!("{edge}"), "e7");
    }

    #[test]
    fn test_edge_id_distinct_from_node_id() {
        use crate::utils::graph::NodeId;

        let node = NodeId::new(5);
        let edge = EdgeId::new(5);
        assert_eq!(node.index(), edge.index());
    }
}
