//! Arena-backed directed graph.
//!
//! Nodes and edges live in flat vectors and are addressed by [`NodeId`] and [`EdgeId`].
//! Each node keeps ordered lists of its outgoing and incoming edges, so successor and
//! predecessor enumeration is deterministic: edges are reported in insertion order.

use crate::{
    utils::graph::{EdgeId, NodeId},
    Error::GraphError,
    Result,
};

/// Read access to the successors of a node.
///
/// Implemented by every graph the traversal algorithms operate on.
pub trait Successors {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns the successors of `node` in edge insertion order.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// Read access to the predecessors of a node.
pub trait Predecessors {
    /// Returns the predecessors of `node` in edge insertion order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node data `N` and edge data `E`.
///
/// Parallel edges and self-loops are allowed; callers that need a simple graph deduplicate
/// before insertion (the control flow graph does).
///
/// # Examples
///
/// ```rust
/// use cfcss::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b, ())?;
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// assert_eq!(graph.predecessors(b).collect::<Vec<_>>(), vec![a]);
/// # Ok::<(), cfcss::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<EdgeEntry<E>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates a new graph with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds a directed edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        let count = self.nodes.len();
        if source.index() >= count || target.index() >= count {
            return Err(GraphError(format!(
                "Edge {source} -> {target} references a node outside the graph ({count} nodes)"
            )));
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(EdgeEntry {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        Ok(id)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the data of a node, or `None` if the ID is invalid.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the data of an edge, or `None` if the ID is invalid.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges.get(edge.index()).map(|e| &e.data)
    }

    /// Returns the `(source, target)` pair of an edge.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(edge.index()).map(|e| (e.source, e.target))
    }

    /// Returns an iterator over all node IDs in index order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Returns the successors of a node in edge insertion order.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&edge| self.edges[edge.index()].target)
    }

    /// Returns the predecessors of a node in edge insertion order.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&edge| self.edges[edge.index()].source)
    }

    /// Returns the outgoing edges of a node together with their data.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &E)> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&edge| (edge, &self.edges[edge.index()].data))
    }

    /// Returns the incoming edges of a node together with their data.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &E)> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&edge| (edge, &self.edges[edge.index()].data))
    }

    /// Returns the number of outgoing edges of a node.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(node.index()).map_or(0, Vec::len)
    }

    /// Returns the number of incoming edges of a node.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(node.index()).map_or(0, Vec::len)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        DirectedGraph::successors(self, node)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        DirectedGraph::predecessors(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_add_nodes_and_edges() {
        let mut graph: DirectedGraph<char, u8> = DirectedGraph::new();
        let a = graph.add_node('a');
        let b = graph.add_node('b');
        let edge = graph.add_edge(a, b, 7).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node(b), Some(&'b'));
        assert_eq!(graph.edge(edge), Some(&7));
        assert_eq!(graph.edge_endpoints(edge), Some((a, b)));
    }

    #[test]
    fn test_graph_rejects_dangling_edge() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(graph.add_edge(a, NodeId::new(3), ()).is_err());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_graph_adjacency_order_is_insertion_order() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let nodes: Vec<NodeId> = (0..4).map(|_| graph.add_node(())).collect();
        graph.add_edge(nodes[2], nodes[3], ()).unwrap();
        graph.add_edge(nodes[0], nodes[3], ()).unwrap();
        graph.add_edge(nodes[1], nodes[3], ()).unwrap();

        let preds: Vec<NodeId> = graph.predecessors(nodes[3]).collect();
        assert_eq!(preds, vec![nodes[2], nodes[0], nodes[1]]);
        assert_eq!(graph.in_degree(nodes[3]), 3);
        assert_eq!(graph.out_degree(nodes[3]), 0);
    }

    #[test]
    fn test_graph_self_loop() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        graph.add_edge(a, a, ()).unwrap();

        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![a]);
        assert_eq!(graph.predecessors(a).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_graph_invalid_node_queries() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert!(graph.is_empty());
        assert!(graph.node(NodeId::new(0)).is_none());
        assert_eq!(graph.successors(NodeId::new(0)).count(), 0);
        assert_eq!(graph.out_degree(NodeId::new(9)), 0);
    }
}
