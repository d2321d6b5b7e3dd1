//! Control Flow Graph implementation.

use std::fmt::Write;

use bitflags::bitflags;

use crate::{
    analysis::cfg::{CfgEdge, CfgEdgeKind},
    instrument::SignatureTable,
    ir::{Block, BlockId, Function, Terminator},
    utils::{
        escape_dot,
        graph::{algorithms, DirectedGraph, EdgeId, NodeId, Predecessors, Successors},
    },
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Structural role of a block in its control flow graph
    pub struct BlockFlags : u8 {
        /// The function entry
        const ENTRY = 0x01;
        /// The block leaves the function (return or unreachable terminator)
        const EXIT = 0x02;
        /// The block has more than one predecessor
        const MERGE = 0x04;
        /// The block has more than one successor
        const BRANCH = 0x08;
        /// The block cannot be reached from the entry
        const UNREACHABLE = 0x10;
        /// The block is its own successor
        const SELF_LOOP = 0x20;
    }
}

/// A read-only control flow graph over one [`Function`].
///
/// Node `n` of the graph is block `n` of the function, so [`NodeId`] and [`BlockId`]
/// convert freely. Edges are deduplicated: a branch whose two targets coincide contributes
/// a single edge, and a switch contributes one edge per distinct target.
///
/// Predecessor lists are in ascending block-index order. Instrumentation relies on this to
/// pick the same reference predecessor every time.
///
/// # Examples
///
/// ```rust
/// use cfcss::analysis::ControlFlowGraph;
/// use cfcss::ir::FunctionBuilder;
///
/// let mut b = FunctionBuilder::new("loop", 1);
/// let entry = b.block("entry");
/// let body = b.block("body");
/// let exit = b.block("exit");
/// b.jump(entry, body);
/// b.branch(body, b.param(0), body, exit);
/// b.ret(exit, None);
/// let function = b.build()?;
///
/// let cfg = ControlFlowGraph::new(&function)?;
/// assert_eq!(cfg.block_count(), 3);
/// assert_eq!(cfg.predecessors(body.into()).count(), 2);
/// # Ok::<(), cfcss::Error>(())
/// ```
#[derive(Debug)]
pub struct ControlFlowGraph<'a> {
    /// The function this graph describes.
    function: &'a Function,
    /// The underlying directed graph structure.
    graph: DirectedGraph<BlockId, CfgEdge>,
    /// Entry node, always block 0.
    entry: NodeId,
    /// Blocks whose terminator leaves the function.
    exits: Vec<NodeId>,
    /// Reachability from the entry, indexed by node.
    reachable: Vec<bool>,
}

impl<'a> ControlFlowGraph<'a> {
    /// Builds the control flow graph of `function`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if the function has no blocks, if a block has no
    /// terminator, or if a terminator names a block that does not exist.
    pub fn new(function: &'a Function) -> Result<Self> {
        if function.is_declaration() {
            return Err(crate::Error::GraphError(format!(
                "Cannot create CFG for '{}' which has no blocks",
                function.name()
            )));
        }

        let block_count = function.block_count();
        let mut graph = DirectedGraph::with_capacity(block_count, block_count * 2);
        for id in function.block_ids() {
            graph.add_node(id);
        }

        // Edges are added block by block, so every incoming list is sorted by source.
        let mut exits = Vec::new();
        for (index, block) in function.blocks().iter().enumerate() {
            let node = NodeId::new(index);
            let Some(terminator) = block.terminator() else {
                return Err(crate::Error::GraphError(format!(
                    "Block {index} of '{}' has no terminator",
                    function.name()
                )));
            };

            for (target, kind) in Self::classify_edges(terminator) {
                if target.index() >= block_count {
                    return Err(crate::Error::GraphError(format!(
                        "Block {index} has successor index {} which exceeds block count {block_count}",
                        target.index()
                    )));
                }
                let target = NodeId::from(target);
                graph.add_edge(node, target, CfgEdge::new(target, kind))?;
            }

            if matches!(terminator, Terminator::Return(_) | Terminator::Unreachable) {
                exits.push(node);
            }
        }

        let entry = NodeId::new(0);
        let mut reachable = vec![false; block_count];
        for node in algorithms::dfs(&graph, entry) {
            reachable[node.index()] = true;
        }

        Ok(Self {
            function,
            graph,
            entry,
            exits,
            reachable,
        })
    }

    /// Pairs each distinct successor of `terminator` with the kind of its first edge.
    fn classify_edges(terminator: &Terminator) -> Vec<(BlockId, CfgEdgeKind)> {
        match terminator {
            Terminator::Jump(target) => vec![(*target, CfgEdgeKind::Unconditional)],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } if then_block == else_block => vec![(*then_block, CfgEdgeKind::Unconditional)],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![
                (*then_block, CfgEdgeKind::ConditionalTrue),
                (*else_block, CfgEdgeKind::ConditionalFalse),
            ],
            Terminator::Switch { cases, default, .. } => {
                let mut edges: Vec<(BlockId, CfgEdgeKind)> = Vec::with_capacity(cases.len() + 1);
                let labelled = cases
                    .iter()
                    .map(|(value, target)| (*target, Some(*value)))
                    .chain(std::iter::once((*default, None)));
                for (target, case_value) in labelled {
                    if edges.iter().all(|(existing, _)| *existing != target) {
                        edges.push((target, CfgEdgeKind::Switch { case_value }));
                    }
                }
                edges
            }
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Returns the function this graph was built from.
    #[must_use]
    pub const fn function(&self) -> &'a Function {
        self.function
    }

    /// Returns the entry block ID.
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the blocks whose terminator leaves the function, in layout order.
    #[must_use]
    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    /// Returns the number of blocks in the CFG.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of distinct edges in the CFG.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the IR block behind a node.
    #[must_use]
    pub fn block(&self, node_id: NodeId) -> Option<&'a Block> {
        self.function.block(BlockId::from(node_id))
    }

    /// Returns an iterator over the distinct successors of a block.
    pub fn successors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(node_id)
    }

    /// Returns an iterator over the distinct predecessors of a block, in ascending order.
    pub fn predecessors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(node_id)
    }

    /// Returns the outgoing edges of a block with their targets.
    pub fn outgoing_edges(
        &self,
        node_id: NodeId,
    ) -> impl Iterator<Item = (EdgeId, NodeId, &CfgEdge)> + '_ {
        self.graph
            .outgoing_edges(node_id)
            .map(|(edge_id, edge)| (edge_id, edge.target(), edge))
    }

    /// Returns `true` if the block can be reached from the entry.
    #[must_use]
    pub fn is_reachable(&self, node_id: NodeId) -> bool {
        self.reachable.get(node_id.index()).copied().unwrap_or(false)
    }

    /// Returns the structural flags of a block.
    #[must_use]
    pub fn flags(&self, node_id: NodeId) -> BlockFlags {
        let mut flags = BlockFlags::empty();
        if node_id == self.entry {
            flags |= BlockFlags::ENTRY;
        }
        if self.exits.contains(&node_id) {
            flags |= BlockFlags::EXIT;
        }
        if self.graph.in_degree(node_id) > 1 {
            flags |= BlockFlags::MERGE;
        }
        if self.graph.out_degree(node_id) > 1 {
            flags |= BlockFlags::BRANCH;
        }
        if !self.is_reachable(node_id) {
            flags |= BlockFlags::UNREACHABLE;
        }
        if self.successors(node_id).any(|succ| succ == node_id) {
            flags |= BlockFlags::SELF_LOOP;
        }
        flags
    }

    /// Returns the blocks reachable from the entry in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        algorithms::reverse_postorder(&self.graph, self.entry)
    }

    /// Returns the blocks reachable from the entry in postorder.
    #[must_use]
    pub fn postorder(&self) -> Vec<NodeId> {
        algorithms::postorder(&self.graph, self.entry)
    }

    /// Returns a depth-first iterator from the entry.
    pub fn dfs(&self) -> impl Iterator<Item = NodeId> + '_ {
        algorithms::dfs(&self.graph, self.entry)
    }

    /// Returns all node IDs in layout order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_ids()
    }

    /// Renders the CFG in Graphviz DOT format.
    ///
    /// Each node lists the block's instructions. When `signatures` is given, the label of
    /// each block also shows its signature. The entry is filled green and exits red.
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>, signatures: Option<&SignatureTable>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph CFG {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"CFG: {}\";", escape_dot(name));
        }
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
        dot.push_str("    edge [fontname=\"Courier\", fontsize=9];\n\n");

        for node_id in self.node_ids() {
            let Some(block) = self.block(node_id) else {
                continue;
            };
            let is_entry = node_id == self.entry;
            let is_exit = self.exits.contains(&node_id);

            let mut label = format!("B{} {}", node_id.index(), escape_dot(block.label()));
            if let Some(signature) = signatures.and_then(|table| table.get(node_id.into())) {
                let _ = write!(label, " [sig {signature}]");
            }
            if is_entry {
                label.push_str(" (entry)");
            }
            if is_exit {
                label.push_str(" (exit)");
            }
            label.push_str("\\l");

            for instruction in block.instructions() {
                label.push_str(&escape_dot(&instruction.to_string()));
                label.push_str("\\l");
            }
            if let Some(terminator) = block.terminator() {
                label.push_str(&escape_dot(&terminator.to_string()));
                label.push_str("\\l");
            }

            let style = if is_entry {
                ", style=filled, fillcolor=lightgreen"
            } else if is_exit {
                ", style=filled, fillcolor=lightcoral"
            } else {
                ""
            };

            let _ = writeln!(dot, "    B{} [label=\"{label}\"{style}];", node_id.index());
        }

        dot.push('\n');

        for node_id in self.node_ids() {
            for (_, target, edge) in self.outgoing_edges(node_id) {
                let color = match edge.kind() {
                    CfgEdgeKind::Unconditional => "black",
                    CfgEdgeKind::ConditionalTrue => "green",
                    CfgEdgeKind::ConditionalFalse => "red",
                    CfgEdgeKind::Switch { .. } => "blue",
                };
                let _ = writeln!(
                    dot,
                    "    B{} -> B{} [label=\"{}\", color={color}];",
                    node_id.index(),
                    target.index(),
                    escape_dot(&edge.kind().label())
                );
            }
        }

        dot.push_str("}\n");
        dot
    }
}

impl Successors for ControlFlowGraph<'_> {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{FunctionBuilder, Operand},
        Error,
    };

    fn diamond() -> Function {
        let mut b = FunctionBuilder::new("diamond", 1);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let join = b.block("join");
        b.branch(entry, b.param(0), left, right);
        b.jump(left, join);
        b.jump(right, join);
        b.ret(join, Some(Operand::Const(0)));
        b.build().unwrap()
    }

    fn ids(nodes: &[usize]) -> Vec<NodeId> {
        nodes.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_cfg_from_declaration() {
        let function = Function::new("extern", 0);
        assert!(matches!(
            ControlFlowGraph::new(&function),
            Err(Error::GraphError(_))
        ));
    }

    #[test]
    fn test_cfg_single_block() {
        let mut b = FunctionBuilder::new("single", 0);
        let entry = b.block("entry");
        b.ret(entry, None);
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        assert_eq!(cfg.block_count(), 1);
        assert_eq!(cfg.entry(), NodeId::new(0));
        assert_eq!(cfg.exits(), &[NodeId::new(0)]);
        assert_eq!(
            cfg.flags(NodeId::new(0)),
            BlockFlags::ENTRY | BlockFlags::EXIT
        );
    }

    #[test]
    fn test_cfg_diamond_shape() {
        let function = diamond();
        let cfg = ControlFlowGraph::new(&function).unwrap();

        assert_eq!(cfg.edge_count(), 4);
        assert_eq!(cfg.successors(NodeId::new(0)).collect::<Vec<_>>(), ids(&[1, 2]));
        assert_eq!(cfg.predecessors(NodeId::new(3)).collect::<Vec<_>>(), ids(&[1, 2]));
        assert!(cfg.flags(NodeId::new(0)).contains(BlockFlags::BRANCH));
        assert!(cfg.flags(NodeId::new(3)).contains(BlockFlags::MERGE));

        let kinds: Vec<CfgEdgeKind> = cfg
            .outgoing_edges(NodeId::new(0))
            .map(|(_, _, edge)| *edge.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![CfgEdgeKind::ConditionalTrue, CfgEdgeKind::ConditionalFalse]
        );
    }

    #[test]
    fn test_cfg_predecessors_ascending() {
        // 0 -> 3, 0 -> 1, 1 -> 2, 2 -> 3: block 3 lists 0 before 2 regardless of edge order.
        let mut b = FunctionBuilder::new("order", 1);
        let b0 = b.block("b0");
        let b1 = b.block("b1");
        let b2 = b.block("b2");
        let b3 = b.block("b3");
        b.branch(b0, b.param(0), b3, b1);
        b.jump(b1, b2);
        b.jump(b2, b3);
        b.ret(b3, None);
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        assert_eq!(cfg.predecessors(NodeId::new(3)).collect::<Vec<_>>(), ids(&[0, 2]));
    }

    #[test]
    fn test_cfg_branch_to_same_target_is_one_edge() {
        let mut b = FunctionBuilder::new("same", 1);
        let entry = b.block("entry");
        let exit = b.block("exit");
        b.branch(entry, b.param(0), exit, exit);
        b.ret(exit, None);
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        assert_eq!(cfg.edge_count(), 1);
        assert_eq!(cfg.predecessors(NodeId::new(1)).count(), 1);
    }

    #[test]
    fn test_cfg_switch_edges() {
        let mut b = FunctionBuilder::new("switch", 1);
        let entry = b.block("entry");
        let a = b.block("a");
        let c = b.block("c");
        b.switch(entry, b.param(0), vec![(0, a), (1, c), (2, a)], c);
        b.ret(a, None);
        b.ret(c, None);
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        let kinds: Vec<CfgEdgeKind> = cfg
            .outgoing_edges(NodeId::new(0))
            .map(|(_, _, edge)| *edge.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                CfgEdgeKind::Switch {
                    case_value: Some(0)
                },
                CfgEdgeKind::Switch {
                    case_value: Some(1)
                },
            ]
        );
    }

    #[test]
    fn test_cfg_self_loop_and_unreachable() {
        let mut b = FunctionBuilder::new("spin", 1);
        let entry = b.block("entry");
        let spin = b.block("spin");
        let dead = b.block("dead");
        b.jump(entry, spin);
        b.branch(spin, b.param(0), spin, entry);
        b.ret(dead, None);
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        assert!(cfg.flags(NodeId::new(1)).contains(BlockFlags::SELF_LOOP));
        assert!(cfg.flags(NodeId::new(0)).contains(BlockFlags::ENTRY));
        assert!(cfg.flags(NodeId::new(2)).contains(BlockFlags::UNREACHABLE));
        assert_eq!(cfg.predecessors(NodeId::new(0)).collect::<Vec<_>>(), ids(&[1]));
    }

    #[test]
    fn test_cfg_traversal_orders() {
        let function = diamond();
        let cfg = ControlFlowGraph::new(&function).unwrap();
        assert_eq!(cfg.postorder(), ids(&[3, 1, 2, 0]));
        assert_eq!(cfg.reverse_postorder(), ids(&[0, 2, 1, 3]));
        assert_eq!(cfg.dfs().count(), 4);
    }

    #[test]
    fn test_cfg_to_dot() {
        let function = diamond();
        let cfg = ControlFlowGraph::new(&function).unwrap();
        let dot = cfg.to_dot(Some("diamond"), None);
        assert!(dot.starts_with("digraph CFG {"));
        assert!(dot.contains("label=\"CFG: diamond\""));
        assert!(dot.contains("B0 -> B1 [label=\"true\", color=green]"));
        assert!(dot.contains("B0 -> B2 [label=\"false\", color=red]"));
        assert!(dot.contains("fillcolor=lightgreen"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
