//! Per-function block and edge statistics.

use std::fmt;

use crate::{
    analysis::ControlFlowGraph,
    ir::{BlockId, Module},
    Result,
};

/// Statistics of a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStats {
    /// The block.
    pub block: BlockId,
    /// Block label.
    pub label: String,
    /// Instruction count, terminator included.
    pub instructions: usize,
    /// Number of distinct successors.
    pub successors: usize,
    /// Number of distinct predecessors.
    pub predecessors: usize,
}

/// Statistics of one function: block count, per-block sizes and the widest fan-in/fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStats {
    /// Function name.
    pub name: String,
    /// Per-block statistics in layout order.
    pub blocks: Vec<BlockStats>,
    /// Number of distinct CFG edges.
    pub edges: usize,
    /// Largest successor count of any block.
    pub max_successors: usize,
    /// Largest predecessor count of any block.
    pub max_predecessors: usize,
}

impl FunctionStats {
    /// Collects the statistics of the function behind `cfg`.
    #[must_use]
    pub fn from_cfg(cfg: &ControlFlowGraph<'_>) -> Self {
        let function = cfg.function();
        let blocks: Vec<BlockStats> = cfg
            .node_ids()
            .filter_map(|node| {
                let block = cfg.block(node)?;
                Some(BlockStats {
                    block: node.into(),
                    label: block.label().to_string(),
                    instructions: block.len(),
                    successors: cfg.successors(node).count(),
                    predecessors: cfg.predecessors(node).count(),
                })
            })
            .collect();

        Self {
            name: function.name().to_string(),
            max_successors: blocks.iter().map(|b| b.successors).max().unwrap_or(0),
            max_predecessors: blocks.iter().map(|b| b.predecessors).max().unwrap_or(0),
            edges: cfg.edge_count(),
            blocks,
        }
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the total instruction count.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions).sum()
    }

    /// Returns the number of blocks with more than one predecessor.
    #[must_use]
    pub fn merge_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.predecessors > 1).count()
    }
}

impl fmt::Display for FunctionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Function {}", self.name)?;
        writeln!(f, "  blocks: {}", self.block_count())?;
        for block in &self.blocks {
            writeln!(
                f,
                "  {} ({}): {} instructions, {} successors, {} predecessors",
                block.block, block.label, block.instructions, block.successors, block.predecessors
            )?;
        }
        writeln!(f, "  max successors: {}", self.max_successors)?;
        write!(f, "  max predecessors: {}", self.max_predecessors)
    }
}

/// Collects statistics for every defined function of a module, in declaration order.
///
/// Declarations have no blocks and are skipped.
///
/// # Errors
///
/// Returns an error if the CFG of any function cannot be built.
pub fn module_stats(module: &Module) -> Result<Vec<FunctionStats>> {
    module
        .functions()
        .iter()
        .filter(|function| !function.is_declaration())
        .map(|function| ControlFlowGraph::new(function).map(|cfg| FunctionStats::from_cfg(&cfg)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, FunctionBuilder, Operand};

    #[test]
    fn test_stats_diamond() {
        let mut b = FunctionBuilder::new("max", 2);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let join = b.block("join");
        let result = b.var();
        let cond = b.binary(entry, BinaryOp::Gt, b.param(0), b.param(1));
        b.branch(entry, cond, left, right);
        b.copy(left, result, b.param(0));
        b.jump(left, join);
        b.copy(right, result, b.param(1));
        b.jump(right, join);
        b.ret(join, Some(Operand::Reg(result)));
        let function = b.build().unwrap();

        let cfg = ControlFlowGraph::new(&function).unwrap();
        let stats = FunctionStats::from_cfg(&cfg);

        assert_eq!(stats.block_count(), 4);
        assert_eq!(stats.instruction_count(), 7);
        assert_eq!(stats.edges, 4);
        assert_eq!(stats.max_successors, 2);
        assert_eq!(stats.max_predecessors, 2);
        assert_eq!(stats.merge_blocks(), 1);
        assert_eq!(stats.blocks[0].instructions, 2);
        assert_eq!(stats.blocks[3].predecessors, 2);
        assert!(stats.to_string().contains("max predecessors: 2"));
    }

    #[test]
    fn test_module_stats_skips_declarations() {
        let mut module = Module::new("m");
        module
            .add_function(FunctionBuilder::new("__ctt_error", 2).build().unwrap())
            .unwrap();
        let mut b = FunctionBuilder::new("main", 0);
        let entry = b.block("entry");
        b.ret(entry, None);
        module.add_function(b.build().unwrap()).unwrap();

        let stats = module_stats(&module).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "main");
    }
}
