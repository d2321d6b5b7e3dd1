use std::path::Path;

use cfcss::analysis::{module_stats, ControlFlowGraph, FunctionStats};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_module, resolve_function},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct BlockOutput {
    block: usize,
    label: String,
    instructions: usize,
    successors: usize,
    predecessors: usize,
}

#[derive(Debug, Serialize)]
struct FunctionOutput {
    name: String,
    blocks: usize,
    edges: usize,
    instructions: usize,
    merge_blocks: usize,
    max_successors: usize,
    max_predecessors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<BlockOutput>>,
}

fn function_output(stats: &FunctionStats, details: bool) -> FunctionOutput {
    FunctionOutput {
        name: stats.name.clone(),
        blocks: stats.block_count(),
        edges: stats.edges,
        instructions: stats.instruction_count(),
        merge_blocks: stats.merge_blocks(),
        max_successors: stats.max_successors,
        max_predecessors: stats.max_predecessors,
        details: details.then(|| {
            stats
                .blocks
                .iter()
                .map(|block| BlockOutput {
                    block: block.block.index(),
                    label: block.label.clone(),
                    instructions: block.instructions,
                    successors: block.successors,
                    predecessors: block.predecessors,
                })
                .collect()
        }),
    }
}

pub fn run(path: &Path, function: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let output: Vec<FunctionOutput> = match function {
        Some(name) => {
            let function = resolve_function(&module, name)?;
            let cfg = ControlFlowGraph::new(function)?;
            vec![function_output(&FunctionStats::from_cfg(&cfg), true)]
        }
        None => module_stats(&module)?
            .iter()
            .map(|stats| function_output(stats, false))
            .collect(),
    };

    print_output(&output, opts, |functions| {
        let mut tw = TabWriter::new(&[
            ("Function", Align::Left),
            ("Blocks", Align::Right),
            ("Edges", Align::Right),
            ("Instructions", Align::Right),
            ("Merges", Align::Right),
            ("Max succ", Align::Right),
            ("Max pred", Align::Right),
        ]);
        for f in functions {
            tw.row(vec![
                f.name.clone(),
                f.blocks.to_string(),
                f.edges.to_string(),
                f.instructions.to_string(),
                f.merge_blocks.to_string(),
                f.max_successors.to_string(),
                f.max_predecessors.to_string(),
            ]);
        }
        tw.print();

        for f in functions {
            let Some(blocks) = &f.details else {
                continue;
            };
            println!();
            let mut tw = TabWriter::new(&[
                ("Block", Align::Left),
                ("Label", Align::Left),
                ("Instructions", Align::Right),
                ("Successors", Align::Right),
                ("Predecessors", Align::Right),
            ])
            .indent("  ");
            for block in blocks {
                tw.row(vec![
                    format!("B{}", block.block),
                    block.label.clone(),
                    block.instructions.to_string(),
                    block.successors.to_string(),
                    block.predecessors.to_string(),
                ]);
            }
            tw.print();
        }
    })
}
