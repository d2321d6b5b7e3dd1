use std::path::Path;

use anyhow::bail;
use cfcss::{
    analysis::ControlFlowGraph,
    instrument::{Planner, PredecessorKind, Reference, SignatureAssigner},
    ir::BlockId,
};
use serde::Serialize;

use crate::{
    commands::common::{load_module, parse_order, resolve_function},
    output::{Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct SuccessorOutput {
    block: usize,
    edge_type: String,
    adjustment: Option<u32>,
}

#[derive(Debug, Serialize)]
struct BlockOutput {
    id: usize,
    label: String,
    signature: u32,
    kind: String,
    flags: Vec<String>,
    instruction_count: usize,
    predecessors: Vec<usize>,
    successors: Vec<SuccessorOutput>,
    update: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CfgOutput {
    function: String,
    block_count: usize,
    edge_count: usize,
    entry: usize,
    exits: Vec<usize>,
    blocks: Vec<BlockOutput>,
}

fn kind_label(kind: &PredecessorKind) -> String {
    match kind {
        PredecessorKind::Entry => "entry".to_string(),
        PredecessorKind::Orphan => "orphan".to_string(),
        PredecessorKind::Single(pred) => format!("single (B{})", pred.index()),
        PredecessorKind::Merge { reference, .. } => match reference {
            Reference::Invocation => "merge (ref: invocation)".to_string(),
            Reference::Block(block) => format!("merge (ref: B{})", block.index()),
        },
    }
}

pub fn run(path: &Path, function: &str, order: &str, format: &str) -> anyhow::Result<()> {
    let module = load_module(path)?;
    let function = resolve_function(&module, function)?;
    let cfg = ControlFlowGraph::new(function)?;
    let table = SignatureAssigner::new(parse_order(order)?, 1).assign(&cfg)?;
    let plan = Planner::default().plan(&cfg, &table)?;

    let mut blocks = Vec::with_capacity(cfg.block_count());
    for node_id in cfg.node_ids() {
        let id = BlockId::from(node_id);
        let (Some(block), Some(block_plan), Some(signature)) =
            (cfg.block(node_id), plan.block(id), table.get(id))
        else {
            continue;
        };
        blocks.push(BlockOutput {
            id: node_id.index(),
            label: block.label().to_string(),
            signature: signature.get(),
            kind: kind_label(&block_plan.kind),
            flags: cfg
                .flags(node_id)
                .iter_names()
                .map(|(name, _)| name.to_lowercase())
                .collect(),
            instruction_count: block.instructions().len(),
            predecessors: cfg.predecessors(node_id).map(|p| p.index()).collect(),
            successors: cfg
                .outgoing_edges(node_id)
                .map(|(_, target, edge)| SuccessorOutput {
                    block: target.index(),
                    edge_type: edge.kind().label(),
                    adjustment: plan.adjustment(id, BlockId::from(target)),
                })
                .collect(),
            update: block_plan.entry.iter().map(ToString::to_string).collect(),
        });
    }

    match format {
        "json" => {
            let output = CfgOutput {
                function: function.name().to_string(),
                block_count: cfg.block_count(),
                edge_count: cfg.edge_count(),
                entry: cfg.entry().index(),
                exits: cfg.exits().iter().map(|e| e.index()).collect(),
                blocks,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "dot" => {
            println!("{}", cfg.to_dot(Some(function.name()), Some(&table)));
        }
        "text" => {
            let exits: Vec<String> = cfg.exits().iter().map(|e| format!("B{}", e.index())).collect();
            println!("Control flow graph for {}", function.name());
            println!(
                "Blocks: {}, Edges: {}, Entry: B{}, Exits: {}",
                cfg.block_count(),
                cfg.edge_count(),
                cfg.entry().index(),
                if exits.is_empty() {
                    "(none)".to_string()
                } else {
                    exits.join(", ")
                }
            );
            println!();

            let mut tw = TabWriter::new(&[
                ("Block", Align::Left),
                ("Label", Align::Left),
                ("Sig", Align::Right),
                ("Kind", Align::Left),
                ("Successors", Align::Left),
                ("Update", Align::Left),
            ]);
            for block in &blocks {
                let successors: Vec<String> = block
                    .successors
                    .iter()
                    .map(|s| {
                        let mut text = format!("B{}", s.block);
                        if !s.edge_type.is_empty() {
                            text.push_str(&format!(" ({})", s.edge_type));
                        }
                        if let Some(value) = s.adjustment {
                            text.push_str(&format!(" D={value}"));
                        }
                        text
                    })
                    .collect();
                tw.row(vec![
                    format!("B{}", block.id),
                    block.label.clone(),
                    block.signature.to_string(),
                    block.kind.clone(),
                    successors.join(", "),
                    block.update.join("; "),
                ]);
            }
            tw.print();
        }
        other => bail!("unknown format '{other}' (text, dot, json)"),
    }
    Ok(())
}
