use std::path::Path;

use anyhow::bail;
use cfcss::{
    analysis::ControlFlowGraph,
    compiler::{FunctionOutcome, ModuleReport},
    config::CfcssConfig,
    instrument::SignatureAssigner,
    ir::Module,
};
use log::error;
use serde::Serialize;

use crate::{
    app::{GlobalOptions, PassOptions},
    commands::common::{instrument_module, load_module, pass_config},
    input::ModuleDto,
    output::{emit, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct FunctionOutput {
    function: String,
    outcome: &'static str,
    instructions_before: Option<usize>,
    instructions_after: Option<usize>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportOutput {
    module: String,
    functions: Vec<FunctionOutput>,
}

fn report_output(module: &Module, report: &ModuleReport) -> ReportOutput {
    let functions = report
        .records
        .iter()
        .map(|record| {
            let (outcome, before, after, error) = match &record.outcome {
                FunctionOutcome::Changed { before, after } => {
                    ("instrumented", Some(*before), Some(*after), None)
                }
                FunctionOutcome::Unchanged => ("unchanged", None, None, None),
                FunctionOutcome::Skipped => ("skipped", None, None, None),
                FunctionOutcome::Failed(err) => ("failed", None, None, Some(err.to_string())),
            };
            FunctionOutput {
                function: record.function.clone(),
                outcome,
                instructions_before: before,
                instructions_after: after,
                error,
            }
        })
        .collect();
    ReportOutput {
        module: module.name().to_string(),
        functions,
    }
}

fn render(module: &Module, config: &CfcssConfig, format: &str) -> anyhow::Result<String> {
    match format {
        "text" => Ok(module.to_string()),
        "json" => Ok(serde_json::to_string_pretty(&ModuleDto::from_module(module))?),
        "dot" => {
            let assigner = SignatureAssigner::new(config.signature_order, config.first_signature);
            let mut out = String::new();
            for function in module.functions() {
                if function.is_declaration() {
                    continue;
                }
                let cfg = ControlFlowGraph::new(function)?;
                let table = assigner.assign(&cfg)?;
                out.push_str(&cfg.to_dot(Some(function.name()), Some(&table)));
                out.push('\n');
            }
            Ok(out)
        }
        other => bail!("unknown format '{other}' (text, json, dot)"),
    }
}

pub fn run(
    path: &Path,
    pass: &PassOptions,
    format: &str,
    output: Option<&Path>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let mut module = load_module(path)?;
    let config = pass_config(pass, CfcssConfig::default().max_steps)?;
    let report = instrument_module(&mut module, config.clone())?;

    for (function, err) in report.failed() {
        error!("{function}: {err}");
    }

    emit(&render(&module, &config, format)?, output)?;

    if output.is_some() {
        let summary = report_output(&module, &report);
        print_output(&summary, opts, |summary| {
            let mut tw = TabWriter::new(&[
                ("Function", Align::Left),
                ("Outcome", Align::Left),
                ("Before", Align::Right),
                ("After", Align::Right),
            ]);
            for function in &summary.functions {
                let count = |n: Option<usize>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
                tw.row(vec![
                    function.function.clone(),
                    function.outcome.to_string(),
                    count(function.instructions_before),
                    count(function.instructions_after),
                ]);
            }
            tw.print();
        })?;
    }

    if report.has_failures() {
        bail!("{} function(s) could not be instrumented", report.failed().count());
    }
    Ok(())
}
