use std::path::Path;

use anyhow::{anyhow, bail};
use cfcss::{
    emulation::{ExecutionOutcome, Interpreter, JumpFault, RecordingHandler},
    ir::{BlockId, Function},
};
use serde::Serialize;

use crate::{
    app::{GlobalOptions, PassOptions},
    commands::common::{instrument_module, load_module, pass_config, resolve_function},
    output::{print_output, Align, TabWriter},
};

pub struct RunOptions<'a> {
    pub instrument: bool,
    pub pass: &'a PassOptions,
    pub inject: Option<&'a str>,
    pub resume: bool,
    pub max_steps: u64,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
struct ViolationOutput {
    function: String,
    block: usize,
    actual: u32,
    expected: u32,
}

#[derive(Debug, Serialize)]
struct GlobalOutput {
    name: String,
    value: i64,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    function: String,
    args: Vec<i64>,
    instrumented: bool,
    returned: Option<i64>,
    faulted: bool,
    steps: u64,
    injection_fired: Option<bool>,
    violations: Vec<ViolationOutput>,
    globals: Vec<GlobalOutput>,
}

/// Resolve a block given as a label or an index.
fn resolve_block(function: &Function, arg: &str) -> anyhow::Result<BlockId> {
    if let Some(index) = function
        .blocks()
        .iter()
        .position(|block| block.label() == arg)
    {
        return Ok(BlockId::new(index));
    }
    let index: usize = arg
        .trim_start_matches(['B', 'b'])
        .parse()
        .map_err(|_| anyhow!("'{arg}' is neither a block label nor a block index"))?;
    if index >= function.block_count() {
        bail!("block {index} is out of range for '{}'", function.name());
    }
    Ok(BlockId::new(index))
}

fn parse_injection(function: &Function, arg: &str) -> anyhow::Result<JumpFault> {
    let (from, to) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid injection '{arg}', expected FROM:TO"))?;
    Ok(JumpFault::new(
        function.name(),
        resolve_block(function, from)?,
        resolve_block(function, to)?,
    ))
}

pub fn run(path: &Path, function: &str, args: &[i64], opts: &RunOptions<'_>) -> anyhow::Result<()> {
    let mut module = load_module(path)?;
    let config = pass_config(opts.pass, opts.max_steps)?;
    if opts.instrument {
        let report = instrument_module(&mut module, config.clone())?;
        if let Some((name, err)) = report.failed().next() {
            bail!("failed to instrument {name}: {err}");
        };
    }

    let target = resolve_function(&module, function)?;
    let fault = opts
        .inject
        .map(|arg| parse_injection(target, arg))
        .transpose()?;

    let handler = if opts.resume {
        RecordingHandler::resume()
    } else {
        RecordingHandler::abort()
    };
    let mut interpreter = Interpreter::new(&module)
        .with_handler(handler)
        .with_config(&config);
    if let Some(fault) = fault {
        interpreter = interpreter.with_fault(fault);
    }

    let outcome = interpreter.run(function, args)?;

    let output = RunOutput {
        function: function.to_string(),
        args: args.to_vec(),
        instrumented: opts.instrument,
        returned: outcome.return_value(),
        faulted: outcome.is_faulted(),
        steps: interpreter.steps(),
        injection_fired: opts.inject.map(|_| !interpreter.fault_pending()),
        violations: interpreter
            .handler()
            .violations()
            .iter()
            .map(|v| ViolationOutput {
                function: v.function.clone(),
                block: v.block.index(),
                actual: v.actual,
                expected: v.expected.get(),
            })
            .collect(),
        globals: module
            .globals()
            .iter()
            .zip(interpreter.globals())
            .map(|(global, value)| GlobalOutput {
                name: global.name.clone(),
                value: *value,
            })
            .collect(),
    };

    print_output(&output, opts.global, |output| {
        match output.returned {
            Some(value) if !output.faulted => println!("{}{:?} = {value}", output.function, output.args),
            _ if output.faulted => println!("{}{:?} aborted", output.function, output.args),
            _ => println!("{}{:?} returned", output.function, output.args),
        }
        println!("Steps: {}", output.steps);
        if let Some(fired) = output.injection_fired {
            println!("Injected jump: {}", if fired { "taken" } else { "not reached" });
        }

        if !output.violations.is_empty() {
            println!();
            println!("Violations:");
            let mut tw = TabWriter::new(&[
                ("Function", Align::Left),
                ("Block", Align::Left),
                ("Actual G", Align::Right),
                ("Expected", Align::Right),
            ])
            .indent("  ");
            for v in &output.violations {
                tw.row(vec![
                    v.function.clone(),
                    format!("B{}", v.block),
                    v.actual.to_string(),
                    v.expected.to_string(),
                ]);
            }
            tw.print();
        }

        if !output.globals.is_empty() {
            println!();
            println!("Globals:");
            let mut tw = TabWriter::new(&[("Name", Align::Left), ("Value", Align::Right)])
                .indent("  ");
            for global in &output.globals {
                tw.row(vec![global.name.clone(), global.value.to_string()]);
            }
            tw.print();
        }
    })?;

    if let ExecutionOutcome::Faulted(violation) = outcome {
        bail!("{violation}");
    }
    Ok(())
}
