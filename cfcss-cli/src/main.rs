mod app;
mod commands;
mod input;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show cfcss info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cfcss", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Instrument {
            path,
            pass,
            format,
            output,
        } => commands::instrument::run(path, pass, format, output.as_deref(), &cli.global),
        Command::Stats { path, function } => {
            commands::stats::run(path, function.as_deref(), &cli.global)
        }
        Command::Cfg {
            path,
            function,
            order,
            format,
        } => commands::cfg::run(path, function, order, format),
        Command::Run {
            path,
            function,
            args,
            instrument,
            pass,
            inject,
            resume,
            max_steps,
        } => commands::run::run(
            path,
            function,
            args,
            &commands::run::RunOptions {
                instrument: *instrument,
                pass,
                inject: inject.as_deref(),
                resume: *resume,
                max_steps: *max_steps,
                global: &cli.global,
            },
        ),
    }
}
