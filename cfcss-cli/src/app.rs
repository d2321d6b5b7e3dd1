use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cfcss - control-flow checking by signatures
#[derive(Debug, Parser)]
#[command(name = "cfcss", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Pass options shared by `instrument` and `run`.
#[derive(Debug, Parser)]
pub struct PassOptions {
    /// Register placement: global or per-activation.
    #[arg(long, default_value = "global")]
    pub scope: String,

    /// Signature order: layout or reverse-postorder.
    #[arg(long, default_value = "layout")]
    pub order: String,

    /// First signature to assign.
    #[arg(long, default_value_t = 1)]
    pub first_signature: u32,

    /// Name of the fault handler function.
    #[arg(long, value_name = "NAME", default_value = "__ctt_error")]
    pub handler: String,

    /// Function to leave uninstrumented (repeatable).
    #[arg(long, value_name = "NAME")]
    pub skip: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Instrument every function of a module and print the result.
    Instrument {
        /// Path to the JSON module description.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[command(flatten)]
        pass: PassOptions,

        /// Output format: text, json, dot.
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the instrumented module to a file instead of stdout.
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Show block, edge and instruction statistics per function.
    Stats {
        /// Path to the JSON module description.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Show only this function, with per-block details.
        #[arg(long, value_name = "NAME")]
        function: Option<String>,
    },

    /// Display the control flow graph of a function with its signatures.
    Cfg {
        /// Path to the JSON module description.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Function to analyze.
        #[arg(long, value_name = "NAME")]
        function: String,

        /// Signature order: layout or reverse-postorder.
        #[arg(long, default_value = "layout")]
        order: String,

        /// Output format: text, dot, json.
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Execute a function in the interpreter.
    Run {
        /// Path to the JSON module description.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Function to call.
        #[arg(long, value_name = "NAME")]
        function: String,

        /// Argument value (repeatable, in parameter order).
        #[arg(long = "arg", value_name = "N", allow_negative_numbers = true)]
        args: Vec<i64>,

        /// Instrument the module before running it.
        #[arg(long)]
        instrument: bool,

        #[command(flatten)]
        pass: PassOptions,

        /// Inject one corrupted jump, given as block labels or indices.
        #[arg(long, value_name = "FROM:TO")]
        inject: Option<String>,

        /// Keep executing after a detected violation.
        #[arg(long)]
        resume: bool,

        /// Step budget.
        #[arg(long, default_value_t = 1_000_000)]
        max_steps: u64,
    },
}
