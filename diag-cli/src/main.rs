mod export;
mod info;
mod load;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use diag_odx::{MergeOptions, ParseOptions, PassPolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "odx-inspect",
    about = "Resolve ODX/PDX diagnostic descriptions into one merged database"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Inheritance passes: a count, or "fixpoint" to repeat until nothing changes
    #[arg(long, global = true, default_value = "fixpoint")]
    passes: PassPolicy,

    /// Maximum structure nesting below a top-level parameter
    #[arg(long, global = true, default_value_t = ParseOptions::default().max_structure_depth)]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Print a summary of the merged database
    Info {
        /// Input files (.odx and friends, or .pdx archives)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Check the merged database for structural problems
    Validate {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Suppress individual error output
        #[arg(short, long)]
        quiet: bool,

        /// Print summary count only
        #[arg(short, long)]
        summary: bool,
    },

    /// Write the merged database as JSON
    Export {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.as_str()),
    )
    .init();

    let parse = ParseOptions {
        max_structure_depth: cli.max_depth,
        ..Default::default()
    };
    let merge = MergeOptions {
        passes: cli.passes,
    };

    match cli.command {
        Command::Info { inputs } => info::run_info(&inputs, &parse, &merge),
        Command::Validate {
            inputs,
            quiet,
            summary,
        } => validate::run_validate(&inputs, &parse, &merge, quiet, summary),
        Command::Export {
            inputs,
            output,
            pretty,
        } => export::run_export(&inputs, &output, &parse, &merge, pretty),
    }
}
