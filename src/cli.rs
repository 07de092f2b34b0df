use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sous")]
#[command(version)]
#[command(about = "Converge a machine to a declared run-list", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge every resource in a run-list
    Apply(ApplyArgs),

    /// Load a run-list and show what would run, without applying anything
    Check(CheckArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Run-list file (TOML)
    pub run_list: PathBuf,

    /// Concurrent downloads (overrides config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Report what would change without changing it
    #[arg(long, alias = "dry-run")]
    pub why_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Run-list file (TOML)
    pub run_list: PathBuf,
}
