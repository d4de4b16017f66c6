use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rostersync",
    about = "Reconcile SIS rosters into a learning platform",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute and print the sequenced plan without applying it
    Plan(PassArgs),
    /// Run a full reconciliation pass
    Sync(SyncArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PassArgs {
    /// JSON snapshot of the SIS
    #[arg(long)]
    pub source: PathBuf,
    /// JSON snapshot of the learning platform
    #[arg(long)]
    pub target: PathBuf,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Date end dates are evaluated against (YYYY-MM-DD, default today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub pass: PassArgs,
    /// Write the platform state after the pass to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
