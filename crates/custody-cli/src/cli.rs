use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "custody",
    about = "Batch custody service: registration, two-phase handoff, and notarized audit trail",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Path to custody.toml (defaults to ./custody.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the custody HTTP server
    Serve(ServeArgs),
    /// Walk a batch through a full custody journey on an in-memory store
    Demo(DemoArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "batch-1")]
    pub batch: String,
    #[arg(long, default_value = "ipfs://abc")]
    pub metadata: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print built-in defaults instead of the loaded configuration
    #[arg(long)]
    pub defaults: bool,
}
