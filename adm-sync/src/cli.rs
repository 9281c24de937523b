use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "adm-sync")]
#[command(about = "Reconcile load-balancer topology into the inventory store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Sync every configured instance into the inventory.
    Sync(SyncArgs),
    /// Show what a sync would change without writing anything.
    Diff(SyncArgs),
    /// Print the reconstructed port/address records of one device.
    Topology(TopologyArgs),
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    #[arg(long, short)]
    pub config: PathBuf,
    #[arg(long)]
    pub dry_run: bool,
    /// Log per-entity events at info level.
    #[arg(long)]
    pub debug: bool,
    /// Only sync this instance.
    #[arg(long)]
    pub instance: Option<String>,
    /// Override the configured tenant.
    #[arg(long)]
    pub tenant: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct TopologyArgs {
    /// Feed snapshot file.
    pub snapshot: PathBuf,
    #[arg(long)]
    pub device: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
