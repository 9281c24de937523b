use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use adm_sync::config::load_config;
use adm_sync::feed::{FeedClient, SnapshotClient};
use adm_sync::job::{run_job, JobOptions};
use adm_sync::report::{render_job, render_topology};
use adm_sync::source::fetch_feeds;
use adm_sync::topology::reconstruct;

mod cli;

use cli::{Cli, Command, OutputFormat, SyncArgs, TopologyArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = match &cli.command {
        Command::Sync(args) | Command::Diff(args) => args.debug,
        Command::Topology(_) => false,
    };
    init_tracing(debug);

    match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Diff(args) => run_sync(SyncArgs {
            dry_run: true,
            ..args
        }),
        Command::Topology(args) => run_topology(args),
    }
}

/// Logs go to stderr so stdout only carries the report. `RUST_LOG` wins
/// over `--debug`.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_sync(args: SyncArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let options = JobOptions {
        dry_run: args.dry_run,
        debug: args.debug,
        instance: args.instance,
        tenant: args.tenant,
    };
    let report = run_job(&config, &options)
        .with_context(|| format!("sync job failed for {}", args.config.display()))?;

    match args.format {
        OutputFormat::Text => println!("{}", render_job(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    let failed: Vec<&str> = report
        .failed_instances()
        .map(|outcome| outcome.name.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("{} instance(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn run_topology(args: TopologyArgs) -> Result<()> {
    let mut client = SnapshotClient::open("snapshot", &args.snapshot)
        .with_context(|| format!("failed to open {}", args.snapshot.display()))?;
    client.login()?;
    let device = client
        .get_devices()?
        .into_iter()
        .find(|device| device.hostname == args.device)
        .ok_or_else(|| anyhow!("device {} not found in {}", args.device, args.snapshot.display()))?;

    let records = reconstruct(&device.hostname, &fetch_feeds(&client, &device));
    client.logout()?;

    match args.format {
        OutputFormat::Text => println!("{}", render_topology(&device.hostname, &records)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
    }
    Ok(())
}
