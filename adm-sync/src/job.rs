//! One reconciliation per configured management-system instance, run
//! sequentially against a shared inventory store.

use graph_diff_core::{run, RunError, RunOptions, RunReport};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, InstanceConfig, SyncSettings};
use crate::feed::{FeedClient, SnapshotClient};
use crate::model::Record;
use crate::source::AdmAdapter;
use crate::store::{InventoryError, InventoryStore};
use crate::target::InventoryAdapter;

#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub dry_run: bool,
    pub debug: bool,
    /// Only process this instance.
    pub instance: Option<String>,
    /// Overrides the configured tenant.
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Synced,
    DryRun,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct InstanceOutcome {
    pub name: String,
    pub status: InstanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport<Record>>,
}

#[derive(Debug, Default, Serialize)]
pub struct JobReport {
    pub instances: Vec<InstanceOutcome>,
}

impl JobReport {
    pub fn failed_instances(&self) -> impl Iterator<Item = &InstanceOutcome> {
        self.instances
            .iter()
            .filter(|outcome| outcome.status == InstanceStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed_instances().next().is_some()
    }
}

/// Errors that stop the whole job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("instance {0} is not configured")]
    UnknownInstance(String),
}

/// Run every selected instance. A failing instance is recorded in the report
/// and the job moves on to the next one.
pub fn run_job(config: &Config, options: &JobOptions) -> Result<JobReport, JobError> {
    config.validate()?;
    let settings = config.settings(options.tenant.as_deref(), options.debug)?;
    let instances: Vec<&InstanceConfig> = match &options.instance {
        Some(name) => vec![config
            .instance(name)
            .ok_or_else(|| JobError::UnknownInstance(name.clone()))?],
        None => config.instances.iter().collect(),
    };

    let mut store = InventoryStore::open(&config.store)?;
    let mut report = JobReport::default();

    for instance in instances {
        info!(instance = %instance.name, dry_run = options.dry_run, "processing instance");
        let outcome = match process_instance(instance, &mut store, &settings, options.dry_run) {
            Ok(run) => {
                if !options.dry_run {
                    store.save()?;
                }
                InstanceOutcome {
                    name: instance.name.clone(),
                    status: if options.dry_run {
                        InstanceStatus::DryRun
                    } else {
                        InstanceStatus::Synced
                    },
                    error: None,
                    report: Some(run),
                }
            }
            Err(err) => {
                error!(instance = %instance.name, %err, "instance sync failed");
                InstanceOutcome {
                    name: instance.name.clone(),
                    status: InstanceStatus::Failed,
                    error: Some(err.to_string()),
                    report: None,
                }
            }
        };
        report.instances.push(outcome);
    }
    Ok(report)
}

fn process_instance(
    instance: &InstanceConfig,
    store: &mut InventoryStore,
    settings: &SyncSettings,
    dry_run: bool,
) -> Result<RunReport<Record>, RunError> {
    let credentials = instance.credentials()?;
    debug!(
        instance = %instance.name,
        base_url = %credentials.base_url,
        username = %credentials.username,
        verify = credentials.verify,
        "resolved credentials"
    );
    let snapshot = instance.snapshot.as_deref().ok_or_else(|| {
        RunError::FatalConfiguration(format!("instance {} has no snapshot", instance.name))
    })?;
    let feed_error = |err: crate::feed::FeedError| RunError::Load {
        side: instance.name.clone(),
        message: err.to_string(),
    };

    let mut client = SnapshotClient::open(&instance.name, snapshot).map_err(feed_error)?;
    client.login().map_err(feed_error)?;
    let result = sync_instance(&client, store, settings, RunOptions { dry_run });
    if let Err(err) = client.logout() {
        warn!(instance = %instance.name, %err, "logout failed");
    }
    result
}

/// Reconcile the inventory against one logged-in feed client.
pub fn sync_instance<C: FeedClient>(
    client: &C,
    store: &mut InventoryStore,
    settings: &SyncSettings,
    options: RunOptions,
) -> Result<RunReport<Record>, RunError> {
    let mut source = AdmAdapter::new(client, settings);
    let mut target = InventoryAdapter::new(store, settings);
    run(&mut source, &mut target, options)
}
