//! The reconciliation state machine.
//!
//! `LoadSource -> LoadTarget -> Diff -> ApplyCreateUpdate -> ApplyDelete ->
//! Label -> Done`. A dry run stops after `Diff`. There is no rollback: once
//! apply has started, whatever the store accepted stays applied.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::info;

use crate::adapter::Adapter;
use crate::apply::{apply_changes, flush_deletes, ApplyReport, Labeler, Store, Synced};
use crate::diff::{diff, Diff};
use crate::entity::Entity;
use crate::error::RunError;
use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadSource,
    LoadTarget,
    Diff,
    ApplyCreateUpdate,
    ApplyDelete,
    Label,
    Done,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::LoadSource => "load_source",
            Phase::LoadTarget => "load_target",
            Phase::Diff => "diff",
            Phase::ApplyCreateUpdate => "apply_create_update",
            Phase::ApplyDelete => "apply_delete",
            Phase::Label => "label",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute and report the diff without touching the target.
    pub dry_run: bool,
}

/// Everything a finished run produced.
#[derive(Debug, Serialize)]
#[serde(bound = "")]
pub struct RunReport<E: Entity> {
    /// Last phase the run completed.
    pub reached: Phase,
    pub diff: Diff<E>,
    /// `None` for dry runs.
    pub apply: Option<ApplyReport>,
    /// Number of entities handed to the labeler.
    pub labeled: usize,
}

/// Run one full reconciliation of `target` towards `source`.
///
/// Load errors abort the run. Per-entity apply failures are collected in the
/// returned [`ApplyReport`].
pub fn run<E, S, T>(source: &mut S, target: &mut T, options: RunOptions) -> Result<RunReport<E>, RunError>
where
    E: Entity,
    S: Adapter<Entity = E>,
    T: Adapter<Entity = E> + Store<E> + Labeler<E>,
{
    enter(Phase::LoadSource, source.name());
    source.load()?;

    enter(Phase::LoadTarget, target.name());
    target.load()?;

    enter(Phase::Diff, target.name());
    let diff = diff(source.graph(), target.graph());

    if options.dry_run {
        info!(adapter = target.name(), "dry run, skipping apply");
        return Ok(RunReport {
            reached: Phase::Diff,
            diff,
            apply: None,
            labeled: 0,
        });
    }

    // The target is both graph owner and store; apply against a detached graph.
    let mut graph = std::mem::take(target.graph_mut());
    let mut report = ApplyReport::default();

    enter(Phase::ApplyCreateUpdate, target.name());
    let deferred = apply_changes(&diff, target, &mut graph, &mut report);

    enter(Phase::ApplyDelete, target.name());
    flush_deletes(deferred, target, &mut graph, &mut report);
    *target.graph_mut() = graph;

    enter(Phase::Label, target.name());
    let synced = synced_entities(source.graph(), target.graph(), &report);
    let labeled = synced.len();
    target.label(&synced);

    enter(Phase::Done, target.name());
    Ok(RunReport {
        reached: Phase::Done,
        diff,
        apply: Some(report),
        labeled,
    })
}

/// Source entities that exist in the applied target graph and did not fail.
pub fn synced_entities<'a, E: Entity>(
    source: &'a Graph<E>,
    target: &Graph<E>,
    report: &ApplyReport,
) -> Vec<Synced<'a, E>> {
    let mut synced = Vec::new();
    for kind in source.kinds() {
        let label = kind.to_string();
        for entity in source.get_all(kind) {
            let identity = entity.identity();
            if target.contains(kind, &identity)
                && !report.failed_contains(&label, &identity)
                && !report.declined_contains(&label, &identity)
            {
                synced.push(Synced {
                    kind,
                    identity,
                    source: entity,
                });
            }
        }
    }
    synced
}

fn enter(phase: Phase, adapter: &str) {
    info!(%phase, adapter, "entering phase");
}
