use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::apply::report::{ApplyReport, EntityRef, Failure};
use crate::apply::store::Store;
use crate::diff::{Action, Diff, DiffElement};
use crate::entity::{Attributes, Entity};
use crate::error::StoreError;
use crate::graph::Graph;

/// Delete operations collected during the create/update pass, queued per kind.
pub struct DeferredDeletes<'d, E: Entity> {
    queues: BTreeMap<E::Kind, Vec<&'d DiffElement<E>>>,
}

impl<E: Entity> DeferredDeletes<'_, E> {
    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply a full diff: creates and updates in diff order, then deferred
/// deletions child-before-parent.
pub fn apply<E, S>(diff: &Diff<E>, store: &mut S, target: &mut Graph<E>) -> ApplyReport
where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let mut report = ApplyReport::default();
    let deferred = apply_changes(diff, store, target, &mut report);
    flush_deletes(deferred, store, target, &mut report);
    report
}

/// Run every create and update in diff order and queue deletions.
///
/// A failing entity is recorded in `report` and does not stop the pass.
pub fn apply_changes<'d, E, S>(
    diff: &'d Diff<E>,
    store: &mut S,
    target: &mut Graph<E>,
    report: &mut ApplyReport,
) -> DeferredDeletes<'d, E>
where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let mut deferred = DeferredDeletes {
        queues: BTreeMap::new(),
    };

    for element in &diff.elements {
        match element.action {
            Action::Create => apply_create(element, store, target, report),
            Action::Update => apply_update(element, store, target, report),
            Action::Delete => {
                debug!(kind = %element.kind, identity = %element.identity, "deferring delete");
                deferred.queues.entry(element.kind).or_default().push(element);
            }
            Action::Skip => {
                debug!(kind = %element.kind, identity = %element.identity, "skipping unmatched entity");
            }
        }
    }
    deferred
}

/// Flush queued deletions in [`Entity::DELETE_ORDER`]. Kinds missing from
/// that order are flushed last.
pub fn flush_deletes<E, S>(
    mut deferred: DeferredDeletes<'_, E>,
    store: &mut S,
    target: &mut Graph<E>,
    report: &mut ApplyReport,
) where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let mut order: Vec<E::Kind> = E::DELETE_ORDER.to_vec();
    for kind in deferred.queues.keys() {
        if !order.contains(kind) {
            order.push(*kind);
        }
    }

    for kind in order {
        let Some(queue) = deferred.queues.remove(&kind) else {
            continue;
        };
        for element in queue {
            apply_delete(element, store, target, report);
        }
    }
}

fn apply_create<E, S>(
    element: &DiffElement<E>,
    store: &mut S,
    target: &mut Graph<E>,
    report: &mut ApplyReport,
) where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let Some(entity) = element.source.as_ref() else {
        return;
    };
    match store.create(entity) {
        Ok(Some(created)) => {
            info!(kind = %element.kind, identity = %element.identity, "created");
            track_created(element, created, target);
            report.created.push(entity_ref(element));
        }
        Ok(None) => {
            // Declined entities stay tracked in the target graph.
            info!(kind = %element.kind, identity = %element.identity, "store declined create");
            track_created(element, entity.clone(), target);
            report.declined.push(entity_ref(element));
        }
        Err(err) => {
            warn!(kind = %element.kind, identity = %element.identity, error = %err, "create failed");
            report.failed.push(failure(element, &err));
        }
    }
}

fn track_created<E: Entity>(element: &DiffElement<E>, entity: E, target: &mut Graph<E>) {
    if let Err(err) = target.add(entity.clone()) {
        warn!(%err, "created entity already present in target graph");
    } else if let Some((parent_kind, parent)) = &element.parent {
        if let Err(err) = target.add_child(*parent_kind, parent, &entity) {
            warn!(%err, "created child without a parent in target graph");
        }
    }
}

fn apply_update<E, S>(
    element: &DiffElement<E>,
    store: &mut S,
    target: &mut Graph<E>,
    report: &mut ApplyReport,
) where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let Some(current) = element.target.as_ref() else {
        return;
    };
    let changes: Attributes = element
        .changes
        .iter()
        .map(|change| (change.attribute, change.new.clone()))
        .collect();

    match store.update(current, &changes) {
        Ok(updated) => {
            info!(
                kind = %element.kind,
                identity = %element.identity,
                attributes = ?changes.keys().collect::<Vec<_>>(),
                "updated"
            );
            match target.get_mut(element.kind, &element.identity) {
                Ok(slot) => *slot = updated,
                Err(_) => {
                    if let Err(err) = target.add(updated) {
                        warn!(%err, "updated entity not restored in target graph");
                    }
                }
            }
            report.updated.push(entity_ref(element));
        }
        Err(err) => {
            warn!(kind = %element.kind, identity = %element.identity, error = %err, "update failed");
            report.failed.push(failure(element, &err));
        }
    }
}

fn apply_delete<E, S>(
    element: &DiffElement<E>,
    store: &mut S,
    target: &mut Graph<E>,
    report: &mut ApplyReport,
) where
    E: Entity,
    S: Store<E> + ?Sized,
{
    let Some(entity) = element.target.as_ref() else {
        return;
    };
    match store.delete(entity) {
        Ok(()) => {
            info!(kind = %element.kind, identity = %element.identity, "deleted");
            if let Err(err) = target.remove(element.kind, &element.identity) {
                warn!(%err, "deleted entity missing from target graph");
            }
            report.deleted.push(entity_ref(element));
        }
        Err(StoreError::Protected(reason)) => {
            info!(
                kind = %element.kind,
                identity = %element.identity,
                %reason,
                "deletion refused for protected entity"
            );
            report.protected.push(entity_ref(element));
        }
        Err(err) => {
            warn!(kind = %element.kind, identity = %element.identity, error = %err, "delete failed");
            report.failed.push(failure(element, &err));
        }
    }
}

fn entity_ref<E: Entity>(element: &DiffElement<E>) -> EntityRef {
    EntityRef {
        kind: element.kind.to_string(),
        identity: element.identity.clone(),
    }
}

fn failure<E: Entity>(element: &DiffElement<E>, err: &StoreError) -> Failure {
    Failure {
        kind: element.kind.to_string(),
        identity: element.identity.clone(),
        action: element.action,
        message: err.to_string(),
    }
}
