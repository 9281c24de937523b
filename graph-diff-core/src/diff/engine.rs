use std::collections::HashSet;

use tracing::debug;

use crate::diff::result::{Action, Change, Diff, DiffElement};
use crate::entity::{Attributes, Entity, Identity, Value};
use crate::graph::Graph;

/// Compute the operations that make `target` agree with `source`.
///
/// Elements are grouped by [`Entity::TOP_LEVEL`] order. Within a kind,
/// source entities come first in source discovery order, followed by
/// target-only entities in target order. Children follow their parent.
pub fn diff<E: Entity>(source: &Graph<E>, target: &Graph<E>) -> Diff<E> {
    let mut out = Vec::new();
    let mut ctx = MatchContext {
        source,
        target,
        out: &mut out,
    };

    for kind in E::TOP_LEVEL {
        let source_ids: Vec<Identity> = source.get_all(*kind).map(Entity::identity).collect();
        let target_ids: Vec<Identity> = target.get_all(*kind).map(Entity::identity).collect();
        diff_members(&mut ctx, *kind, &source_ids, &target_ids, None);
    }

    let diff = Diff { elements: out };
    let summary = diff.summary();
    debug!(
        create = summary.create,
        update = summary.update,
        delete = summary.delete,
        skip = summary.skip,
        "diff computed"
    );
    diff
}

struct MatchContext<'a, 'b, E: Entity> {
    source: &'a Graph<E>,
    target: &'a Graph<E>,
    out: &'b mut Vec<DiffElement<E>>,
}

fn diff_members<E: Entity>(
    ctx: &mut MatchContext<'_, '_, E>,
    kind: E::Kind,
    source_ids: &[Identity],
    target_ids: &[Identity],
    parent: Option<&(E::Kind, Identity)>,
) {
    let in_source: HashSet<&Identity> = source_ids.iter().collect();
    let in_target: HashSet<&Identity> = target_ids.iter().collect();
    let depth = usize::from(parent.is_some());

    for identity in source_ids {
        let Ok(src) = ctx.source.get(kind, identity) else {
            continue;
        };
        let dst = if in_target.contains(identity) {
            ctx.target.get(kind, identity).ok()
        } else {
            None
        };

        match dst {
            Some(dst) => {
                let changes = changed_attributes(&src.attributes(), &dst.attributes());
                if !changes.is_empty() {
                    ctx.out.push(DiffElement {
                        kind,
                        identity: identity.clone(),
                        action: Action::Update,
                        depth,
                        parent: parent.cloned(),
                        changes,
                        source: Some(src.clone()),
                        target: Some(dst.clone()),
                    });
                }
            }
            None => {
                let changes = src
                    .attributes()
                    .into_iter()
                    .map(|(attribute, new)| Change {
                        attribute,
                        old: Value::Unset,
                        new,
                    })
                    .collect();
                ctx.out.push(DiffElement {
                    kind,
                    identity: identity.clone(),
                    action: Action::Create,
                    depth,
                    parent: parent.cloned(),
                    changes,
                    source: Some(src.clone()),
                    target: None,
                });
            }
        }
        diff_children(ctx, kind, identity);
    }

    for identity in target_ids {
        if in_source.contains(identity) {
            continue;
        }
        let Ok(dst) = ctx.target.get(kind, identity) else {
            continue;
        };
        let action = if ctx.target.skips_unmatched(kind) {
            Action::Skip
        } else {
            Action::Delete
        };
        ctx.out.push(DiffElement {
            kind,
            identity: identity.clone(),
            action,
            depth,
            parent: parent.cloned(),
            changes: Vec::new(),
            source: None,
            target: Some(dst.clone()),
        });
        if action == Action::Delete {
            diff_children(ctx, kind, identity);
        }
    }
}

/// Diff the children of one parent, grouping child links by kind in order of
/// first appearance (source links before target links).
fn diff_children<E: Entity>(ctx: &mut MatchContext<'_, '_, E>, kind: E::Kind, identity: &Identity) {
    let source_links = ctx.source.children_of(kind, identity);
    let target_links = ctx.target.children_of(kind, identity);
    if source_links.is_empty() && target_links.is_empty() {
        return;
    }

    let mut child_kinds: Vec<E::Kind> = Vec::new();
    for (child_kind, _) in source_links.iter().chain(target_links) {
        if !child_kinds.contains(child_kind) {
            child_kinds.push(*child_kind);
        }
    }

    let parent = (kind, identity.clone());
    for child_kind in child_kinds {
        let source_ids = ids_of_kind(source_links, child_kind);
        let target_ids = ids_of_kind(target_links, child_kind);
        diff_members(ctx, child_kind, &source_ids, &target_ids, Some(&parent));
    }
}

fn ids_of_kind<K: PartialEq + Copy>(links: &[(K, Identity)], kind: K) -> Vec<Identity> {
    links
        .iter()
        .filter(|(k, _)| *k == kind)
        .map(|(_, id)| id.clone())
        .collect()
}

/// Attributes whose source value differs from the target value. Attributes
/// the target lacks compare against [`Value::Unset`].
fn changed_attributes(source: &Attributes, target: &Attributes) -> Vec<Change> {
    source
        .iter()
        .filter_map(|(attribute, new)| {
            let old = target.get(attribute).cloned().unwrap_or(Value::Unset);
            (old != *new).then(|| Change {
                attribute: *attribute,
                old,
                new: new.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::diff::result::Action;
    use crate::graph::Graph;
    use crate::testing::{Item, ItemKind};

    use super::diff;

    fn graph(parents: &[(&str, &str)], children: &[(&str, &str, &str)]) -> Graph<Item> {
        let mut g = Graph::new();
        for (name, value) in parents {
            g.add(Item::parent(name, value)).expect("add parent");
        }
        for (name, parent, value) in children {
            let child = Item::child(name, parent, value);
            g.add(child.clone()).expect("add child");
            g.add_child(ItemKind::Parent, &Item::parent(parent, "").identity_key(), &child)
                .expect("link child");
        }
        g
    }

    #[test]
    fn identical_graphs_produce_empty_diff() {
        let source = graph(&[("a", "1")], &[("x", "a", "up")]);
        let target = graph(&[("a", "1")], &[("x", "a", "up")]);
        let result = diff(&source, &target);
        assert!(result.is_empty());
        assert!(result.elements.is_empty());
    }

    #[test]
    fn classifies_create_update_delete() {
        let source = graph(&[("a", "1"), ("b", "2")], &[]);
        let target = graph(&[("a", "9"), ("c", "3")], &[]);
        let result = diff(&source, &target);

        let actions: Vec<_> = result
            .elements
            .iter()
            .map(|e| (e.identity.to_string(), e.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("a".to_string(), Action::Update),
                ("b".to_string(), Action::Create),
                ("c".to_string(), Action::Delete),
            ]
        );
        let update = &result.elements[0];
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].attribute, "value");
        assert_eq!(update.changes[0].old.as_text(), Some("9"));
        assert_eq!(update.changes[0].new.as_text(), Some("1"));
    }

    #[test]
    fn children_follow_their_parent() {
        let source = graph(&[("a", "1"), ("b", "1")], &[("x", "a", "up")]);
        let target = graph(&[], &[]);
        let result = diff(&source, &target);
        let order: Vec<_> = result
            .elements
            .iter()
            .map(|e| format!("{}:{}", e.kind, e.identity))
            .collect();
        assert_eq!(order, vec!["parent:a", "child:x__a", "parent:b"]);
        assert_eq!(result.elements[1].depth, 1);
        assert_eq!(
            result.elements[1].parent.as_ref().map(|(_, id)| id.to_string()),
            Some("a".to_string())
        );
    }

    #[test]
    fn deleted_parent_deletes_children() {
        let source = graph(&[], &[]);
        let target = graph(&[("a", "1")], &[("x", "a", "up")]);
        let result = diff(&source, &target);
        assert_eq!(result.summary().delete, 2);
    }

    #[test]
    fn skip_unmatched_kind_is_not_deleted() {
        let source = graph(&[("a", "1")], &[]);
        let mut target = graph(&[("a", "1"), ("other-tenant", "1")], &[]);
        target.set_skip_unmatched(ItemKind::Parent);

        let result = diff(&source, &target);
        assert_eq!(result.summary().delete, 0);
        assert_eq!(result.summary().skip, 1);
        assert!(result.is_empty());
    }
}
