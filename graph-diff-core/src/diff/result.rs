use serde::Serialize;

use crate::entity::{Entity, Identity, Value};

/// What the target side must do with one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Present only in the source.
    Create,
    /// Present on both sides with differing attributes.
    Update,
    /// Present only in the target.
    Delete,
    /// Present only in a scoped target; left alone.
    Skip,
}

/// One attribute transition. `old` is [`Value::Unset`] for creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub attribute: &'static str,
    pub old: Value,
    pub new: Value,
}

/// A single diff outcome for one entity.
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "")]
pub struct DiffElement<E: Entity> {
    pub kind: E::Kind,
    pub identity: Identity,
    pub action: Action,
    /// 0 for top-level kinds, 1 for their children.
    pub depth: usize,
    /// Parent link for child entities.
    pub parent: Option<(E::Kind, Identity)>,
    pub changes: Vec<Change>,
    #[serde(skip)]
    pub source: Option<E>,
    #[serde(skip)]
    pub target: Option<E>,
}

/// Ordered diff between a source and a target graph.
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "")]
pub struct Diff<E: Entity> {
    pub elements: Vec<DiffElement<E>>,
}

/// Per-action element counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub skip: usize,
}

impl<E: Entity> Diff<E> {
    /// True when applying the diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| e.action == Action::Skip)
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for element in &self.elements {
            match element.action {
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Delete => summary.delete += 1,
                Action::Skip => summary.skip += 1,
            }
        }
        summary
    }

    /// Elements with the given action, in diff order.
    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &DiffElement<E>> + '_ {
        self.elements.iter().filter(move |e| e.action == action)
    }
}

#[cfg(test)]
mod tests {
    use crate::diff::diff;
    use crate::graph::Graph;
    use crate::testing::Item;

    #[test]
    fn serialized_diff_carries_action_and_changes() {
        let mut source = Graph::new();
        source.add(Item::parent("a", "1")).expect("add");
        let target = Graph::new();

        let value = serde_json::to_value(diff(&source, &target)).expect("serialize");
        let element = &value["elements"][0];
        assert_eq!(element["action"], "create");
        assert_eq!(element["identity"], serde_json::json!(["a"]));
        assert_eq!(element["changes"][0]["attribute"], "value");
        assert_eq!(element["changes"][0]["new"]["value"], "1");
    }
}
