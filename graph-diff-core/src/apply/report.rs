use serde::Serialize;

use crate::diff::Action;
use crate::entity::Identity;

/// Kind and identity of one entity touched by the apply engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: String,
    pub identity: Identity,
}

/// A per-entity failure. Reported once per affected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: String,
    pub identity: Identity,
    pub action: Action,
    pub message: String,
}

/// Outcome of applying one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created: Vec<EntityRef>,
    pub updated: Vec<EntityRef>,
    pub deleted: Vec<EntityRef>,
    /// Creates the store chose not to perform.
    pub declined: Vec<EntityRef>,
    /// Deletes refused because of dependent records.
    pub protected: Vec<EntityRef>,
    pub failed: Vec<Failure>,
}

impl ApplyReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub(crate) fn failed_contains(&self, kind: &str, identity: &Identity) -> bool {
        self.failed
            .iter()
            .any(|f| f.kind == kind && &f.identity == identity)
    }

    pub(crate) fn declined_contains(&self, kind: &str, identity: &Identity) -> bool {
        self.declined
            .iter()
            .any(|d| d.kind == kind && &d.identity == identity)
    }
}
