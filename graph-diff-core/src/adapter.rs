use tracing::warn;

use crate::entity::{Entity, Identity};
use crate::error::{GraphError, RunError};
use crate::graph::Graph;

/// One side of a reconciliation: something that can populate a [`Graph`].
pub trait Adapter {
    type Entity: Entity;

    /// Short label used in logs and reports.
    fn name(&self) -> &str;

    fn graph(&self) -> &Graph<Self::Entity>;

    fn graph_mut(&mut self) -> &mut Graph<Self::Entity>;

    /// Populate the graph. Per-entity problems are logged and skipped; only
    /// conditions that make the whole side unusable are returned.
    fn load(&mut self) -> Result<(), RunError>;

    fn get(
        &self,
        kind: <Self::Entity as Entity>::Kind,
        identity: &Identity,
    ) -> Result<&Self::Entity, GraphError> {
        self.graph().get(kind, identity)
    }

    /// Add an entity, logging and discarding duplicates. Returns whether the
    /// entity was inserted.
    fn add(&mut self, entity: Self::Entity) -> bool {
        match self.graph_mut().add(entity) {
            Ok(()) => true,
            Err(err) => {
                warn!(adapter = self.name(), %err, "duplicate entity not loaded");
                false
            }
        }
    }

    fn get_all(
        &self,
        kind: <Self::Entity as Entity>::Kind,
    ) -> impl Iterator<Item = &Self::Entity> + '_ {
        self.graph().get_all(kind)
    }
}
