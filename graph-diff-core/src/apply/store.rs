use crate::entity::{Attributes, Entity, Identity};
use crate::error::StoreError;

/// Persistence collaborator of the target side.
///
/// Each call is an independent unit of work; the apply engine never bundles
/// calls into a transaction.
pub trait Store<E: Entity> {
    /// Persist a new entity. `Ok(None)` means the store declined to create
    /// it and the entity is left out of the target graph.
    fn create(&mut self, entity: &E) -> Result<Option<E>, StoreError>;

    /// Set only the given attributes on an existing entity and return the
    /// entity as stored afterwards.
    fn update(&mut self, current: &E, changes: &Attributes) -> Result<E, StoreError>;

    /// Remove an entity. Refusals caused by dependent records must be
    /// reported as [`StoreError::Protected`].
    fn delete(&mut self, entity: &E) -> Result<(), StoreError>;
}

/// An entity that ended a run present on both sides.
#[derive(Debug, Clone)]
pub struct Synced<'a, E: Entity> {
    pub kind: E::Kind,
    pub identity: Identity,
    pub source: &'a E,
}

/// Post-apply capability that stamps provenance on synced entities.
pub trait Labeler<E: Entity> {
    fn label(&mut self, synced: &[Synced<'_, E>]);
}
