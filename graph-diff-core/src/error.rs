use thiserror::Error;

use crate::entity::Identity;

/// Errors raised by [`crate::Graph`] operations.
///
/// Both variants are expected control flow: callers log a duplicate and move
/// on, and treat a missing entity as a signal to create or lazily load it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An entity with the same identity is already present.
    #[error("duplicate {kind} {identity}")]
    DuplicateKey { kind: String, identity: Identity },
    /// No entity with this identity exists.
    #[error("{kind} {identity} not found")]
    NotFound { kind: String, identity: Identity },
}

/// Errors a persistence collaborator reports back to the apply engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Deletion refused because other records still reference the entity.
    #[error("protected: {0}")]
    Protected(String),
    /// A referenced record (parent, prefix, tenant) is missing in the store.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    /// The store rejected the write.
    #[error("{0}")]
    Rejected(String),
}

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Credentials or required settings are missing. Raised before any load.
    #[error("fatal configuration: {0}")]
    FatalConfiguration(String),
    /// A side could not produce its graph at all.
    #[error("failed to load {side}: {message}")]
    Load { side: String, message: String },
}
