//! Generic identity-based graph reconciliation.
//!
//! Two adapters each load a [`Graph`] of typed entities; [`diff`] classifies
//! every identity into create/update/delete/skip, and [`apply`] executes the
//! result against the target side's [`Store`], deferring deletions so that
//! children go before their parents.

pub mod adapter;
pub mod apply;
pub mod diff;
pub mod entity;
pub mod error;
pub mod format;
pub mod graph;
pub mod run;

#[cfg(test)]
mod testing;

pub use adapter::Adapter;
pub use apply::{apply, ApplyReport, EntityRef, Failure, Labeler, Store, Synced};
pub use diff::{diff, Action, Change, Diff, DiffElement, DiffSummary};
pub use entity::{Attributes, Entity, Identity, Kind, Value};
pub use error::{GraphError, RunError, StoreError};
pub use format::{format_apply_summary, format_summary, format_text};
pub use graph::Graph;
pub use run::{run, Phase, RunOptions, RunReport};
