//! Executes a diff against the target side's persistence collaborator.

pub mod engine;
pub mod report;
pub mod store;

pub use engine::{apply, apply_changes, flush_deletes, DeferredDeletes};
pub use report::{ApplyReport, EntityRef, Failure};
pub use store::{Labeler, Store, Synced};
