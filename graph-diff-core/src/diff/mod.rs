//! Identity-based graph diffing.

pub mod engine;
pub mod result;

pub use engine::diff;
pub use result::{Action, Change, Diff, DiffElement, DiffSummary};
