//! Diff and apply report formatters.

pub mod text;

pub use text::{format_apply_summary, format_summary, format_text};
