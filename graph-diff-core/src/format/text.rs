use crate::apply::ApplyReport;
use crate::diff::{Action, Diff};
use crate::entity::Entity;

/// Format a diff as plain text, one line per element.
///
/// `+` create, `~` update (followed by one `old -> new` line per changed
/// attribute), `-` delete, `=` skipped. Children are indented under their
/// parent.
pub fn format_text<E: Entity>(diff: &Diff<E>) -> String {
    let mut lines = Vec::with_capacity(diff.elements.len());
    for element in &diff.elements {
        let indent = "  ".repeat(element.depth);
        let prefix = match element.action {
            Action::Create => '+',
            Action::Update => '~',
            Action::Delete => '-',
            Action::Skip => '=',
        };
        lines.push(format!(
            "{indent}{prefix} {} {}",
            element.kind, element.identity
        ));
        if element.action == Action::Update {
            for change in &element.changes {
                lines.push(format!(
                    "{indent}    {}: {} -> {}",
                    change.attribute, change.old, change.new
                ));
            }
        }
    }
    lines.join("\n")
}

/// Format per-action counts of a diff.
pub fn format_summary<E: Entity>(diff: &Diff<E>) -> String {
    let summary = diff.summary();
    format!(
        "create={} update={} delete={} skip={}",
        summary.create, summary.update, summary.delete, summary.skip
    )
}

/// Format the outcome counts of an apply pass.
pub fn format_apply_summary(report: &ApplyReport) -> String {
    format!(
        "created={} updated={} deleted={} declined={} protected={} failed={}",
        report.created.len(),
        report.updated.len(),
        report.deleted.len(),
        report.declined.len(),
        report.protected.len(),
        report.failed.len()
    )
}
