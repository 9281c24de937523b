use colored::Colorize;
use graph_diff_core::{format_apply_summary, format_summary, format_text, ApplyReport, Diff};

use crate::job::{InstanceStatus, JobReport};
use crate::model::Record;
use crate::topology::PortRecord;

/// Render a diff for terminal output.
pub fn render_diff(diff: &Diff<Record>) -> String {
    let raw = format_text(diff);
    let mut out = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        let colored = if trimmed.starts_with('+') {
            line.green().to_string()
        } else if trimmed.starts_with('-') {
            line.red().to_string()
        } else if trimmed.starts_with('~') {
            line.yellow().to_string()
        } else if trimmed.starts_with('=') {
            line.dimmed().to_string()
        } else {
            line.to_string()
        };
        out.push(colored);
    }

    out.join("\n")
}

/// Render per-action counts of a diff.
pub fn render_summary(diff: &Diff<Record>) -> String {
    format_summary(diff).cyan().to_string()
}

/// Render apply outcome counts followed by one line per failure.
pub fn render_apply(report: &ApplyReport) -> String {
    let mut out = vec![format_apply_summary(report).cyan().to_string()];
    for entity in &report.declined {
        out.push(format!("declined {} {}", entity.kind, entity.identity).yellow().to_string());
    }
    for entity in &report.protected {
        out.push(format!("protected {} {}", entity.kind, entity.identity).dimmed().to_string());
    }
    for failure in &report.failed {
        out.push(
            format!(
                "failed {:?} {} {}: {}",
                failure.action, failure.kind, failure.identity, failure.message
            )
            .to_lowercase()
            .red()
            .to_string(),
        );
    }
    out.join("\n")
}

/// Render the whole job, one block per instance.
pub fn render_job(report: &JobReport) -> String {
    let mut out = Vec::new();
    for outcome in &report.instances {
        let status = match outcome.status {
            InstanceStatus::Synced => "synced".green(),
            InstanceStatus::DryRun => "dry run".yellow(),
            InstanceStatus::Failed => "failed".red(),
        };
        out.push(format!("instance {} ({status})", outcome.name).bold().to_string());
        if let Some(error) = &outcome.error {
            out.push(error.red().to_string());
        }
        let Some(run) = &outcome.report else {
            continue;
        };
        if run.diff.is_empty() {
            out.push("no changes".dimmed().to_string());
        } else {
            out.push(render_diff(&run.diff));
        }
        out.push(render_summary(&run.diff));
        if let Some(apply) = &run.apply {
            out.push(render_apply(apply));
        }
    }
    out.join("\n")
}

/// Render reconstructed port records as a table.
pub fn render_topology(host: &str, records: &[PortRecord]) -> String {
    let mut out = vec![format!("device {host}").bold().to_string()];
    if records.is_empty() {
        out.push("no addresses".dimmed().to_string());
    }
    for record in records {
        let line = format!(
            "  {:<6} {:<8} {:<40} {}",
            record.vlan,
            record.port,
            record.cidr(),
            record.tags.join(",")
        );
        out.push(if record.is_primary() {
            line.green().to_string()
        } else {
            line
        });
    }
    out.join("\n")
}
