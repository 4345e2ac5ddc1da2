//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

use crate::config::ValidationReport;
use crate::runner::{ResourceReport, ResourceStatus, RunReport};
use crate::state::LocalState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation report.
    #[must_use]
    pub fn format_validation(&self, report: &ValidationReport, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": true,
                    "resources": report.resources,
                    "warnings": report.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Manifest is valid ({} resource(s))\n",
                    "✓".green(),
                    report.resources
                );
                if show_warnings && !report.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &report.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if !report.warnings.is_empty() {
                    let _ = writeln!(
                        output,
                        "   {} warning(s), use --warnings to list them",
                        report.warnings.len()
                    );
                }
                output
            }
        }
    }

    /// Formats the report of a sync or delete run.
    #[must_use]
    pub fn format_run(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_run_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_run_text(report: &RunReport) -> String {
        let mut output = String::new();

        if report.resources.is_empty() {
            output.push_str("No resources in manifest.\n");
            return output;
        }

        for resource in &report.resources {
            let _ = write!(
                output,
                "{:>10}  {}",
                Self::format_status(resource.status),
                resource.label()
            );
            if !resource.identifier.is_empty() {
                let _ = write!(output, " ({})", resource.identifier.dimmed());
            }
            if resource.status.is_sync() && !resource.ready {
                let _ = write!(output, " {}", "not ready".yellow());
            }
            output.push('\n');
            Self::format_details(&mut output, resource);
        }

        let _ = write!(
            output,
            "\nRun: {} created, {} updated, {} unchanged, {} deleted, {} skipped, {} failed\n",
            (report.count(ResourceStatus::Created) + report.count(ResourceStatus::Recreated))
                .to_string()
                .green(),
            report.count(ResourceStatus::Updated).to_string().yellow(),
            report.count(ResourceStatus::Unchanged),
            report.count(ResourceStatus::Deleted).to_string().red(),
            report.count(ResourceStatus::Skipped),
            report.failed().to_string().red()
        );

        if report.cancelled {
            let _ = writeln!(output, "{} Run was cancelled", "⚠".yellow());
        }

        output
    }

    /// Appends the per-resource detail lines.
    fn format_details(output: &mut String, resource: &ResourceReport) {
        for change in &resource.changes {
            let _ = writeln!(output, "            ~ {change}");
        }
        if !resource.tags_upserted.is_empty() {
            let _ = writeln!(
                output,
                "            + tags {}",
                resource.tags_upserted.join(", ")
            );
        }
        if !resource.tags_removed.is_empty() {
            let _ = writeln!(
                output,
                "            - tags {}",
                resource.tags_removed.join(", ")
            );
        }
        if let Some(action) = &resource.delete_action {
            let _ = writeln!(output, "            {action}");
        }
        for warning in &resource.warnings {
            let _ = writeln!(
                output,
                "            {} {}: {}",
                "⚠".yellow(),
                warning.step,
                warning.error
            );
        }
        if let Some(error) = &resource.error {
            let _ = writeln!(output, "            {} {error}", "✗".red());
        }
    }

    /// Formats a resource status with color.
    fn format_status(status: ResourceStatus) -> String {
        let text = status.to_string();
        match status {
            ResourceStatus::Created | ResourceStatus::Recreated => text.green().to_string(),
            ResourceStatus::Updated | ResourceStatus::Stopped => text.yellow().to_string(),
            ResourceStatus::Deleted | ResourceStatus::Failed => text.red().to_string(),
            ResourceStatus::Unchanged | ResourceStatus::Skipped | ResourceStatus::NotRun => {
                text.dimmed().to_string()
            }
        }
    }

    /// Formats persisted state.
    #[must_use]
    pub fn format_state(&self, state: &LocalState) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&StateJson::from(state)).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "State");
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Provider resources: {}", state.provider.len());

                if state.resources.is_empty() {
                    output.push_str("\n   No recorded resources.\n");
                } else {
                    let _ = writeln!(output, "\n   Resources ({}):", state.resources.len());
                    for resource in &state.resources {
                        let _ = writeln!(
                            output,
                            "     {}/{} {}",
                            resource.kind(),
                            resource.name(),
                            resource.meta().identifier.dimmed()
                        );
                    }
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success {
                            "✓".green()
                        } else {
                            "✗".red()
                        };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn format_error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "error", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct StateJson {
    version: String,
    last_updated: String,
    provider_resources: usize,
    resources: Vec<RecordedJson>,
    history: Vec<crate::state::HistoryEntry>,
}

#[derive(Serialize)]
struct RecordedJson {
    kind: &'static str,
    name: String,
    identifier: String,
}

impl From<&LocalState> for StateJson {
    fn from(state: &LocalState) -> Self {
        Self {
            version: state.version.clone(),
            last_updated: state.last_updated.to_rfc3339(),
            provider_resources: state.provider.len(),
            resources: state
                .resources
                .iter()
                .map(|r| RecordedJson {
                    kind: r.kind(),
                    name: r.name().to_string(),
                    identifier: r.meta().identifier.clone(),
                })
                .collect(),
            history: state.history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifestResource;
    use crate::resource::kinds::Queue;

    fn report() -> RunReport {
        RunReport {
            resources: vec![ResourceReport {
                kind: "queue",
                name: String::from("orders"),
                identifier: String::from("queue-1"),
                status: ResourceStatus::Created,
                ready: true,
                changes: Vec::new(),
                tags_upserted: vec![String::from("team")],
                tags_removed: Vec::new(),
                warnings: Vec::new(),
                delete_action: None,
                error: None,
            }],
            cancelled: false,
        }
    }

    #[test]
    fn test_run_json_is_parseable() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_run(&report())).unwrap();

        assert_eq!(json["resources"][0]["status"], "created");
        assert_eq!(json["resources"][0]["identifier"], "queue-1");
        assert_eq!(json["cancelled"], false);
    }

    #[test]
    fn test_run_text_lists_resources() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_run(&report());

        assert!(text.contains("queue/orders"));
        assert!(text.contains("+ tags team"));
        assert!(text.contains("1 created"));
    }

    #[test]
    fn test_state_json_lists_recorded_resources() {
        let mut state = LocalState::new();
        let mut queue = ManifestResource::Queue(Queue::new("orders"));
        queue.meta_mut().identifier = String::from("queue-1");
        state.record_resources([queue]);

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_state(&state)).unwrap();

        assert_eq!(json["resources"][0]["kind"], "queue");
        assert_eq!(json["resources"][0]["identifier"], "queue-1");
    }
}
