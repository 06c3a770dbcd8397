//! Output formatting for CLI commands.
//!
//! Diagnostics and summaries go to stderr so stdout stays reserved for
//! machine-readable payloads (the schema command). Text output is colored;
//! JSON output is a single document per command.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::bundle::Bundle;
use crate::mutator::Diagnostics;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource row for the summary table.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Key")]
    key: String,
}

/// JSON shape of the summary command.
#[derive(Serialize)]
struct SummaryJson<'a> {
    bundle: &'a str,
    target: &'a str,
    mode: Option<String>,
    root_path: Option<&'a str>,
    resources: Vec<ResourceJson<'a>>,
}

#[derive(Serialize)]
struct ResourceJson<'a> {
    #[serde(rename = "type")]
    resource_type: &'static str,
    key: &'a str,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Writes accumulated diagnostics to stderr.
    pub fn emit_diagnostics(&self, diags: &Diagnostics) {
        if diags.is_empty() {
            return;
        }
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::to_string_pretty(diags).unwrap_or_default());
            }
            OutputFormat::Text => {
                for diag in diags {
                    eprintln!("{}", diag.render());
                }
            }
        }
    }

    /// Formats the bundle summary.
    #[must_use]
    pub fn format_summary(&self, bundle: &Bundle) -> String {
        match self.format {
            OutputFormat::Json => {
                let summary = SummaryJson {
                    bundle: &bundle.config.bundle.name,
                    target: bundle.selected_target(),
                    mode: bundle
                        .config
                        .bundle
                        .mode
                        .map(|m| format!("{m:?}").to_lowercase()),
                    root_path: bundle.config.workspace.root_path.as_deref(),
                    resources: bundle
                        .config
                        .resources
                        .keys_by_type()
                        .map(|(resource_type, key)| ResourceJson { resource_type, key })
                        .collect(),
                };
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_summary_text(bundle),
        }
    }

    fn format_summary_text(bundle: &Bundle) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} {} (target: {})",
            "Bundle".bold(),
            bundle.config.bundle.name,
            bundle.selected_target().cyan()
        );
        if let Some(mode) = bundle.config.bundle.mode {
            let _ = writeln!(output, "  Mode: {}", format!("{mode:?}").to_lowercase());
        }
        if let Some(user) = &bundle.config.workspace.current_user {
            let _ = writeln!(output, "  User: {}", user.user_name);
        }
        if let Some(root) = &bundle.config.workspace.root_path {
            let _ = writeln!(output, "  Root: {root}");
        }

        let rows: Vec<ResourceRow> = bundle
            .config
            .resources
            .keys_by_type()
            .map(|(resource_type, key)| ResourceRow {
                resource_type: resource_type.to_string(),
                key: key.clone(),
            })
            .collect();
        if rows.is_empty() {
            let _ = writeln!(output, "\nNo resources configured.");
        } else {
            let _ = writeln!(output, "\n{}", Table::new(rows));
        }
        output
    }

    /// Formats the closing line of a command.
    #[must_use]
    pub fn format_result(&self, ok: bool, what: &str) -> String {
        if self.format == OutputFormat::Json {
            return String::new();
        }
        if ok {
            format!("{} {what}", "✓".green())
        } else {
            format!("{} {what} failed", "✗".red())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resources::Job;

    #[test]
    fn test_summary_lists_resources() {
        let mut bundle = Bundle::for_tests();
        bundle.config.bundle.name = String::from("etl");
        bundle.config.bundle.target = Some(String::from("prod"));
        bundle
            .config
            .resources
            .jobs
            .insert(String::from("nightly"), Job::default());

        let formatter = OutputFormatter::new(OutputFormat::Text);
        let summary = formatter.format_summary(&bundle);
        assert!(summary.contains("etl"));
        assert!(summary.contains("prod"));
        assert!(summary.contains("nightly"));
    }

    #[test]
    fn test_json_summary_shape() {
        let mut bundle = Bundle::for_tests();
        bundle.config.bundle.name = String::from("etl");
        bundle
            .config
            .resources
            .jobs
            .insert(String::from("nightly"), Job::default());

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_summary(&bundle)).expect("json");
        assert_eq!(json["bundle"], "etl");
        assert_eq!(json["resources"][0]["key"], "nightly");
    }
}
