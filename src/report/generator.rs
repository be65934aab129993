//! Summary report generation.
//!
//! This module renders the aggregated series and the row accounting of every
//! loaded table as Markdown or JSON.

use crate::cli::OutputFormat;
use crate::figure::renderer::{IID_LABEL, OBJECTIVE_LABEL, REFERENCE_LABEL};
use crate::models::{Report, ReportMetadata, SummarySeries, TableSummary};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# CoinRun Robustness Summary\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_filter_section(report));
    output.push_str(&generate_series_section(IID_LABEL, &report.figure.iid_failure));
    output.push_str(&generate_series_section(
        OBJECTIVE_LABEL,
        &report.figure.objective_failure,
    ));
    output.push_str(&generate_tables_section(&report.tables));

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Results Directory:** `{}`\n",
        metadata.results_dir.display()
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Figure:** `{}`\n",
        metadata.figure_path.display()
    ));
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_filter_section(report: &Report) -> String {
    let figure = &report.figure;
    let mut section = String::new();

    section.push_str("## Seed Filter\n\n");
    section.push_str(&format!(
        "- **Good Seeds:** {} (baseline invisible-coin frequency < {})\n",
        figure.good_seed_count, figure.threshold
    ));
    section.push_str(&format!(
        "- **{}:** {:.2}%\n\n",
        REFERENCE_LABEL,
        figure.baseline_reference * 100.0
    ));

    section
}

fn generate_series_section(title: &str, series: &SummarySeries) -> String {
    let mut section = format!("## {}\n\n", title);

    if series.is_empty() {
        section.push_str("No conditions found.\n\n");
        return section;
    }

    section.push_str("| Randomization (%) | Frequency (%) |\n");
    section.push_str("|:---:|:---:|\n");
    for (condition, value) in series.points() {
        section.push_str(&format!("| {} | {:.2} |\n", condition, value * 100.0));
    }
    section.push('\n');

    section
}

fn generate_tables_section(tables: &[TableSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Tables\n\n");
    section.push_str("| Role | Condition | Rows | Kept | Skipped | Source |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---|\n");

    for table in tables {
        let source = table
            .source
            .as_ref()
            .map(|p| format!("`{}`", p.display()))
            .unwrap_or_default();
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            table.role, table.condition, table.rows_loaded, table.rows_kept, table.skipped_rows, source
        ));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render `report` in `format` and write it to `path`.
pub fn write_report(report: &Report, format: OutputFormat, path: &Path) -> Result<()> {
    let content = match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Markdown => generate_markdown_report(report),
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
