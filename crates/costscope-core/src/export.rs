//! Export of call records and reports
//!
//! CSV for spreadsheets, JSON for tooling, Markdown for sharing a summary.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::models::CallRecord;
use crate::report::{format_cost, format_number, Report};

const CSV_HEADER: &str = "#,Scope,Model,Provider,Input,Output,Cost,Duration (ms),Flags";

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Export call records to CSV, one row per call in append order
///
/// CSV columns: #, Scope, Model, Provider, Input, Output, Cost, Duration (ms), Flags
///
/// # Examples
///
/// ```no_run
/// use costscope_core::export::export_calls_to_csv;
/// use costscope_core::Session;
/// use std::path::Path;
///
/// let session = Session::new("batch");
/// export_calls_to_csv(&session.stats().calls, Path::new("calls.csv")).unwrap();
/// ```
pub fn export_calls_to_csv(records: &[CallRecord], path: &Path) -> Result<()> {
    create_parent(path)?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", CSV_HEADER).context("Failed to write CSV header")?;

    for record in records {
        writeln!(
            writer,
            "{},{},{},{},{},{},{:.6},{:.0},{}",
            record.seq,
            csv_quote(&record.scope_path.to_string()),
            csv_quote(&record.model),
            csv_quote(record.provider.as_deref().unwrap_or("")),
            record.input_tokens,
            record.output_tokens,
            record.cost_usd,
            record.duration_seconds * 1000.0,
            record.flags.label()
        )
        .with_context(|| format!("Failed to write row for call {}", record.seq))?;
    }

    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Export a full report (stats, tree, hints) as pretty JSON
pub fn export_report_to_json(report: &Report, path: &Path) -> Result<()> {
    create_parent(path)?;

    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

    Ok(())
}

/// Export a report summary as Markdown
///
/// Sections:
/// - Summary totals
/// - Cost by top-level scope and by model (highest first)
/// - Optimization hints
pub fn export_report_to_markdown(report: &Report, path: &Path) -> Result<()> {
    create_parent(path)?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create Markdown file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let stats = &report.stats;

    writeln!(writer, "# Cost Report: {}", stats.session_name)?;
    writeln!(writer)?;
    writeln!(
        writer,
        "**Generated**: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(writer)?;

    writeln!(writer, "## Summary")?;
    writeln!(writer)?;
    writeln!(writer, "| Metric | Value |")?;
    writeln!(writer, "|--------|-------|")?;
    writeln!(writer, "| Total Cost | {} |", stats.cost_display())?;
    writeln!(writer, "| Calls | {} |", stats.total_calls)?;
    writeln!(writer, "| Input Tokens | {} |", format_number(stats.input_tokens))?;
    writeln!(writer, "| Output Tokens | {} |", format_number(stats.output_tokens))?;
    writeln!(writer, "| Unpriced Calls | {} |", stats.unpriced_calls)?;
    writeln!(writer)?;

    for (title, map) in [
        ("Cost by Scope", &stats.cost_by_scope),
        ("Cost by Model", &stats.cost_by_model),
    ] {
        writeln!(writer, "## {}", title)?;
        writeln!(writer)?;
        writeln!(writer, "| Name | Cost | Share |")?;
        writeln!(writer, "|------|------|-------|")?;

        let mut rows: Vec<(&String, &f64)> = map.iter().collect();
        rows.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        for (name, cost) in rows {
            let share = if stats.total_cost_usd > 0.0 {
                cost / stats.total_cost_usd * 100.0
            } else {
                0.0
            };
            writeln!(writer, "| {} | {} | {:.1}% |", name, format_cost(*cost), share)?;
        }
        writeln!(writer)?;
    }

    if !report.hints.is_empty() {
        writeln!(writer, "## Optimization Hints")?;
        writeln!(writer)?;
        for hint in &report.hints {
            writeln!(writer, "- {}", hint)?;
        }
        writeln!(writer)?;
    }

    writer.flush().context("Failed to flush Markdown writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScopePath, UsageEvent};
    use crate::Session;
    use tempfile::TempDir;

    fn session() -> Session {
        let session = Session::new("export");
        session.record(
            UsageEvent::new("gpt-4o", 12_000, 400)
                .with_duration(1.25)
                .with_provider("openai"),
            ScopePath::new(["pipeline", "fetch"]),
        );
        session.record(UsageEvent::new("mystery", 10, 10), ScopePath::root());
        session
    }

    #[test]
    fn test_export_calls_csv_empty() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("calls.csv");

        export_calls_to_csv(&[], &csv_path).unwrap();

        let contents = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(contents, format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn test_export_calls_csv_with_data() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("calls.csv");

        export_calls_to_csv(&session().stats().calls, &csv_path).unwrap();

        let contents = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "1,\"pipeline > fetch\",\"gpt-4o\",\"openai\",12000,400,0.034000,1250,"
        );
        assert!(lines[2].starts_with("2,\"<unattributed>\",\"mystery\",\"\""));
        assert!(lines[2].ends_with("unpriced"));
    }

    #[test]
    fn test_csv_quotes_are_escaped() {
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("calls.csv");
        export_calls_to_csv(&[], &nested).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_export_report_json() {
        let temp_dir = TempDir::new().unwrap();
        let json_path = temp_dir.path().join("report.json");

        export_report_to_json(&session().report(), &json_path).unwrap();

        let contents = std::fs::read_to_string(&json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["stats"]["total_calls"], 2);
        assert_eq!(value["stats"]["unpriced_calls"], 1);
    }

    #[test]
    fn test_export_report_markdown() {
        let temp_dir = TempDir::new().unwrap();
        let md_path = temp_dir.path().join("report.md");

        export_report_to_markdown(&session().report(), &md_path).unwrap();

        let contents = std::fs::read_to_string(&md_path).unwrap();
        assert!(contents.starts_with("# Cost Report: export"));
        assert!(contents.contains("| Total Cost | $0.0340 |"));
        assert!(contents.contains("| pipeline | $0.0340 | 100.0% |"));
        assert!(contents.contains("## Optimization Hints"));
    }
}
