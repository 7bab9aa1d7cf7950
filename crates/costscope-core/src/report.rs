//! Session statistics, reports and renderers
//!
//! [`Stats`] and [`Report`] are plain data; renderers turn a [`Report`] into
//! text. Everything here is a pure read over a snapshot.

use crate::aggregate::{CostNode, CostTree};
use crate::error::CoreError;
use crate::hints::Hint;
use crate::models::{CallRecord, UNATTRIBUTED};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Running totals, updated once per appended record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
    pub unpriced_calls: u64,
    pub malformed_calls: u64,
    /// Top-level scope name (or `<unattributed>`) → cost
    pub by_scope: BTreeMap<String, f64>,
    pub by_model: BTreeMap<String, f64>,
}

impl Totals {
    pub fn add(&mut self, record: &CallRecord) {
        self.cost_usd += record.cost_usd;
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.calls += 1;
        if record.flags.unpriced {
            self.unpriced_calls += 1;
        }
        if record.flags.malformed {
            self.malformed_calls += 1;
        }
        let scope = record.scope_path.top_level().unwrap_or(UNATTRIBUTED);
        *self.by_scope.entry(scope.to_string()).or_insert(0.0) += record.cost_usd;
        *self.by_model.entry(record.model.clone()).or_insert(0.0) += record.cost_usd;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Structural snapshot of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub session_name: String,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_calls: u64,
    pub unpriced_calls: u64,
    pub malformed_calls: u64,
    pub cost_by_scope: BTreeMap<String, f64>,
    pub cost_by_model: BTreeMap<String, f64>,
    /// Every call record in append order
    pub calls: Vec<CallRecord>,
}

impl Stats {
    pub fn new(session_name: impl Into<String>, totals: &Totals, calls: Vec<CallRecord>) -> Self {
        Self {
            session_name: session_name.into(),
            total_cost_usd: totals.cost_usd,
            total_tokens: totals.total_tokens(),
            input_tokens: totals.input_tokens,
            output_tokens: totals.output_tokens,
            total_calls: totals.calls,
            unpriced_calls: totals.unpriced_calls,
            malformed_calls: totals.malformed_calls,
            cost_by_scope: totals.by_scope.clone(),
            cost_by_model: totals.by_model.clone(),
            calls,
        }
    }

    /// Build from a record list without running totals
    pub fn from_records(session_name: impl Into<String>, records: Vec<CallRecord>) -> Self {
        let mut totals = Totals::default();
        for record in &records {
            totals.add(record);
        }
        Self::new(session_name, &totals, records)
    }

    pub fn is_empty(&self) -> bool {
        self.total_calls == 0
    }

    pub fn cost_display(&self) -> String {
        format_cost(self.total_cost_usd)
    }
}

/// Stats plus the cost tree and hints
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub stats: Stats,
    pub tree: CostTree,
    pub hints: Vec<Hint>,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// Window used to extrapolate hint savings, after flooring
    pub sampling_window_secs: f64,
}

/// Pluggable report output
pub trait ReportRenderer {
    fn render(&self, report: &Report) -> Result<String, CoreError>;
}

/// Ranked cost tree with bars, per-model lines and hints
#[derive(Debug, Clone)]
pub struct TextRenderer {
    pub bar_width: usize,
    pub show_hints: bool,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            bar_width: 16,
            show_hints: true,
        }
    }
}

impl TextRenderer {
    fn render_node(&self, out: &mut String, node: &CostNode, depth: usize, total: f64) {
        let indent = "  ".repeat(depth + 1);
        let label = format!("{}{}", indent, node.name);
        let pct = percent(node.inclusive_cost_usd, total);
        let _ = writeln!(
            out,
            "{:<40} {:>10}  {}  {:>3.0}%  ({} call{})",
            label,
            format_cost(node.inclusive_cost_usd),
            bar(pct, self.bar_width),
            pct,
            node.inclusive_calls,
            plural(node.inclusive_calls)
        );
        self.render_models(out, node, depth + 1, total);

        for child in node.ranked_children() {
            self.render_node(out, child, depth + 1, total);
        }
    }

    fn render_models(&self, out: &mut String, node: &CostNode, depth: usize, total: f64) {
        // A single model with no children repeats the node line
        if node.models.len() == 1 && node.is_leaf() && depth > 0 {
            if let Some((model, cost)) = node.models.iter().next() {
                let _ = writeln!(
                    out,
                    "{}  └─ {} [{} tokens]{}",
                    "  ".repeat(depth),
                    model,
                    format_number(cost.total_tokens()),
                    unpriced_suffix(cost.unpriced_calls)
                );
            }
            return;
        }

        for (model, cost) in node.ranked_models() {
            let pct = percent(cost.cost_usd, total);
            let label = format!("{}  └─ {}", "  ".repeat(depth), model);
            let _ = writeln!(
                out,
                "{:<40} {:>10}  {}  {:>3.0}%  [{} tokens]{}",
                label,
                format_cost(cost.cost_usd),
                bar(pct, self.bar_width),
                pct,
                format_number(cost.total_tokens()),
                unpriced_suffix(cost.unpriced_calls)
            );
        }
    }
}

impl ReportRenderer for TextRenderer {
    fn render(&self, report: &Report) -> Result<String, CoreError> {
        let stats = &report.stats;
        if stats.is_empty() {
            return Ok(format!("costscope [{}]: no LLM calls recorded.\n", stats.session_name));
        }

        let mut out = String::new();
        let total = report.tree.total_cost();
        let _ = writeln!(
            out,
            "costscope cost report [{}]: total {}  ({} tokens, {} call{})",
            stats.session_name,
            stats.cost_display(),
            format_number(stats.total_tokens),
            stats.total_calls,
            plural(stats.total_calls)
        );
        let _ = writeln!(out, "{}", "─".repeat(78));

        let root = &report.tree.root;
        if root.self_calls > 0 {
            let pct = percent(root.self_cost_usd, total);
            let _ = writeln!(
                out,
                "{:<40} {:>10}  {}  {:>3.0}%  ({} call{})",
                format!("  {}", UNATTRIBUTED),
                format_cost(root.self_cost_usd),
                bar(pct, self.bar_width),
                pct,
                root.self_calls,
                plural(root.self_calls)
            );
            self.render_models(&mut out, root, 1, total);
        }
        for child in root.ranked_children() {
            self.render_node(&mut out, child, 0, total);
        }

        if stats.unpriced_calls > 0 || stats.malformed_calls > 0 {
            let _ = writeln!(
                out,
                "\n  {} unpriced, {} malformed call(s) recorded at $0",
                stats.unpriced_calls, stats.malformed_calls
            );
        }

        if self.show_hints && !report.hints.is_empty() {
            let _ = writeln!(out, "\nOptimization hints:");
            for hint in &report.hints {
                let _ = writeln!(out, "  {}", hint);
            }
        }

        Ok(out)
    }
}

/// Pretty JSON of the whole [`Report`]
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
    pub compact: bool,
}

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: &Report) -> Result<String, CoreError> {
        let rendered = if self.compact {
            serde_json::to_string(report)
        } else {
            serde_json::to_string_pretty(report)
        };
        rendered.map_err(|source| CoreError::JsonSerialize {
            what: "report",
            source,
        })
    }
}

/// `$0.0070` style, four decimals
pub fn format_cost(usd: f64) -> String {
    format!("${:.4}", usd)
}

/// Format large numbers (K, M, B)
pub fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

fn bar(pct: f64, width: usize) -> String {
    let filled = ((pct / 100.0 * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn unpriced_suffix(unpriced: u64) -> &'static str {
    if unpriced > 0 {
        " (unpriced)"
    } else {
        ""
    }
}
