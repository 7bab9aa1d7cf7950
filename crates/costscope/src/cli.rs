//! CLI output formatting and command helpers
//!
//! Everything here returns strings so handlers in `main.rs` stay thin and
//! formatting can be tested without a terminal.

use costscope_core::pricing::embedded;
use costscope_core::report::{format_cost, format_number};
use costscope_core::{scope, Hint, ModelPricing, PricingResolver, Session, Stats, UsageEvent};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use std::collections::BTreeMap;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    UnknownModel {
        model: String,
        suggestions: Vec<String>,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::UnknownModel { model, suggestions } => {
                write!(f, "No price known for model '{}'", model)?;
                if !suggestions.is_empty() {
                    write!(f, "\nDid you mean: {}", suggestions.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CliError {}

// ============================================================================
// Tables
// ============================================================================

fn header(table: &mut Table, columns: &[&str], no_color: bool) {
    if no_color {
        table.set_header(columns.to_vec());
    } else {
        table.set_header(
            columns
                .iter()
                .map(|c| Cell::new(*c).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
}

fn share(part: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", part / total * 100.0)
    } else {
        "-".to_string()
    }
}

/// Rows of a cost map, most expensive first
fn ranked(map: &BTreeMap<String, f64>) -> Vec<(&String, f64)> {
    let mut rows: Vec<(&String, f64)> = map.iter().map(|(k, v)| (k, *v)).collect();
    rows.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    rows
}

/// Summary plus per-scope and per-model tables (or JSON)
pub fn format_stats(stats: &Stats, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string());
    }

    if stats.is_empty() {
        return "No LLM calls recorded.".to_string();
    }

    let mut lines = vec![
        format!("Session:          {}", stats.session_name),
        format!("Total Cost:       {}", stats.cost_display()),
        format!("Calls:            {}", stats.total_calls),
        format!(
            "Tokens:           {} (in: {}, out: {})",
            format_number(stats.total_tokens),
            format_number(stats.input_tokens),
            format_number(stats.output_tokens)
        ),
    ];
    if stats.unpriced_calls > 0 {
        lines.push(format!("Unpriced Calls:   {}", stats.unpriced_calls));
    }
    lines.push(String::new());

    for (title, map) in [("Scope", &stats.cost_by_scope), ("Model", &stats.cost_by_model)] {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        header(&mut table, &[title, "Cost", "Share"], no_color);
        for (name, cost) in ranked(map) {
            table.add_row(Row::from(vec![
                name.clone(),
                format_cost(cost),
                share(cost, stats.total_cost_usd),
            ]));
        }
        lines.push(table.to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Hint table (or JSON)
pub fn format_hints(hints: &[Hint], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(hints).unwrap_or_else(|_| "[]".to_string());
    }

    if hints.is_empty() {
        return "No optimization hints.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    header(
        &mut table,
        &["Severity", "Scope", "Model", "Suggestion", "Savings/mo"],
        no_color,
    );

    for hint in hints {
        let savings = hint
            .estimated_monthly_savings_usd
            .map(|s| format!("${:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        let severity = if no_color {
            Cell::new(hint.severity.label())
        } else {
            let color = match hint.severity {
                costscope_core::Severity::High => Color::Red,
                costscope_core::Severity::Medium => Color::Yellow,
                costscope_core::Severity::Low => Color::Green,
            };
            Cell::new(hint.severity.label()).fg(color)
        };

        table.add_row(Row::from(vec![
            severity,
            Cell::new(hint.scope_path.to_string()),
            Cell::new(&hint.model),
            Cell::new(&hint.message),
            Cell::new(savings),
        ]));
    }

    table.to_string()
}

// ============================================================================
// Pricing
// ============================================================================

/// Known models sharing the query's family prefix (text before the first '-')
pub fn suggest_models(query: &str) -> Vec<String> {
    let query = query.trim().to_lowercase();
    let family = query.split('-').next().unwrap_or("");
    if family.is_empty() {
        return Vec::new();
    }
    embedded::list_models()
        .into_iter()
        .filter(|m| m.starts_with(family))
        .map(str::to_string)
        .collect()
}

pub fn lookup_price(
    pricing: &dyn PricingResolver,
    model: &str,
) -> Result<ModelPricing, CliError> {
    pricing.price_for(model).ok_or_else(|| CliError::UnknownModel {
        model: model.to_string(),
        suggestions: suggest_models(model),
    })
}

/// Price sheet for one model, with the cost of a sample call and its
/// cheaper alternative when one exists
pub fn format_price(
    pricing: &dyn PricingResolver,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> Result<String, CliError> {
    let price = lookup_price(pricing, model)?;
    let mut lines = vec![
        format!("Model:            {}", model),
        format!("Input:            ${:.4} / 1M tokens", price.input_price_per_million),
        format!("Output:           ${:.4} / 1M tokens", price.output_price_per_million),
        format!(
            "Sample call:      {} ({} in / {} out)",
            format_cost(price.cost(input_tokens, output_tokens)),
            format_number(input_tokens),
            format_number(output_tokens)
        ),
    ];

    if let Some(alternative) = pricing.cheaper_alternative(model) {
        if let Some(alt_price) = pricing.price_for(&alternative) {
            lines.push(format!(
                "Cheaper option:   {} at {} for the same call",
                alternative,
                format_cost(alt_price.cost(input_tokens, output_tokens))
            ));
        }
    }

    Ok(lines.join("\n"))
}

/// Table of every built-in model price
pub fn format_price_list(no_color: bool) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    header(&mut table, &["Model", "Input $/M", "Output $/M"], no_color);
    for model in embedded::list_models() {
        if let Some(price) = embedded::lookup(model) {
            table.add_row(Row::from(vec![
                model.to_string(),
                format!("{:.4}", price.input_price_per_million),
                format!("{:.4}", price.output_price_per_million),
            ]));
        }
    }
    table.to_string()
}

// ============================================================================
// Demo
// ============================================================================

/// Simulated research agent: research → summarize → report
///
/// Token counts stand in for real provider responses.
pub async fn run_demo_pipeline(session: &Session) {
    scope::in_scope("research_agent", async {
        scope::in_scope("research", async {
            for query in 0..3u64 {
                scope::in_scope("web_search", async {
                    session.record_current(
                        UsageEvent::new("gpt-4o", 6_500 + query * 900, 350)
                            .with_duration(1.8)
                            .with_provider("openai"),
                    );
                })
                .await;
            }
        })
        .await;

        scope::in_scope("summarize", async {
            session.record_current(
                UsageEvent::new("claude-sonnet-4-6", 9_000, 1_200)
                    .with_duration(4.2)
                    .with_provider("anthropic"),
            );
        })
        .await;

        scope::in_scope("report", async {
            session.record_current(
                UsageEvent::new("gpt-4o-mini", 1_500, 2_600)
                    .with_duration(2.5)
                    .with_provider("openai"),
            );
        })
        .await;
    })
    .await;

    // One stray call outside any scope
    session.record_current(UsageEvent::new("gemini-2.0-flash", 400, 60).with_provider("google"));
}
