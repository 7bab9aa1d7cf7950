//! Optimization hints
//!
//! Rule-based suggestions derived from a [`CostTree`]. Each rule looks at one
//! "leaf": a (scope node, model) pair at the node's self level. Rules are
//! independent; one leaf can produce several hints.
//!
//! - Cheaper model (high): a materially cheaper same-class model exists and
//!   the leaf's share of session cost exceeds `cost_share_threshold`
//! - Oversized context (medium): mean input tokens above `max_mean_input_tokens`
//! - Verbose output (low): mean output tokens above `max_mean_output_tokens`
//!
//! Hints are advisory. They never touch recorded data.

use crate::aggregate::{CostNode, CostTree, ModelCost};
use crate::models::ScopePath;
use crate::pricing::PricingResolver;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Hint severity, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::High => "🔴",
            Severity::Medium => "🟡",
            Severity::Low => "🟢",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which rule produced a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    CheaperModel,
    OversizedContext,
    VerboseOutput,
    ShortOutput,
}

/// One actionable suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hint {
    pub kind: HintKind,
    pub severity: Severity,
    pub scope_path: ScopePath,
    pub model: String,
    pub message: String,
    /// Only set by rules that can price their suggestion
    pub estimated_monthly_savings_usd: Option<f64>,
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]: {}",
            self.severity.icon(),
            self.scope_path,
            self.model,
            self.message
        )?;
        if let Some(savings) = self.estimated_monthly_savings_usd {
            write!(f, " (~${:.2}/month)", savings)?;
        }
        Ok(())
    }
}

/// Hint rule thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HintConfig {
    /// Minimum leaf share of session cost for the cheaper-model rule, in (0, 1]
    pub cost_share_threshold: f64,
    /// Alternative must save at least this fraction of the leaf cost, in (0, 1]
    pub material_savings_fraction: f64,
    pub max_mean_input_tokens: u64,
    pub max_mean_output_tokens: u64,
    /// Below this mean output a leaf looks like classification or extraction
    pub min_mean_output_tokens: u64,
    /// Lower bound for the sampling window used in monthly extrapolation
    pub min_sampling_window_secs: u64,
    pub monthly_window_days: u32,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            cost_share_threshold: 0.10,
            material_savings_fraction: 0.10,
            max_mean_input_tokens: 4_000,
            max_mean_output_tokens: 2_000,
            min_mean_output_tokens: 200,
            min_sampling_window_secs: 60,
            monthly_window_days: 30,
        }
    }
}

impl HintConfig {
    /// Factor turning savings observed over `window_secs` into a monthly figure
    pub fn monthly_factor(&self, window_secs: f64) -> f64 {
        let floor = self.min_sampling_window_secs.max(1) as f64;
        let window = if window_secs.is_finite() {
            window_secs.max(floor)
        } else {
            floor
        };
        self.monthly_window_days as f64 * SECONDS_PER_DAY / window
    }
}

/// Generate hints for a cost tree
///
/// `window_secs` is the wall-clock span the tree was sampled over.
/// Output is sorted by severity, then by estimated savings (largest first),
/// then by scope path and model for reproducibility.
pub fn generate_hints(
    tree: &CostTree,
    pricing: &dyn PricingResolver,
    config: &HintConfig,
    window_secs: f64,
) -> Vec<Hint> {
    let mut hints = Vec::new();
    let total_cost = tree.total_cost();
    let monthly_factor = config.monthly_factor(window_secs);

    tree.root.visit(&mut |node| {
        for (model, leaf) in &node.models {
            if let Some(hint) =
                cheaper_model_hint(node, model, leaf, total_cost, pricing, config, monthly_factor)
            {
                hints.push(hint);
            }

            let mean_input = leaf.mean_input_tokens();
            if mean_input > config.max_mean_input_tokens as f64 {
                hints.push(Hint {
                    kind: HintKind::OversizedContext,
                    severity: Severity::Medium,
                    scope_path: node.path.clone(),
                    model: model.clone(),
                    message: format!(
                        "Average input is {:.0} tokens. Trim context, summarize history, or limit retrieval chunks.",
                        mean_input
                    ),
                    estimated_monthly_savings_usd: None,
                });
            }

            let mean_output = leaf.mean_output_tokens();
            if mean_output > config.max_mean_output_tokens as f64 {
                hints.push(Hint {
                    kind: HintKind::VerboseOutput,
                    severity: Severity::Low,
                    scope_path: node.path.clone(),
                    model: model.clone(),
                    message: format!(
                        "Average output is {:.0} tokens. Ask for concise answers or lower max_tokens.",
                        mean_output
                    ),
                    estimated_monthly_savings_usd: None,
                });
            }

            if let Some(hint) = short_output_hint(node, model, leaf, pricing, config) {
                hints.push(hint);
            }
        }
    });

    hints.sort_by(compare_hints);
    hints
}

fn cheaper_model_hint(
    node: &CostNode,
    model: &str,
    leaf: &ModelCost,
    total_cost: f64,
    pricing: &dyn PricingResolver,
    config: &HintConfig,
    monthly_factor: f64,
) -> Option<Hint> {
    if total_cost <= 0.0 || leaf.cost_usd <= 0.0 {
        return None;
    }
    let share = leaf.cost_usd / total_cost;
    if share <= config.cost_share_threshold {
        return None;
    }

    let alternative = pricing.cheaper_alternative(model)?;
    let alt_cost = pricing
        .price_for(&alternative)?
        .cost(leaf.input_tokens, leaf.output_tokens);
    let ratio = alt_cost / leaf.cost_usd;
    if !ratio.is_finite() || ratio > 1.0 - config.material_savings_fraction {
        return None;
    }

    let savings = leaf.cost_usd * (1.0 - ratio);
    Some(Hint {
        kind: HintKind::CheaperModel,
        severity: Severity::High,
        scope_path: node.path.clone(),
        model: model.to_string(),
        message: format!(
            "Switch to {} ({:.0}% cheaper on this workload, {:.0}% of session cost)",
            alternative,
            (1.0 - ratio) * 100.0,
            share * 100.0
        ),
        estimated_monthly_savings_usd: Some(savings * monthly_factor),
    })
}

/// Expensive model on a cheap task: short answers with a cheaper option
fn short_output_hint(
    node: &CostNode,
    model: &str,
    leaf: &ModelCost,
    pricing: &dyn PricingResolver,
    config: &HintConfig,
) -> Option<Hint> {
    let mean_output = leaf.mean_output_tokens();
    if leaf.calls == 0 || mean_output >= config.min_mean_output_tokens as f64 {
        return None;
    }
    let alternative = pricing.cheaper_alternative(model)?;
    Some(Hint {
        kind: HintKind::ShortOutput,
        severity: Severity::Low,
        scope_path: node.path.clone(),
        model: model.to_string(),
        message: format!(
            "Short output ({:.0} tokens avg). {} is likely enough for classification or extraction.",
            mean_output, alternative
        ),
        estimated_monthly_savings_usd: None,
    })
}

fn compare_hints(a: &Hint, b: &Hint) -> Ordering {
    let savings = |h: &Hint| h.estimated_monthly_savings_usd.unwrap_or(0.0);
    a.severity
        .cmp(&b.severity)
        .then_with(|| {
            savings(b)
                .partial_cmp(&savings(a))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.scope_path.cmp(&b.scope_path))
        .then_with(|| a.model.cmp(&b.model))
        .then_with(|| a.message.cmp(&b.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::{CallRecord, RecordFlags};
    use crate::pricing::{embedded, StaticPricing};
    use chrono::Utc;

    fn priced(path: &[&str], model: &str, input: u64, output: u64) -> CallRecord {
        CallRecord {
            seq: 0,
            scope_path: ScopePath::from(path),
            model: model.to_string(),
            provider: None,
            input_tokens: input,
            output_tokens: output,
            cost_usd: embedded::calculate_cost(model, input, output).unwrap_or(0.0),
            timestamp: Utc::now(),
            duration_seconds: 1.0,
            flags: RecordFlags::default(),
        }
    }

    #[test]
    fn test_empty_tree_has_no_hints() {
        let tree = aggregate(&Vec::<CallRecord>::new());
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);
        assert!(hints.is_empty());
    }

    #[test]
    fn test_cheaper_model_fires_above_threshold() {
        let records = vec![priced(&["summarize"], "gpt-4o", 1_000, 200)];
        let tree = aggregate(&records);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 3_600.0);

        let hint = hints
            .iter()
            .find(|h| h.kind == HintKind::CheaperModel)
            .unwrap();
        assert_eq!(hint.severity, Severity::High);
        assert_eq!(hint.model, "gpt-4o");
        assert!(hint.message.contains("gpt-4o-mini"));

        // gpt-4o-mini is 6% of gpt-4o on both sides: savings = 94% of cost
        let cost = records[0].cost_usd;
        let expected = cost * 0.94 * (30.0 * 86_400.0 / 3_600.0);
        let savings = hint.estimated_monthly_savings_usd.unwrap();
        assert!((savings - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn test_cheaper_model_silent_below_threshold() {
        let mut records = vec![priced(&["small"], "gpt-4o", 100, 10)];
        // An expensive leaf with no alternative dominates the session
        for _ in 0..10 {
            records.push(priced(&["big"], "o3-mini", 100_000, 10_000));
        }
        let tree = aggregate(&records);
        let share = tree.find(&ScopePath::new(["small"])).unwrap().self_cost_usd / tree.total_cost();
        assert!(share < 0.10);

        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);
        assert!(hints
            .iter()
            .all(|h| !(h.kind == HintKind::CheaperModel && h.model == "gpt-4o")));
    }

    #[test]
    fn test_alternative_must_be_materially_cheaper() {
        let pricing = StaticPricing::new()
            .with_override("house-large", crate::pricing::ModelPricing::new(1.0, 1.0))
            .with_override("house-small", crate::pricing::ModelPricing::new(0.95, 0.95))
            .with_alternative("house-large", "house-small");
        let mut record = priced(&["x"], "house-large", 10_000, 0);
        record.cost_usd = 0.01;
        let tree = aggregate(&[record]);

        let hints = generate_hints(&tree, &pricing, &HintConfig::default(), 60.0);
        assert!(hints.iter().all(|h| h.kind != HintKind::CheaperModel));
    }

    #[test]
    fn test_oversized_context_independent_of_cheaper_model() {
        // o3-mini has no alternative; only the context rule applies
        let records = vec![priced(&["rag"], "o3-mini", 9_000, 100)];
        let tree = aggregate(&records);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);

        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].kind, HintKind::OversizedContext);
        assert_eq!(hints[0].severity, Severity::Medium);
        assert!(hints[0].estimated_monthly_savings_usd.is_none());
    }

    #[test]
    fn test_oversized_context_fires_for_unpriced_model() {
        let mut record = priced(&["rag"], "in-house", 20_000, 10);
        record.flags.unpriced = true;
        let tree = aggregate(&[record]);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].kind, HintKind::OversizedContext);
    }

    #[test]
    fn test_verbose_output_is_low() {
        let records = vec![priced(&["write"], "o3-mini", 100, 5_000)];
        let tree = aggregate(&records);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].severity, Severity::Low);
    }

    #[test]
    fn test_short_output_suggests_alternative() {
        let records = vec![
            priced(&["classify"], "claude-sonnet-4-6", 800, 40),
            priced(&["classify"], "claude-sonnet-4-6", 900, 60),
        ];
        let tree = aggregate(&records);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);

        let hint = hints
            .iter()
            .find(|h| h.kind == HintKind::ShortOutput)
            .unwrap();
        assert_eq!(hint.severity, Severity::Low);
        assert_eq!(hint.scope_path, ScopePath::new(["classify"]));
        assert!(hint.message.contains("50 tokens avg"));
        assert!(hint.message.contains("claude-haiku-4-5"));
        assert!(hint.estimated_monthly_savings_usd.is_none());
    }

    #[test]
    fn test_short_output_needs_alternative_and_short_answers() {
        let config = HintConfig::default();
        // No cheaper option for o3-mini
        let tree = aggregate(&[priced(&["a"], "o3-mini", 500, 20)]);
        let hints = generate_hints(&tree, &StaticPricing::new(), &config, 60.0);
        assert!(hints.iter().all(|h| h.kind != HintKind::ShortOutput));

        // Exactly at the threshold does not count as short
        let tree = aggregate(&[priced(&["b"], "gpt-4o", 500, 200)]);
        let hints = generate_hints(&tree, &StaticPricing::new(), &config, 60.0);
        assert!(hints.iter().all(|h| h.kind != HintKind::ShortOutput));
    }

    #[test]
    fn test_ordering_severity_then_savings() {
        let records = vec![
            priced(&["a"], "gpt-4o", 12_000, 400),
            priced(&["b"], "claude-opus-4-6", 1_000, 3_000),
            priced(&["c"], "o3-mini", 100, 4_000),
        ];
        let tree = aggregate(&records);
        let hints = generate_hints(&tree, &StaticPricing::new(), &HintConfig::default(), 60.0);

        assert!(hints.windows(2).all(|w| w[0].severity <= w[1].severity));
        let high: Vec<&Hint> = hints.iter().filter(|h| h.severity == Severity::High).collect();
        assert!(high.len() >= 2);
        assert!(high.windows(2).all(|w| {
            w[0].estimated_monthly_savings_usd >= w[1].estimated_monthly_savings_usd
        }));
    }

    #[test]
    fn test_monthly_factor_floors_window() {
        let config = HintConfig::default();
        assert_eq!(config.monthly_factor(1.0), config.monthly_factor(60.0));
        assert_eq!(config.monthly_factor(f64::NAN), config.monthly_factor(60.0));
        assert!((config.monthly_factor(86_400.0) - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_display_includes_savings() {
        let hint = Hint {
            kind: HintKind::CheaperModel,
            severity: Severity::High,
            scope_path: ScopePath::new(["a"]),
            model: "gpt-4o".into(),
            message: "Switch".into(),
            estimated_monthly_savings_usd: Some(12.5),
        };
        assert_eq!(hint.to_string(), "🔴 a [gpt-4o]: Switch (~$12.50/month)");
    }
}
