//! Built-in pricing table for hosted text-generation models
//!
//! Prices are USD per million tokens, input and output billed separately.
//!
//! # Examples
//!
//! ```
//! use costscope_core::pricing::embedded::{calculate_cost, lookup};
//!
//! // gpt-4o: 12K input + 400 output = $0.03 + $0.004
//! let cost = calculate_cost("gpt-4o", 12_000, 400).unwrap();
//! assert!((cost - 0.034).abs() < 1e-9);
//!
//! // Versioned names resolve to their base entry
//! assert_eq!(lookup("gpt-4o-2024-05-13").unwrap().input_price_per_million, 2.5);
//!
//! // Unknown models have no price
//! assert!(lookup("unknown-model").is_none());
//! ```

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pricing structure for a model
///
/// All prices are per million tokens (M).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per million input tokens ($/M)
    pub input_price_per_million: f64,
    /// Price per million output tokens ($/M)
    pub output_price_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_price_per_million: f64, output_price_per_million: f64) -> Self {
        Self {
            input_price_per_million,
            output_price_per_million,
        }
    }

    /// (input, output) price per single token
    pub fn per_token(&self) -> (f64, f64) {
        (
            self.input_price_per_million / 1_000_000.0,
            self.output_price_per_million / 1_000_000.0,
        )
    }

    /// Cost in USD for the given token counts
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input_price, output_price) = self.per_token();
        input_tokens as f64 * input_price + output_tokens as f64 * output_price
    }
}

/// Official list prices (February 2026)
static PRICING_TABLE: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Anthropic - Claude 4.x
    m.insert("claude-opus-4-6", ModelPricing::new(15.0, 75.0));
    m.insert("claude-opus-4-5", ModelPricing::new(15.0, 75.0));
    m.insert("claude-sonnet-4-6", ModelPricing::new(3.0, 15.0));
    m.insert("claude-sonnet-4-5", ModelPricing::new(3.0, 15.0));
    m.insert("claude-haiku-4-5", ModelPricing::new(0.80, 4.0));

    // Anthropic - Claude 3.x (legacy)
    m.insert("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0));
    m.insert("claude-3-5-haiku", ModelPricing::new(0.80, 4.0));
    m.insert("claude-3-opus", ModelPricing::new(15.0, 75.0));
    m.insert("claude-3-sonnet", ModelPricing::new(3.0, 15.0));
    m.insert("claude-3-haiku", ModelPricing::new(0.25, 1.25));

    // OpenAI - GPT-4o family
    m.insert("gpt-4o", ModelPricing::new(2.50, 10.0));
    m.insert("gpt-4o-mini", ModelPricing::new(0.15, 0.60));

    // OpenAI - o-series reasoning
    m.insert("o1", ModelPricing::new(15.0, 60.0));
    m.insert("o1-mini", ModelPricing::new(3.0, 12.0));
    m.insert("o3-mini", ModelPricing::new(1.10, 4.40));

    // OpenAI - legacy
    m.insert("gpt-4-turbo", ModelPricing::new(10.0, 30.0));
    m.insert("gpt-4", ModelPricing::new(30.0, 60.0));
    m.insert("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50));

    // Google - Gemini
    m.insert("gemini-1.5-pro", ModelPricing::new(1.25, 5.0));
    m.insert("gemini-1.5-flash", ModelPricing::new(0.075, 0.30));
    m.insert("gemini-1.5-flash-8b", ModelPricing::new(0.0375, 0.15));
    m.insert("gemini-2.0-flash", ModelPricing::new(0.10, 0.40));
    m.insert("gemini-2.0-flash-exp", ModelPricing::new(0.075, 0.30));

    // Meta - Llama (via API providers, approximate)
    m.insert("llama-3.1-70b-instruct", ModelPricing::new(0.88, 0.88));
    m.insert("llama-3.1-8b-instruct", ModelPricing::new(0.20, 0.20));

    // Mistral
    m.insert("mistral-large-latest", ModelPricing::new(2.0, 6.0));
    m.insert("mistral-small-latest", ModelPricing::new(0.20, 0.60));

    m
});

/// Same-capability-class downgrades used by the cheaper-model hint
static CHEAPER_ALTERNATIVES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("claude-opus-4-6", "claude-sonnet-4-6"),
        ("claude-opus-4-5", "claude-sonnet-4-5"),
        ("claude-sonnet-4-6", "claude-haiku-4-5"),
        ("claude-sonnet-4-5", "claude-haiku-4-5"),
        ("claude-3-5-sonnet", "claude-3-5-haiku"),
        ("claude-3-opus", "claude-3-sonnet"),
        ("gpt-4o", "gpt-4o-mini"),
        ("gpt-4-turbo", "gpt-4o"),
        ("gpt-4", "gpt-4o"),
        ("o1", "o3-mini"),
        ("gemini-1.5-pro", "gemini-1.5-flash"),
    ])
});

/// Resolve a model name to its table key
///
/// Case-insensitive. Exact match first, then the longest key that prefixes the
/// name at a `-` boundary, so `gpt-4o-mini-2024-07-18` resolves to
/// `gpt-4o-mini` and never to `gpt-4o`.
pub fn canonical_name(model: &str) -> Option<&'static str> {
    let model = model.trim().to_lowercase();
    if let Some((key, _)) = PRICING_TABLE.get_key_value(model.as_str()) {
        return Some(*key);
    }

    PRICING_TABLE
        .keys()
        .filter(|key| {
            model.len() > key.len()
                && model.starts_with(*key)
                && model.as_bytes()[key.len()] == b'-'
        })
        .max_by_key(|key| key.len())
        .copied()
}

/// Get pricing for a model, `None` when unknown
pub fn lookup(model: &str) -> Option<ModelPricing> {
    canonical_name(model).and_then(|key| PRICING_TABLE.get(key).copied())
}

/// Known cheaper same-class model, if any
pub fn cheaper_alternative(model: &str) -> Option<&'static str> {
    canonical_name(model).and_then(|key| CHEAPER_ALTERNATIVES.get(key).copied())
}

/// Calculate cost for token usage with a specific model
///
/// ```text
/// Input cost = (input / 1M) × input_price
/// Output cost = (output / 1M) × output_price
/// ```
///
/// Returns `None` when the model is not in the table.
pub fn calculate_cost(model: &str, input: u64, output: u64) -> Option<f64> {
    lookup(model).map(|pricing| pricing.cost(input, output))
}

/// Sorted list of all known model names
pub fn list_models() -> Vec<&'static str> {
    let mut models: Vec<_> = PRICING_TABLE.keys().copied().collect();
    models.sort_unstable();
    models
}
