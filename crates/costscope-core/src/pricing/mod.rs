//! Pricing resolution for metered calls
//!
//! The recorder only depends on the [`PricingResolver`] trait. [`StaticPricing`]
//! is the default resolver: the embedded table plus caller-supplied overrides.

pub mod embedded;

pub use embedded::{list_models, ModelPricing};
use std::collections::HashMap;

/// Maps a model name to its per-token prices
///
/// Implementations must be pure lookups: no I/O, no blocking.
pub trait PricingResolver: Send + Sync {
    /// Prices for `model`, `None` when the model is unknown
    fn price_for(&self, model: &str) -> Option<ModelPricing>;

    /// A materially cheaper model in the same capability class
    fn cheaper_alternative(&self, _model: &str) -> Option<String> {
        None
    }
}

/// Embedded table with optional per-model overrides
#[derive(Debug, Clone, Default)]
pub struct StaticPricing {
    overrides: HashMap<String, ModelPricing>,
    alternatives: HashMap<String, String>,
}

impl StaticPricing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override (or add) prices for one model. Names are matched case-insensitively.
    pub fn with_override(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.overrides
            .insert(model.into().trim().to_lowercase(), pricing);
        self
    }

    /// Override (or add) the cheaper alternative for one model
    pub fn with_alternative(mut self, model: impl Into<String>, cheaper: impl Into<String>) -> Self {
        self.alternatives
            .insert(model.into().trim().to_lowercase(), cheaper.into());
        self
    }
}

impl PricingResolver for StaticPricing {
    fn price_for(&self, model: &str) -> Option<ModelPricing> {
        let key = model.trim().to_lowercase();
        self.overrides
            .get(&key)
            .copied()
            .or_else(|| embedded::lookup(&key))
    }

    fn cheaper_alternative(&self, model: &str) -> Option<String> {
        let key = model.trim().to_lowercase();
        self.alternatives
            .get(&key)
            .cloned()
            .or_else(|| embedded::cheaper_alternative(&key).map(str::to_string))
    }
}
