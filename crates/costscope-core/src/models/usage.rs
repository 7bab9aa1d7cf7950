//! Usage events produced by the interception layer

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable usage report for one completed metered call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Vendor tag supplied by the interceptor ("openai", "anthropic", ...)
    #[serde(default)]
    pub provider: Option<String>,
}

impl UsageEvent {
    /// Event stamped now with zero duration
    pub fn new(model: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            timestamp: Utc::now(),
            duration_seconds: 0.0,
            provider: None,
        }
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Check the fields the recorder relies on
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.model.trim().is_empty() {
            return Err(CoreError::MalformedUsageEvent {
                reason: "empty model name".to_string(),
            });
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(CoreError::MalformedUsageEvent {
                reason: format!("invalid duration {}", self.duration_seconds),
            });
        }
        Ok(())
    }
}
