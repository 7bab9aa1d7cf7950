//! Error types for costscope-core
//!
//! Telemetry-path failures (pricing, malformed usage) never escape the record
//! path: they become [`Diagnostic`] entries instead. Only scope-stack contract
//! violations are surfaced to callers.

use std::collections::VecDeque;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for costscope operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===================
    // Parse Errors
    // ===================
    #[error("Failed to parse config in {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        message: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    JsonSerialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // ===================
    // Telemetry Errors (absorbed on the record path)
    // ===================
    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Malformed usage event: {reason}")]
    MalformedUsageEvent { reason: String },

    // ===================
    // Contract Errors
    // ===================
    #[error("Unbalanced scope stack: expected '{expected}' at depth {depth}, found {found}")]
    UnbalancedScopeStack {
        expected: String,
        depth: usize,
        found: String,
    },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Severity level for internal diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Record kept, data degraded (e.g. unpriced)
    Warning,
    /// Input was unusable and was replaced by a placeholder
    Error,
}

/// A single diagnostic produced while absorbing a telemetry failure
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
    /// Actionable suggestion for the user (optional)
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
            suggestion: None,
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
            suggestion: None,
        }
    }

    /// Add an actionable suggestion to this diagnostic
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Build a user-facing diagnostic from an absorbed error
    pub fn from_core_error(source: impl Into<String>, error: &CoreError) -> Self {
        let source = source.into();
        match error {
            CoreError::UnknownModel { model } => Self::warning(
                source,
                format!("No price known for model '{}'; recorded as unpriced", model),
            )
            .with_suggestion("Add a price override with StaticPricing::with_override"),
            CoreError::MalformedUsageEvent { reason } => Self::error(
                source,
                format!("Usage event rejected ({}); recorded as zero-cost", reason),
            ),
            other => Self::error(source, other.to_string()),
        }
    }
}

/// Bounded log of diagnostics, oldest entries evicted first
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    dropped: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.iter().cloned().collect()
    }

    /// Number of diagnostics evicted because the log was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    /// Returns count by severity (warnings, errors)
    pub fn error_count(&self) -> (usize, usize) {
        let warnings = self
            .entries
            .iter()
            .filter(|d| d.severity == ErrorSeverity::Warning)
            .count();
        (warnings, self.entries.len() - warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_log_severity_counting() {
        let mut log = DiagnosticLog::new(10);
        log.push(Diagnostic::warning("recorder", "unpriced"));
        log.push(Diagnostic::error("recorder", "malformed"));
        log.push(Diagnostic::warning("recorder", "unpriced again"));

        assert_eq!(log.error_count(), (2, 1));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_diagnostic_log_evicts_oldest() {
        let mut log = DiagnosticLog::new(2);
        log.push(Diagnostic::warning("a", "1"));
        log.push(Diagnostic::warning("b", "2"));
        log.push(Diagnostic::warning("c", "3"));

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "b");
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_unknown_model_diagnostic_has_suggestion() {
        let err = CoreError::UnknownModel {
            model: "mystery-1".to_string(),
        };
        let diag = Diagnostic::from_core_error("recorder", &err);
        assert_eq!(diag.severity, ErrorSeverity::Warning);
        assert!(diag.message.contains("mystery-1"));
        assert!(diag.suggestion.is_some());
    }
}
