//! Resolved call records

use super::ScopePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Markers for records whose cost could not be resolved normally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFlags {
    /// Model missing from the pricing table; cost recorded as zero
    #[serde(default)]
    pub unpriced: bool,
    /// Usage event failed validation; cost recorded as zero
    #[serde(default)]
    pub malformed: bool,
}

impl RecordFlags {
    pub fn is_clean(&self) -> bool {
        !self.unpriced && !self.malformed
    }

    /// Short label for tables ("unpriced", "malformed", "")
    pub fn label(&self) -> &'static str {
        match (self.unpriced, self.malformed) {
            (_, true) => "malformed",
            (true, false) => "unpriced",
            (false, false) => "",
        }
    }
}

/// One metered call attributed to a scope path. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Append order within the session, starting at 1
    pub seq: u64,
    pub scope_path: ScopePath,
    pub model: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub flags: RecordFlags,
}

impl CallRecord {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn is_unattributed(&self) -> bool {
        self.scope_path.is_unattributed()
    }
}
