//! Recorder: turns usage events into priced call records
//!
//! Resolution never fails. Unknown models and malformed events degrade to a
//! zero-cost record with a flag plus a [`Diagnostic`].

use crate::error::{CoreError, Diagnostic};
use crate::models::{CallRecord, RecordFlags, ScopePath, UsageEvent};
use crate::pricing::PricingResolver;
use std::sync::Arc;
use tracing::warn;

/// Output of [`Recorder::resolve`]
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Record with `seq` still unset (0); the session assigns it on append
    pub record: CallRecord,
    pub diagnostic: Option<Diagnostic>,
}

/// Prices usage events against a [`PricingResolver`]
#[derive(Clone)]
pub struct Recorder {
    pricing: Arc<dyn PricingResolver>,
}

impl Recorder {
    pub fn new(pricing: Arc<dyn PricingResolver>) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> &Arc<dyn PricingResolver> {
        &self.pricing
    }

    /// Price `event` and attribute it to `scope_path`
    ///
    /// `scope_path` must be a snapshot taken when the call completed.
    pub fn resolve(&self, event: UsageEvent, scope_path: ScopePath) -> Resolved {
        let mut flags = RecordFlags::default();
        let mut failure = None;

        let cost_usd = match event.validate() {
            Err(e) => {
                flags.malformed = true;
                failure = Some(e);
                0.0
            }
            Ok(()) => match self.pricing.price_for(&event.model) {
                Some(pricing) => {
                    let cost = pricing.cost(event.input_tokens, event.output_tokens);
                    if cost.is_finite() && cost >= 0.0 {
                        cost
                    } else {
                        flags.malformed = true;
                        failure = Some(CoreError::MalformedUsageEvent {
                            reason: format!("pricing for '{}' produced cost {}", event.model, cost),
                        });
                        0.0
                    }
                }
                None => {
                    flags.unpriced = true;
                    failure = Some(CoreError::UnknownModel {
                        model: event.model.clone(),
                    });
                    0.0
                }
            },
        };

        let diagnostic = failure.map(|e| {
            warn!(
                model = %event.model,
                scope = %scope_path,
                error = %e,
                "call recorded with degraded cost"
            );
            Diagnostic::from_core_error("recorder", &e)
        });

        let duration_seconds = if event.duration_seconds.is_finite() && event.duration_seconds >= 0.0 {
            event.duration_seconds
        } else {
            0.0
        };

        let record = CallRecord {
            seq: 0,
            scope_path,
            model: event.model,
            provider: event.provider,
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            cost_usd,
            timestamp: event.timestamp,
            duration_seconds,
            flags,
        };

        Resolved { record, diagnostic }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder").finish_non_exhaustive()
    }
}
