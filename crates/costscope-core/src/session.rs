//! Profiling session
//!
//! A [`Session`] owns the append-only call record log. It is cheap to clone
//! (one `Arc`) and safe to share across threads and tasks. Independent
//! sessions never share state, so tests can build as many as they like.
//!
//! Locking: one `parking_lot::RwLock` around the log and its running totals.
//! Appends take the write lock only for the push; reads copy what they need
//! under the read lock and do all aggregation after releasing it.

use crate::aggregate::{aggregate, CostTree};
use crate::config::ProfilerConfig;
use crate::error::{CoreError, Diagnostic, DiagnosticLog};
use crate::event::{EventBus, SessionEvent};
use crate::hints::{generate_hints, Hint};
use crate::models::{CallRecord, ScopePath, UsageEvent};
use crate::persistence::{PersistenceMirror, RecordSink, SqliteRecordStore};
use crate::pricing::{PricingResolver, StaticPricing};
use crate::recorder::Recorder;
use crate::report::{format_cost, Report, ReportRenderer, Stats, Totals};
use crate::scope;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Callback contract for the interception layer
///
/// Implementors receive one event per completed metered call. Implementations
/// must not fail or block the caller.
pub trait UsageObserver: Send + Sync {
    fn on_metered_call_completed(&self, event: UsageEvent);
}

struct RecordLog {
    records: Vec<Arc<CallRecord>>,
    next_seq: u64,
    totals: Totals,
    started_at: DateTime<Utc>,
}

impl RecordLog {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            next_seq: 1,
            totals: Totals::default(),
            started_at,
        }
    }

    /// Append and fold into the totals. Nothing here can fail once the
    /// record is in the log, so totals never count a record the log lacks.
    fn push(&mut self, mut record: CallRecord) -> Arc<CallRecord> {
        record.seq = self.next_seq;
        let record = Arc::new(record);
        self.records.push(Arc::clone(&record));
        self.next_seq += 1;
        self.totals.add(&record);
        if record.timestamp < self.started_at {
            self.started_at = record.timestamp;
        }
        record
    }
}

struct Inner {
    name: String,
    config: ProfilerConfig,
    recorder: Recorder,
    log: RwLock<RecordLog>,
    events: EventBus,
    diagnostics: Mutex<DiagnosticLog>,
    mirror: Option<PersistenceMirror>,
}

/// Lifecycle-scoped owner of the call record log
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// In-memory session with the built-in pricing table
    pub fn new(name: impl Into<String>) -> Self {
        let config = ProfilerConfig {
            session_name: name.into(),
            persist: false,
            ..ProfilerConfig::default()
        };
        Self::from_parts(
            config,
            Recorder::new(Arc::new(StaticPricing::new())),
            EventBus::default_capacity(),
            None,
        )
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    fn from_parts(
        config: ProfilerConfig,
        recorder: Recorder,
        events: EventBus,
        mirror: Option<PersistenceMirror>,
    ) -> Self {
        let diagnostics = DiagnosticLog::new(config.max_diagnostics);
        Self {
            inner: Arc::new(Inner {
                name: config.session_name.clone(),
                log: RwLock::new(RecordLog::new(Utc::now())),
                config,
                recorder,
                events,
                diagnostics: Mutex::new(diagnostics),
                mirror,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.inner.config
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.mirror.is_some()
    }

    /// Start of the sampling window: session start or earliest record
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.log.read().started_at
    }

    // ===================
    // Record path
    // ===================

    /// Price `event`, attribute it to `scope_path` and append it
    ///
    /// Never fails: unknown models and malformed events are stored at zero
    /// cost with a flag, and a diagnostic is kept.
    pub fn record(&self, event: UsageEvent, scope_path: ScopePath) -> Arc<CallRecord> {
        let resolved = self.inner.recorder.resolve(event, scope_path);
        if let Some(diagnostic) = resolved.diagnostic {
            self.inner.diagnostics.lock().push(diagnostic);
        }

        let record = {
            let mut log = self.inner.log.write();
            let record = log.push(resolved.record);
            // Mirror under the lock so stored order matches seq order
            if let Some(mirror) = &self.inner.mirror {
                mirror.append(Arc::clone(&record));
            }
            record
        };

        debug!(
            session = %self.inner.name,
            seq = record.seq,
            scope = %record.scope_path,
            model = %record.model,
            cost_usd = record.cost_usd,
            "Call recorded"
        );
        self.inner
            .events
            .publish(SessionEvent::RecordAppended(Arc::clone(&record)));
        record
    }

    /// Record against the calling context's current scope path
    pub fn record_current(&self, event: UsageEvent) -> Arc<CallRecord> {
        self.record(event, scope::current_path())
    }

    // ===================
    // Queries
    // ===================

    pub fn records(&self) -> Vec<Arc<CallRecord>> {
        self.inner.log.read().records.clone()
    }

    pub fn stats(&self) -> Stats {
        let (totals, calls) = {
            let log = self.inner.log.read();
            let calls: Vec<CallRecord> = log.records.iter().map(|r| (**r).clone()).collect();
            (log.totals.clone(), calls)
        };
        Stats::new(self.inner.name.clone(), &totals, calls)
    }

    pub fn tree(&self) -> CostTree {
        let records = self.records();
        aggregate(records.iter().map(|r| r.as_ref()))
    }

    pub fn hints(&self) -> Vec<Hint> {
        self.report().hints
    }

    /// Stats, cost tree and hints from one consistent snapshot
    pub fn report(&self) -> Report {
        let (totals, records, started_at) = {
            let log = self.inner.log.read();
            (log.totals.clone(), log.records.clone(), log.started_at)
        };

        let generated_at = Utc::now();
        let hint_config = &self.inner.config.hints;
        let elapsed = (generated_at - started_at).num_milliseconds() as f64 / 1000.0;
        let window = elapsed.max(hint_config.min_sampling_window_secs.max(1) as f64);

        let tree = aggregate(records.iter().map(|r| r.as_ref()));
        let hints = generate_hints(
            &tree,
            self.inner.recorder.pricing().as_ref(),
            hint_config,
            window,
        );
        let calls = records.iter().map(|r| (**r).clone()).collect();

        Report {
            stats: Stats::new(self.inner.name.clone(), &totals, calls),
            tree,
            hints,
            started_at,
            generated_at,
            sampling_window_secs: window,
        }
    }

    pub fn render(&self, renderer: &dyn ReportRenderer) -> Result<String, CoreError> {
        renderer.render(&self.report())
    }

    pub fn total_cost(&self) -> f64 {
        self.inner.log.read().totals.cost_usd
    }

    pub fn total_tokens(&self) -> u64 {
        self.inner.log.read().totals.total_tokens()
    }

    pub fn total_calls(&self) -> u64 {
        self.inner.log.read().totals.calls
    }

    /// Top-level scope → cost; unattributed calls under `<unattributed>`
    pub fn cost_by_scope(&self) -> BTreeMap<String, f64> {
        self.inner.log.read().totals.by_scope.clone()
    }

    pub fn cost_by_model(&self) -> BTreeMap<String, f64> {
        self.inner.log.read().totals.by_model.clone()
    }

    /// Total cost as `$0.0070`
    pub fn cost_display(&self) -> String {
        format_cost(self.total_cost())
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.diagnostics.lock().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ===================
    // Lifecycle
    // ===================

    /// Clear the log, totals, diagnostics and (when persistent) the store
    ///
    /// Scope guards already on a stack stay valid; they only affect records
    /// made after the reset.
    pub fn reset(&self) {
        let cleared = {
            let mut log = self.inner.log.write();
            let cleared = log.records.len();
            *log = RecordLog::new(Utc::now());
            if let Some(mirror) = &self.inner.mirror {
                mirror.clear();
            }
            cleared
        };
        self.inner.diagnostics.lock().clear();

        info!(session = %self.inner.name, cleared, "Session reset");
        self.inner.events.publish(SessionEvent::Reset);
    }

    /// Wait until every record so far has reached durable storage
    pub fn flush(&self) {
        if let Some(mirror) = &self.inner.mirror {
            mirror.flush();
        }
    }
}

impl UsageObserver for Session {
    fn on_metered_call_completed(&self, event: UsageEvent) {
        self.record_current(event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.name)
            .field("calls", &self.total_calls())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

/// Builder for sessions with custom pricing or persistence
#[derive(Default)]
pub struct SessionBuilder {
    config: ProfilerConfig,
    pricing: Option<Arc<dyn PricingResolver>>,
    sink: Option<Arc<dyn RecordSink>>,
    events: Option<EventBus>,
}

impl SessionBuilder {
    pub fn config(mut self, config: ProfilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = name.into();
        self
    }

    pub fn pricing(mut self, pricing: Arc<dyn PricingResolver>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Persist through `sink`, regardless of `config.persist`
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use an existing bus, so subscribers see the replay event
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config.validate().context("Invalid profiler configuration")?;

        let sink: Option<Arc<dyn RecordSink>> = match self.sink {
            Some(sink) => Some(sink),
            None if self.config.persist => {
                let path = self
                    .config
                    .db_path()
                    .context("No persistence path configured and no home directory found")?;
                Some(Arc::new(SqliteRecordStore::open(&path)?))
            }
            None => None,
        };

        let replayed = match &sink {
            Some(sink) => sink.load_all().context("Failed to replay stored records")?,
            None => Vec::new(),
        };
        let mirror = sink.map(PersistenceMirror::spawn).transpose()?;

        let pricing = self
            .pricing
            .unwrap_or_else(|| Arc::new(StaticPricing::new()));
        let events = self.events.unwrap_or_else(|| EventBus::new(self.config.event_capacity));
        let session = Session::from_parts(self.config, Recorder::new(pricing), events, mirror);

        if !replayed.is_empty() {
            let count = replayed.len();
            {
                let mut log = session.inner.log.write();
                for record in replayed {
                    log.push(record);
                }
            }
            session
                .inner
                .events
                .publish(SessionEvent::Replayed(count));
        }

        info!(
            session = %session.name(),
            persistent = session.is_persistent(),
            replayed = session.total_calls(),
            "Session initialized"
        );
        Ok(session)
    }
}
