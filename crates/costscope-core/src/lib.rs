//! costscope-core - Core library for costscope
//!
//! Attributes the cost of metered text-generation calls to caller-declared
//! scopes: per-context scope stacks, a recorder that prices usage events, a
//! cost tree with self/inclusive rollups, and rule-based savings hints.
//!
//! ```
//! use costscope_core::{scope, Session, UsageEvent};
//!
//! let session = Session::new("docs");
//! scope::profile("pipeline", || {
//!     scope::profile("fetch", || {
//!         session.record_current(UsageEvent::new("gpt-4o", 12_000, 400));
//!     });
//! });
//!
//! let tree = session.tree();
//! let pipeline = tree.root.children.get("pipeline").unwrap();
//! assert_eq!(pipeline.self_cost_usd, 0.0);
//! assert!((pipeline.inclusive_cost_usd - 0.034).abs() < 1e-9);
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod hints;
pub mod models;
pub mod persistence;
pub mod pricing;
pub mod recorder;
pub mod report;
pub mod scope;
pub mod session;

pub use aggregate::{aggregate, CostNode, CostTree, ModelCost};
pub use config::ProfilerConfig;
pub use error::{CoreError, Diagnostic, DiagnosticLog, ErrorSeverity};
pub use event::{EventBus, SessionEvent};
pub use export::{export_calls_to_csv, export_report_to_json, export_report_to_markdown};
pub use hints::{generate_hints, Hint, HintConfig, HintKind, Severity};
pub use models::{CallRecord, RecordFlags, ScopePath, UsageEvent, UNATTRIBUTED};
pub use persistence::{PersistenceMirror, RecordSink, SqliteRecordStore};
pub use pricing::{ModelPricing, PricingResolver, StaticPricing};
pub use recorder::Recorder;
pub use report::{JsonRenderer, Report, ReportRenderer, Stats, TextRenderer, Totals};
pub use scope::{CloseError, ScopeGuard, ScopeStack};
pub use session::{Session, SessionBuilder, UsageObserver};
