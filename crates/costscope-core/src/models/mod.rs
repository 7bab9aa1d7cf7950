//! Data models for costscope

pub mod record;
pub mod scope_path;
pub mod usage;

pub use record::{CallRecord, RecordFlags};
pub use scope_path::{ScopePath, UNATTRIBUTED};
pub use usage::UsageEvent;
