//! Durable call record storage
//!
//! The session only talks to [`RecordSink`]. [`SqliteRecordStore`] is the
//! bundled implementation; [`PersistenceMirror`] moves writes off the record
//! path onto a dedicated writer thread.
//!
//! Schema:
//! - `store_metadata`: key/value rows, currently only `version`
//! - `call_records`: one row per call, insertion order kept by `id`
//!
//! A version mismatch clears `call_records` on open.

use crate::models::{CallRecord, RecordFlags, ScopePath};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bump when the `call_records` layout changes
///
/// - v1: initial layout
/// - v2: added provider column
const STORE_VERSION: i32 = 2;

/// Durable backend for call records
///
/// Called from the mirror thread only, never from the record path.
pub trait RecordSink: Send + Sync {
    /// All stored records in append order
    fn load_all(&self) -> Result<Vec<CallRecord>>;

    fn append(&self, records: &[CallRecord]) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// SQLite-backed record store (thread-safe)
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRecordStore {
    /// Create or open the store at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open record store: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        let store = Self::init(conn, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Private in-memory store, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS call_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_path TEXT NOT NULL,
                model TEXT NOT NULL,
                provider TEXT,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                timestamp TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                unpriced INTEGER NOT NULL,
                malformed INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_call_records_model ON call_records(model);
            "#,
        )
        .context("Failed to create schema")?;

        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query store version")?;

        match stored_version {
            Some(v) if v != STORE_VERSION => {
                warn!(
                    stored = v,
                    current = STORE_VERSION,
                    "Record store version mismatch, clearing stored records"
                );
                conn.execute("DELETE FROM call_records", [])
                    .context("Failed to clear stale records")?;
                conn.execute(
                    "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION],
                )
                .context("Failed to update store version")?;
            }
            None => {
                conn.execute(
                    "INSERT INTO store_metadata (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION],
                )
                .context("Failed to initialize store version")?;
            }
            Some(_) => {}
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM call_records", [], |row| row.get(0))
            .context("Failed to count records")?;
        Ok(count.max(0) as usize)
    }
}

impl RecordSink for SqliteRecordStore {
    fn load_all(&self) -> Result<Vec<CallRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, scope_path, model, provider, input_tokens, output_tokens, cost_usd,
                        timestamp, duration_seconds, unpriced, malformed
                 FROM call_records ORDER BY id",
            )
            .context("Failed to prepare record query")?;

        let rows = stmt
            .query_map([], |row| {
                let timestamp: String = row.get(7)?;
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            7,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                let input: i64 = row.get(4)?;
                let output: i64 = row.get(5)?;
                let id: i64 = row.get(0)?;

                Ok(CallRecord {
                    seq: id.max(0) as u64,
                    scope_path: row.get::<_, ScopePath>(1)?,
                    model: row.get(2)?,
                    provider: row.get(3)?,
                    input_tokens: input.max(0) as u64,
                    output_tokens: output.max(0) as u64,
                    cost_usd: row.get(6)?,
                    timestamp,
                    duration_seconds: row.get(8)?,
                    flags: RecordFlags {
                        unpriced: row.get(9)?,
                        malformed: row.get(10)?,
                    },
                })
            })
            .context("Failed to query records")?;

        let records = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode stored record")?;
        Ok(records)
    }

    fn append(&self, records: &[CallRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO call_records
                        (scope_path, model, provider, input_tokens, output_tokens, cost_usd,
                         timestamp, duration_seconds, unpriced, malformed)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .context("Failed to prepare insert")?;

            for record in records {
                stmt.execute(params![
                    record.scope_path,
                    record.model,
                    record.provider,
                    record.input_tokens.min(i64::MAX as u64) as i64,
                    record.output_tokens.min(i64::MAX as u64) as i64,
                    record.cost_usd,
                    record.timestamp.to_rfc3339(),
                    record.duration_seconds,
                    record.flags.unpriced,
                    record.flags.malformed,
                ])
                .with_context(|| format!("Failed to store record {}", record.seq))?;
            }
        }
        tx.commit().context("Failed to commit records")?;

        debug!(count = records.len(), "Records persisted");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM call_records", [])
            .context("Failed to clear records")?;
        info!(deleted, "Record store cleared");
        Ok(())
    }
}

enum MirrorCommand {
    Append(Arc<CallRecord>),
    Clear,
    Flush(std::sync::mpsc::SyncSender<()>),
    Shutdown,
}

/// Forwards session writes to a [`RecordSink`] on a background thread
///
/// Sending never blocks. Sink failures are logged and dropped; they never
/// reach the session.
pub struct PersistenceMirror {
    tx: mpsc::UnboundedSender<MirrorCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceMirror {
    pub fn spawn(sink: Arc<dyn RecordSink>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("costscope-mirror".to_string())
            .spawn(move || run_mirror(sink, rx))
            .context("Failed to spawn persistence mirror thread")?;

        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn append(&self, record: Arc<CallRecord>) {
        if self.tx.send(MirrorCommand::Append(record)).is_err() {
            warn!("Persistence mirror stopped, record not persisted");
        }
    }

    pub fn clear(&self) {
        if self.tx.send(MirrorCommand::Clear).is_err() {
            warn!("Persistence mirror stopped, store not cleared");
        }
    }

    /// Block until every command sent so far has reached the sink
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = std::sync::mpsc::sync_channel(1);
        if self.tx.send(MirrorCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for PersistenceMirror {
    fn drop(&mut self) {
        let _ = self.tx.send(MirrorCommand::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Persistence mirror thread panicked");
            }
        }
    }
}

fn run_mirror(sink: Arc<dyn RecordSink>, mut rx: mpsc::UnboundedReceiver<MirrorCommand>) {
    debug!("Persistence mirror started");
    let mut batch: Vec<CallRecord> = Vec::new();

    while let Some(command) = rx.blocking_recv() {
        let mut next = Some(command);
        // Drain whatever is queued so appends go out in one transaction
        while let Some(command) = next.take() {
            match command {
                MirrorCommand::Append(record) => batch.push((*record).clone()),
                MirrorCommand::Clear => {
                    write_batch(sink.as_ref(), &mut batch);
                    if let Err(e) = sink.clear() {
                        warn!(error = %e, "Failed to clear record store");
                    }
                }
                MirrorCommand::Flush(ack) => {
                    write_batch(sink.as_ref(), &mut batch);
                    let _ = ack.send(());
                }
                MirrorCommand::Shutdown => {
                    write_batch(sink.as_ref(), &mut batch);
                    debug!("Persistence mirror stopped");
                    return;
                }
            }
            next = rx.try_recv().ok();
        }
        write_batch(sink.as_ref(), &mut batch);
    }

    write_batch(sink.as_ref(), &mut batch);
}

fn write_batch(sink: &dyn RecordSink, batch: &mut Vec<CallRecord>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = sink.append(batch) {
        warn!(error = %e, count = batch.len(), "Failed to persist records");
    }
    batch.clear();
}
