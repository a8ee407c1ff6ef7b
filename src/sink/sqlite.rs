//! Batched SQLite sink
//!
//! Outcomes are buffered per table and committed in one transaction per
//! batch with cached prepared statements. The writer agent owns the only
//! connection, so there is no lock contention.

use crate::error::{SinkError, SinkResult};
use crate::item::WorkItem;
use crate::sink::schema::{self, keys, OutcomeTable};
use crate::sink::WriteSink;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sink that stores outcomes in a SQLite database
pub struct SqliteSink {
    conn: Connection,
    path: PathBuf,
    run_id: String,
    batch_size: usize,
    written: Vec<WorkItem>,
    failed: Vec<WorkItem>,
    batches_committed: u64,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and mark the run as started
    pub fn create(path: &Path, run_id: &str, batch_size: usize) -> SinkResult<Self> {
        let conn = Connection::open(path).map_err(|e| SinkError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::with_connection(conn, path, run_id, batch_size)
    }

    /// Use an already open connection (in-memory databases in tests)
    pub fn with_connection(
        conn: Connection,
        path: &Path,
        run_id: &str,
        batch_size: usize,
    ) -> SinkResult<Self> {
        schema::create_database(&conn)?;
        schema::set_run_info(&conn, keys::RUN_ID, run_id)?;
        schema::set_run_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
        schema::set_run_info(&conn, keys::HERD_VERSION, env!("CARGO_PKG_VERSION"))?;
        schema::set_run_info(&conn, keys::START_TIME, &now_rfc3339())?;
        schema::set_run_info(&conn, keys::STATUS, "running")?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            batch_size: batch_size.max(1),
            written: Vec::with_capacity(batch_size),
            failed: Vec::new(),
            batches_committed: 0,
        })
    }

    /// Access the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn commit(&mut self, table: OutcomeTable) -> SinkResult<()> {
        let buffer = match table {
            OutcomeTable::Written => std::mem::take(&mut self.written),
            OutcomeTable::Failed => std::mem::take(&mut self.failed),
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let recorded_at = now_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(table.insert_sql())?;
            for item in &buffer {
                stmt.execute(params![
                    self.run_id,
                    item.foo,
                    item.bar,
                    item.baz.to_rfc3339_opts(SecondsFormat::Millis, true),
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;

        self.batches_committed += 1;
        debug!(
            path = %self.path.display(),
            table = table.name(),
            rows = buffer.len(),
            batches = self.batches_committed,
            "Committed batch"
        );
        Ok(())
    }
}

impl WriteSink for SqliteSink {
    fn write_success(&mut self, item: &WorkItem) -> SinkResult<()> {
        self.written.push(item.clone());
        if self.written.len() >= self.batch_size {
            self.commit(OutcomeTable::Written)?;
        }
        Ok(())
    }

    fn write_failures(&mut self, items: &[WorkItem]) -> SinkResult<()> {
        self.failed.extend_from_slice(items);
        if self.failed.len() >= self.batch_size {
            self.commit(OutcomeTable::Failed)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        self.commit(OutcomeTable::Written)?;
        self.commit(OutcomeTable::Failed)?;
        schema::set_run_info(&self.conn, keys::END_TIME, &now_rfc3339())?;
        schema::set_run_info(&self.conn, keys::STATUS, "completed")?;
        Ok(())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
