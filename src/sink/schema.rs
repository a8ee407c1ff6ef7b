//! SQLite schema for the writer's output database
//!
//! Two append-only tables hold the outcomes of a run, plus a small
//! key/value table with run metadata.

use crate::error::SinkResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Items reported through `writeData`
const CREATE_WRITTEN_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS written_items (
    id INTEGER PRIMARY KEY,
    run_id TEXT NOT NULL,
    foo TEXT NOT NULL,
    bar INTEGER NOT NULL,
    baz TEXT NOT NULL,            -- RFC 3339
    recorded_at TEXT NOT NULL     -- RFC 3339
)
"#;

/// Items reported through `writeFailureData`
const CREATE_FAILED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS failed_items (
    id INTEGER PRIMARY KEY,
    run_id TEXT NOT NULL,
    foo TEXT NOT NULL,
    bar INTEGER NOT NULL,
    baz TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)
"#;

const CREATE_RUN_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS run_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Write-friendly pragmas; the writer is the only connection
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
"#;

/// Which outcome table a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTable {
    Written,
    Failed,
}

impl OutcomeTable {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeTable::Written => "written_items",
            OutcomeTable::Failed => "failed_items",
        }
    }

    pub(crate) fn insert_sql(&self) -> &'static str {
        match self {
            OutcomeTable::Written => {
                "INSERT INTO written_items (run_id, foo, bar, baz, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            OutcomeTable::Failed => {
                "INSERT INTO failed_items (run_id, foo, bar, baz, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5)"
            }
        }
    }
}

/// Create and configure a new database for writing
pub fn create_database(conn: &Connection) -> SinkResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_WRITTEN_TABLE, [])?;
    conn.execute(CREATE_FAILED_TABLE, [])?;
    conn.execute(CREATE_RUN_INFO_TABLE, [])?;

    Ok(())
}

/// Store run metadata
pub fn set_run_info(conn: &Connection, key: &str, value: &str) -> SinkResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO run_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get run metadata
pub fn get_run_info(conn: &Connection, key: &str) -> SinkResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM run_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Number of rows in an outcome table
pub fn count_rows(conn: &Connection, table: OutcomeTable) -> SinkResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Metadata keys
pub mod keys {
    /// Unique id of the run
    pub const RUN_ID: &str = "run_id";

    /// Timestamp when the writer opened the database (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the writer closed the database (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// jobherd version
    pub const HERD_VERSION: &str = "herd_version";

    /// "running" or "completed"
    pub const STATUS: &str = "status";
}
