//! Write sinks for the writer slot
//!
//! The writer agent appends every outcome it is sent to a [`WriteSink`]:
//! successful items through `writeData`, unprocessed items through
//! `writeFailureData`. Sinks:
//!
//! - [`LogSink`]: structured log lines only
//! - [`MemorySink`]: shared in-memory record, readable while the run is live
//! - [`SqliteSink`]: batched inserts into a SQLite file

pub mod schema;
mod sqlite;

pub use sqlite::SqliteSink;

use crate::error::SinkResult;
use crate::item::WorkItem;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Append-only destination for outcomes
pub trait WriteSink: Send {
    /// Record one successfully processed item
    fn write_success(&mut self, item: &WorkItem) -> SinkResult<()>;

    /// Record items that were not processed
    fn write_failures(&mut self, items: &[WorkItem]) -> SinkResult<()>;

    /// Make buffered records durable
    fn flush(&mut self) -> SinkResult<()>;
}

/// Sink that only logs what it receives
#[derive(Debug, Default)]
pub struct LogSink {
    written: u64,
    failed: u64,
}

impl WriteSink for LogSink {
    fn write_success(&mut self, item: &WorkItem) -> SinkResult<()> {
        self.written += 1;
        info!(item = %item, "writeData");
        Ok(())
    }

    fn write_failures(&mut self, items: &[WorkItem]) -> SinkResult<()> {
        self.failed += items.len() as u64;
        info!(count = items.len(), "writeFailureData");
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        info!(written = self.written, failed = self.failed, "Log sink closed");
        Ok(())
    }
}

/// Everything a [`MemorySink`] has received
#[derive(Debug, Default, Clone)]
pub struct SinkRecords {
    pub written: Vec<WorkItem>,
    pub failed: Vec<WorkItem>,
    pub flushes: u64,
}

/// Sink that keeps everything in memory behind a shared lock
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<SinkRecords>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> SinkRecords {
        self.records.lock().clone()
    }
}

impl WriteSink for MemorySink {
    fn write_success(&mut self, item: &WorkItem) -> SinkResult<()> {
        self.records.lock().written.push(item.clone());
        Ok(())
    }

    fn write_failures(&mut self, items: &[WorkItem]) -> SinkResult<()> {
        self.records.lock().failed.extend_from_slice(items);
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        self.records.lock().flushes += 1;
        Ok(())
    }
}
