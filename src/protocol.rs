//! Message protocol between the coordinator and its workers.
//!
//! Every message is an envelope `{"request": <tag>, "data": <payload>}`.
//! Over a process boundary the envelopes are JSON-serialized and
//! newline-delimited; in-process workers exchange the values directly.

use crate::item::WorkItem;
use serde::{Deserialize, Serialize};

/// Message from the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", content = "data", rename_all = "camelCase")]
pub enum Request {
    /// Ask a processor to produce its discovered items.
    ProcessDiscovery,

    /// Assign a shard of the batch.
    ProcessCollectionPart(Vec<WorkItem>),

    /// Stop issuing new work units; drain what is in flight.
    HaltCollection,

    /// Persist one successfully processed item (writer only).
    WriteData(WorkItem),

    /// Persist items that were not processed (writer only).
    WriteFailureData(Vec<WorkItem>),

    /// Flush and stop the worker.
    Exit,
}

/// Message from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", content = "data", rename_all = "camelCase")]
pub enum Response {
    /// Worker is up and listening.
    Online,

    /// Discovery result.
    DiscoveryComplete(Vec<WorkItem>),

    /// Item processed OK.
    CollectionSuccess(WorkItem),

    /// Item processing failed; eligible for retry.
    CollectionFailure(WorkItem),

    /// Unfinished items reported after halt.
    HaltedCollection(Vec<WorkItem>),

    /// Worker is halted and has nothing left in flight.
    Drained,
}

impl Request {
    /// Wire tag of this message
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ProcessDiscovery => "processDiscovery",
            Self::ProcessCollectionPart(_) => "processCollectionPart",
            Self::HaltCollection => "haltCollection",
            Self::WriteData(_) => "writeData",
            Self::WriteFailureData(_) => "writeFailureData",
            Self::Exit => "exit",
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl Response {
    /// Wire tag of this message
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::DiscoveryComplete(_) => "discoveryComplete",
            Self::CollectionSuccess(_) => "collectionSuccess",
            Self::CollectionFailure(_) => "collectionFailure",
            Self::HaltedCollection(_) => "haltedCollection",
            Self::Drained => "drained",
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
