//! jobherd - Coordinator and Worker-Pool Job Distribution
//!
//! One coordinator discovers a batch of work items, partitions them across a
//! fixed-size pool of workers, collects per-item outcomes, routes results to
//! a dedicated writer worker and enforces a global time budget.
//!
//! # Features
//!
//! - **Single Event Loop**: Every worker response arrives on one inbound
//!   channel tagged with its slot; the batch is only touched by the
//!   coordinator thread.
//!
//! - **Conservative Partitioning**: Each processor receives
//!   `size / cluster_size / divisor` items at a time and is refilled as it
//!   reports back.
//!
//! - **Time-Boxed Halt**: When the halt budget expires, processors finish
//!   their current unit and hand back whatever they did not start; those
//!   items are recorded as failure data, never lost.
//!
//! - **Pluggable Transports**: Workers run as threads or as child processes
//!   speaking newline-delimited JSON.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Coordinator                              │
//! │   Spawning → AwaitingDiscovery → Distributing → Halting → Done  │
//! └──────┬───────────────────────────────────────────────▲──────────┘
//!        │ processDiscovery / processCollectionPart       │
//!        │ haltCollection / writeData / writeFailureData  │ responses
//!        ▼                                                │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Worker Agents                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │ slot 0  │  │ slot 1  │  │ slot 2  │  ...    │slot N-1 │     │
//! │  │ writer  │  │processor│  │processor│         │processor│     │
//! │  └────┬────┘  └─────────┘  └─────────┘         └─────────┘     │
//! └───────┼─────────────────────────────────────────────────────────┘
//!         ▼
//!  ┌──────────────────┐
//!  │ Sink (log/SQLite)│
//!  └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Default run: 5 workers, halt after 300s
//! jobherd
//!
//! # Fast run that stops once every item has an outcome
//! jobherd -n 8 --max-delay-ms 100 --finish-when-drained -o run.db
//!
//! # Query results
//! sqlite3 run.db "SELECT COUNT(*) FROM failed_items"
//! ```

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod item;
pub mod progress;
pub mod protocol;
pub mod sink;
pub mod transport;

pub use config::{CliArgs, RefillPolicy, RunConfig, Transport};
pub use engine::{Coordinator, RunReport};
pub use error::{HerdError, Result};
pub use item::WorkItem;
