//! The coordination engine
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │          Coordinator         │
//!                 │  WorkBatch ─ partition size  │
//!                 │  halt timer ─ drain grace    │
//!                 └──────┬──────────────▲────────┘
//!          requests      │              │ inbound (slot-tagged)
//!        ┌───────────────┼──────────────┼───────────────┐
//!        ▼               ▼              │               ▼
//!   ┌─────────┐    ┌───────────┐        │         ┌───────────┐
//!   │ slot 0  │    │  slot 1   │  ...   │         │  slot N-1 │
//!   │ writer  │    │ processor │────────┘         │ processor │
//!   └─────────┘    └───────────┘                  └───────────┘
//! ```
//!
//! Successes become `writeData` to slot 0, failures go back to the tail of
//! the batch, and items that never finished become `writeFailureData`.

pub mod batch;
pub mod coordinator;
pub mod lifecycle;
pub mod queue;
pub mod slot;

pub use batch::WorkBatch;
pub use coordinator::{
    compute_partition_size, Coordinator, HaltCause, Phase, RunProgress, RunReport,
};
pub use queue::{QueueStats, WorkQueue};
pub use slot::{Role, WorkerSlot};
