//! Worker transports
//!
//! A transport spawns workers and carries messages to and from them. The
//! coordinator only sees two things:
//!
//! - a [`WorkerHandle`] per slot for outbound requests
//! - one shared inbound channel of [`Inbound`] events, each tagged with the
//!   slot it came from
//!
//! Two transports are provided:
//!
//! - [`ThreadSpawner`]: each worker is a named thread with its own inbox
//! - [`ProcessSpawner`]: each worker is a child process speaking
//!   newline-delimited JSON over stdin/stdout

mod process;
mod thread;
pub mod worker_main;

pub use process::ProcessSpawner;
pub use thread::{ChannelOutbox, ThreadSpawner};

use crate::engine::slot::Role;
use crate::error::{ChannelError, Result, WorkerError};
use crate::protocol::{Request, Response};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Something that happened on a worker slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    /// The worker sent a message
    Message(Response),

    /// The worker is gone
    Exited { reason: String },
}

/// An event on the coordinator's inbound channel
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Slot the event belongs to
    pub slot: usize,

    /// What happened
    pub event: SlotEvent,
}

impl Inbound {
    pub fn message(slot: usize, response: Response) -> Self {
        Self {
            slot,
            event: SlotEvent::Message(response),
        }
    }

    pub fn exited(slot: usize, reason: impl Into<String>) -> Self {
        Self {
            slot,
            event: SlotEvent::Exited {
                reason: reason.into(),
            },
        }
    }
}

/// Coordinator-side handle to one worker
pub trait WorkerHandle: Send {
    /// Deliver a request. Ordered, at most once.
    fn send(&mut self, request: Request) -> std::result::Result<(), ChannelError>;

    /// Ask the worker to exit and wait up to `timeout` for it
    fn stop(&mut self, timeout: Duration) -> std::result::Result<(), WorkerError>;
}

/// Worker-side sender of responses
pub trait Outbox: Send {
    fn send(&mut self, response: Response) -> std::result::Result<(), ChannelError>;
}

/// What to spawn for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnSpec {
    pub slot: usize,
    pub role: Role,
}

/// Creates workers for the pool
pub trait Spawner {
    /// Start a worker whose responses are delivered to `inbound`
    fn spawn(&self, spec: SpawnSpec, inbound: Sender<Inbound>) -> Result<Box<dyn WorkerHandle>>;
}
