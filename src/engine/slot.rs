//! Worker slots: the coordinator's view of one pooled worker

use crate::error::{ChannelError, ConfigError, WorkerError};
use crate::item::WorkItem;
use crate::protocol::Request;
use crate::transport::WorkerHandle;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What a slot is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Persists outcomes; never receives partitions
    Writer,
    /// Discovers and processes items
    Processor,
}

impl Role {
    /// Role for a slot index: slot 0 is the writer
    pub fn for_slot(index: usize) -> Self {
        if index == 0 {
            Role::Writer
        } else {
            Role::Processor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Writer => "writer",
            Role::Processor => "processor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "writer" => Ok(Role::Writer),
            "processor" => Ok(Role::Processor),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// One pooled worker as seen by the coordinator
pub struct WorkerSlot {
    /// Position in the pool
    pub index: usize,

    /// Writer or processor
    pub role: Role,

    /// Whether the slot had work outstanding the last time we looked
    pub last_known_busy: bool,

    /// Reported `online`
    pub online: bool,

    /// Still reachable
    pub alive: bool,

    /// Reported `discoveryComplete`
    pub discovered: bool,

    /// Reported `drained` after halt
    pub drained: bool,

    /// Items handed to this worker and not yet reported back
    in_flight: Vec<WorkItem>,

    handle: Box<dyn WorkerHandle>,
}

impl WorkerSlot {
    pub fn new(index: usize, role: Role, handle: Box<dyn WorkerHandle>) -> Self {
        Self {
            index,
            role,
            last_known_busy: false,
            online: false,
            alive: true,
            discovered: false,
            drained: false,
            in_flight: Vec::new(),
            handle,
        }
    }

    pub fn is_processor(&self) -> bool {
        self.role == Role::Processor
    }

    /// Live processor with nothing in flight
    pub fn is_idle_processor(&self) -> bool {
        self.is_processor() && self.alive && self.in_flight.is_empty()
    }

    /// Send a request to the worker
    pub fn send(&mut self, request: Request) -> Result<(), ChannelError> {
        if !self.alive {
            return Err(ChannelError::Disconnected { slot: self.index });
        }
        self.handle.send(request)
    }

    /// Record a partition as handed to this worker
    pub fn assign(&mut self, items: &[WorkItem]) {
        self.in_flight.extend_from_slice(items);
        self.last_known_busy = !self.in_flight.is_empty();
    }

    /// Record one item as reported back. Returns false if it was not in flight.
    pub fn settle(&mut self, item: &WorkItem) -> bool {
        let found = match self.in_flight.iter().position(|i| i == item) {
            Some(pos) => {
                self.in_flight.swap_remove(pos);
                true
            }
            None => false,
        };
        self.last_known_busy = !self.in_flight.is_empty();
        found
    }

    /// Number of items in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Take back everything in flight
    pub fn take_in_flight(&mut self) -> Vec<WorkItem> {
        self.last_known_busy = false;
        std::mem::take(&mut self.in_flight)
    }

    /// Mark the slot unreachable
    pub fn mark_dead(&mut self) {
        self.alive = false;
        self.last_known_busy = false;
    }

    /// Ask the worker to exit and wait for it
    pub fn stop(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        self.alive = false;
        self.handle.stop(timeout)
    }
}

impl fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("index", &self.index)
            .field("role", &self.role)
            .field("alive", &self.alive)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
