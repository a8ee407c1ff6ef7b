//! Per-worker agent
//!
//! Each agent:
//! - Announces itself with `online`
//! - Produces discovered items on `processDiscovery`
//! - Schedules one simulated unit per item of every partition it receives
//! - Reports each unit individually, or the rest of its partition in bulk
//!   once the halt flag is set
//! - Appends outcomes to its sink when it holds the writer role

use crate::agent::schedule::Schedule;
use crate::agent::strategy::Outcome;
use crate::agent::AgentKit;
use crate::engine::slot::Role;
use crate::error::{HerdError, Result};
use crate::item::WorkItem;
use crate::protocol::{Request, Response};
use crate::transport::Outbox;
use crossbeam_channel::{at, never, select, Receiver};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Counters collected by an agent
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AgentStats {
    /// Partitions received
    pub partitions: u64,

    /// Items reported as `collectionSuccess`
    pub succeeded: u64,

    /// Items reported as `collectionFailure`
    pub failed: u64,

    /// Items reported through `haltedCollection`
    pub halted: u64,

    /// Items appended to the sink as successes (writer only)
    pub written: u64,

    /// Items appended to the sink as failures (writer only)
    pub failure_written: u64,
}

/// The logic running inside one worker
pub struct WorkerAgent {
    slot: usize,
    role: Role,
    kit: AgentKit,
    outbox: Box<dyn Outbox>,
    schedule: Schedule,
    halted: bool,
    drained_reported: bool,
    next_partition: u64,
    stats: AgentStats,
}

impl WorkerAgent {
    pub fn new(slot: usize, role: Role, kit: AgentKit, outbox: Box<dyn Outbox>) -> Self {
        Self {
            slot,
            role,
            kit,
            outbox,
            schedule: Schedule::new(),
            halted: false,
            drained_reported: false,
            next_partition: 0,
            stats: AgentStats::default(),
        }
    }

    /// Whether the halt flag is set
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Units still scheduled
    pub fn pending(&self) -> usize {
        self.schedule.len()
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    /// Serve requests until `exit` or until the inbox closes
    pub fn run(mut self, inbox: Receiver<Request>) -> Result<AgentStats> {
        info!(slot = self.slot, role = %self.role, "Worker starting");
        self.reply(Response::Online)?;

        loop {
            let timer = match self.schedule.next_deadline() {
                Some(due) => at(due),
                None => never(),
            };

            select! {
                recv(inbox) -> msg => match msg {
                    Ok(Request::Exit) | Err(_) => break,
                    Ok(request) => self.handle(request)?,
                },
                recv(timer) -> _ => self.complete_due(Instant::now())?,
            }
        }

        if let Some(sink) = self.kit.sink.as_mut() {
            sink.flush()?;
        }

        info!(
            slot = self.slot,
            role = %self.role,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            halted = self.stats.halted,
            written = self.stats.written,
            "Worker shutting down"
        );
        Ok(self.stats)
    }

    /// Handle one request from the coordinator
    pub fn handle(&mut self, request: Request) -> Result<()> {
        trace!(slot = self.slot, request = request.tag(), "Request received");
        match request {
            Request::ProcessDiscovery => self.discover(),
            Request::ProcessCollectionPart(items) => self.accept_partition(items),
            Request::HaltCollection => {
                if !self.halted {
                    debug!(slot = self.slot, pending = self.schedule.len(), "Halt flag set");
                }
                self.halted = true;
                self.report_drained_if_idle()
            }
            Request::WriteData(item) => match self.kit.sink.as_mut() {
                Some(sink) => {
                    sink.write_success(&item)?;
                    self.stats.written += 1;
                    Ok(())
                }
                None => {
                    warn!(
                        slot = self.slot,
                        role = %self.role,
                        "writeData sent to a worker without a sink"
                    );
                    Ok(())
                }
            },
            Request::WriteFailureData(items) => match self.kit.sink.as_mut() {
                Some(sink) => {
                    sink.write_failures(&items)?;
                    self.stats.failure_written += items.len() as u64;
                    Ok(())
                }
                None => {
                    warn!(
                        slot = self.slot,
                        role = %self.role,
                        count = items.len(),
                        "writeFailureData sent to a worker without a sink"
                    );
                    Ok(())
                }
            },
            Request::Exit => Ok(()),
        }
    }

    /// Complete every unit due at `now`
    pub fn complete_due(&mut self, now: Instant) -> Result<()> {
        while let Some(unit) = self.schedule.pop_due(now) {
            if self.halted {
                let mut items = vec![unit.item];
                items.extend(self.schedule.cancel_partition(unit.partition));
                self.stats.halted += items.len() as u64;
                debug!(
                    slot = self.slot,
                    partition = unit.partition,
                    count = items.len(),
                    "Reporting unfinished partition"
                );
                self.reply(Response::HaltedCollection(items))?;
                continue;
            }

            match self.kit.attempt.attempt(&unit.item) {
                Outcome::Success => {
                    self.stats.succeeded += 1;
                    self.reply(Response::CollectionSuccess(unit.item))?;
                }
                Outcome::Failure => {
                    self.stats.failed += 1;
                    trace!(slot = self.slot, item = %unit.item, "Attempt failed");
                    self.reply(Response::CollectionFailure(unit.item))?;
                }
            }
        }
        self.report_drained_if_idle()
    }

    fn discover(&mut self) -> Result<()> {
        if self.role == Role::Writer {
            warn!(slot = self.slot, "Writer asked to discover; ignoring");
            return Ok(());
        }
        let items = self.kit.source.discover();
        info!(slot = self.slot, count = items.len(), "Discovery complete");
        self.reply(Response::DiscoveryComplete(items))
    }

    fn accept_partition(&mut self, items: Vec<WorkItem>) -> Result<()> {
        if self.role == Role::Writer {
            // Hand the items straight back so they are requeued, not lost.
            warn!(
                slot = self.slot,
                count = items.len(),
                "Writer received a partition; returning it"
            );
            for item in items {
                self.reply(Response::CollectionFailure(item))?;
            }
            return Ok(());
        }

        self.stats.partitions += 1;
        if self.halted {
            if !items.is_empty() {
                self.stats.halted += items.len() as u64;
                self.reply(Response::HaltedCollection(items))?;
            }
            return self.report_drained_if_idle();
        }

        let partition = self.next_partition;
        self.next_partition += 1;
        let now = Instant::now();

        trace!(slot = self.slot, partition, count = items.len(), "Partition scheduled");
        for item in items {
            let due = now + self.kit.attempt.delay(&item);
            self.schedule.push(partition, item, due);
        }
        Ok(())
    }

    fn report_drained_if_idle(&mut self) -> Result<()> {
        if self.halted && self.schedule.is_empty() && !self.drained_reported {
            self.drained_reported = true;
            debug!(slot = self.slot, "Drained");
            self.reply(Response::Drained)?;
        }
        Ok(())
    }

    fn reply(&mut self, response: Response) -> Result<()> {
        self.outbox.send(response).map_err(HerdError::from)
    }
}
