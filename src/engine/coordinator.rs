//! Run coordinator - drives the pool through one run
//!
//! The coordinator is responsible for:
//! - Spawning the pool (slot 0 is the writer)
//! - Triggering discovery once every slot is online
//! - Partitioning the discovered items across the processors
//! - Routing outcomes: successes to the writer, failures back to the batch
//! - The halt timer, the drain grace period and the final flush
//!
//! Everything runs on one thread: responses from every slot arrive on a
//! single inbound channel and all batch mutations happen in the handlers.

use crate::config::{RefillPolicy, RunConfig};
use crate::engine::batch::WorkBatch;
use crate::engine::lifecycle::{self, InstanceGuard};
use crate::engine::slot::{Role, WorkerSlot};
use crate::error::{HerdError, Result};
use crate::item::WorkItem;
use crate::protocol::{Request, Response};
use crate::transport::{Inbound, SlotEvent, SpawnSpec, Spawner, WorkerHandle};
use crossbeam_channel::{after, never, select, tick, unbounded, Receiver};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Slot index of the writer
pub const WRITER_SLOT: usize = 0;

/// How often the halt switch is polled and progress is published
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Items per partition: `size / cluster_size / divisor`, never below one
pub fn compute_partition_size(size: usize, cluster_size: usize, divisor: usize) -> usize {
    let raw = size / cluster_size.max(1) / divisor.max(1);
    raw.max(1)
}

/// Where the run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for every slot to come online
    Spawning,
    /// Discovery broadcast sent, collecting results
    AwaitingDiscovery,
    /// Partitions are being handed out
    Distributing,
    /// Halt broadcast sent, waiting for processors to drain
    Halting,
    /// Finished
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Spawning => "spawning",
            Phase::AwaitingDiscovery => "discovering",
            Phase::Distributing => "distributing",
            Phase::Halting => "halting",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why the run halted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// The halt budget expired
    Timer,
    /// The external halt switch was set (Ctrl-C)
    Signal,
    /// Every item had an outcome and `finish_when_drained` was set
    Finished,
    /// No processor is left
    NoProcessors,
}

impl fmt::Display for HaltCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HaltCause::Timer => "halt budget expired",
            HaltCause::Signal => "interrupted",
            HaltCause::Finished => "all items handled",
            HaltCause::NoProcessors => "no processors left",
        };
        f.write_str(name)
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Items produced by discovery
    pub discovered: u64,

    /// Items forwarded to the writer as `writeData`
    pub succeeded: u64,

    /// `collectionFailure` reports (one item may fail many times)
    pub failed_attempts: u64,

    /// Items reported through `haltedCollection`
    pub halted_items: u64,

    /// Items given up on after reaching the retry limit
    pub abandoned: u64,

    /// Items still queued or in flight when the run ended
    pub leftover: u64,

    /// Partitions handed out
    pub partitions_sent: u64,

    /// Partition size computed at distribution
    pub partition_size: usize,

    /// Slots lost during the run
    pub dead_workers: usize,

    /// Why the run halted
    pub halt_cause: Option<HaltCause>,

    /// Time taken for the run
    pub duration: Duration,
}

impl RunReport {
    /// Items forwarded to the writer as `writeFailureData`
    pub fn failure_data(&self) -> u64 {
        self.halted_items + self.abandoned + self.leftover
    }

    /// Every discovered item reached the writer exactly once
    pub fn is_balanced(&self) -> bool {
        self.discovered == self.succeeded + self.failure_data()
    }
}

/// Snapshot for display
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub phase: Phase,
    pub discovered: u64,
    pub queued: usize,
    pub in_flight: usize,
    pub succeeded: u64,
    pub failed_attempts: u64,
    pub halted_items: u64,
    pub live_workers: usize,
    pub total_workers: usize,
    pub elapsed: Duration,
}

impl RunProgress {
    /// Successes per second
    pub fn items_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.succeeded as f64 / secs
        } else {
            0.0
        }
    }
}

type ProgressFn = Box<dyn FnMut(&RunProgress)>;

/// Coordinates one run of the pool
pub struct Coordinator {
    config: RunConfig,
    slots: Vec<WorkerSlot>,
    inbound: Receiver<Inbound>,
    batch: WorkBatch,
    phase: Phase,
    partition_size: usize,
    discovery_sent: bool,
    discovered: Vec<WorkItem>,
    failures: HashMap<WorkItem, u32>,
    halted: bool,
    halt_switch: Arc<AtomicBool>,
    report: RunReport,
    progress: Option<ProgressFn>,
    started: Instant,
    _guard: InstanceGuard,
}

impl Coordinator {
    /// Claim the process-wide instance and spawn the pool
    pub fn spawn(config: RunConfig, spawner: &dyn Spawner) -> Result<Self> {
        let guard = lifecycle::acquire()?;
        let (tx, rx) = unbounded();

        let mut handles = Vec::with_capacity(config.cluster_size);
        for slot in 0..config.cluster_size {
            let spec = SpawnSpec {
                slot,
                role: Role::for_slot(slot),
            };
            handles.push(spawner.spawn(spec, tx.clone())?);
        }
        drop(tx);

        info!(count = handles.len(), "Workers spawned");
        Ok(Self::assemble(config, handles, rx, guard))
    }

    /// Use already-running workers whose responses arrive on `inbound`
    pub fn with_handles(
        config: RunConfig,
        handles: Vec<Box<dyn WorkerHandle>>,
        inbound: Receiver<Inbound>,
    ) -> Result<Self> {
        let guard = lifecycle::acquire()?;
        Ok(Self::assemble(config, handles, inbound, guard))
    }

    fn assemble(
        config: RunConfig,
        handles: Vec<Box<dyn WorkerHandle>>,
        inbound: Receiver<Inbound>,
        guard: InstanceGuard,
    ) -> Self {
        let slots = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| WorkerSlot::new(index, Role::for_slot(index), handle))
            .collect();

        Self {
            config,
            slots,
            inbound,
            batch: WorkBatch::default(),
            phase: Phase::Spawning,
            partition_size: 1,
            discovery_sent: false,
            discovered: Vec::new(),
            failures: HashMap::new(),
            halted: false,
            halt_switch: Arc::new(AtomicBool::new(false)),
            report: RunReport::default(),
            progress: None,
            started: Instant::now(),
            _guard: guard,
        }
    }

    /// Get a clone of the halt switch (for signal handlers)
    pub fn halt_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halt_switch)
    }

    /// Publish progress snapshots while the run is live
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&RunProgress) + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Items waiting in the batch
    pub fn queued(&self) -> usize {
        self.batch.size()
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Current state for display
    pub fn progress(&self) -> RunProgress {
        RunProgress {
            phase: self.phase,
            discovered: self.report.discovered,
            queued: self.batch.size(),
            in_flight: self.slots.iter().map(|s| s.in_flight()).sum(),
            succeeded: self.report.succeeded,
            failed_attempts: self.report.failed_attempts,
            halted_items: self.report.halted_items,
            live_workers: self.slots.iter().filter(|s| s.alive).count(),
            total_workers: self.slots.len(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Run until done and return the final statistics
    pub fn run(mut self) -> Result<RunReport> {
        self.started = Instant::now();
        info!(
            workers = self.slots.len(),
            halt_after_secs = self.config.halt_after.as_secs_f64(),
            divisor = self.config.partition_divisor,
            "Starting run"
        );

        if let Err(e) = self.event_loop() {
            error!(error = %e, "Run aborted");
            self.stop_all();
            return Err(e);
        }
        self.finish()
    }

    fn event_loop(&mut self) -> Result<()> {
        let inbound = self.inbound.clone();
        let halt_timer = after(self.config.halt_after);
        let ticker = tick(TICK_INTERVAL);
        let mut grace = never();
        let mut grace_armed = false;

        while self.phase != Phase::Done {
            select! {
                recv(inbound) -> event => match event {
                    Ok(event) => self.handle_event(event)?,
                    Err(_) => {
                        warn!("Every worker channel is closed");
                        for slot in &mut self.slots {
                            slot.mark_dead();
                        }
                        self.phase = Phase::Done;
                    }
                },
                recv(halt_timer) -> _ => {
                    info!("Halt budget expired");
                    self.begin_halt(HaltCause::Timer)?;
                },
                recv(ticker) -> _ => {
                    if self.halt_switch.load(Ordering::Relaxed) && !self.halted {
                        info!("Halt requested");
                        self.begin_halt(HaltCause::Signal)?;
                    }
                    self.publish_progress();
                },
                recv(grace) -> _ => {
                    warn!(
                        waiting = self.live_processors().filter(|s| !s.drained).count(),
                        "Drain grace period expired"
                    );
                    self.phase = Phase::Done;
                },
            }

            if self.halted && !grace_armed {
                grace = after(self.config.drain_grace);
                grace_armed = true;
            }
        }

        self.publish_progress();
        Ok(())
    }

    /// Apply one inbound event
    pub fn handle_event(&mut self, event: Inbound) -> Result<()> {
        let slot = event.slot;
        if slot >= self.slots.len() {
            warn!(slot, "Event from unknown slot");
            return Ok(());
        }

        match event.event {
            SlotEvent::Message(response) => self.handle_response(slot, response)?,
            SlotEvent::Exited { reason } => self.handle_lost(slot, &reason)?,
        }

        self.check_progress()
    }

    fn handle_response(&mut self, slot: usize, response: Response) -> Result<()> {
        if !self.slots[slot].alive {
            debug!(slot, response = response.tag(), "Ignoring response from lost worker");
            return Ok(());
        }
        trace!(slot, response = response.tag(), "Response received");

        match response {
            Response::Online => {
                self.slots[slot].online = true;
                debug!(slot, "Worker online");
            }

            Response::DiscoveryComplete(items) => {
                if !self.slots[slot].is_processor() {
                    warn!(slot, "Discovery result from the writer ignored");
                } else if self.slots[slot].discovered {
                    warn!(slot, count = items.len(), "Duplicate discovery result ignored");
                } else {
                    self.slots[slot].discovered = true;
                    self.report.discovered += items.len() as u64;
                    debug!(slot, count = items.len(), "Discovery result received");
                    if self.phase == Phase::AwaitingDiscovery {
                        self.discovered.extend(items);
                    } else {
                        // Halted before distribution; flushed as leftovers.
                        self.batch.extend(items);
                    }
                }
            }

            Response::CollectionSuccess(item) => {
                if !self.slots[slot].settle(&item) {
                    warn!(slot, item = %item, "Success for an item not in flight ignored");
                    return Ok(());
                }
                self.report.succeeded += 1;
                self.write(Request::WriteData(item))?;

                if self.accepting_work() && !self.batch.is_empty() {
                    let size = match self.config.refill {
                        RefillPolicy::Partition => self.partition_size,
                        RefillPolicy::Single => 1,
                    };
                    self.dispatch(slot, size)?;
                }
            }

            Response::CollectionFailure(item) => {
                if !self.slots[slot].settle(&item) {
                    warn!(slot, item = %item, "Failure for an item not in flight ignored");
                    return Ok(());
                }
                self.report.failed_attempts += 1;
                self.record_failure(item)?;

                if self.accepting_work() {
                    self.dispatch(slot, self.partition_size)?;
                }
            }

            Response::HaltedCollection(items) => {
                let settled: Vec<WorkItem> = items
                    .into_iter()
                    .filter(|item| self.slots[slot].settle(item))
                    .collect();
                if settled.is_empty() {
                    return Ok(());
                }
                self.report.halted_items += settled.len() as u64;
                debug!(slot, count = settled.len(), "Halted items forwarded");
                self.write(Request::WriteFailureData(settled))?;
            }

            Response::Drained => {
                self.slots[slot].drained = true;
                debug!(slot, "Worker drained");
            }
        }
        Ok(())
    }

    /// Count a failure and requeue the item, or abandon it at the retry limit
    fn record_failure(&mut self, item: WorkItem) -> Result<()> {
        let Some(limit) = self.config.max_attempts else {
            self.batch.requeue(item);
            return Ok(());
        };

        let count = self.failures.entry(item.clone()).or_insert(0);
        *count += 1;
        if *count < limit {
            self.batch.requeue(item);
            return Ok(());
        }

        self.failures.remove(&item);
        self.report.abandoned += 1;
        debug!(item = %item, attempts = limit, "Retry limit reached");
        self.write(Request::WriteFailureData(vec![item]))
    }

    /// Start halting: broadcast `haltCollection` and stop handing out work
    pub fn begin_halt(&mut self, cause: HaltCause) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        self.halted = true;
        self.report.halt_cause = Some(cause);
        self.phase = Phase::Halting;
        info!(%cause, queued = self.batch.size(), "Halting");

        let targets: Vec<usize> = self.live_processors().map(|s| s.index).collect();
        for slot in targets {
            if let Err(e) = self.slots[slot].send(Request::HaltCollection) {
                self.handle_lost(slot, &e.to_string())?;
            }
        }
        self.check_progress()
    }

    /// A slot is gone: requeue what it held and hand it to idle processors
    fn handle_lost(&mut self, slot: usize, reason: &str) -> Result<()> {
        if !self.slots[slot].alive {
            return Ok(());
        }
        if self.phase == Phase::Done {
            debug!(slot, reason, "Worker exited");
            return Ok(());
        }

        error!(slot, role = %self.slots[slot].role, reason, "Worker lost");
        self.slots[slot].mark_dead();
        self.report.dead_workers += 1;

        if self.slots[slot].role == Role::Writer {
            return Err(HerdError::WriterLost {
                slot,
                reason: reason.to_string(),
            });
        }

        let orphaned = self.slots[slot].take_in_flight();
        if !orphaned.is_empty() {
            info!(slot, count = orphaned.len(), "Requeueing items of lost worker");
            self.batch.extend(orphaned);
        }

        if self.live_processors().next().is_none() {
            warn!("All processor workers have terminated");
            return self.begin_halt(HaltCause::NoProcessors);
        }

        if self.accepting_work() {
            let idle: Vec<usize> = self
                .slots
                .iter()
                .filter(|s| s.is_idle_processor())
                .map(|s| s.index)
                .collect();
            for target in idle {
                if self.batch.is_empty() {
                    break;
                }
                self.dispatch(target, self.partition_size)?;
            }
        }
        Ok(())
    }

    /// Advance phases that depend on the state of every slot
    fn check_progress(&mut self) -> Result<()> {
        match self.phase {
            Phase::Spawning => {
                if !self.halted && self.slots.iter().filter(|s| s.alive).all(|s| s.online) {
                    self.broadcast_discovery()?;
                }
            }
            Phase::AwaitingDiscovery => {
                if self.live_processors().all(|s| s.discovered) {
                    self.start_distribution()?;
                }
            }
            Phase::Distributing => {
                if self.config.finish_when_drained && self.is_settled() {
                    info!("Every item has an outcome");
                    self.begin_halt(HaltCause::Finished)?;
                }
            }
            Phase::Halting => {
                if self.live_processors().all(|s| s.drained) {
                    debug!("All processors drained");
                    self.phase = Phase::Done;
                }
            }
            Phase::Done => {}
        }
        Ok(())
    }

    /// Send `processDiscovery` to every processor, once
    fn broadcast_discovery(&mut self) -> Result<()> {
        if self.discovery_sent {
            return Ok(());
        }
        self.discovery_sent = true;
        self.phase = Phase::AwaitingDiscovery;
        info!(
            processors = self.live_processors().count(),
            "All workers online; starting discovery"
        );

        let targets: Vec<usize> = self.live_processors().map(|s| s.index).collect();
        for slot in targets {
            if let Err(e) = self.slots[slot].send(Request::ProcessDiscovery) {
                self.handle_lost(slot, &e.to_string())?;
            }
        }
        Ok(())
    }

    /// Build the batch from the discovery results and hand out the first partitions
    fn start_distribution(&mut self) -> Result<()> {
        let items = std::mem::take(&mut self.discovered);
        self.batch.extend(items);
        self.partition_size = compute_partition_size(
            self.batch.size(),
            self.slots.len(),
            self.config.partition_divisor,
        );
        self.report.partition_size = self.partition_size;
        self.phase = Phase::Distributing;

        info!(
            items = self.batch.size(),
            partition_size = self.partition_size,
            "Discovery complete; distributing"
        );

        let targets: Vec<usize> = self.live_processors().map(|s| s.index).collect();
        for slot in targets {
            if self.batch.is_empty() || !self.accepting_work() {
                break;
            }
            if self.slots[slot].alive {
                self.dispatch(slot, self.partition_size)?;
            }
        }
        self.check_progress()
    }

    /// Hand up to `n` items to `slot`
    fn dispatch(&mut self, slot: usize, n: usize) -> Result<()> {
        let items = self.batch.take_partition(n);
        if items.is_empty() {
            return Ok(());
        }

        self.slots[slot].assign(&items);
        trace!(slot, count = items.len(), remaining = self.batch.size(), "Partition sent");
        match self.slots[slot].send(Request::ProcessCollectionPart(items)) {
            Ok(()) => {
                self.report.partitions_sent += 1;
                Ok(())
            }
            Err(e) => self.handle_lost(slot, &e.to_string()),
        }
    }

    /// Send to the writer; failure is fatal
    fn write(&mut self, request: Request) -> Result<()> {
        if let Err(e) = self.slots[WRITER_SLOT].send(request) {
            self.slots[WRITER_SLOT].mark_dead();
            return Err(HerdError::WriterLost {
                slot: WRITER_SLOT,
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    fn accepting_work(&self) -> bool {
        self.phase == Phase::Distributing && !self.halted
    }

    /// Nothing queued and nothing in flight
    fn is_settled(&self) -> bool {
        self.batch.is_empty() && self.slots.iter().all(|s| s.in_flight() == 0)
    }

    fn live_processors(&self) -> impl Iterator<Item = &WorkerSlot> {
        self.slots.iter().filter(|s| s.is_processor() && s.alive)
    }

    fn publish_progress(&mut self) {
        if self.progress.is_none() {
            return;
        }
        let snapshot = self.progress();
        if let Some(callback) = self.progress.as_mut() {
            callback(&snapshot);
        }
    }

    /// Flush leftovers to the writer and stop the pool
    fn finish(mut self) -> Result<RunReport> {
        self.phase = Phase::Done;
        debug!(stats = ?self.batch.stats(), "Batch counters");

        let mut leftovers = self.batch.drain_all();
        leftovers.extend(self.discovered.drain(..));
        for slot in self.slots.iter_mut().filter(|s| s.is_processor()) {
            leftovers.extend(slot.take_in_flight());
        }

        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "Forwarding unfinished items as failure data");
            self.report.leftover = leftovers.len() as u64;
            if let Err(e) = self.write(Request::WriteFailureData(leftovers)) {
                self.stop_all();
                return Err(e);
            }
        }

        self.stop_all();
        self.report.duration = self.started.elapsed();

        info!(
            discovered = self.report.discovered,
            succeeded = self.report.succeeded,
            failure_data = self.report.failure_data(),
            failed_attempts = self.report.failed_attempts,
            duration_secs = self.report.duration.as_secs(),
            "Run completed"
        );
        Ok(self.report.clone())
    }

    /// Stop processors first, then the writer so it can flush everything
    fn stop_all(&mut self) {
        let timeout = self.config.stop_timeout;
        let order: Vec<usize> = (1..self.slots.len()).chain(std::iter::once(WRITER_SLOT)).collect();
        for index in order {
            let Some(slot) = self.slots.get_mut(index) else {
                continue;
            };
            if let Err(e) = slot.stop(timeout) {
                warn!(slot = index, error = %e, "Worker failed to stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::TEST_LOCK;
    use crate::error::{ChannelError, WorkerError};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    type Wire = Arc<Mutex<Vec<(usize, Request)>>>;

    struct RecordingHandle {
        slot: usize,
        wire: Wire,
        broken: Arc<AtomicBool>,
    }

    impl WorkerHandle for RecordingHandle {
        fn send(&mut self, request: Request) -> std::result::Result<(), ChannelError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(ChannelError::Disconnected { slot: self.slot });
            }
            self.wire.lock().push((self.slot, request));
            Ok(())
        }

        fn stop(&mut self, _timeout: Duration) -> std::result::Result<(), WorkerError> {
            Ok(())
        }
    }

    struct Harness {
        coordinator: Coordinator,
        wire: Wire,
        broken: Vec<Arc<AtomicBool>>,
    }

    impl Harness {
        fn new(config: RunConfig) -> Self {
            lifecycle::reset();
            let wire: Wire = Arc::default();
            let broken: Vec<Arc<AtomicBool>> =
                (0..config.cluster_size).map(|_| Arc::default()).collect();
            let handles = (0..config.cluster_size)
                .map(|slot| {
                    Box::new(RecordingHandle {
                        slot,
                        wire: Arc::clone(&wire),
                        broken: Arc::clone(&broken[slot]),
                    }) as Box<dyn WorkerHandle>
                })
                .collect();
            let (_tx, rx) = unbounded();
            let coordinator = Coordinator::with_handles(config, handles, rx).unwrap();
            Self {
                coordinator,
                wire,
                broken,
            }
        }

        fn send(&mut self, slot: usize, response: Response) {
            self.coordinator
                .handle_event(Inbound::message(slot, response))
                .unwrap();
        }

        fn take(&self) -> Vec<(usize, Request)> {
            std::mem::take(&mut *self.wire.lock())
        }

        fn all_online(&mut self) {
            for slot in 0..self.broken.len() {
                self.send(slot, Response::Online);
            }
        }

        /// Bring the pool to `Distributing` with `per_processor` items discovered by each
        fn distribute(&mut self, per_processor: usize) -> Vec<(usize, Request)> {
            self.all_online();
            self.take();
            for slot in 1..self.broken.len() {
                let items = (0..per_processor)
                    .map(|i| item(&format!("s{}-{}", slot, i)))
                    .collect();
                self.send(slot, Response::DiscoveryComplete(items));
            }
            self.take()
        }
    }

    fn item(name: &str) -> WorkItem {
        let baz = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        WorkItem::new(name, 0, baz)
    }

    fn config(cluster_size: usize) -> RunConfig {
        RunConfig {
            cluster_size,
            ..Default::default()
        }
    }

    fn partition_of(request: &Request) -> Vec<WorkItem> {
        match request {
            Request::ProcessCollectionPart(items) => items.clone(),
            other => panic!("Expected a partition, got {:?}", other),
        }
    }

    #[test]
    fn test_compute_partition_size() {
        assert_eq!(compute_partition_size(60, 5, 3), 4);
        assert_eq!(compute_partition_size(5, 5, 3), 1);
        assert_eq!(compute_partition_size(0, 5, 3), 1);
        assert_eq!(compute_partition_size(100, 2, 1), 50);
    }

    #[test]
    fn test_discovery_broadcast_once() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));

        h.send(0, Response::Online);
        h.send(1, Response::Online);
        assert!(h.take().is_empty());
        assert_eq!(h.coordinator.phase(), Phase::Spawning);

        h.send(2, Response::Online);
        h.send(1, Response::Online);
        h.send(2, Response::Online);

        let sent = h.take();
        assert_eq!(
            sent,
            vec![(1, Request::ProcessDiscovery), (2, Request::ProcessDiscovery)]
        );
        assert_eq!(h.coordinator.phase(), Phase::AwaitingDiscovery);
    }

    #[test]
    fn test_initial_partitions_respect_bound() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(5));
        let sent = h.distribute(15);

        assert_eq!(h.coordinator.phase(), Phase::Distributing);
        assert_eq!(h.coordinator.partition_size(), 4);
        assert_eq!(sent.len(), 4);
        for (slot, request) in &sent {
            assert!(*slot >= 1);
            assert_eq!(partition_of(request).len(), 4);
        }
        assert_eq!(h.coordinator.queued(), 60 - 16);
        assert!(h.coordinator.partition_size() <= 60 / 5);
    }

    #[test]
    fn test_tiny_batch_uses_single_item_partitions() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(5));
        h.all_online();
        h.take();
        let items: Vec<WorkItem> = ["A", "B", "C", "D", "E"].iter().map(|n| item(n)).collect();
        h.send(1, Response::DiscoveryComplete(items));
        for slot in 2..5 {
            h.send(slot, Response::DiscoveryComplete(Vec::new()));
        }

        let sent = h.take();
        assert_eq!(h.coordinator.partition_size(), 1);
        let names: Vec<String> = sent
            .iter()
            .flat_map(|(_, r)| partition_of(r))
            .map(|i| i.foo)
            .collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
        assert_eq!(h.coordinator.queued(), 1);
    }

    #[test]
    fn test_success_routes_to_writer_and_refills() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));
        let sent = h.distribute(10);
        let first = partition_of(&sent[0].1)[0].clone();

        h.send(1, Response::CollectionSuccess(first.clone()));
        let sent = h.take();
        assert_eq!(sent[0], (0, Request::WriteData(first)));
        assert_eq!(sent[1].0, 1);
        assert_eq!(partition_of(&sent[1].1).len(), h.coordinator.partition_size());
    }

    #[test]
    fn test_single_refill_policy() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(RunConfig {
            cluster_size: 3,
            partition_divisor: 1,
            refill: RefillPolicy::Single,
            ..Default::default()
        });
        let sent = h.distribute(10);
        let first = partition_of(&sent[0].1)[0].clone();

        h.send(1, Response::CollectionSuccess(first));
        let sent = h.take();
        assert_eq!(partition_of(&sent[1].1).len(), 1);
    }

    #[test]
    fn test_failure_requeues_at_tail_and_refills() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(RunConfig {
            cluster_size: 2,
            partition_divisor: 1,
            ..Default::default()
        });
        // 4 items, one processor: partition size 4 / 2 / 1 = 2
        let sent = h.distribute(4);
        let partition = partition_of(&sent[0].1);
        assert_eq!(partition.len(), 2);

        h.send(1, Response::CollectionFailure(partition[0].clone()));
        let sent = h.take();
        assert_eq!(sent.len(), 1);
        let refill = partition_of(&sent[0].1);
        assert_eq!(refill.len(), 2);
        assert_eq!(refill[0].foo, "s1-2");
        assert_eq!(refill[1].foo, "s1-3");
        assert_eq!(h.coordinator.queued(), 1);
        assert_eq!(h.coordinator.report().failed_attempts, 1);
    }

    #[test]
    fn test_duplicate_success_written_once() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));
        let sent = h.distribute(1);
        assert_eq!(sent.len(), 2);
        let held = partition_of(&sent[0].1)[0].clone();
        assert_eq!(sent[0].0, 1);

        h.send(1, Response::CollectionSuccess(held.clone()));
        h.send(2, Response::CollectionSuccess(held.clone()));

        let writes: Vec<_> = h
            .take()
            .into_iter()
            .filter(|(_, r)| matches!(r, Request::WriteData(_)))
            .collect();
        assert_eq!(writes, vec![(0, Request::WriteData(held))]);
        assert_eq!(h.coordinator.report().succeeded, 1);
        assert_eq!(h.coordinator.queued(), 0);
    }

    #[test]
    fn test_halt_stops_dispatch_but_keeps_routing() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));
        let sent = h.distribute(10);
        let in_flight = partition_of(&sent[0].1);

        h.coordinator.begin_halt(HaltCause::Timer).unwrap();
        let sent = h.take();
        assert_eq!(
            sent,
            vec![(1, Request::HaltCollection), (2, Request::HaltCollection)]
        );

        h.send(1, Response::CollectionSuccess(in_flight[0].clone()));
        assert_eq!(h.take(), vec![(0, Request::WriteData(in_flight[0].clone()))]);

        let rest = in_flight[1..].to_vec();
        h.send(1, Response::HaltedCollection(rest.clone()));
        assert_eq!(h.take(), vec![(0, Request::WriteFailureData(rest))]);

        h.send(1, Response::Drained);
        assert_eq!(h.coordinator.phase(), Phase::Halting);
        h.send(2, Response::Drained);
        assert_eq!(h.coordinator.phase(), Phase::Done);
    }

    #[test]
    fn test_lost_worker_items_go_to_idle_processors() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(RunConfig {
            cluster_size: 3,
            partition_divisor: 1,
            ..Default::default()
        });
        // 6 items, partition size 2: slot 1 works through its share and the queue
        let sent = h.distribute(3);
        let on_two = partition_of(&sent[1].1);
        let mut pending = partition_of(&sent[0].1);
        while let Some(next) = pending.pop() {
            h.send(1, Response::CollectionSuccess(next));
            for (slot, request) in h.take() {
                if slot == 1 {
                    pending.extend(partition_of(&request));
                }
            }
        }
        assert_eq!(h.coordinator.queued(), 0);

        h.coordinator
            .handle_event(Inbound::exited(2, "crashed"))
            .unwrap();
        let sent = h.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1);
        assert_eq!(partition_of(&sent[0].1), on_two);
        assert_eq!(h.coordinator.report().dead_workers, 1);

        // A late message from the lost worker is ignored
        h.send(2, Response::CollectionSuccess(on_two[0].clone()));
        assert!(h.take().is_empty());
    }

    #[test]
    fn test_failed_send_marks_worker_lost() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));
        h.broken[2].store(true, Ordering::SeqCst);
        h.all_online();

        assert_eq!(h.take(), vec![(1, Request::ProcessDiscovery)]);
        h.send(1, Response::DiscoveryComplete(vec![item("a")]));
        assert_eq!(h.coordinator.phase(), Phase::Distributing);
        assert_eq!(h.coordinator.report().dead_workers, 1);
    }

    #[test]
    fn test_losing_all_processors_halts() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(2));
        h.distribute(3);

        h.coordinator
            .handle_event(Inbound::exited(1, "crashed"))
            .unwrap();
        assert!(h.coordinator.is_halted());
        assert_eq!(h.coordinator.report().halt_cause, Some(HaltCause::NoProcessors));
        assert_eq!(h.coordinator.phase(), Phase::Done);
        assert_eq!(h.coordinator.queued(), 3);
    }

    #[test]
    fn test_losing_writer_is_fatal() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(3));
        h.all_online();

        let result = h.coordinator.handle_event(Inbound::exited(0, "gone"));
        assert!(matches!(result, Err(HerdError::WriterLost { slot: 0, .. })));
    }

    #[test]
    fn test_retry_limit_abandons_item() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(RunConfig {
            cluster_size: 2,
            max_attempts: Some(2),
            ..Default::default()
        });
        h.distribute(1);
        let flaky = item("s1-0");

        h.send(1, Response::CollectionFailure(flaky.clone()));
        assert_eq!(h.take(), vec![(1, Request::ProcessCollectionPart(vec![flaky.clone()]))]);

        h.send(1, Response::CollectionFailure(flaky.clone()));
        assert_eq!(h.take(), vec![(0, Request::WriteFailureData(vec![flaky]))]);
        assert_eq!(h.coordinator.report().abandoned, 1);
        assert_eq!(h.coordinator.queued(), 0);
    }

    #[test]
    fn test_item_failing_ten_times_then_halted() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(config(2));
        h.distribute(1);
        let stubborn = item("s1-0");

        for _ in 0..10 {
            h.send(1, Response::CollectionFailure(stubborn.clone()));
            assert_eq!(
                h.take(),
                vec![(1, Request::ProcessCollectionPart(vec![stubborn.clone()]))]
            );
        }

        h.coordinator.begin_halt(HaltCause::Timer).unwrap();
        h.take();
        h.send(1, Response::HaltedCollection(vec![stubborn.clone()]));
        assert_eq!(h.take(), vec![(0, Request::WriteFailureData(vec![stubborn]))]);
        assert_eq!(h.coordinator.report().failed_attempts, 10);
        assert_eq!(h.coordinator.report().halted_items, 1);
    }

    #[test]
    fn test_finish_when_drained() {
        let _serial = TEST_LOCK.lock();
        let mut h = Harness::new(RunConfig {
            cluster_size: 2,
            finish_when_drained: true,
            ..Default::default()
        });
        h.distribute(1);

        h.send(1, Response::CollectionSuccess(item("s1-0")));
        assert!(h.coordinator.is_halted());
        assert_eq!(h.coordinator.report().halt_cause, Some(HaltCause::Finished));
        assert_eq!(
            h.take(),
            vec![
                (0, Request::WriteData(item("s1-0"))),
                (1, Request::HaltCollection)
            ]
        );
    }

    #[test]
    fn test_second_coordinator_rejected() {
        let _serial = TEST_LOCK.lock();
        let _h = Harness::new(config(2));
        let (_tx, rx) = unbounded();
        let second = Coordinator::with_handles(config(2), Vec::new(), rx);
        assert!(matches!(second, Err(HerdError::AlreadyRunning)));
    }

    #[test]
    fn test_report_balance() {
        let report = RunReport {
            discovered: 10,
            succeeded: 6,
            halted_items: 2,
            abandoned: 1,
            leftover: 1,
            ..Default::default()
        };
        assert_eq!(report.failure_data(), 4);
        assert!(report.is_balanced());
    }
}
