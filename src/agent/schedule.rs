//! Deadline heap of simulated work units
//!
//! Every item of a partition becomes an independent unit with its own due
//! time. The agent loop sleeps until the earliest deadline or the next
//! inbound message, whichever comes first, so pending units never block
//! message handling. Cancelled units leave stale heap entries behind; they
//! are skipped when they reach the top.

use crate::item::WorkItem;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// One scheduled unit
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Partition the unit belongs to
    pub partition: u64,

    /// The item being worked on
    pub item: WorkItem,
}

/// Pending units ordered by due time
#[derive(Debug, Default)]
pub struct Schedule {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    units: HashMap<u64, Unit>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit that completes at `due`
    pub fn push(&mut self, partition: u64, item: WorkItem, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((due, seq)));
        self.units.insert(seq, Unit { partition, item });
    }

    /// Earliest deadline among live units
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((due, _))| *due)
    }

    /// Remove and return the earliest unit if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<Unit> {
        self.discard_stale();
        match self.heap.peek() {
            Some(Reverse((due, _))) if *due <= now => {
                let Reverse((_, seq)) = self.heap.pop()?;
                self.units.remove(&seq)
            }
            _ => None,
        }
    }

    /// Cancel every pending unit of `partition`, returning their items in
    /// scheduling order
    pub fn cancel_partition(&mut self, partition: u64) -> Vec<WorkItem> {
        let mut seqs: Vec<u64> = self
            .units
            .iter()
            .filter(|(_, unit)| unit.partition == partition)
            .map(|(seq, _)| *seq)
            .collect();
        seqs.sort_unstable();

        seqs.into_iter()
            .filter_map(|seq| self.units.remove(&seq))
            .map(|unit| unit.item)
            .collect()
    }

    /// Number of live units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse((_, seq))) = self.heap.peek() {
            if self.units.contains_key(seq) {
                break;
            }
            self.heap.pop();
        }
    }
}
