//! The coordinator's batch of pending work

use crate::engine::queue::{QueueStats, WorkQueue};
use crate::item::WorkItem;

/// Pending work items, handed out in partitions.
///
/// Failed items re-enter at the tail, so retries are served after every
/// item that was already waiting.
#[derive(Debug, Default)]
pub struct WorkBatch {
    queue: WorkQueue<WorkItem>,
}

impl WorkBatch {
    /// Build a batch from discovered items, preserving their order
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            queue: WorkQueue::from_items(items),
        }
    }

    /// Number of items still waiting
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Check if no items are waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the next partition of at most `n` items
    pub fn take_partition(&mut self, n: usize) -> Vec<WorkItem> {
        self.queue.take(n)
    }

    /// Put a failed item back at the tail
    pub fn requeue(&mut self, item: WorkItem) {
        self.queue.append(item);
    }

    /// Return several items at once (a dead worker's in-flight shard)
    pub fn extend(&mut self, items: impl IntoIterator<Item = WorkItem>) {
        self.queue.extend(items);
    }

    /// Empty the batch
    pub fn drain_all(&mut self) -> Vec<WorkItem> {
        self.queue.take(self.queue.len())
    }

    /// Queue counters
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn items(names: &[&str]) -> Vec<WorkItem> {
        let now = Utc::now();
        names.iter().map(|n| WorkItem::new(*n, 0, now)).collect()
    }

    fn names(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|i| i.foo.as_str()).collect()
    }

    #[test]
    fn test_size_tracks_queue() {
        let mut batch = WorkBatch::new(items(&["a", "b", "c"]));
        assert_eq!(batch.size(), 3);

        batch.take_partition(2);
        assert_eq!(batch.size(), 1);

        batch.requeue(items(&["x"]).remove(0));
        assert_eq!(batch.size(), 2);
    }

    #[test]
    fn test_requeue_goes_to_tail() {
        let mut batch = WorkBatch::new(items(&["a", "b", "c"]));
        let first = batch.take_partition(1);
        batch.requeue(first[0].clone());

        assert_eq!(names(&batch.take_partition(3)), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_drain_all() {
        let mut batch = WorkBatch::new(items(&["a", "b"]));
        batch.extend(items(&["c"]));
        assert_eq!(names(&batch.drain_all()), vec!["a", "b", "c"]);
        assert!(batch.is_empty());
    }
}
