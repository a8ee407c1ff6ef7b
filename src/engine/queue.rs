//! FIFO work queue
//!
//! An ordered buffer of pending items. Items are appended at the tail and
//! taken from the head in blocks, so the oldest remaining item always
//! leaves first.

use std::collections::VecDeque;

/// Counters for a work queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Total items appended (initial load included)
    pub enqueued: u64,

    /// Total items handed out by `take`
    pub dequeued: u64,

    /// Number of `take` calls that returned fewer items than asked for
    pub short_takes: u64,
}

/// Ordered, mutable buffer of pending items
#[derive(Debug, Clone)]
pub struct WorkQueue<T> {
    items: VecDeque<T>,
    stats: QueueStats,
}

impl<T> WorkQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            stats: QueueStats::default(),
        }
    }

    /// Create a queue holding `items` in their given order
    pub fn from_items(items: Vec<T>) -> Self {
        let stats = QueueStats {
            enqueued: items.len() as u64,
            ..QueueStats::default()
        };
        Self {
            items: VecDeque::from(items),
            stats,
        }
    }

    /// Append an item at the tail
    pub fn append(&mut self, item: T) {
        self.items.push_back(item);
        self.stats.enqueued += 1;
    }

    /// Remove and return the first `min(n, len)` items, oldest first
    pub fn take(&mut self, n: usize) -> Vec<T> {
        let count = n.min(self.items.len());
        if count < n {
            self.stats.short_takes += 1;
        }
        self.stats.dequeued += count as u64;
        self.items.drain(..count).collect()
    }

    /// Current number of pending items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queue counters
    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Extend<T> for WorkQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.append(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_fifo() {
        let mut queue = WorkQueue::from_items(vec!['a', 'b', 'c', 'd', 'e']);

        assert_eq!(queue.take(2), vec!['a', 'b']);
        queue.append('f');
        assert_eq!(queue.take(3), vec!['c', 'd', 'e']);
        assert_eq!(queue.take(3), vec!['f']);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_zero_returns_nothing() {
        let mut queue = WorkQueue::from_items(vec![1, 2, 3]);
        assert!(queue.take(0).is_empty());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_take_more_than_len_drains() {
        let mut queue = WorkQueue::from_items(vec![1, 2]);
        assert_eq!(queue.take(10), vec![1, 2]);
        assert!(queue.is_empty());
        assert!(queue.take(1).is_empty());
        assert_eq!(queue.stats().short_takes, 2);
    }

    #[test]
    fn test_interleaved_append_take_keeps_order() {
        let mut queue = WorkQueue::new();
        let mut expected = Vec::new();
        let mut taken = Vec::new();

        for round in 0..20u32 {
            for k in 0..(round % 4) {
                let value = round * 10 + k;
                queue.append(value);
                expected.push(value);
            }
            taken.extend(queue.take((round % 3) as usize));
        }
        taken.extend(queue.take(usize::MAX));

        assert_eq!(taken, expected);
    }

    #[test]
    fn test_stats() {
        let mut queue = WorkQueue::from_items(vec![1, 2, 3]);
        queue.append(4);
        queue.extend([5, 6]);
        queue.take(4);

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 6);
        assert_eq!(stats.dequeued, 4);
        assert_eq!(stats.short_takes, 0);
    }
}
