//! Per-printer job list
//!
//! Ordered by priority, then arrival. The job being printed stays at the
//! head until it settles, and nothing is ever inserted ahead of it.

use std::collections::VecDeque;

use crate::retry::RetryPlacement;
use crate::types::{JobId, Priority};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedJob {
    id: JobId,
    priority: Priority,
    processing: bool,
}

#[derive(Debug, Default)]
pub struct PrinterQueue {
    entries: VecDeque<QueuedJob>,
    in_flight: bool,
}

impl PrinterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// First index a new job may take: right after the last processing entry
    fn insert_floor(&self) -> usize {
        self.entries
            .iter()
            .rposition(|e| e.processing)
            .map_or(0, |i| i + 1)
    }

    /// Insert before the first job with strictly lower priority, else append.
    /// Returns the position taken.
    pub fn insert(&mut self, id: JobId, priority: Priority) -> usize {
        let floor = self.insert_floor();
        let index = self
            .entries
            .iter()
            .skip(floor)
            .position(|e| priority > e.priority)
            .map_or(self.entries.len(), |i| i + floor);
        self.entries.insert(
            index,
            QueuedJob {
                id,
                priority,
                processing: false,
            },
        );
        index
    }

    /// Put a job whose retry came due back into the list
    pub fn requeue(&mut self, id: JobId, priority: Priority, placement: RetryPlacement) -> usize {
        let floor = self.insert_floor();
        let index = match placement {
            RetryPlacement::Front => floor,
            // Ahead of its own band, behind anything more urgent
            RetryPlacement::PriorityBand => self
                .entries
                .iter()
                .skip(floor)
                .position(|e| priority >= e.priority)
                .map_or(self.entries.len(), |i| i + floor),
        };
        self.entries.insert(
            index,
            QueuedJob {
                id,
                priority,
                processing: false,
            },
        );
        index
    }

    /// Head pending job, unless the printer is busy
    pub fn next_pending(&self) -> Option<&JobId> {
        if self.in_flight {
            return None;
        }
        self.entries.iter().find(|e| !e.processing).map(|e| &e.id)
    }

    /// Mark `id` as printing and take the in-flight lock
    pub fn start(&mut self, id: &str) -> bool {
        if self.in_flight {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.processing = true;
                self.in_flight = true;
                true
            }
            None => false,
        }
    }

    /// Drop a settled job and release the in-flight lock
    pub fn finish(&mut self, id: &str) -> bool {
        let removed = match self.entries.iter().position(|e| e.id == id) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        };
        self.in_flight = false;
        removed
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Job ids in dispatch order
    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.entries.iter().map(|e| &e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(queue: &PrinterQueue) -> Vec<&str> {
        queue.job_ids().map(String::as_str).collect()
    }

    #[test]
    fn test_priority_insertion() {
        let mut q = PrinterQueue::new();
        q.insert("n1".into(), Priority::Normal);
        q.insert("l1".into(), Priority::Low);
        q.insert("n2".into(), Priority::Normal);
        q.insert("h1".into(), Priority::High);
        q.insert("h2".into(), Priority::High);
        q.insert("l2".into(), Priority::Low);

        assert_eq!(ids(&q), vec!["h1", "h2", "n1", "n2", "l1", "l2"]);
    }

    #[test]
    fn test_never_ahead_of_processing() {
        let mut q = PrinterQueue::new();
        q.insert("low".into(), Priority::Low);
        assert!(q.start("low"));

        let index = q.insert("high".into(), Priority::High);
        assert_eq!(index, 1);
        assert_eq!(ids(&q), vec!["low", "high"]);
    }

    #[test]
    fn test_in_flight_lock() {
        let mut q = PrinterQueue::new();
        q.insert("a".into(), Priority::Normal);
        q.insert("b".into(), Priority::Normal);

        assert_eq!(q.next_pending().map(String::as_str), Some("a"));
        assert!(q.start("a"));
        assert!(q.is_in_flight());
        assert_eq!(q.next_pending(), None);
        assert!(!q.start("b"));

        assert!(q.finish("a"));
        assert!(!q.is_in_flight());
        assert_eq!(q.next_pending().map(String::as_str), Some("b"));
    }

    #[test]
    fn test_requeue_front() {
        let mut q = PrinterQueue::new();
        q.insert("h".into(), Priority::High);
        q.insert("n".into(), Priority::Normal);

        q.requeue("retry".into(), Priority::Low, RetryPlacement::Front);
        assert_eq!(ids(&q), vec!["retry", "h", "n"]);
    }

    #[test]
    fn test_requeue_priority_band() {
        let mut q = PrinterQueue::new();
        q.insert("h".into(), Priority::High);
        q.insert("n1".into(), Priority::Normal);
        q.insert("n2".into(), Priority::Normal);

        q.requeue("retry".into(), Priority::Normal, RetryPlacement::PriorityBand);
        assert_eq!(ids(&q), vec!["h", "retry", "n1", "n2"]);
    }

    #[test]
    fn test_finish_unknown_still_releases() {
        let mut q = PrinterQueue::new();
        q.insert("a".into(), Priority::Normal);
        q.start("a");
        assert!(!q.finish("zzz"));
        assert!(!q.is_in_flight());
        assert_eq!(q.len(), 1);
    }
}
