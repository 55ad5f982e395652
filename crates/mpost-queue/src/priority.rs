//! Priority ordering for pending jobs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::job::QueuedJob;

struct Entry {
    priority: i32,
    seq: u64,
    job: QueuedJob,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: higher priority first, then lower sequence (earlier) first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending jobs ordered by priority, FIFO within a priority.
///
/// Not synchronized: owned by the single executor task.
#[derive(Default)]
pub struct PriorityJobQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl PriorityJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: QueuedJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority: job.priority,
            seq,
            job,
        });
    }

    /// Remove the highest-priority, earliest-submitted job.
    pub fn pop(&mut self) -> Option<QueuedJob> {
        self.heap.pop().map(|entry| entry.job)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpost_models::Job;

    fn queued(priority: i32) -> QueuedJob {
        QueuedJob::from_job(&Job::new("user-1", 1)).with_priority(priority)
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PriorityJobQueue::new();
        let low = queued(1);
        let high = queued(10);
        let low_id = low.job_id.clone();
        let high_id = high.job_id.clone();

        queue.push(low);
        queue.push(high);

        assert_eq!(queue.pop().unwrap().job_id, high_id);
        assert_eq!(queue.pop().unwrap().job_id, low_id);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PriorityJobQueue::new();
        let jobs: Vec<QueuedJob> = (0..5).map(|_| queued(3)).collect();
        let ids: Vec<_> = jobs.iter().map(|j| j.job_id.clone()).collect();
        for job in jobs {
            queue.push(job);
        }

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|j| j.job_id).collect();
        assert_eq!(popped, ids);
    }

    #[test]
    fn test_mixed_ordering() {
        let mut queue = PriorityJobQueue::new();
        let a = queued(0);
        let b = queued(5);
        let c = queued(0);
        let d = queued(5);
        let expected = vec![
            b.job_id.clone(),
            d.job_id.clone(),
            a.job_id.clone(),
            c.job_id.clone(),
        ];
        for job in [a, b, c, d] {
            queue.push(job);
        }
        assert_eq!(queue.len(), 4);

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|j| j.job_id).collect();
        assert_eq!(popped, expected);
        assert!(queue.is_empty());
    }
}
