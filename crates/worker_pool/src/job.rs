//! Job trait and the priority-ordered waiting queue entry

use std::cmp::Ordering;
use std::sync::Arc;

use contracts::Priority;

/// Unit of work executed by the [`WorkerPool`](crate::WorkerPool)
///
/// `run` executes on a blocking thread and may block (I/O, decoding).
/// Jobs are shared: the submitter keeps its own `Arc` to observe and cancel
/// the job while it waits or runs, and `run` receives the pool's `Arc` so a
/// job can hand itself on when it finishes.
pub trait Job: Send + Sync + 'static {
    /// Scheduling priority. Read when the job is queued and again on
    /// [`WorkerPool::reprioritize`](crate::WorkerPool::reprioritize).
    fn priority(&self) -> Priority;

    /// Cancelled jobs are dropped when they reach the head of the queue
    fn is_cancelled(&self) -> bool;

    fn run(self: Arc<Self>);
}

/// A job waiting for a permit.
///
/// Ordered by priority (higher first), then by sequence number (FIFO within
/// the same priority).
pub(crate) struct WaitingJob<J> {
    pub job: Arc<J>,
    pub priority: Priority,
    pub sequence: u64,
}

impl<J> PartialEq for WaitingJob<J> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<J> Eq for WaitingJob<J> {}

impl<J> PartialOrd for WaitingJob<J> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<J> Ord for WaitingJob<J> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then lower sequence (older) first
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn waiting(priority: Priority, sequence: u64) -> WaitingJob<()> {
        WaitingJob {
            job: Arc::new(()),
            priority,
            sequence,
        }
    }

    #[test]
    fn test_higher_priority_first() {
        let mut heap = BinaryHeap::new();
        heap.push(waiting(Priority::Low, 0));
        heap.push(waiting(Priority::High, 1));
        heap.push(waiting(Priority::Normal, 2));

        assert_eq!(heap.pop().unwrap().priority, Priority::High);
        assert_eq!(heap.pop().unwrap().priority, Priority::Normal);
        assert_eq!(heap.pop().unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_fifo_within_same_priority() {
        let mut heap = BinaryHeap::new();
        for sequence in [3, 1, 2] {
            heap.push(waiting(Priority::Normal, sequence));
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|w| w.sequence)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
