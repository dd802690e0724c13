//! Delivery metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by the delivery task
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Batches handed over by the dispatcher
    batch_count: AtomicU64,
    /// Results delivered outside a batch (memory hits, unsupported locators)
    immediate_count: AtomicU64,
    /// Actions that received an image
    success_count: AtomicU64,
    /// Actions that received an error
    error_count: AtomicU64,
}

impl DeliveryMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    pub fn inc_batch_count(&self) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn immediate_count(&self) -> u64 {
        self.immediate_count.load(Ordering::Relaxed)
    }

    pub fn inc_immediate_count(&self) {
        self.immediate_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn inc_success_count(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn inc_error_count(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            batch_count: self.batch_count(),
            immediate_count: self.immediate_count(),
            success_count: self.success_count(),
            error_count: self.error_count(),
        }
    }
}

/// Snapshot of delivery metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySnapshot {
    pub batch_count: u64,
    pub immediate_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = DeliveryMetrics::new();
        metrics.inc_batch_count();
        metrics.inc_success_count();
        metrics.inc_success_count();
        metrics.inc_error_count();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batch_count, 1);
        assert_eq!(snapshot.immediate_count, 0);
        assert_eq!(snapshot.success_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }
}
