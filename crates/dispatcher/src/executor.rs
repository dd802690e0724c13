//! Seam between the dispatcher and the worker pool

use std::sync::Arc;

use contracts::NetworkInfo;
use worker_pool::{PoolError, WorkerPool};

use crate::hunter::Hunter;

/// Where the dispatcher submits hunters
///
/// Implemented by [`WorkerPool<Hunter>`]; tests substitute an executor that
/// records submissions and runs them by hand.
pub trait HunterExecutor: Send + Sync {
    /// Queue a hunter for execution
    ///
    /// # Errors
    /// [`PoolError::Shutdown`] once the executor stopped accepting work.
    fn submit(&self, hunter: Arc<Hunter>) -> Result<(), PoolError>;

    /// Re-rank a queued hunter whose priority was raised by an attach
    fn reprioritize(&self, hunter: &Arc<Hunter>);

    fn adjust_thread_count(&self, info: Option<&NetworkInfo>);

    fn is_shutdown(&self) -> bool;

    fn shutdown(&self);
}

impl HunterExecutor for WorkerPool<Hunter> {
    fn submit(&self, hunter: Arc<Hunter>) -> Result<(), PoolError> {
        WorkerPool::submit(self, hunter)
    }

    fn reprioritize(&self, hunter: &Arc<Hunter>) {
        WorkerPool::reprioritize(self, hunter);
    }

    fn adjust_thread_count(&self, info: Option<&NetworkInfo>) {
        WorkerPool::adjust_thread_count(self, info);
    }

    fn is_shutdown(&self) -> bool {
        WorkerPool::is_shutdown(self)
    }

    fn shutdown(&self) {
        WorkerPool::shutdown(self);
    }
}

impl<T: HunterExecutor + ?Sized> HunterExecutor for Arc<T> {
    fn submit(&self, hunter: Arc<Hunter>) -> Result<(), PoolError> {
        (**self).submit(hunter)
    }

    fn reprioritize(&self, hunter: &Arc<Hunter>) {
        (**self).reprioritize(hunter);
    }

    fn adjust_thread_count(&self, info: Option<&NetworkInfo>) {
        (**self).adjust_thread_count(info);
    }

    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }

    fn shutdown(&self) {
        (**self).shutdown();
    }
}
