//! Worker pool error types

use thiserror::Error;

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Pool has been shut down and rejects new jobs
    #[error("worker pool is shut down")]
    Shutdown,
}
