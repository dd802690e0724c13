//! # Worker Pool
//!
//! 有界、按优先级调度、可动态调整并发度的执行器。
//!
//! 负责：
//! - 按 `Priority` (高优先) + 提交顺序 (FIFO) 排队
//! - 以 semaphore permit 限制并发，在阻塞线程上执行 `Job::run`
//! - 根据网络状况调整线程数 (`adjust_thread_count`)
//! - 关闭后拒绝新任务，已在运行的任务自然结束

mod error;
mod job;
mod pool;
mod sizing;

pub use error::PoolError;
pub use job::Job;
pub use pool::{PoolSnapshot, WorkerPool};
pub use sizing::thread_count_for;
