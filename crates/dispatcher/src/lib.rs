//! # Dispatcher
//!
//! 图片请求调度模块。
//!
//! 负责：
//! - 相同 fingerprint 的请求去重，共享一个 `Hunter`
//! - 在单个 actor 任务中串行处理提交、取消、暂停/恢复、重试与网络变化
//! - 将完成结果批量交给投递任务，由 `MainSink` 逐个回调
//! - `Loader` 作为组合根，持有缓存、线程池、调度器与网络监听

pub mod action;
pub mod cache;
pub mod connectivity;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handle;
pub mod hunter;
pub mod loader;
pub mod metrics;
pub mod registry;

pub use action::{Action, ActionId, ActionRef, ActionSlot, LoadResult, Loaded};
pub use cache::{CacheStats, LruMemoryCache};
pub use connectivity::{Broadcast, ConnectivityMonitor};
pub use delivery::{CallbackSink, Delivery, DeliveryItem, MainSink};
pub use dispatcher::{Command, DispatcherCore, DispatcherSnapshot};
pub use error::DispatcherError;
pub use executor::HunterExecutor;
pub use handle::DispatcherHandle;
pub use hunter::{Hunter, HunterContext, HunterEvent, HunterOutcome, HunterState};
pub use loader::{LoadBuilder, Loader, LoaderBuilder, LoaderSnapshot, Ticket};
pub use metrics::{DeliveryMetrics, DeliverySnapshot};
pub use registry::SourceSet;
