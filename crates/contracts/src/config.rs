//! Loader configuration contracts shared across crates.

use serde::{Deserialize, Serialize};

/// Top-level loader configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Dispatcher and batching
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub pool: PoolConfig,

    /// Memory cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry budget
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Delay before a pending completion batch is flushed (milliseconds)
    pub batch_delay_ms: u64,
    /// Flush immediately once this many hunters are batched
    pub batch_max_size: usize,
    /// Track connectivity; enables replay of failed network requests
    pub scans_network_changes: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 200,
            batch_max_size: 32,
            scans_network_changes: true,
        }
    }
}

/// Thread counts per connectivity class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Used before any connectivity is known and for unknown links
    pub default_threads: usize,
    /// No network / disconnected
    pub offline_threads: usize,
    /// Wi-Fi, WiMAX, Ethernet
    pub unmetered_threads: usize,
    /// LTE / 5G
    pub cellular_fast_threads: usize,
    /// 3G
    pub cellular_moderate_threads: usize,
    /// 2G
    pub cellular_slow_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_threads: 3,
            offline_threads: 1,
            unmetered_threads: 4,
            cellular_fast_threads: 3,
            cellular_moderate_threads: 2,
            cellular_slow_threads: 1,
        }
    }
}

/// Memory cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on decoded pixel bytes kept in memory
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// In-process retries for network locators
    pub network_retry_count: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_retry_count: 2,
        }
    }
}
