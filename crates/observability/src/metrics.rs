//! 加载链路指标收集模块
//!
//! 基于 `metrics` facade 记录 worker pool、hunter、缓存与批量投递指标；
//! 同时提供内存聚合器，用于 CLI 输出摘要。

use std::collections::HashMap;

use contracts::{ErrorKind, LoadedFrom};
use metrics::{counter, gauge, histogram};

/// 记录 worker pool 线程数
pub fn record_pool_thread_count(threads: usize) {
    gauge!("hunter_pool_threads").set(threads as f64);
}

/// 记录单个任务在 worker 上的执行耗时
pub fn record_pool_job_duration_ms(duration_ms: f64) {
    histogram!("hunter_pool_job_duration_ms").record(duration_ms);
}

/// 记录新建 hunter
pub fn record_hunter_created(kind: &str) {
    counter!("hunter_hunters_created_total", "kind" => kind.to_string()).increment(1);
}

/// 记录请求挂载到已有 hunter (去重命中)
pub fn record_hunter_attached() {
    counter!("hunter_hunters_deduplicated_total").increment(1);
}

/// 记录 hunter 结束状态
///
/// `outcome`: completed / failed / cancelled / replay
pub fn record_hunter_outcome(outcome: &str) {
    counter!("hunter_hunters_finished_total", "outcome" => outcome.to_string()).increment(1);
}

/// 记录进程内重试
pub fn record_hunter_retry(kind: &str) {
    counter!("hunter_hunters_retried_total", "kind" => kind.to_string()).increment(1);
}

/// 记录存活 hunter 数量
pub fn record_live_hunters(count: usize) {
    gauge!("hunter_hunters_live").set(count as f64);
}

/// 记录内存缓存查询
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("hunter_cache_lookups_total", "result" => result).increment(1);
}

/// 记录内存缓存占用
pub fn record_cache_size(entries: usize, bytes: usize) {
    gauge!("hunter_cache_entries").set(entries as f64);
    gauge!("hunter_cache_bytes").set(bytes as f64);
}

/// 记录一次批量投递
pub fn record_batch_flushed(size: usize) {
    counter!("hunter_batches_flushed_total").increment(1);
    histogram!("hunter_batch_size").record(size as f64);
}

/// 记录单个 action 的投递结果
pub fn record_delivery(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("hunter_deliveries_total", "status" => status).increment(1);
}

/// 记录网络恢复后重放的 action 数量
pub fn record_replay_flushed(count: usize) {
    counter!("hunter_replayed_actions_total").increment(count as u64);
}

/// 加载结果聚合器
///
/// 在内存中聚合每个请求的结果，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct LoadMetricsAggregator {
    /// 请求总数
    pub total: u64,

    /// 成功数
    pub succeeded: u64,

    /// 失败数
    pub failed: u64,

    /// 各来源成功次数
    pub source_counts: HashMap<String, u64>,

    /// 各错误类型次数
    pub error_counts: HashMap<String, u64>,

    /// 端到端耗时统计 (毫秒)
    pub latency_stats: RunningStats,
}

impl LoadMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功
    pub fn record_success(&mut self, from: LoadedFrom, latency_ms: f64) {
        self.total += 1;
        self.succeeded += 1;
        *self.source_counts.entry(from.to_string()).or_insert(0) += 1;
        self.latency_stats.push(latency_ms);
    }

    /// 记录一次失败
    pub fn record_failure(&mut self, kind: ErrorKind, latency_ms: f64) {
        self.total += 1;
        self.failed += 1;
        *self.error_counts.entry(format!("{kind:?}")).or_insert(0) += 1;
        self.latency_stats.push(latency_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            success_rate: if self.total > 0 {
                self.succeeded as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            source_counts: self.source_counts.clone(),
            error_counts: self.error_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 加载摘要
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub latency_ms: StatsSummary,
    pub source_counts: HashMap<String, u64>,
    pub error_counts: HashMap<String, u64>,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Load Summary ===")?;
        writeln!(f, "Requests: {}", self.total)?;
        writeln!(
            f,
            "Succeeded: {} ({:.2}%)",
            self.succeeded, self.success_rate
        )?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.source_counts.is_empty() {
            writeln!(f, "Loaded from:")?;
            let mut sources: Vec<_> = self.source_counts.iter().collect();
            sources.sort();
            for (source, count) in sources {
                writeln!(f, "  {}: {}", source, count)?;
            }
        }

        if !self.error_counts.is_empty() {
            writeln!(f, "Errors:")?;
            let mut errors: Vec<_> = self.error_counts.iter().collect();
            errors.sort();
            for (kind, count) in errors {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
