//! 配置校验模块
//!
//! 校验规则：
//! - 各类线程数 > 0
//! - offline_threads <= default_threads <= unmetered_threads
//! - batch_max_size > 0
//! - cache.max_bytes > 0

use contracts::{ContractError, LoaderConfig};

/// 校验 LoaderConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &LoaderConfig) -> Result<(), ContractError> {
    validate_thread_counts(config)?;
    validate_thread_ordering(config)?;
    validate_dispatcher(config)?;
    validate_cache(config)?;
    Ok(())
}

/// 校验线程数为正
fn validate_thread_counts(config: &LoaderConfig) -> Result<(), ContractError> {
    let pool = &config.pool;
    let counts = [
        ("pool.default_threads", pool.default_threads),
        ("pool.offline_threads", pool.offline_threads),
        ("pool.unmetered_threads", pool.unmetered_threads),
        ("pool.cellular_fast_threads", pool.cellular_fast_threads),
        ("pool.cellular_moderate_threads", pool.cellular_moderate_threads),
        ("pool.cellular_slow_threads", pool.cellular_slow_threads),
    ];
    for (field, value) in counts {
        if value == 0 {
            return Err(ContractError::config_validation(
                field,
                "thread count must be > 0",
            ));
        }
    }
    Ok(())
}

/// 校验线程数的大小关系
fn validate_thread_ordering(config: &LoaderConfig) -> Result<(), ContractError> {
    let pool = &config.pool;
    if pool.offline_threads > pool.default_threads {
        return Err(ContractError::config_validation(
            "pool.offline_threads / pool.default_threads",
            format!(
                "offline_threads ({}) must be <= default_threads ({})",
                pool.offline_threads, pool.default_threads
            ),
        ));
    }
    if pool.default_threads > pool.unmetered_threads {
        return Err(ContractError::config_validation(
            "pool.default_threads / pool.unmetered_threads",
            format!(
                "default_threads ({}) must be <= unmetered_threads ({})",
                pool.default_threads, pool.unmetered_threads
            ),
        ));
    }
    Ok(())
}

/// 校验 dispatcher 批处理配置
fn validate_dispatcher(config: &LoaderConfig) -> Result<(), ContractError> {
    if config.dispatcher.batch_max_size == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.batch_max_size",
            "batch_max_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验缓存配置
fn validate_cache(config: &LoaderConfig) -> Result<(), ContractError> {
    if config.cache.max_bytes == 0 {
        return Err(ContractError::config_validation(
            "cache.max_bytes",
            "max_bytes must be > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&LoaderConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_thread_count() {
        let mut config = LoaderConfig::default();
        config.pool.cellular_slow_threads = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("pool.cellular_slow_threads"));
    }

    #[test]
    fn test_offline_above_default() {
        let mut config = LoaderConfig::default();
        config.pool.offline_threads = 5;
        config.pool.unmetered_threads = 8;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("offline_threads"));
    }

    #[test]
    fn test_default_above_unmetered() {
        let mut config = LoaderConfig::default();
        config.pool.default_threads = 6;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("unmetered_threads"));
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = LoaderConfig::default();
        config.dispatcher.batch_max_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ContractError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_zero_cache_size() {
        let mut config = LoaderConfig::default();
        config.cache.max_bytes = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("cache.max_bytes"));
    }
}
