//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::LoaderConfig;
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    batch_delay_ms: u64,
    batch_max_size: usize,
    scans_network_changes: bool,
    default_threads: usize,
    cache_max_bytes: usize,
    network_retry_count: u32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(Some(&args.config)) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    batch_delay_ms: config.dispatcher.batch_delay_ms,
                    batch_max_size: config.dispatcher.batch_max_size,
                    scans_network_changes: config.dispatcher.scans_network_changes,
                    default_threads: config.pool.default_threads,
                    cache_max_bytes: config.cache.max_bytes,
                    network_retry_count: config.retry.network_retry_count,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &LoaderConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.dispatcher.scans_network_changes {
        warnings.push(
            "dispatcher.scans_network_changes is off - failed network requests are never replayed"
                .to_string(),
        );
    }

    if config.dispatcher.batch_delay_ms == 0 {
        warnings.push(
            "dispatcher.batch_delay_ms is 0 - completions are delivered without batching delay"
                .to_string(),
        );
    }

    if config.dispatcher.batch_max_size == 1 {
        warnings.push("dispatcher.batch_max_size is 1 - every completion flushes on its own".to_string());
    }

    if config.retry.network_retry_count == 0 {
        warnings.push("retry.network_retry_count is 0 - network requests are never retried".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!(
                "\n  Batching: {} ms / {} hunters",
                summary.batch_delay_ms, summary.batch_max_size
            );
            println!("  Network scanning: {}", summary.scans_network_changes);
            println!("  Default threads: {}", summary.default_threads);
            println!("  Cache: {} bytes", summary.cache_max_bytes);
            println!("  Network retries: {}", summary.network_retry_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
