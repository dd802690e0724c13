//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{CellularGeneration, LoaderConfig, LocatorKind, NetworkInfo};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Kinds the `fetch` command registers a source for
const CLI_SOURCES: [LocatorKind; 1] = [LocatorKind::PlainFile];

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<String>,
    config: LoaderConfig,
    locators: Vec<LocatorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    threads: Vec<ThreadInfo>,
}

#[derive(Serialize)]
struct LocatorInfo {
    kind: LocatorKind,
    retries: u32,
    replayable: bool,
    available: bool,
}

#[derive(Serialize)]
struct ThreadInfo {
    network: String,
    threads: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = ?args.config, "Loading configuration info");

    let config = load_config(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load default config".to_string(),
    })?;

    let info = build_config_info(config, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: LoaderConfig, args: &InfoArgs) -> ConfigInfo {
    let locators = LocatorKind::ALL
        .iter()
        .map(|&kind| LocatorInfo {
            kind,
            retries: kind.retry_count(config.retry.network_retry_count),
            replayable: kind.supports_replay(),
            available: CLI_SOURCES.contains(&kind),
        })
        .collect();

    let threads = if args.threads {
        connectivity_classes()
            .into_iter()
            .map(|(network, info)| ThreadInfo {
                network: network.to_string(),
                threads: worker_pool::thread_count_for(&config.pool, info.as_ref()),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        config_path: args.config.as_ref().map(|p| p.display().to_string()),
        config,
        locators,
        threads,
    }
}

fn connectivity_classes() -> Vec<(&'static str, Option<NetworkInfo>)> {
    vec![
        ("offline", None),
        ("wifi", Some(NetworkInfo::wifi())),
        ("5g", Some(NetworkInfo::cellular(CellularGeneration::G5))),
        ("4g", Some(NetworkInfo::cellular(CellularGeneration::G4))),
        ("3g", Some(NetworkInfo::cellular(CellularGeneration::G3))),
        ("2g", Some(NetworkInfo::cellular(CellularGeneration::G2))),
        ("cellular (unknown)", Some(NetworkInfo::cellular(CellularGeneration::Unknown))),
    ]
}

fn print_config_info(info: &ConfigInfo) {
    let config = &info.config;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Hunter Loader Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!(
        "📄 Source: {}",
        info.config_path.as_deref().unwrap_or("built-in defaults")
    );

    println!("\n📦 Dispatcher");
    println!("   ├─ Batch delay: {} ms", config.dispatcher.batch_delay_ms);
    println!("   ├─ Batch max size: {}", config.dispatcher.batch_max_size);
    println!(
        "   └─ Scans network changes: {}",
        config.dispatcher.scans_network_changes
    );

    let pool = &config.pool;
    println!("\n🧵 Worker Pool");
    println!("   ├─ Default: {}", pool.default_threads);
    println!("   ├─ Offline: {}", pool.offline_threads);
    println!("   ├─ Unmetered: {}", pool.unmetered_threads);
    println!("   ├─ Cellular fast: {}", pool.cellular_fast_threads);
    println!("   ├─ Cellular moderate: {}", pool.cellular_moderate_threads);
    println!("   └─ Cellular slow: {}", pool.cellular_slow_threads);

    println!("\n💾 Memory Cache");
    println!(
        "   └─ Max size: {} bytes ({:.1} MiB)",
        config.cache.max_bytes,
        config.cache.max_bytes as f64 / (1024.0 * 1024.0)
    );

    println!("\n🔗 Locators");
    for (i, locator) in info.locators.iter().enumerate() {
        let prefix = if i == info.locators.len() - 1 {
            "└─"
        } else {
            "├─"
        };
        println!(
            "   {} {:<10} retries={} replay={} {}",
            prefix,
            locator.kind.to_string(),
            locator.retries,
            locator.replayable,
            if locator.available { "✓" } else { "-" }
        );
    }

    if !info.threads.is_empty() {
        println!("\n📶 Threads by connectivity");
        for (i, entry) in info.threads.iter().enumerate() {
            let prefix = if i == info.threads.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!("   {} {}: {}", prefix, entry.network, entry.threads);
        }
    }

    println!();
}
