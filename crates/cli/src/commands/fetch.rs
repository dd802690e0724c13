//! `fetch` command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{
    LoadError, Locator, LocatorKind, LoaderConfig, MemoryPolicy, Request, TargetId,
};
use dispatcher::{Broadcast, LoadResult, Loader, SourceSet};
use observability::metrics::LoadMetricsAggregator;
use serde::Serialize;
use sources::{FileSource, ImageDecoder};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::load_config;
use crate::cli::FetchArgs;
use crate::error::CliError;

/// Outcome of one locator, for text and JSON output
#[derive(Debug, Serialize)]
struct FetchOutcome {
    locator: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    latency_ms: f64,
}

/// Execute the `fetch` command
#[instrument(name = "cli_fetch", skip(args), fields(locators = args.locators.len()))]
pub async fn run_fetch(args: &FetchArgs) -> Result<()> {
    let config = effective_config(args)?;
    let locators = collect_locators(args)?;
    if locators.is_empty() {
        return Err(CliError::NoLocators.into());
    }

    let loader = build_loader(config)?;
    if let Some(network) = args.network {
        info!(network = ?network, "Announcing connectivity");
        loader
            .monitor()
            .on_broadcast(Some(Broadcast::Connectivity(network.info())));
    }

    let outcomes = tokio::select! {
        outcomes = load_all(&loader, args, &locators) => Some(outcomes),
        _ = shutdown_signal() => None,
    };

    let Some(outcomes) = outcomes else {
        warn!("Received shutdown signal, cancelling pending loads...");
        loader.shutdown().await;
        return Ok(());
    };

    let mut aggregator = LoadMetricsAggregator::new();
    for (outcome, result) in &outcomes {
        match result {
            Ok(loaded) => aggregator.record_success(loaded.from, outcome.latency_ms),
            Err(e) => aggregator.record_failure(e.kind(), outcome.latency_ms),
        }
    }

    if let Ok(snapshot) = loader.snapshot().await {
        debug!(
            pool_completed = snapshot.pool.completed,
            batches = snapshot.delivery.batch_count,
            cache_entries = snapshot.cache_entries,
            "Loader state before shutdown"
        );
    }
    loader.shutdown().await;

    let outcomes: Vec<FetchOutcome> = outcomes.into_iter().map(|(outcome, _)| outcome).collect();
    if args.json {
        let json = serde_json::to_string_pretty(&outcomes)
            .context("Failed to serialize fetch results")?;
        println!("{}", json);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
        println!();
        print!("{}", aggregator.summary());
    }

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    if failed > 0 {
        anyhow::bail!("{} of {} requests failed", failed, outcomes.len());
    }
    Ok(())
}

/// Configuration file plus CLI overrides, validated again after overriding
fn effective_config(args: &FetchArgs) -> Result<LoaderConfig> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(threads) = args.threads {
        let pool = &mut config.pool;
        pool.default_threads = threads;
        pool.unmetered_threads = pool.unmetered_threads.max(threads);
        pool.offline_threads = pool.offline_threads.min(threads);
    }
    if let Some(delay) = args.batch_delay_ms {
        config.dispatcher.batch_delay_ms = delay;
    }

    config_loader::ConfigLoader::validate(&config)
        .map_err(|e| CliError::config_invalid(e.to_string()))?;
    Ok(config)
}

/// Positional locators followed by the lines of `--input`
fn collect_locators(args: &FetchArgs) -> Result<Vec<Locator>, CliError> {
    let mut raw = args.locators.clone();
    if let Some(input) = &args.input {
        let content = std::fs::read_to_string(input)
            .map_err(|e| CliError::input_read(input.display().to_string(), e))?;
        raw.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(raw.iter().map(|s| to_locator(s)).collect())
}

/// Relative paths that exist on disk become `file://` locators
fn to_locator(raw: &str) -> Locator {
    let locator = Locator::new(raw);
    if locator.kind() != LocatorKind::Unrecognized {
        return locator;
    }
    match Path::new(raw).canonicalize() {
        Ok(path) => Locator::from_path(path),
        Err(_) => locator,
    }
}

fn build_loader(config: LoaderConfig) -> Result<Loader> {
    let sources = SourceSet::new().with(LocatorKind::PlainFile, Arc::new(FileSource::new()));
    Loader::builder()
        .config(config)
        .sources(sources)
        .decoder(Arc::new(ImageDecoder::new()))
        .build()
        .map_err(|e| CliError::loader_build(e.to_string()).into())
}

fn build_request(args: &FetchArgs, locator: Locator) -> Request {
    let mut request = Request::new(locator).priority(args.priority.into());
    if let Some((width, height)) = args.resize {
        request = request.resize(width, height);
        if args.center_crop {
            request = request.center_crop();
        } else if args.center_inside {
            request = request.center_inside();
        }
    }
    if let Some(degrees) = args.rotate {
        request = request.rotate(degrees);
    }
    if args.skip_memory_cache {
        request = request.memory_policy(MemoryPolicy::NO_CACHE | MemoryPolicy::NO_STORE);
    }
    request
}

/// Submit everything up front so equal requests share one hunter, then
/// collect results in submission order
async fn load_all(
    loader: &Loader,
    args: &FetchArgs,
    locators: &[Locator],
) -> Vec<(FetchOutcome, LoadResult)> {
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for (index, locator) in locators.iter().enumerate() {
        let mut builder = loader
            .load(build_request(args, locator.clone()))
            .target(TargetId(index as u64));
        if let Some(tag) = &args.tag {
            builder = builder.tag(tag.as_str());
        }
        let ticket = builder.submit();
        let action = ticket.action().clone();
        let handle = loader.handle().clone();

        tasks.spawn(async move {
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, ticket.wait()).await {
                    Ok(result) => result,
                    Err(_) => {
                        handle.cancel(action);
                        Err(LoadError::Transient {
                            message: format!("timed out after {}s", limit.as_secs()),
                            content_length: false,
                        })
                    }
                },
                None => ticket.wait().await,
            };
            (index, result, started.elapsed())
        });
    }

    let mut results: Vec<Option<(FetchOutcome, LoadResult)>> =
        locators.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, result, elapsed) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Load task failed");
                continue;
            }
        };
        let outcome = describe(&locators[index], &result, elapsed);
        results[index] = Some((outcome, result));
    }

    results.into_iter().flatten().collect()
}

fn describe(locator: &Locator, result: &LoadResult, elapsed: Duration) -> FetchOutcome {
    let latency_ms = elapsed.as_secs_f64() * 1000.0;
    match result {
        Ok(loaded) => FetchOutcome {
            locator: locator.to_string(),
            ok: true,
            width: Some(loaded.image.width),
            height: Some(loaded.image.height),
            from: Some(loaded.from.to_string()),
            error: None,
            latency_ms,
        },
        Err(e) => FetchOutcome {
            locator: locator.to_string(),
            ok: false,
            width: None,
            height: None,
            from: None,
            error: Some(e.to_string()),
            latency_ms,
        },
    }
}

fn print_outcome(outcome: &FetchOutcome) {
    match (outcome.ok, outcome.width, outcome.height) {
        (true, Some(width), Some(height)) => println!(
            "✓ {}  {}x{}  from {}  ({:.1} ms)",
            outcome.locator,
            width,
            height,
            outcome.from.as_deref().unwrap_or("?"),
            outcome.latency_ms
        ),
        _ => println!(
            "✗ {}  {}  ({:.1} ms)",
            outcome.locator,
            outcome.error.as_deref().unwrap_or("unknown error"),
            outcome.latency_ms
        ),
    }
}

/// Resolves on Ctrl+C or SIGTERM; never resolves if no handler could be installed
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::io::Write;

    fn fetch_args(argv: &[&str]) -> FetchArgs {
        let mut full = vec!["hunter", "fetch"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Fetch(args) => args,
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_thread_override_keeps_ordering_valid() {
        let args = fetch_args(&["/a.png", "--threads", "8"]);
        let config = effective_config(&args).unwrap();
        assert_eq!(config.pool.default_threads, 8);
        assert!(config.pool.unmetered_threads >= 8);
        assert!(config.pool.offline_threads <= 8);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let args = fetch_args(&["/a.png", "--threads", "0"]);
        assert!(effective_config(&args).is_err());
    }

    #[test]
    fn test_collect_locators_reads_input_file() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        writeln!(list, "# comment\n/b.png\n\nhttps://x.io/c.png").unwrap();
        let path = list.path().to_string_lossy().to_string();

        let args = fetch_args(&["/a.png", "--input", &path]);
        let locators = collect_locators(&args).unwrap();
        let kinds: Vec<_> = locators.iter().map(Locator::kind).collect();
        assert_eq!(
            kinds,
            vec![
                LocatorKind::PlainFile,
                LocatorKind::PlainFile,
                LocatorKind::Network
            ]
        );
    }

    #[test]
    fn test_missing_input_file() {
        let args = fetch_args(&["--input", "/no/such/list.txt"]);
        assert!(matches!(
            collect_locators(&args),
            Err(CliError::InputRead { .. })
        ));
    }

    #[test]
    fn test_to_locator_classification() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pic.png");
        std::fs::write(&file, b"x").unwrap();

        // Absolute paths are already recognised
        assert_eq!(to_locator(&file.to_string_lossy()).kind(), LocatorKind::PlainFile);
        assert_eq!(to_locator("not-a-file.png").kind(), LocatorKind::Unrecognized);
    }

    #[test]
    fn test_build_request_applies_transformations() {
        let args = fetch_args(&["/a.png", "--resize", "32x16", "--center-inside", "--rotate", "90"]);
        let request = build_request(&args, Locator::new("/a.png"));
        let key = request.fingerprint();
        assert!(key.as_str().contains("resize:32x16"));
        assert!(key.as_str().contains("centerInside"));
        assert!(key.as_str().contains("rotation:"));
    }

    #[tokio::test]
    async fn test_load_all_reports_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");

        let args = fetch_args(&["/placeholder.png"]);
        let loader = build_loader(LoaderConfig::default()).unwrap();
        let locators = vec![
            Locator::from_path(&missing),
            Locator::new("package:com.example"),
        ];

        let results = load_all(&loader, &args, &locators).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].1, Err(LoadError::NotFound { .. })));
        assert!(matches!(results[1].1, Err(LoadError::Unsupported { .. })));
        assert!(!results[0].0.ok);
        loader.shutdown().await;
    }
}
