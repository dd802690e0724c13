//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{CellularGeneration, NetworkInfo, Priority};
use std::path::PathBuf;

/// Hunter - deduplicating, prioritised image loader
#[derive(Parser, Debug)]
#[command(
    name = "hunter",
    author,
    version,
    about = "Deduplicating, prioritised image loader",
    long_about = "Loads images through the hunter dispatcher.\n\n\
                  Equal requests share one fetch, work runs on a pool sized by \n\
                  connectivity, and completions are delivered in batches."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "HUNTER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "HUNTER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a list of images and report per-request outcomes
    Fetch(FetchArgs),

    /// Validate configuration file without loading anything
    Validate(ValidateArgs),

    /// Display the effective loader configuration
    Info(InfoArgs),
}

/// Arguments for the `fetch` command
#[derive(Parser, Debug, Clone)]
pub struct FetchArgs {
    /// Locators to load (file paths, file:// URIs or other locator strings)
    #[arg(required_unless_present = "input")]
    pub locators: Vec<String>,

    /// Read additional locators from a file, one per line
    #[arg(short, long, env = "HUNTER_INPUT")]
    pub input: Option<PathBuf>,

    /// Path to configuration file (TOML or JSON); defaults are used when absent
    #[arg(short, long, env = "HUNTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Tag attached to every request
    #[arg(long)]
    pub tag: Option<String>,

    /// Request priority
    #[arg(long, value_enum, default_value = "normal")]
    pub priority: PriorityArg,

    /// Resize decoded images, e.g. `128x128`
    #[arg(long, value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Center-crop to the resize box
    #[arg(long, requires = "resize", conflicts_with = "center_inside")]
    pub center_crop: bool,

    /// Fit inside the resize box
    #[arg(long, requires = "resize")]
    pub center_inside: bool,

    /// Rotate decoded images by this many degrees
    #[arg(long)]
    pub rotate: Option<f32>,

    /// Bypass the memory cache for reads and writes
    #[arg(long)]
    pub skip_memory_cache: bool,

    /// Connectivity to announce before loading
    #[arg(long, value_enum, env = "HUNTER_NETWORK")]
    pub network: Option<NetworkArg>,

    /// Override the default worker thread count
    #[arg(long, env = "HUNTER_THREADS")]
    pub threads: Option<usize>,

    /// Override the batch delay in milliseconds
    #[arg(long, env = "HUNTER_BATCH_DELAY_MS")]
    pub batch_delay_ms: Option<u64>,

    /// Per-request timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "HUNTER_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "HUNTER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "hunter.toml", env = "HUNTER_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; built-in defaults are shown when absent
    #[arg(short, long, env = "HUNTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the thread count chosen for each connectivity class
    #[arg(long)]
    pub threads: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    #[default]
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

/// Simulated connectivity broadcast
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkArg {
    Wifi,
    #[value(name = "5g")]
    Cellular5g,
    #[value(name = "4g")]
    Cellular4g,
    #[value(name = "3g")]
    Cellular3g,
    #[value(name = "2g")]
    Cellular2g,
    Offline,
}

impl NetworkArg {
    /// `None` means no active network
    pub fn info(self) -> Option<NetworkInfo> {
        match self {
            Self::Wifi => Some(NetworkInfo::wifi()),
            Self::Cellular5g => Some(NetworkInfo::cellular(CellularGeneration::G5)),
            Self::Cellular4g => Some(NetworkInfo::cellular(CellularGeneration::G4)),
            Self::Cellular3g => Some(NetworkInfo::cellular(CellularGeneration::G3)),
            Self::Cellular2g => Some(NetworkInfo::cellular(CellularGeneration::G2)),
            Self::Offline => None,
        }
    }
}

/// Parse `WIDTHxHEIGHT`
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("invalid width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("invalid height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("resize dimensions must be positive".to_string());
    }
    Ok((w, h))
}
