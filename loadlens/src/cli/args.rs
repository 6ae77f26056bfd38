//! CLI argument definitions
//!
//! All Clap derive structs for `loadlens` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Default number of trials per measurement.
pub const DEFAULT_RUNS: usize = 3;

// ============================================================================
// Root CLI
// ============================================================================

/// Measure page-load phases with a real browser and explore what-if
/// optimizations without re-measuring.
#[derive(Parser, Debug)]
#[command(name = "loadlens", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error log output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "LOADLENS_COLOR")]
    pub color: ColorChoice,

    /// Log line format on stderr.
    #[arg(long, default_value = "human", global = true, env = "LOADLENS_LOG_FORMAT")]
    pub log_format: LogFormatArg,

    /// Path to YAML configuration file (defaults to ./loadlens.yaml if present).
    #[arg(short, long, global = true, env = "LOADLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve Prometheus metrics on 127.0.0.1:<PORT> while running.
    #[arg(long, global = true, env = "LOADLENS_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run browser trials against a URL and report aggregated phases.
    Measure(MeasureArgs),

    /// Aggregate previously collected samples from a JSON file.
    Aggregate(AggregateArgs),

    /// Simulate optimizations on a baseline without re-measuring.
    Simulate(SimulateArgs),

    /// List the registered optimization toggles.
    Toggles(TogglesArgs),

    /// Encode or decode shareable scenario queries.
    Scenario(ScenarioCommand),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version and build information.
    Version(VersionArgs),
}

// ============================================================================
// Scenario Selection
// ============================================================================

/// Toggle selection shared by every command that simulates.
#[derive(Args, Debug, Default, Clone)]
pub struct ScenarioArgs {
    /// Enable an optimization toggle (repeatable or comma-separated).
    #[arg(short, long = "enable", value_name = "KEY", value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Scenario query string, e.g. "tls_warm=1&defer_js=1".
    #[arg(long, value_name = "QUERY")]
    pub scenario: Option<String>,

    /// Base URL for a shareable permalink to this scenario.
    #[arg(long, value_name = "URL")]
    pub permalink_base: Option<String>,
}

// ============================================================================
// Measure / Aggregate / Simulate
// ============================================================================

/// Arguments for `measure`.
#[derive(Args, Debug)]
pub struct MeasureArgs {
    /// Page to measure.
    #[arg(short, long)]
    pub url: String,

    /// Number of trials.
    #[arg(
        short = 'n',
        long,
        default_value_t = DEFAULT_RUNS,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub runs: usize,

    /// Browser driver command line; the URL is appended as the last argument.
    #[arg(long, env = "LOADLENS_DRIVER", value_name = "CMD")]
    pub driver: Option<String>,

    /// Per-trial timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Maximum trials in flight.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `aggregate`.
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// JSON array of samples (phase maps or navigation timing entries).
    #[arg(short, long, value_name = "FILE")]
    pub samples: PathBuf,

    /// URL the samples were measured against, for the report.
    #[arg(short, long)]
    pub url: Option<String>,

    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
#[command(group = clap::ArgGroup::new("input").required(true).multiple(false))]
pub struct SimulateArgs {
    /// Samples file to aggregate first; simulation uses the per-phase medians.
    #[arg(short, long, group = "input", value_name = "FILE")]
    pub samples: Option<PathBuf>,

    /// JSON phase map used directly as the representative baseline.
    #[arg(short, long, group = "input", value_name = "FILE")]
    pub baseline: Option<PathBuf>,

    /// Measured page, carried into the permalink.
    #[arg(short, long)]
    pub url: Option<String>,

    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Toggles / Scenario
// ============================================================================

/// Arguments for `toggles`.
#[derive(Args, Debug)]
pub struct TogglesArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Scenario query commands.
#[derive(Args, Debug)]
pub struct ScenarioCommand {
    /// Scenario subcommand.
    #[command(subcommand)]
    pub subcommand: ScenarioSubcommand,
}

/// Scenario subcommands.
#[derive(Subcommand, Debug)]
pub enum ScenarioSubcommand {
    /// Encode enabled toggles as a query string.
    Encode(ScenarioEncodeArgs),

    /// Decode a query string into toggle states.
    Decode(ScenarioDecodeArgs),
}

/// Arguments for `scenario encode`.
#[derive(Args, Debug)]
pub struct ScenarioEncodeArgs {
    /// Enable an optimization toggle (repeatable or comma-separated).
    #[arg(short, long = "enable", value_name = "KEY", value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Build a full permalink on this base URL instead of a bare query.
    #[arg(long, value_name = "URL", requires = "url")]
    pub permalink_base: Option<String>,

    /// Measured page for the permalink.
    #[arg(short, long)]
    pub url: Option<String>,
}

/// Arguments for `scenario decode`.
#[derive(Args, Debug)]
pub struct ScenarioDecodeArgs {
    /// Query string, with or without the leading '?'.
    pub query: String,

    /// Fail on keys that are not registered toggles.
    #[arg(long)]
    pub strict: bool,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Completions / Version
// ============================================================================

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    #[default]
    Human,
    /// JSON document.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================
