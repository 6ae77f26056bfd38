//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler, plus the
//! helpers every handler shares: configuration loading, input files and
//! scenario resolution.

pub mod aggregate;
pub mod completions;
pub mod measure;
pub mod scenario;
pub mod simulate;
pub mod toggles;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use loadlens_core::{ReportAssembler, ScenarioModel, ScenarioState};

use crate::cli::args::{Cli, Commands, ScenarioArgs, ScenarioSubcommand};
use crate::config::{ConfigLoader, LoadLensConfig, LoaderOptions, default_config_path};
use crate::error::{LoadLensError, Result};

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli) -> Result<()> {
    if let Some(port) = cli.metrics_port {
        crate::observability::init_metrics(port)?;
    }

    let config_path = cli.config.clone().or_else(default_config_path);
    let config_path = config_path.as_deref();

    match cli.command {
        Commands::Measure(args) => measure::run(&args, config_path).await,
        Commands::Aggregate(args) => aggregate::run(&args, config_path),
        Commands::Simulate(args) => simulate::run(&args, config_path),
        Commands::Toggles(args) => toggles::run(&args, config_path),
        Commands::Scenario(cmd) => match cmd.subcommand {
            ScenarioSubcommand::Encode(args) => scenario::encode(&args, config_path),
            ScenarioSubcommand::Decode(args) => scenario::decode(&args, config_path),
        },
        Commands::Completions(args) => {
            completions::run(&args);
            Ok(())
        }
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Loads configuration and logs every load warning.
pub(crate) fn load_config(
    path: Option<&Path>,
    require_driver: bool,
) -> Result<Arc<LoadLensConfig>> {
    if let Some(path) = path {
        tracing::info!(config = %path.display(), "loading configuration");
    }
    let loader = ConfigLoader::new(LoaderOptions {
        require_driver,
        ..LoaderOptions::default()
    });
    let load_result = loader.load(path)?;

    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    Ok(load_result.config)
}

/// Reads an input file, keeping the path in the error message.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        LoadLensError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

/// Scenario selected on the command line.
#[derive(Debug)]
pub(crate) struct ResolvedScenario {
    pub state: ScenarioState,
    /// `url` parameter carried by `--scenario`, if any.
    pub target_url: Option<String>,
}

/// Builds the toggle state from `--scenario` and `--enable`.
///
/// The query is decoded first (unknown keys are logged and ignored), then
/// each `--enable` key is switched on. An unknown `--enable` key is a usage
/// error with a suggestion.
pub(crate) fn resolve_scenario(
    model: &ScenarioModel,
    args: &ScenarioArgs,
) -> Result<ResolvedScenario> {
    let (mut state, target_url) = match &args.scenario {
        Some(query) => {
            let decoded = ReportAssembler::new(model).decode_scenario(query);
            for unknown in &decoded.unknown {
                tracing::warn!("ignoring {unknown}");
            }
            (decoded.state, decoded.target_url)
        }
        None => (ScenarioState::all_off(model), None),
    };

    for key in &args.enable {
        let toggle = model.resolve(key.trim())?;
        state.enable(toggle.key.clone());
    }

    Ok(ResolvedScenario { state, target_url })
}

/// Builds a permalink or reports an invalid base URL as a usage error.
pub(crate) fn permalink(
    model: &ScenarioModel,
    base: &str,
    target_url: &str,
    state: &ScenarioState,
) -> Result<String> {
    ReportAssembler::new(model)
        .permalink(base, target_url, state)
        .map_err(|e| LoadLensError::Usage(format!("invalid permalink base '{base}': {e}")))
}
