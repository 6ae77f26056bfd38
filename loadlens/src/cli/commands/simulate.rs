//! `simulate`: what-if scenarios on an existing baseline.

use std::path::Path;

use loadlens_core::{
    PhaseBreakdown, ReportAssembler, SimulationEngine, TrialAggregator, parse_sample,
    parse_samples,
};

use crate::cli::args::SimulateArgs;
use crate::error::{LoadLensError, Result};
use crate::observability::metrics;
use crate::output::print_simulation;

use super::{load_config, permalink, read_input, resolve_scenario};

/// Simulate the selected scenario and print the comparison.
///
/// # Errors
///
/// Returns an I/O or sample error for unreadable input, a usage error for
/// an unknown `--enable` key or a permalink without a target URL.
pub fn run(args: &SimulateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, false)?;
    let model = config.scenarios.build_model()?;
    let scenario = resolve_scenario(&model, &args.scenario)?;

    let engine = SimulationEngine::new(&model);
    let result = if let Some(path) = &args.samples {
        let samples = parse_samples(&read_input(path)?)?;
        let profile = TrialAggregator::new(config.aggregation).aggregate(&samples)?;
        engine.simulate(&profile, &scenario.state)
    } else if let Some(path) = &args.baseline {
        let baseline = PhaseBreakdown::from(&parse_sample(&read_input(path)?)?);
        engine.simulate_breakdown(&baseline, &scenario.state)
    } else {
        return Err(LoadLensError::Usage(
            "either --samples or --baseline is required".to_string(),
        ));
    };

    metrics::record_simulation(result.applied.iter().map(String::as_str));
    tracing::info!(
        applied = ?result.applied,
        total_delta_ms = result.total_delta,
        "simulation complete"
    );

    let report = ReportAssembler::new(&model).simulation_report(&result, &scenario.state);

    let link = match &args.scenario.permalink_base {
        Some(base) => {
            let target = args
                .url
                .as_deref()
                .or(scenario.target_url.as_deref())
                .ok_or_else(|| {
                    LoadLensError::Usage("--permalink-base requires --url".to_string())
                })?;
            Some(permalink(&model, base, target, &scenario.state)?)
        }
        None => None,
    };

    print_simulation(&report, link.as_deref(), args.format)
}
