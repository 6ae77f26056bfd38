//! `aggregate`: build a measurement report from a samples file.

use std::path::Path;

use loadlens_core::{TrialAggregator, parse_samples};

use crate::cli::args::AggregateArgs;
use crate::error::{LoadLensError, Result};
use crate::output::{MeasurementReport, print_measurement};
use crate::trials::TrialRecord;

use super::{load_config, permalink, read_input, resolve_scenario};

/// Aggregate the samples in `args.samples` and print the report.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, a sample error if it
/// is malformed, `InsufficientSamples` if it holds no sample, and a usage
/// error for `--permalink-base` without a URL.
pub fn run(args: &AggregateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, false)?;
    let model = config.scenarios.build_model()?;
    let scenario = resolve_scenario(&model, &args.scenario)?;

    let raw = read_input(&args.samples)?;
    let samples = parse_samples(&raw)?;
    tracing::info!(file = %args.samples.display(), samples = samples.len(), "loaded samples");

    let records = samples
        .into_iter()
        .enumerate()
        .map(|(i, sample)| TrialRecord::from_sample(i + 1, sample))
        .collect();

    let url = args.url.clone().or(scenario.target_url);
    let aggregator = TrialAggregator::new(config.aggregation);
    let mut report =
        MeasurementReport::build(url, records, &aggregator, &model, &scenario.state)?;

    if let Some(base) = &args.scenario.permalink_base {
        let url = report.url.as_deref().ok_or_else(|| {
            LoadLensError::Usage("--permalink-base requires --url".to_string())
        })?;
        report.permalink = Some(permalink(&model, base, url, &scenario.state)?);
    }

    print_measurement(&report, args.format)
}
