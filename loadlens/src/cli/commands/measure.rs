//! `measure`: run browser trials and report the aggregated profile.

use std::path::Path;

use loadlens_core::TrialAggregator;

use crate::cli::args::MeasureArgs;
use crate::config::DriverConfig;
use crate::error::{LoadLensError, Result};
use crate::output::{MeasurementReport, print_measurement};
use crate::trials::TrialRunner;

use super::{load_config, permalink, resolve_scenario};

/// Measure `args.url` and print the report.
///
/// # Errors
///
/// Returns a usage error for an unsplittable `--driver`, a config error if
/// no driver is configured, an unknown toggle as a usage error, and
/// `InsufficientSamples` when every trial fails.
pub async fn run(args: &MeasureArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, args.driver.is_none())?;
    let model = config.scenarios.build_model()?;
    let scenario = resolve_scenario(&model, &args.scenario)?;

    let driver = driver_config(&config.driver, args)?;
    let runner = TrialRunner::new(&driver)?;

    let records = runner.run(&args.url, args.runs).await;

    let aggregator = TrialAggregator::new(config.aggregation);
    let mut report = MeasurementReport::build(
        Some(args.url.clone()),
        records,
        &aggregator,
        &model,
        &scenario.state,
    )?;

    if let Some(base) = &args.scenario.permalink_base {
        report.permalink = Some(permalink(&model, base, &args.url, &scenario.state)?);
    }

    tracing::info!(
        url = %args.url,
        succeeded = report.successful_runs,
        runs = report.runs,
        total_median_ms = report.profile.total().median,
        "measurement complete"
    );
    print_measurement(&report, args.format)
}

/// Applies command-line overrides on top of the configured driver.
fn driver_config(base: &DriverConfig, args: &MeasureArgs) -> Result<DriverConfig> {
    let mut driver = base.clone();
    if let Some(cmd) = &args.driver {
        driver.command = shlex::split(cmd)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| LoadLensError::Usage(format!("cannot parse --driver '{cmd}'")))?;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        if timeout_ms == 0 {
            return Err(LoadLensError::Usage(
                "--timeout-ms must be greater than 0".to_string(),
            ));
        }
        driver.timeout_ms = timeout_ms;
    }
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(LoadLensError::Usage(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        driver.concurrency = concurrency;
    }
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;

    fn measure_args(extra: &[&str]) -> MeasureArgs {
        let mut argv = vec!["loadlens", "measure", "--url", "https://example.com"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Measure(args) => args,
            other => panic!("expected measure, got {other:?}"),
        }
    }

    #[test]
    fn test_driver_overrides() {
        let args = measure_args(&[
            "--driver",
            "node 'drivers/nav timing.js' --headless",
            "--timeout-ms",
            "5000",
            "--concurrency",
            "2",
        ]);
        let driver = driver_config(&DriverConfig::default(), &args).unwrap();
        assert_eq!(
            driver.command,
            vec!["node", "drivers/nav timing.js", "--headless"]
        );
        assert_eq!(driver.timeout_ms, 5000);
        assert_eq!(driver.concurrency, 2);
    }

    #[test]
    fn test_config_driver_kept_without_flags() {
        let base = DriverConfig {
            command: vec!["./driver.sh".to_string()],
            ..DriverConfig::default()
        };
        let args = measure_args(&[]);
        assert_eq!(driver_config(&base, &args).unwrap(), base);
    }

    #[test]
    fn test_unbalanced_quote_rejected() {
        let args = measure_args(&["--driver", "node 'unterminated"]);
        assert!(driver_config(&DriverConfig::default(), &args).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let args = measure_args(&["--concurrency", "0"]);
        assert!(driver_config(&DriverConfig::default(), &args).is_err());
    }
}
