//! Report documents and terminal rendering.
//!
//! JSON goes to stdout unchanged so it can be piped into chart renderers;
//! the human format is a fixed-width table.

use std::fmt::Write as _;

use serde::Serialize;

use loadlens_core::{
    AggregateError, Adjustment, OptimizationToggle, PhaseProfile, ReportAssembler, ScenarioModel,
    ScenarioState, SimulationEngine, SimulationReport, TrialAggregator,
};

use crate::cli::args::OutputFormat;
use crate::error::Result;
use crate::observability::metrics;
use crate::trials::{TrialRecord, successful_samples};

// ============================================================================
// Measurement Report
// ============================================================================

/// Output of `measure` and `aggregate`: the statistical profile, every raw
/// trial, and the simulation report for the requested scenario flattened
/// alongside.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Trials attempted.
    pub runs: usize,

    /// Trials that produced a sample.
    pub successful_runs: usize,

    pub profile: PhaseProfile,

    pub raw_results: Vec<TrialRecord>,

    #[serde(flatten)]
    pub simulation: SimulationReport,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MeasurementReport {
    /// Aggregates the successful records and simulates `state` on the
    /// resulting profile.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::InsufficientSamples` when no record carries
    /// a sample.
    pub fn build(
        url: Option<String>,
        records: Vec<TrialRecord>,
        aggregator: &TrialAggregator,
        model: &ScenarioModel,
        state: &ScenarioState,
    ) -> Result<Self> {
        let samples = successful_samples(&records);
        if samples.is_empty() {
            return Err(AggregateError::InsufficientSamples { got: 0 }.into());
        }

        let profile = aggregator.aggregate(&samples)?;
        for (phase, stats) in profile.iter() {
            metrics::record_outliers(phase, stats.discarded, stats.degenerate);
        }

        let mut warnings: Vec<String> = records
            .iter()
            .filter_map(|r| r.warning.as_ref().map(|w| format!("run {}: {w}", r.run)))
            .collect();
        if profile.below_min_runs() {
            warnings.push(format!(
                "only {} successful trial(s); at least {} recommended",
                profile.trials(),
                aggregator.config().min_runs
            ));
        }
        for phase in profile.degenerate_phases() {
            warnings.push(format!(
                "{phase}: every sample was flagged as an outlier, statistics use all samples"
            ));
        }

        let result = SimulationEngine::new(model).simulate(&profile, state);
        metrics::record_simulation(result.applied.iter().map(String::as_str));
        let simulation = ReportAssembler::new(model).simulation_report(&result, state);

        Ok(Self {
            url,
            runs: records.len(),
            successful_runs: samples.len(),
            profile,
            raw_results: records,
            simulation,
            permalink: None,
            warnings,
        })
    }
}

// ============================================================================
// Printing
// ============================================================================

/// Prints any serializable document as pretty JSON on stdout.
///
/// # Errors
///
/// Returns `LoadLensError::Json` if serialization fails.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a measurement report in the requested format.
///
/// # Errors
///
/// Returns `LoadLensError::Json` if JSON serialization fails.
pub fn print_measurement(report: &MeasurementReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Human => {
            print!("{}", render_measurement(report));
            Ok(())
        }
    }
}

/// Prints a simulation report in the requested format.
///
/// # Errors
///
/// Returns `LoadLensError::Json` if JSON serialization fails.
pub fn print_simulation(
    report: &SimulationReport,
    permalink: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct WithLink<'a> {
                #[serde(flatten)]
                report: &'a SimulationReport,
                #[serde(skip_serializing_if = "Option::is_none")]
                permalink: Option<&'a str>,
            }
            print_json(&WithLink { report, permalink })
        }
        OutputFormat::Human => {
            let mut out = render_simulation(report);
            if let Some(link) = permalink {
                let _ = writeln!(out, "\nPermalink: {link}");
            }
            print!("{out}");
            Ok(())
        }
    }
}

// ============================================================================
// Human Rendering
// ============================================================================

/// Renders the statistics table followed by the scenario comparison.
#[must_use]
pub fn render_measurement(report: &MeasurementReport) -> String {
    let mut out = String::new();
    if let Some(url) = &report.url {
        let _ = writeln!(out, "URL: {url}");
    }
    let _ = writeln!(
        out,
        "Trials: {} of {} succeeded",
        report.successful_runs, report.runs
    );
    out.push('\n');

    let _ = writeln!(
        out,
        "{:<20} {:>10} {:>10} {:>9} {:>21} {:>6}",
        "Phase", "Median", "Mean", "Stddev", "Confidence interval", "Kept"
    );
    let profile = &report.profile;
    let rows = profile
        .iter()
        .map(|(phase, stats)| (phase.label(), stats))
        .chain(std::iter::once(("Total", profile.total())));
    for (label, stats) in rows {
        let kept = if stats.degenerate {
            format!("{}*", stats.sample_count)
        } else {
            stats.sample_count.to_string()
        };
        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>10} {:>9} {:>21} {:>6}",
            label,
            ms(stats.median),
            ms(stats.mean),
            format!("{:.1}", stats.stddev),
            format!(
                "[{:.1}, {:.1}]",
                stats.confidence_interval.low, stats.confidence_interval.high
            ),
            kept
        );
    }
    if !profile.degenerate_phases().is_empty() {
        out.push_str("* outlier filter discarded every sample; all samples kept\n");
    }

    out.push('\n');
    out.push_str(&render_simulation(&report.simulation));

    if let Some(link) = &report.permalink {
        let _ = writeln!(out, "\nPermalink: {link}");
    }
    if !report.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &report.warnings {
            let _ = writeln!(out, "  - {warning}");
        }
    }
    out
}

/// Renders the original versus optimized comparison.
#[must_use]
pub fn render_simulation(report: &SimulationReport) -> String {
    let mut out = String::new();

    let active: Vec<&str> = report
        .scenario
        .iter()
        .filter(|(_, on)| **on)
        .map(|(k, _)| k.as_str())
        .collect();
    let _ = writeln!(
        out,
        "Scenario: {}",
        if active.is_empty() {
            "baseline (no optimizations)".to_string()
        } else {
            active.join(", ")
        }
    );

    let _ = writeln!(
        out,
        "{:<20} {:>12} {:>12} {:>12}",
        "Phase", "Original", "Optimized", "Delta"
    );
    for row in &report.phases {
        let _ = writeln!(
            out,
            "{:<20} {:>12} {:>12} {:>12}",
            row.name,
            ms(row.original),
            ms(row.optimized),
            signed_ms(row.delta)
        );
    }
    let _ = writeln!(
        out,
        "{:<20} {:>12} {:>12} {:>12}",
        "Full TTFB",
        ms(report.original.full_ttfb()),
        ms(report.optimized.full_ttfb()),
        signed_ms(report.optimized.full_ttfb() - report.original.full_ttfb())
    );
    let _ = writeln!(
        out,
        "{:<20} {:>12} {:>12} {:>12}",
        "Total",
        ms(report.original.total()),
        ms(report.optimized.total()),
        signed_ms(report.total_delta)
    );
    out
}

/// Renders the toggle registry with each adjustment.
#[must_use]
pub fn render_toggles<'a>(toggles: impl IntoIterator<Item = &'a OptimizationToggle>) -> String {
    let mut out = String::new();
    for toggle in toggles {
        let _ = writeln!(out, "{:<14} {}", toggle.key, toggle.label);
        if !toggle.description.is_empty() {
            let _ = writeln!(out, "{:<14} {}", "", toggle.description);
        }
        for adj in &toggle.adjustments {
            let _ = writeln!(
                out,
                "{:<14}   {:<10} {}",
                "",
                adj.phase.id(),
                describe_adjustment(adj.adjustment)
            );
        }
    }
    out
}

fn describe_adjustment(adjustment: Adjustment) -> String {
    match adjustment {
        Adjustment::Scale { factor, floor_ms } if floor_ms > 0.0 => {
            format!("x{factor} (at least {floor_ms} ms)")
        }
        Adjustment::Scale { factor, .. } => format!("x{factor}"),
        Adjustment::Subtract { ms } => format!("-{ms} ms"),
    }
}

fn ms(value: f64) -> String {
    format!("{value:.1} ms")
}

fn signed_ms(value: f64) -> String {
    if value > 0.0 {
        format!("+{value:.1} ms")
    } else {
        format!("{value:.1} ms")
    }
}
