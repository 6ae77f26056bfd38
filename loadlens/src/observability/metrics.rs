//! Metrics for trial collection and simulation.
//!
//! Recorded through the `metrics` facade. The Prometheus exporter is only
//! installed when a port is requested; without a recorder every `record_*`
//! call is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use loadlens_core::{Phase, ScenarioModel};

use crate::error::{LoadLensError, TrialError};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Bucket for toggle keys outside the built-in registry.
const CUSTOM_TOGGLE_LABEL: &str = "__custom__";

/// Returns the toggle key when it is built in, `"__custom__"` otherwise.
///
/// Custom toggle keys come from user configuration and would otherwise
/// grow label cardinality without bound.
#[must_use]
pub fn sanitize_toggle_label(key: &str) -> &str {
    if ScenarioModel::builtin().get(key).is_some() {
        key
    } else {
        CUSTOM_TOGGLE_LABEL
    }
}

/// Installs the Prometheus exporter on `127.0.0.1:<port>`.
///
/// # Errors
///
/// Returns `LoadLensError::Io` if the listener cannot be installed
/// (e.g. port already in use).
pub fn init_metrics(port: u16) -> Result<(), LoadLensError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    PrometheusBuilder::new()
        .with_http_listener(([127, 0, 0, 1], port))
        .install()
        .map_err(|e| LoadLensError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    tracing::info!(port, "prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("loadlens_trials_total", "Browser trials attempted");
    describe_counter!(
        "loadlens_trials_failed_total",
        "Browser trials that produced no sample, by reason"
    );
    describe_histogram!(
        "loadlens_trial_duration_ms",
        "Wall-clock duration of one browser trial in milliseconds"
    );
    describe_counter!(
        "loadlens_outliers_discarded_total",
        "Samples discarded by the MAD outlier filter, by phase"
    );
    describe_counter!(
        "loadlens_degenerate_fallbacks_total",
        "Phases whose outlier filter discarded every sample"
    );
    describe_counter!(
        "loadlens_simulations_total",
        "What-if simulations run, by active toggle"
    );
}

/// Records one finished trial.
pub fn record_trial(duration: Duration, error: Option<&TrialError>) {
    counter!("loadlens_trials_total").increment(1);
    histogram!("loadlens_trial_duration_ms").record(duration.as_secs_f64() * 1000.0);
    if let Some(err) = error {
        counter!("loadlens_trials_failed_total", "reason" => failure_reason(err)).increment(1);
    }
}

/// Records outlier filtering results for one phase.
pub fn record_outliers(phase: Phase, discarded: usize, degenerate: bool) {
    if discarded > 0 {
        counter!("loadlens_outliers_discarded_total", "phase" => phase.id())
            .increment(u64::try_from(discarded).unwrap_or(u64::MAX));
    }
    if degenerate {
        counter!("loadlens_degenerate_fallbacks_total", "phase" => phase.id()).increment(1);
    }
}

/// Records one simulation with its active toggles.
pub fn record_simulation<'a>(active: impl IntoIterator<Item = &'a str>) {
    let mut any = false;
    for key in active {
        any = true;
        counter!("loadlens_simulations_total", "toggle" => sanitize_toggle_label(key).to_owned())
            .increment(1);
    }
    if !any {
        counter!("loadlens_simulations_total", "toggle" => "none").increment(1);
    }
}

const fn failure_reason(err: &TrialError) -> &'static str {
    match err {
        TrialError::NoDriver | TrialError::SpawnFailed(_) => "spawn",
        TrialError::Timeout { .. } => "timeout",
        TrialError::NonZeroExit { .. } => "exit",
        TrialError::InvalidOutput(_) => "output",
    }
}
