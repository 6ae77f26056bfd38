//! Trial aggregation
//!
//! Turns the samples of N browser trials into a statistically stable
//! [`PhaseProfile`]. Each phase is filtered independently with a median
//! absolute deviation (MAD) rule, so a trial can be kept for most phases and
//! dropped from the one phase where it was an outlier.
//!
//! Aggregation is deterministic: the same samples in the same order always
//! produce bit-identical profiles.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::AggregateError;
use crate::sample::{Phase, PhaseSample};
use crate::simulation::PhaseBreakdown;
use crate::stats;

// ============================================================================
// Configuration
// ============================================================================

/// Policy constants for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// A value is an outlier when `|value - median| > outlier_k * MAD`.
    pub outlier_k: f64,

    /// Critical value for the normal-approximation confidence interval.
    pub z_score: f64,

    /// Recommended number of trials. Fewer still aggregate but are flagged.
    pub min_runs: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            outlier_k: 3.0,
            z_score: 1.96,
            min_runs: 3,
        }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Closed interval `[low, high]` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

impl ConfidenceInterval {
    /// Returns `true` if `value` lies inside the interval.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Aggregated statistics for one phase (or the total).
///
/// Invariants: `sample_count >= 1` and
/// `confidence_interval.low <= median <= confidence_interval.high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseStats {
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Samples retained after outlier filtering.
    pub sample_count: usize,
    /// Samples removed as outliers.
    pub discarded: usize,
    /// Every sample was flagged, so the unfiltered set was used instead.
    pub degenerate: bool,
}

/// Aggregated view over a set of trials.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseProfile {
    phases: [PhaseStats; Phase::COUNT],
    total: PhaseStats,
    trials: usize,
    below_min_runs: bool,
}

impl PhaseProfile {
    /// Statistics for one phase.
    #[must_use]
    pub const fn phase(&self, phase: Phase) -> &PhaseStats {
        &self.phases[phase.index()]
    }

    /// Statistics over per-trial totals.
    #[must_use]
    pub const fn total(&self) -> &PhaseStats {
        &self.total
    }

    /// Number of raw samples the profile was built from.
    #[must_use]
    pub const fn trials(&self) -> usize {
        self.trials
    }

    /// `true` when fewer trials than the configured `min_runs` were given.
    #[must_use]
    pub const fn below_min_runs(&self) -> bool {
        self.below_min_runs
    }

    /// Iterates `(phase, stats)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseStats)> + '_ {
        Phase::ALL.iter().map(|p| (*p, self.phase(*p)))
    }

    /// The per-phase medians, which simulation uses as the representative
    /// value of each phase.
    #[must_use]
    pub fn representative(&self) -> PhaseBreakdown {
        PhaseBreakdown::from_fn(|phase| self.phase(phase).median)
    }

    /// Total number of outliers removed across all phases.
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.phases.iter().map(|s| s.discarded).sum()
    }

    /// Phases that fell back to the unfiltered sample set.
    #[must_use]
    pub fn degenerate_phases(&self) -> Vec<Phase> {
        self.iter()
            .filter(|(_, s)| s.degenerate)
            .map(|(p, _)| p)
            .collect()
    }
}

impl Serialize for PhaseProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Phase::COUNT + 3))?;
        for (phase, stats) in self.iter() {
            map.serialize_entry(phase.id(), stats)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.serialize_entry("trials", &self.trials)?;
        map.serialize_entry("below_min_runs", &self.below_min_runs)?;
        map.end()
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Filters outliers and aggregates trial samples into a [`PhaseProfile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TrialAggregator {
    config: AggregationConfig,
}

impl TrialAggregator {
    /// Creates an aggregator with the given policy.
    #[must_use]
    pub const fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// The active policy.
    #[must_use]
    pub const fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Aggregates samples into a per-phase profile plus a total profile.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::InsufficientSamples` when `samples` is empty.
    /// Any non-empty input aggregates successfully.
    pub fn aggregate(&self, samples: &[PhaseSample]) -> Result<PhaseProfile, AggregateError> {
        if samples.is_empty() {
            return Err(AggregateError::InsufficientSamples { got: 0 });
        }

        let below_min_runs = samples.len() < self.config.min_runs;
        if below_min_runs {
            warn!(
                trials = samples.len(),
                min_runs = self.config.min_runs,
                "fewer trials than recommended; confidence intervals will be wide"
            );
        }

        let phases = Phase::ALL.map(|phase| {
            let values: Vec<f64> = samples.iter().map(|s| s.get(phase)).collect();
            self.aggregate_values(phase.id(), &values)
        });
        let totals: Vec<f64> = samples.iter().map(PhaseSample::total).collect();
        let total = self.aggregate_values("total", &totals);

        Ok(PhaseProfile {
            phases,
            total,
            trials: samples.len(),
            below_min_runs,
        })
    }

    /// Filters and summarizes one series. `values` must be non-empty.
    fn aggregate_values(&self, name: &str, values: &[f64]) -> PhaseStats {
        let retained = self.filter_outliers(values);

        let (retained, degenerate) = if retained.is_empty() {
            warn!(
                phase = name,
                samples = values.len(),
                "all samples flagged as outliers; using the unfiltered set"
            );
            (values.to_vec(), true)
        } else {
            (retained, false)
        };

        let discarded = values.len() - retained.len();
        if discarded > 0 {
            debug!(phase = name, discarded, retained = retained.len(), "discarded outliers");
        }

        self.summarize(&retained, discarded, degenerate)
    }

    /// Keeps values within `outlier_k` MADs of the median. A zero MAD keeps
    /// everything.
    fn filter_outliers(&self, values: &[f64]) -> Vec<f64> {
        let center = stats::median(values);
        let mad = stats::median_absolute_deviation(values);
        if mad <= 0.0 {
            return values.to_vec();
        }
        let limit = self.config.outlier_k * mad;
        values
            .iter()
            .copied()
            .filter(|v| (v - center).abs() <= limit)
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn summarize(&self, values: &[f64], discarded: usize, degenerate: bool) -> PhaseStats {
        let n = values.len();
        let mean = stats::mean(values);
        let median = stats::median(values);
        let stddev = stats::sample_stddev(values);

        let mut confidence_interval = if n == 1 {
            ConfidenceInterval {
                low: mean,
                high: mean,
            }
        } else {
            let half_width = self.config.z_score * stddev / (n as f64).sqrt();
            ConfidenceInterval {
                low: mean - half_width,
                high: mean + half_width,
            }
        };
        // The interval is centred on the mean; skewed data can leave the
        // median outside it, so widen to keep low <= median <= high.
        confidence_interval.low = confidence_interval.low.min(median);
        confidence_interval.high = confidence_interval.high.max(median);

        PhaseStats {
            mean,
            median,
            stddev,
            confidence_interval,
            sample_count: n,
            discarded,
            degenerate,
        }
    }
}
