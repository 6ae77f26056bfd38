//! `loadlens` core: page-load phase aggregation and what-if simulation
//!
//! This crate holds the pure measurement-and-simulation engine shared by the
//! `loadlens` command-line tool:
//! - [`sample`]: the seven load phases and one trial's timing breakdown
//! - [`stats`]: robust statistics (median, MAD, Bessel-corrected stddev)
//! - [`aggregate`]: outlier filtering and per-phase aggregation over trials
//! - [`scenario`]: the registry of optimization toggles and their rules
//! - [`simulation`]: counterfactual recomputation of a baseline breakdown
//! - [`report`]: the JSON shape and shareable query encoding
//!
//! Nothing in here performs I/O, reads the clock, or touches global mutable
//! state, so every entry point can be called concurrently without locks.

pub mod aggregate;
pub mod error;
pub mod report;
pub mod sample;
pub mod scenario;
pub mod simulation;
pub mod stats;

pub use aggregate::{
    AggregationConfig, ConfidenceInterval, PhaseProfile, PhaseStats, TrialAggregator,
};
pub use error::{AggregateError, SampleError, ScenarioError};
pub use report::{DecodedScenario, PhaseRow, ReportAssembler, SimulationReport, UnknownToggle};
pub use sample::{NavigationTiming, Phase, PhaseSample, parse_sample, parse_samples};
pub use scenario::{
    Adjustment, OptimizationToggle, PhaseAdjustment, ScenarioFactors, ScenarioModel, ScenarioState,
};
pub use simulation::{PhaseBreakdown, PhaseDelta, SimulationEngine, SimulationResult};
