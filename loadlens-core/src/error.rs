//! Core error types for `loadlens`
//!
//! Errors raised by sample construction, aggregation and the toggle
//! registry. Simulation itself has no error type: it is total over any
//! valid breakdown.

use thiserror::Error;

use crate::sample::Phase;

// ============================================================================
// Sample Errors
// ============================================================================

/// Errors raised while building a [`crate::PhaseSample`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// A phase duration was negative, NaN or infinite.
    #[error("invalid duration for phase '{phase}': {value} (expected a finite value >= 0)")]
    InvalidDuration {
        /// Phase carrying the bad value
        phase: Phase,
        /// The rejected value
        value: f64,
    },

    /// Every phase is finite but their sum is not.
    #[error("phase durations sum to a non-finite total")]
    TotalOverflow,

    /// A sample entry could not be interpreted.
    #[error("malformed sample at index {index}: {message}")]
    Malformed {
        /// Position of the entry in the input array
        index: usize,
        /// Parser or validation message
        message: String,
    },
}

// ============================================================================
// Aggregation Errors
// ============================================================================

/// Errors raised by [`crate::TrialAggregator`].
///
/// Only genuine absence of data is an error. Statistical edge cases such as
/// every sample of a phase being flagged as an outlier are absorbed by the
/// aggregator and reported through [`crate::PhaseStats::degenerate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// No trial produced a sample.
    #[error("insufficient samples: got {got}, need at least 1")]
    InsufficientSamples {
        /// Number of samples supplied
        got: usize,
    },
}

// ============================================================================
// Scenario Errors
// ============================================================================

/// Errors raised by the optimization toggle registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    /// A toggle with the same key is already registered.
    #[error("toggle '{0}' is already registered")]
    DuplicateToggle(String),

    /// A toggle key is not in the registry.
    #[error("unknown toggle '{key}'{}", suggestion.as_ref().map_or_else(String::new, |s| format!(" (did you mean '{s}'?)")))]
    UnknownToggle {
        /// The key that was looked up
        key: String,
        /// Closest registered key, if any is close enough
        suggestion: Option<String>,
    },
}
