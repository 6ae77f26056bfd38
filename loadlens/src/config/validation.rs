//! Configuration validation
//!
//! Runs on the fully deserialized `LoadLensConfig` after environment
//! overrides. Every issue is collected before the result is returned.

use std::collections::HashSet;

use loadlens_core::{Adjustment, AggregationConfig, ScenarioModel};

use crate::config::schema::{DriverConfig, LoadLensConfig, ScenarioConfig};
use crate::error::{Severity, ValidationIssue};

/// Concurrency above this is flagged.
const MAX_REASONABLE_CONCURRENCY: usize = 64;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration, collecting all errors and warnings.
    ///
    /// `require_driver` is set by commands that launch trials; an empty
    /// driver command is only an error for them.
    pub fn validate(&mut self, config: &LoadLensConfig, require_driver: bool) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_aggregation(&config.aggregation);
        self.validate_scenarios(&config.scenarios);
        self.validate_driver(&config.driver, require_driver);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_aggregation(&mut self, aggregation: &AggregationConfig) {
        if !(aggregation.outlier_k.is_finite() && aggregation.outlier_k > 0.0) {
            self.add_error("aggregation.outlier_k", "must be a positive number");
        } else if aggregation.outlier_k < 1.0 {
            self.add_warning(
                "aggregation.outlier_k",
                "values below 1 discard most samples and often fall back to the unfiltered set",
            );
        }

        if !(aggregation.z_score.is_finite() && aggregation.z_score > 0.0) {
            self.add_error("aggregation.z_score", "must be a positive number");
        }

        if aggregation.min_runs == 0 {
            self.add_error("aggregation.min_runs", "must be at least 1");
        }
    }

    fn validate_scenarios(&mut self, scenarios: &ScenarioConfig) {
        for (name, value) in scenarios.factors.factors() {
            if !(0.0..=1.0).contains(&value) {
                self.add_error(
                    &format!("scenarios.factors.{name}"),
                    "must be within [0, 1]",
                );
            }
        }
        for (name, value) in scenarios.factors.floors() {
            if !(value.is_finite() && value >= 0.0) {
                self.add_error(
                    &format!("scenarios.factors.{name}"),
                    "must be a non-negative number of milliseconds",
                );
            }
        }

        let builtin: HashSet<&str> = ScenarioModel::builtin().keys().collect();
        let mut seen = HashSet::new();
        for (i, toggle) in scenarios.toggles.iter().enumerate() {
            let path = format!("scenarios.toggles[{i}]");

            if toggle.key.is_empty() {
                self.add_error(&format!("{path}.key"), "toggle key cannot be empty");
            } else if builtin.contains(toggle.key.as_str()) {
                self.add_error(
                    &format!("{path}.key"),
                    &format!("'{}' is a built-in toggle", toggle.key),
                );
            } else if !seen.insert(toggle.key.as_str()) {
                self.add_error(
                    &format!("{path}.key"),
                    &format!("duplicate toggle key '{}'", toggle.key),
                );
            } else if !is_query_safe(&toggle.key) {
                self.add_warning(
                    &format!("{path}.key"),
                    "keys outside [a-z0-9_] are percent-encoded in scenario queries",
                );
            }

            if toggle.adjustments.is_empty() {
                self.add_error(
                    &format!("{path}.adjustments"),
                    "toggle must adjust at least one phase",
                );
            }

            for (j, adj) in toggle.adjustments.iter().enumerate() {
                let adj_path = format!("{path}.adjustments[{j}].adjustment");
                match adj.adjustment {
                    Adjustment::Scale { factor, floor_ms } => {
                        if !(0.0..=1.0).contains(&factor) {
                            self.add_error(&format!("{adj_path}.factor"), "must be within [0, 1]");
                        }
                        if !(floor_ms.is_finite() && floor_ms >= 0.0) {
                            self.add_error(
                                &format!("{adj_path}.floor_ms"),
                                "must be a non-negative number of milliseconds",
                            );
                        }
                    }
                    Adjustment::Subtract { ms } => {
                        if !(ms.is_finite() && ms >= 0.0) {
                            self.add_error(
                                &format!("{adj_path}.ms"),
                                "must be a non-negative number of milliseconds",
                            );
                        }
                    }
                }
            }
        }
    }

    fn validate_driver(&mut self, driver: &DriverConfig, require_driver: bool) {
        if require_driver && driver.command.is_empty() {
            self.add_error(
                "driver.command",
                "a browser driver command is required to run trials",
            );
        }
        if driver.command.first().is_some_and(String::is_empty) {
            self.add_error("driver.command[0]", "program name cannot be empty");
        }

        if driver.timeout_ms == 0 {
            self.add_error("driver.timeout_ms", "must be greater than 0");
        }

        if driver.concurrency == 0 {
            self.add_error("driver.concurrency", "must be at least 1");
        } else if driver.concurrency > MAX_REASONABLE_CONCURRENCY {
            self.add_warning(
                "driver.concurrency",
                "parallel browsers compete for CPU and network, skewing timings",
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

fn is_query_safe(key: &str) -> bool {
    key.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
