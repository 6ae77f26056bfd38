//! Error types for `loadlens`
//!
//! Top-level error hierarchy for the command-line tool and the mapping
//! from error kind to process exit code.

use std::path::PathBuf;
use thiserror::Error;

use loadlens_core::{AggregateError, SampleError, ScenarioError};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `loadlens` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Browser driver error (spawn failure, timeout, bad output)
    pub const TRIAL_ERROR: i32 = 4;

    /// No usable samples to aggregate
    pub const INSUFFICIENT_SAMPLES: i32 = 5;

    /// Usage error (invalid arguments, unknown toggle)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `loadlens` operations.
#[derive(Debug, Error)]
pub enum LoadLensError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Browser trial error
    #[error(transparent)]
    Trial(#[from] TrialError),

    /// Aggregation error
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Malformed sample input
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Toggle registry error
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Invalid command-line usage
    #[error("{0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoadLensError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Trial(_) => ExitCode::TRIAL_ERROR,
            Self::Aggregate(AggregateError::InsufficientSamples { .. }) => {
                ExitCode::INSUFFICIENT_SAMPLES
            }
            Self::Sample(_) | Self::Json(_) => ExitCode::ERROR,
            Self::Scenario(_) | Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}{}: {message}", line.map_or_else(String::new, |l| format!(" (line {l})")))]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Required environment variable referenced with `${VAR:?msg}` is unset
    #[error("environment variable '{var}' not set: {message}")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message supplied after `:?`
        message: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "scenarios.toggles[0].key")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Trial Errors
// ============================================================================

/// Failures of a single browser trial.
///
/// A failed trial is recorded on its raw result and excluded from
/// aggregation; it only becomes fatal when no trial succeeds.
#[derive(Debug, Clone, Error)]
pub enum TrialError {
    /// No driver command configured
    #[error("no browser driver configured (set driver.command or pass --driver)")]
    NoDriver,

    /// Driver process could not be started
    #[error("failed to spawn driver: {0}")]
    SpawnFailed(String),

    /// Driver did not finish within the trial timeout
    #[error("trial timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured per-trial timeout
        timeout_ms: u64,
    },

    /// Driver exited unsuccessfully
    #[error("driver exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    NonZeroExit {
        /// Exit status, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Driver output was not a navigation timing object
    #[error("invalid driver output: {0}")]
    InvalidOutput(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `loadlens` operations.
pub type Result<T> = std::result::Result<T, LoadLensError>;

// ============================================================================
// Tests
// ============================================================================
