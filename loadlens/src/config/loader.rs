//! Configuration loader
//!
//! Loading pipeline:
//! 1. Read the file (size limit, UTF-8 BOM stripped)
//! 2. Environment variable expansion on the raw text
//! 3. YAML parsing and deserialization
//! 4. `LOADLENS_*` environment overrides
//! 5. Validation
//! 6. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde_yaml::Value;

use crate::config::schema::LoadLensConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,

    /// Treat a missing driver command as an error.
    pub require_driver: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("LOADLENS_MAX_CONFIG_SIZE", 1024 * 1024),
            require_driver: false,
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<LoadLensConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a new configuration loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads configuration from `path`, or built-in defaults when no path
    /// is given. Environment overrides and validation apply either way.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - A `${VAR:?message}` reference names an unset variable
    /// - YAML parsing or deserialization fails
    /// - Validation fails
    pub fn load(&self, path: Option<&Path>) -> Result<LoadResult, ConfigError> {
        let Some(path) = path else {
            tracing::debug!("no configuration file given, using defaults");
            return self.finish(LoadLensConfig::default(), Vec::new(), "<defaults>", &env_lookup);
        };

        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.options.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.options.max_config_size),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        tracing::debug!(path = %path.display(), bytes = file_size, "loading configuration");
        self.load_str_with(&raw, path, &env_lookup)
    }

    /// Loads configuration from YAML text; `source` is only used in
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_str(&self, raw: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        self.load_str_with(raw, source, &env_lookup)
    }

    fn load_str_with(
        &self,
        raw: &str,
        source: &Path,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let substituted = substitute_env(raw, source, lookup, &mut warnings)?;

        let root: Value =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        let config = if root.is_null() {
            warnings.push(LoadWarning {
                message: "configuration file is empty, using defaults".to_string(),
                location: Some(source.display().to_string()),
            });
            LoadLensConfig::default()
        } else {
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        self.finish(config, warnings, &source.display().to_string(), lookup)
    }

    fn finish(
        &self,
        mut config: LoadLensConfig,
        mut warnings: Vec<LoadWarning>,
        source: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<LoadResult, ConfigError> {
        apply_env_overrides(&mut config, lookup, &mut warnings);

        let result = Validator::new().validate(&config, self.options.require_driver);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: source.to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Overrides
// ============================================================================

/// Applies `LOADLENS_*` overrides on top of the file configuration.
///
/// Unparseable values are ignored with a warning.
fn apply_env_overrides(
    config: &mut LoadLensConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
    warnings: &mut Vec<LoadWarning>,
) {
    let parsed = |name: &str| -> Option<String> {
        let value = lookup(name)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    };

    if let Some(v) = override_value(&parsed, "LOADLENS_OUTLIER_K", warnings) {
        config.aggregation.outlier_k = v;
    }
    if let Some(v) = override_value(&parsed, "LOADLENS_Z_SCORE", warnings) {
        config.aggregation.z_score = v;
    }
    if let Some(v) = override_value(&parsed, "LOADLENS_MIN_RUNS", warnings) {
        config.aggregation.min_runs = v;
    }
    if let Some(v) = override_value(&parsed, "LOADLENS_TRIAL_TIMEOUT_MS", warnings) {
        config.driver.timeout_ms = v;
    }
    if let Some(v) = override_value(&parsed, "LOADLENS_CONCURRENCY", warnings) {
        config.driver.concurrency = v;
    }
    if let Some(raw) = parsed("LOADLENS_DRIVER") {
        match shlex::split(&raw) {
            Some(argv) if !argv.is_empty() => config.driver.command = argv,
            _ => warnings.push(LoadWarning {
                message: format!("ignoring LOADLENS_DRIVER: cannot split '{raw}' into arguments"),
                location: Some("LOADLENS_DRIVER".to_string()),
            }),
        }
    }
}

fn override_value<T: FromStr>(
    parsed: &impl Fn(&str) -> Option<String>,
    name: &str,
    warnings: &mut Vec<LoadWarning>,
) -> Option<T> {
    let raw = parsed(name)?;
    if let Ok(value) = raw.parse() {
        tracing::debug!(var = name, value = %raw, "applying environment override");
        Some(value)
    } else {
        warnings.push(LoadWarning {
            message: format!("ignoring {name}: cannot parse '{raw}'"),
            location: Some(name.to_string()),
        });
        None
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Expands environment references in raw YAML text before parsing:
/// - `${VAR}` expands to the value, or an empty string with a warning
/// - `${VAR:-default}` expands to `default` if unset
/// - `${VAR:?message}` fails if unset
/// - `$$` is a literal `$`
fn substitute_env(
    raw: &str,
    source: &Path,
    lookup: &dyn Fn(&str) -> Option<String>,
    warnings: &mut Vec<LoadWarning>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
            continue;
        }
        let Some(body_start) = tail.strip_prefix('{') else {
            out.push('$');
            rest = tail;
            continue;
        };
        let Some(end) = body_start.find('}') else {
            return Err(ConfigError::ParseError {
                path: source.to_path_buf(),
                line: Some(line_of(raw, raw.len() - rest.len() + pos)),
                message: "unclosed environment variable reference".to_string(),
            });
        };

        let reference = &body_start[..end];
        rest = &body_start[end + 1..];

        let (name, modifier) = match reference.find(":-").or_else(|| reference.find(":?")) {
            Some(i) => (&reference[..i], Some((&reference[i + 1..i + 2], &reference[i + 2..]))),
            None => (reference, None),
        };

        match (lookup(name), modifier) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(("-", default))) => out.push_str(default),
            (None, Some((_, message))) => {
                return Err(ConfigError::EnvVarNotSet {
                    var: name.to_string(),
                    message: message.to_string(),
                });
            }
            (None, None) => warnings.push(LoadWarning {
                message: format!("environment variable '{name}' is not set, using empty string"),
                location: Some(source.display().to_string()),
            }),
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn line_of(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset.min(text.len())].matches('\n').count() + 1
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads an environment variable, falling back to `default` if unset or
/// unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default location checked by `loadlens` when `--config` is not given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let path = PathBuf::from("loadlens.yaml");
    path.is_file().then_some(path)
}

// ============================================================================
// Tests
// ============================================================================
