//! Configuration schema types
//!
//! Deserialized from the YAML file given with `--config`. Every section is
//! optional; omitted fields take the built-in defaults.

use serde::{Deserialize, Serialize};

use loadlens_core::{
    AggregationConfig, OptimizationToggle, ScenarioError, ScenarioFactors, ScenarioModel,
};

/// Default per-trial timeout, matching a browser navigation timeout.
pub const DEFAULT_TRIAL_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for `loadlens`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadLensConfig {
    /// Outlier filtering and confidence interval policy
    pub aggregation: AggregationConfig,

    /// Toggle factors and custom toggles
    pub scenarios: ScenarioConfig,

    /// External browser driver
    pub driver: DriverConfig,
}

// ============================================================================
// Scenarios
// ============================================================================

/// Scenario registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Overrides for the built-in toggle constants
    pub factors: ScenarioFactors,

    /// Extra toggles, applied after the built-ins in list order
    pub toggles: Vec<OptimizationToggle>,
}

impl ScenarioConfig {
    /// Builds the registry: built-in toggles with configured factors, then
    /// custom toggles.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::DuplicateToggle` if a custom key collides.
    pub fn build_model(&self) -> Result<ScenarioModel, ScenarioError> {
        let mut model = ScenarioModel::from_factors(&self.factors);
        for toggle in &self.toggles {
            model.register(toggle.clone())?;
        }
        Ok(model)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// How browser trials are executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Driver argv; the target URL is appended as the last argument
    pub command: Vec<String>,

    /// Per-trial timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum trials in flight (1 = sequential)
    pub concurrency: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: DEFAULT_TRIAL_TIMEOUT_MS,
            concurrency: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: LoadLensConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, LoadLensConfig::default());
        assert!((config.aggregation.outlier_k - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.driver.timeout_ms, DEFAULT_TRIAL_TIMEOUT_MS);
        assert_eq!(config.driver.concurrency, 1);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let yaml = r"
aggregation:
  outlier_k: 2.5
scenarios:
  factors:
    edge_cache_dns_factor: 0.5
driver:
  command: [node, drivers/playwright.js]
";
        let config: LoadLensConfig = serde_yaml::from_str(yaml).unwrap();
        assert!((config.aggregation.outlier_k - 2.5).abs() < f64::EPSILON);
        assert!((config.aggregation.z_score - 1.96).abs() < f64::EPSILON);
        assert!((config.scenarios.factors.edge_cache_dns_factor - 0.5).abs() < f64::EPSILON);
        assert!((config.scenarios.factors.edge_cache_tcp_factor - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.driver.command, vec!["node", "drivers/playwright.js"]);
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<LoadLensConfig, _> = serde_yaml::from_str("throttling: 3g\n");
        assert!(result.is_err());
    }

    #[test]
    fn custom_toggles_follow_builtins() {
        let yaml = r"
toggles:
  - key: brotli
    label: Brotli
    adjustments:
      - phase: download
        adjustment: { kind: scale, factor: 0.75 }
";
        let scenarios: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        let model = scenarios.build_model().unwrap();
        let keys: Vec<&str> = model.keys().collect();
        assert_eq!(
            keys,
            vec!["tls_warm", "edge_cache", "defer_js", "early_hints", "brotli"]
        );
    }

    #[test]
    fn custom_toggle_cannot_shadow_builtin() {
        let scenarios = ScenarioConfig {
            toggles: vec![OptimizationToggle::new("defer_js", "", "")],
            ..ScenarioConfig::default()
        };
        assert!(scenarios.build_model().is_err());
    }
}
