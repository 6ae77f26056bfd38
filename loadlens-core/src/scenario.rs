//! Optimization toggles and the scenario registry
//!
//! Each [`OptimizationToggle`] owns a list of per-phase [`Adjustment`]s. The
//! [`ScenarioModel`] keeps toggles in declaration order, and that order is
//! the order in which active toggles are applied when several of them touch
//! the same phase. Reordering the registry changes combined results whenever
//! scaling and subtracting rules meet on one phase, so the order is part of
//! the contract.
//!
//! Adding a scenario means registering a key and its adjustments; neither
//! aggregation nor simulation changes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::sample::Phase;

// ============================================================================
// Built-in Keys
// ============================================================================

/// Session resumption removes the TLS handshake.
pub const TLS_WARM: &str = "tls_warm";
/// Serving from an edge node shortens DNS and TCP round trips.
pub const EDGE_CACHE: &str = "edge_cache";
/// Deferring scripts removes render-blocking execution.
pub const DEFER_JS: &str = "defer_js";
/// 103 Early Hints lets the browser preload in parallel.
pub const EARLY_HINTS: &str = "early_hints";

// ============================================================================
// Adjustments
// ============================================================================

/// A pure transformation of one phase value.
///
/// Every adjustment clamps its result to `[0, input]`: a toggle may only
/// reduce a phase, never raise it or drive it negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    /// Multiply by `factor`, keeping at least `floor_ms` of residual cost.
    Scale {
        factor: f64,
        #[serde(default)]
        floor_ms: f64,
    },
    /// Remove a fixed cost of `ms`.
    Subtract { ms: f64 },
}

impl Adjustment {
    /// Applies the adjustment to `value` (milliseconds, `>= 0`).
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        let adjusted = match self {
            Self::Scale { factor, floor_ms } => (value * factor).max(floor_ms),
            Self::Subtract { ms } => value - ms,
        };
        adjusted.min(value).max(0.0)
    }
}

/// An adjustment bound to the phase it targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseAdjustment {
    pub phase: Phase,
    pub adjustment: Adjustment,
}

// ============================================================================
// Toggles
// ============================================================================

/// One simulateable optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationToggle {
    /// Registry key, also used as the query parameter name.
    pub key: String,

    /// Short human-readable name.
    #[serde(default)]
    pub label: String,

    /// What the optimization models.
    #[serde(default)]
    pub description: String,

    /// Adjustments applied in list order.
    pub adjustments: Vec<PhaseAdjustment>,
}

impl OptimizationToggle {
    /// Creates a toggle with no adjustments.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            description: description.into(),
            adjustments: Vec::new(),
        }
    }

    /// Adds an adjustment for `phase`.
    #[must_use]
    pub fn adjust(mut self, phase: Phase, adjustment: Adjustment) -> Self {
        self.adjustments.push(PhaseAdjustment { phase, adjustment });
        self
    }

    /// Transforms the baseline value of `phase`. Phases the toggle does not
    /// target are returned unchanged.
    #[must_use]
    pub fn apply(&self, phase: Phase, value: f64) -> f64 {
        self.adjustments
            .iter()
            .filter(|a| a.phase == phase)
            .fold(value, |v, a| a.adjustment.apply(v))
    }

    /// Returns `true` if any adjustment targets `phase`.
    #[must_use]
    pub fn targets(&self, phase: Phase) -> bool {
        self.adjustments.iter().any(|a| a.phase == phase)
    }
}

// ============================================================================
// Factors
// ============================================================================

/// Numeric policy constants for the built-in toggles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioFactors {
    pub tls_warm_factor: f64,
    pub tls_warm_floor_ms: f64,
    pub edge_cache_dns_factor: f64,
    pub edge_cache_tcp_factor: f64,
    pub defer_js_render_factor: f64,
    pub defer_js_render_floor_ms: f64,
    pub early_hints_ttfb_factor: f64,
    pub early_hints_ttfb_floor_ms: f64,
    pub early_hints_download_factor: f64,
}

impl Default for ScenarioFactors {
    fn default() -> Self {
        Self {
            tls_warm_factor: 0.0,
            tls_warm_floor_ms: 1.0,
            edge_cache_dns_factor: 0.2,
            edge_cache_tcp_factor: 0.1,
            defer_js_render_factor: 0.6,
            defer_js_render_floor_ms: 100.0,
            early_hints_ttfb_factor: 0.7,
            early_hints_ttfb_floor_ms: 10.0,
            early_hints_download_factor: 0.9,
        }
    }
}

impl ScenarioFactors {
    /// Names and values of every scale factor, for range validation.
    #[must_use]
    pub const fn factors(&self) -> [(&'static str, f64); 6] {
        [
            ("tls_warm_factor", self.tls_warm_factor),
            ("edge_cache_dns_factor", self.edge_cache_dns_factor),
            ("edge_cache_tcp_factor", self.edge_cache_tcp_factor),
            ("defer_js_render_factor", self.defer_js_render_factor),
            ("early_hints_ttfb_factor", self.early_hints_ttfb_factor),
            ("early_hints_download_factor", self.early_hints_download_factor),
        ]
    }

    /// Names and values of every floor.
    #[must_use]
    pub const fn floors(&self) -> [(&'static str, f64); 3] {
        [
            ("tls_warm_floor_ms", self.tls_warm_floor_ms),
            ("defer_js_render_floor_ms", self.defer_js_render_floor_ms),
            ("early_hints_ttfb_floor_ms", self.early_hints_ttfb_floor_ms),
        ]
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered registry of optimization toggles.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioModel {
    toggles: Vec<OptimizationToggle>,
}

/// Process-wide registry with default factors.
static BUILTIN_MODEL: LazyLock<ScenarioModel> =
    LazyLock::new(|| ScenarioModel::from_factors(&ScenarioFactors::default()));

impl ScenarioModel {
    /// The built-in toggles with default factors.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN_MODEL
    }

    /// Builds the built-in toggles with the given factors, in declaration
    /// order: `tls_warm`, `edge_cache`, `defer_js`, `early_hints`.
    #[must_use]
    pub fn from_factors(f: &ScenarioFactors) -> Self {
        let toggles = vec![
            OptimizationToggle::new(
                TLS_WARM,
                "Warm TLS",
                "TLS session resumption skips the full handshake",
            )
            .adjust(
                Phase::Tls,
                Adjustment::Scale {
                    factor: f.tls_warm_factor,
                    floor_ms: f.tls_warm_floor_ms,
                },
            ),
            OptimizationToggle::new(
                EDGE_CACHE,
                "Edge cache",
                "An edge node close to the user shortens DNS and TCP round trips",
            )
            .adjust(
                Phase::Dns,
                Adjustment::Scale {
                    factor: f.edge_cache_dns_factor,
                    floor_ms: 0.0,
                },
            )
            .adjust(
                Phase::Tcp,
                Adjustment::Scale {
                    factor: f.edge_cache_tcp_factor,
                    floor_ms: 0.0,
                },
            ),
            OptimizationToggle::new(
                DEFER_JS,
                "Defer JavaScript",
                "Render-blocking scripts are deferred until after first render",
            )
            .adjust(
                Phase::Render,
                Adjustment::Scale {
                    factor: f.defer_js_render_factor,
                    floor_ms: f.defer_js_render_floor_ms,
                },
            ),
            OptimizationToggle::new(
                EARLY_HINTS,
                "Early Hints",
                "103 Early Hints let critical resources preload in parallel",
            )
            .adjust(
                Phase::Ttfb,
                Adjustment::Scale {
                    factor: f.early_hints_ttfb_factor,
                    floor_ms: f.early_hints_ttfb_floor_ms,
                },
            )
            .adjust(
                Phase::Download,
                Adjustment::Scale {
                    factor: f.early_hints_download_factor,
                    floor_ms: 0.0,
                },
            ),
        ];
        Self { toggles }
    }

    /// An empty registry.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            toggles: Vec::new(),
        }
    }

    /// Appends a toggle after every toggle already registered.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::DuplicateToggle` if the key is taken.
    pub fn register(&mut self, toggle: OptimizationToggle) -> Result<(), ScenarioError> {
        if self.get(&toggle.key).is_some() {
            return Err(ScenarioError::DuplicateToggle(toggle.key));
        }
        self.toggles.push(toggle);
        Ok(())
    }

    /// Toggles in application order.
    pub fn toggles(&self) -> impl Iterator<Item = &OptimizationToggle> {
        self.toggles.iter()
    }

    /// Keys in application order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.toggles.iter().map(|t| t.key.as_str())
    }

    /// Looks up a toggle by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OptimizationToggle> {
        self.toggles.iter().find(|t| t.key == key)
    }

    /// Looks up a toggle by key, with a typo suggestion on failure.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::UnknownToggle` if no toggle has this key.
    pub fn resolve(&self, key: &str) -> Result<&OptimizationToggle, ScenarioError> {
        self.get(key).ok_or_else(|| ScenarioError::UnknownToggle {
            key: key.to_string(),
            suggestion: self.suggest(key),
        })
    }

    /// Closest registered key within a Damerau-Levenshtein distance of 3.
    #[must_use]
    pub fn suggest(&self, input: &str) -> Option<String> {
        self.keys()
            .map(|k| (k, strsim::damerau_levenshtein(input, k)))
            .filter(|(_, dist)| *dist <= 3)
            .min_by_key(|(_, dist)| *dist)
            .map(|(k, _)| k.to_string())
    }

    /// Number of registered toggles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.toggles.len()
    }

    /// Returns `true` if no toggle is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }
}

// ============================================================================
// Scenario State
// ============================================================================

/// A user's toggle selection, keyed by toggle key.
///
/// Request-scoped and owned by the caller. Keys that are absent count as off;
/// keys unknown to the model are carried but never applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioState {
    toggles: BTreeMap<String, bool>,
}

impl ScenarioState {
    /// An empty selection (everything off).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every toggle of `model` explicitly set to off.
    #[must_use]
    pub fn all_off(model: &ScenarioModel) -> Self {
        model.keys().map(|k| (k.to_string(), false)).collect()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, on: bool) -> Self {
        self.set(key, on);
        self
    }

    /// Sets a toggle on or off.
    pub fn set(&mut self, key: impl Into<String>, on: bool) {
        self.toggles.insert(key.into(), on);
    }

    /// Turns a toggle on.
    pub fn enable(&mut self, key: impl Into<String>) {
        self.set(key, true);
    }

    /// Returns `true` if `key` is explicitly on.
    #[must_use]
    pub fn is_active(&self, key: &str) -> bool {
        self.toggles.get(key).copied().unwrap_or(false)
    }

    /// Keys that are on, sorted.
    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.toggles
            .iter()
            .filter(|(_, on)| **on)
            .map(|(k, _)| k.as_str())
    }

    /// Returns `true` if no toggle of `model` is on.
    #[must_use]
    pub fn is_identity(&self, model: &ScenarioModel) -> bool {
        !model.keys().any(|k| self.is_active(k))
    }

    /// Iterates `(key, on)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.toggles.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for ScenarioState {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self {
            toggles: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_declaration_order() {
        let keys: Vec<&str> = ScenarioModel::builtin().keys().collect();
        assert_eq!(keys, vec![TLS_WARM, EDGE_CACHE, DEFER_JS, EARLY_HINTS]);
    }

    #[test]
    fn tls_warm_near_zeroes_tls_only() {
        let toggle = ScenarioModel::builtin().get(TLS_WARM).unwrap();
        assert!((toggle.apply(Phase::Tls, 80.0) - 1.0).abs() < f64::EPSILON);
        assert!((toggle.apply(Phase::Dns, 20.0) - 20.0).abs() < f64::EPSILON);
        assert!(toggle.apply(Phase::Tls, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn edge_cache_scales_dns_and_tcp() {
        let toggle = ScenarioModel::builtin().get(EDGE_CACHE).unwrap();
        assert!((toggle.apply(Phase::Dns, 20.0) - 4.0).abs() < 1e-9);
        assert!((toggle.apply(Phase::Tcp, 30.0) - 3.0).abs() < 1e-9);
        assert!((toggle.apply(Phase::Ttfb, 150.0) - 150.0).abs() < f64::EPSILON);
        assert!(toggle.targets(Phase::Dns));
        assert!(!toggle.targets(Phase::Tls));
    }

    #[test]
    fn floors_never_raise_a_phase() {
        let toggle = ScenarioModel::builtin().get(DEFER_JS).unwrap();
        // 60 * 0.6 = 36 would floor to 100, but the input is only 60
        assert!((toggle.apply(Phase::Render, 60.0) - 60.0).abs() < f64::EPSILON);
        assert!((toggle.apply(Phase::Render, 500.0) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn subtract_clamps_at_zero() {
        let adj = Adjustment::Subtract { ms: 50.0 };
        assert!(adj.apply(30.0).abs() < f64::EPSILON);
        assert!((adj.apply(80.0) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_factor_clamps_at_zero() {
        let adj = Adjustment::Scale {
            factor: -2.0,
            floor_ms: 0.0,
        };
        assert!(adj.apply(10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut model = ScenarioModel::from_factors(&ScenarioFactors::default());
        let err = model
            .register(OptimizationToggle::new(TLS_WARM, "", ""))
            .unwrap_err();
        assert_eq!(err, ScenarioError::DuplicateToggle(TLS_WARM.to_string()));
    }

    #[test]
    fn register_appends_in_order() {
        let mut model = ScenarioModel::from_factors(&ScenarioFactors::default());
        model
            .register(
                OptimizationToggle::new("brotli", "Brotli", "Smaller transfer")
                    .adjust(Phase::Download, Adjustment::Scale { factor: 0.8, floor_ms: 0.0 }),
            )
            .unwrap();
        assert_eq!(model.keys().last(), Some("brotli"));
        assert_eq!(model.len(), 5);
    }

    #[test]
    fn resolve_suggests_close_key() {
        let err = ScenarioModel::builtin().resolve("tls_wram").unwrap_err();
        assert_eq!(
            err,
            ScenarioError::UnknownToggle {
                key: "tls_wram".to_string(),
                suggestion: Some(TLS_WARM.to_string()),
            }
        );
        assert!(ScenarioModel::builtin().suggest("completely_different").is_none());
    }

    #[test]
    fn custom_factors_flow_into_rules() {
        let model = ScenarioModel::from_factors(&ScenarioFactors {
            edge_cache_dns_factor: 0.5,
            ..ScenarioFactors::default()
        });
        let toggle = model.get(EDGE_CACHE).unwrap();
        assert!((toggle.apply(Phase::Dns, 20.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_state_defaults_off() {
        let state = ScenarioState::new().with(TLS_WARM, true).with(DEFER_JS, false);
        assert!(state.is_active(TLS_WARM));
        assert!(!state.is_active(DEFER_JS));
        assert!(!state.is_active(EARLY_HINTS));
        assert_eq!(state.active_keys().collect::<Vec<_>>(), vec![TLS_WARM]);
        assert!(!state.is_identity(ScenarioModel::builtin()));
        assert!(ScenarioState::all_off(ScenarioModel::builtin()).is_identity(ScenarioModel::builtin()));
    }

    #[test]
    fn unknown_keys_do_not_break_identity() {
        let state = ScenarioState::new().with("not_a_toggle", true);
        assert!(state.is_identity(ScenarioModel::builtin()));
    }

    #[test]
    fn toggle_deserializes_from_yaml_like_json() {
        let toggle: OptimizationToggle = serde_json::from_str(
            r#"{"key": "brotli", "adjustments": [
                {"phase": "download", "adjustment": {"kind": "scale", "factor": 0.8}},
                {"phase": "http_wait", "adjustment": {"kind": "subtract", "ms": 5}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(toggle.adjustments.len(), 2);
        assert_eq!(toggle.adjustments[1].phase, Phase::Ttfb);
        assert!((toggle.apply(Phase::Download, 100.0) - 80.0).abs() < 1e-9);
    }
}
