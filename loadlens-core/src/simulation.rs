//! Counterfactual simulation
//!
//! [`SimulationEngine::simulate`] takes the representative value of each
//! phase (the median of the baseline profile), applies every active toggle
//! in registry order, and sums the adjusted phases into a new total. Nothing
//! is re-filtered or re-aggregated: simulation is a deterministic transform
//! of one value per phase.
//!
//! The engine borrows its registry immutably and allocates a fresh result on
//! every call, so it can be shared across threads freely.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::aggregate::PhaseProfile;
use crate::sample::{Phase, PhaseSample};
use crate::scenario::{OptimizationToggle, ScenarioModel, ScenarioState};

// ============================================================================
// Breakdown
// ============================================================================

/// One representative value per phase plus their sum.
///
/// `total` is always the sum of the phase values in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseBreakdown {
    values: [f64; Phase::COUNT],
    total: f64,
}

impl PhaseBreakdown {
    /// Builds a breakdown by evaluating `f` for each phase in canonical order.
    pub fn from_fn(mut f: impl FnMut(Phase) -> f64) -> Self {
        let values = Phase::ALL.map(&mut f);
        let total = values.iter().sum();
        Self { values, total }
    }

    /// Value of one phase.
    #[must_use]
    pub const fn get(&self, phase: Phase) -> f64 {
        self.values[phase.index()]
    }

    /// Sum of all phases.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Sum of the connection-setup phases (redirect through ttfb).
    #[must_use]
    pub fn full_ttfb(&self) -> f64 {
        Phase::ALL
            .iter()
            .filter(|p| p.is_connection_setup())
            .map(|p| self.get(*p))
            .sum()
    }

    /// Iterates `(phase, ms)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, f64)> + '_ {
        Phase::ALL.iter().map(|p| (*p, self.get(*p)))
    }
}

impl From<&PhaseSample> for PhaseBreakdown {
    fn from(sample: &PhaseSample) -> Self {
        Self::from_fn(|phase| sample.get(phase))
    }
}

impl Serialize for PhaseBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Phase::COUNT + 2))?;
        for (phase, value) in self.iter() {
            map.serialize_entry(phase.id(), &value)?;
        }
        map.serialize_entry("full_ttfb", &self.full_ttfb())?;
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

// ============================================================================
// Result
// ============================================================================

/// Before/after values for one phase. A negative `delta` is an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseDelta {
    pub phase: Phase,
    pub original: f64,
    pub optimized: f64,
    pub delta: f64,
}

/// Outcome of one simulation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub original: PhaseBreakdown,
    pub optimized: PhaseBreakdown,
    pub phases: Vec<PhaseDelta>,
    pub total_delta: f64,
    /// Toggle keys that were applied, in application order.
    pub applied: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Applies a scenario to a baseline.
#[derive(Debug, Clone, Copy)]
pub struct SimulationEngine<'m> {
    model: &'m ScenarioModel,
}

impl Default for SimulationEngine<'static> {
    fn default() -> Self {
        Self::new(ScenarioModel::builtin())
    }
}

impl<'m> SimulationEngine<'m> {
    /// Creates an engine over `model`.
    #[must_use]
    pub const fn new(model: &'m ScenarioModel) -> Self {
        Self { model }
    }

    /// The registry in use.
    #[must_use]
    pub const fn model(&self) -> &'m ScenarioModel {
        self.model
    }

    /// Simulates `state` against the medians of `baseline`.
    #[must_use]
    pub fn simulate(&self, baseline: &PhaseProfile, state: &ScenarioState) -> SimulationResult {
        self.simulate_breakdown(&baseline.representative(), state)
    }

    /// Simulates `state` against an already-reduced baseline.
    ///
    /// With no active toggle, `optimized` is bit-identical to `original`.
    #[must_use]
    pub fn simulate_breakdown(
        &self,
        baseline: &PhaseBreakdown,
        state: &ScenarioState,
    ) -> SimulationResult {
        let active: Vec<&OptimizationToggle> = self
            .model
            .toggles()
            .filter(|t| state.is_active(&t.key))
            .collect();

        let optimized = PhaseBreakdown::from_fn(|phase| {
            active
                .iter()
                .fold(baseline.get(phase), |value, toggle| toggle.apply(phase, value))
        });

        let phases = Phase::ALL
            .iter()
            .map(|&phase| {
                let original = baseline.get(phase);
                let adjusted = optimized.get(phase);
                PhaseDelta {
                    phase,
                    original,
                    optimized: adjusted,
                    delta: adjusted - original,
                }
            })
            .collect();

        SimulationResult {
            original: *baseline,
            optimized,
            phases,
            total_delta: optimized.total() - baseline.total(),
            applied: active.iter().map(|t| t.key.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TrialAggregator;
    use crate::scenario::{Adjustment, DEFER_JS, EARLY_HINTS, EDGE_CACHE, ScenarioFactors, TLS_WARM};
    use proptest::prelude::*;

    fn baseline() -> PhaseBreakdown {
        let sample = PhaseSample::from_durations([0.0, 20.0, 30.0, 80.0, 150.0, 100.0, 50.0]).unwrap();
        PhaseBreakdown::from(&sample)
    }

    fn all_states() -> Vec<ScenarioState> {
        let keys = [TLS_WARM, EDGE_CACHE, DEFER_JS, EARLY_HINTS];
        (0..16u8)
            .map(|mask| {
                keys.iter()
                    .enumerate()
                    .map(|(i, k)| (*k, mask & (1 << i) != 0))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn end_to_end_tls_and_edge() {
        let engine = SimulationEngine::default();
        let state = ScenarioState::new().with(TLS_WARM, true).with(EDGE_CACHE, true);
        let result = engine.simulate_breakdown(&baseline(), &state);

        assert!((result.original.total() - 430.0).abs() < 1e-9);
        assert!(result.optimized.get(Phase::Tls) <= 1.0);
        assert!((result.optimized.get(Phase::Dns) - 4.0).abs() < 1e-9);
        assert!((result.optimized.get(Phase::Tcp) - 3.0).abs() < 1e-9);
        for phase in [Phase::Render, Phase::Ttfb, Phase::Download, Phase::Redirect] {
            assert_eq!(
                result.optimized.get(phase).to_bits(),
                result.original.get(phase).to_bits()
            );
        }
        assert!(result.optimized.total() < 430.0);
        assert!(result.total_delta < 0.0);
        assert_eq!(result.applied, vec![TLS_WARM.to_string(), EDGE_CACHE.to_string()]);
    }

    #[test]
    fn disjoint_toggles_do_not_interact() {
        let engine = SimulationEngine::default();
        let alone = engine.simulate_breakdown(&baseline(), &ScenarioState::new().with(TLS_WARM, true));
        let both = engine.simulate_breakdown(
            &baseline(),
            &ScenarioState::new().with(TLS_WARM, true).with(EDGE_CACHE, true),
        );
        assert_eq!(
            alone.optimized.get(Phase::Tls).to_bits(),
            both.optimized.get(Phase::Tls).to_bits()
        );
    }

    #[test]
    fn registry_order_governs_shared_phases() {
        let mut model = ScenarioModel::empty();
        model
            .register(
                OptimizationToggle::new("halve", "", "")
                    .adjust(Phase::Ttfb, Adjustment::Scale { factor: 0.5, floor_ms: 0.0 }),
            )
            .unwrap();
        model
            .register(
                OptimizationToggle::new("minus_forty", "", "")
                    .adjust(Phase::Ttfb, Adjustment::Subtract { ms: 40.0 }),
            )
            .unwrap();
        let engine = SimulationEngine::new(&model);
        let state = ScenarioState::new().with("minus_forty", true).with("halve", true);
        let result = engine.simulate_breakdown(&baseline(), &state);
        // 150 * 0.5 - 40, not (150 - 40) * 0.5
        assert!((result.optimized.get(Phase::Ttfb) - 35.0).abs() < 1e-9);
        assert_eq!(result.applied, vec!["halve".to_string(), "minus_forty".to_string()]);
    }

    #[test]
    fn simulate_uses_profile_medians() {
        let samples: Vec<PhaseSample> = [140.0, 150.0, 160.0, 4000.0]
            .into_iter()
            .map(|ttfb| PhaseSample::from_pairs([(Phase::Ttfb, ttfb), (Phase::Tls, 80.0)]).unwrap())
            .collect();
        let profile = TrialAggregator::default().aggregate(&samples).unwrap();
        let result = SimulationEngine::default()
            .simulate(&profile, &ScenarioState::new().with(TLS_WARM, true));
        assert!((result.original.get(Phase::Ttfb) - 150.0).abs() < 1e-9);
        assert!((result.optimized.get(Phase::Tls) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn every_combination_keeps_totals_consistent_and_non_negative() {
        let engine = SimulationEngine::default();
        for state in all_states() {
            let result = engine.simulate_breakdown(&baseline(), &state);
            let sum: f64 = result.optimized.iter().map(|(_, v)| v).sum();
            assert_eq!(sum.to_bits(), result.optimized.total().to_bits());
            assert!(result.optimized.iter().all(|(_, v)| v >= 0.0));
            let delta_sum: f64 = result.phases.iter().map(|d| d.delta).sum();
            assert!((delta_sum - result.total_delta).abs() < 1e-9);
        }
    }

    #[test]
    fn serialized_breakdown_includes_totals() {
        let v = serde_json::to_value(baseline()).unwrap();
        assert_eq!(v["total"], 430.0);
        assert_eq!(v["full_ttfb"], 280.0);
        assert_eq!(v["tcp"], 30.0);
    }

    fn breakdown_strategy() -> impl Strategy<Value = PhaseBreakdown> {
        prop::array::uniform7(0.0f64..10_000.0).prop_map(|values| {
            PhaseBreakdown::from_fn(|phase| values[phase.index()])
        })
    }

    fn factors_strategy() -> impl Strategy<Value = ScenarioFactors> {
        (
            prop::array::uniform6(0.0f64..=1.0),
            prop::array::uniform3(0.0f64..500.0),
        )
            .prop_map(|(f, floors)| ScenarioFactors {
                tls_warm_factor: f[0],
                edge_cache_dns_factor: f[1],
                edge_cache_tcp_factor: f[2],
                defer_js_render_factor: f[3],
                early_hints_ttfb_factor: f[4],
                early_hints_download_factor: f[5],
                tls_warm_floor_ms: floors[0],
                defer_js_render_floor_ms: floors[1],
                early_hints_ttfb_floor_ms: floors[2],
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn identity_scenario_is_exact(base in breakdown_strategy()) {
            let model = ScenarioModel::builtin();
            let result = SimulationEngine::new(model)
                .simulate_breakdown(&base, &ScenarioState::all_off(model));
            prop_assert_eq!(result.optimized, base);
            prop_assert_eq!(result.total_delta.to_bits(), 0.0f64.to_bits());
            prop_assert!(result.applied.is_empty());
        }

        #[test]
        fn adjusted_phases_never_negative_or_raised(
            base in breakdown_strategy(),
            factors in factors_strategy(),
            mask in 0u8..16,
        ) {
            let model = ScenarioModel::from_factors(&factors);
            let state: ScenarioState = model
                .keys()
                .enumerate()
                .map(|(i, k)| (k.to_string(), mask & (1 << i) != 0))
                .collect();
            let result = SimulationEngine::new(&model).simulate_breakdown(&base, &state);
            for (phase, value) in result.optimized.iter() {
                prop_assert!(value >= 0.0);
                prop_assert!(value <= base.get(phase));
            }
            let sum: f64 = result.optimized.iter().map(|(_, v)| v).sum();
            prop_assert_eq!(sum.to_bits(), result.optimized.total().to_bits());
        }

        #[test]
        fn simulation_is_deterministic(base in breakdown_strategy(), mask in 0u8..16) {
            let model = ScenarioModel::builtin();
            let state: ScenarioState = model
                .keys()
                .enumerate()
                .map(|(i, k)| (k.to_string(), mask & (1 << i) != 0))
                .collect();
            let engine = SimulationEngine::new(model);
            let a = engine.simulate_breakdown(&base, &state);
            let b = engine.simulate_breakdown(&base, &state);
            prop_assert_eq!(a, b);
        }
    }
}
