//! Report assembly and shareable scenario links
//!
//! Converts a [`SimulationResult`] into the JSON document consumed by chart
//! and table renderers, and encodes a [`ScenarioState`] as query parameters
//! (`tls_warm=1&edge_cache=0&...`) for permalinks. Pure serialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;
use url::Url;
use url::form_urlencoded;

use crate::sample::Phase;
use crate::scenario::{ScenarioModel, ScenarioState};
use crate::simulation::{PhaseBreakdown, SimulationResult};

/// Query parameter carrying the measured page in a permalink.
pub const TARGET_URL_PARAM: &str = "url";

/// Rounds to one decimal place for display rows.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// Report Shape
// ============================================================================

/// One row of the phase table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRow {
    /// Phase key, e.g. `"tls"`.
    pub id: Phase,
    /// Display label, e.g. `"TLS Handshake"`.
    pub name: &'static str,
    pub original: f64,
    pub optimized: f64,
    pub delta: f64,
}

/// The document handed to downstream renderers.
///
/// `original` and `optimized` carry unrounded per-phase values, `full_ttfb`
/// and `total`; `phases` rows are rounded to 0.1 ms for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub original: PhaseBreakdown,
    pub optimized: PhaseBreakdown,
    pub phases: Vec<PhaseRow>,
    pub total_delta: f64,
    /// Every registered toggle with its state in this scenario.
    pub scenario: BTreeMap<String, bool>,
}

/// A query key that is not a registered toggle. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToggle {
    pub key: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for UnknownToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown toggle '{}'", self.key)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Result of decoding a scenario query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedScenario {
    /// One entry per registered toggle.
    pub state: ScenarioState,
    /// Keys that were ignored.
    pub unknown: Vec<UnknownToggle>,
    /// Value of the `url` parameter, if present.
    pub target_url: Option<String>,
}

// ============================================================================
// Assembler
// ============================================================================

/// Builds reports and scenario encodings for one toggle registry.
#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler<'m> {
    model: &'m ScenarioModel,
}

impl Default for ReportAssembler<'static> {
    fn default() -> Self {
        Self::new(ScenarioModel::builtin())
    }
}

impl<'m> ReportAssembler<'m> {
    #[must_use]
    pub const fn new(model: &'m ScenarioModel) -> Self {
        Self { model }
    }

    /// Shapes a simulation result for rendering.
    #[must_use]
    pub fn simulation_report(
        &self,
        result: &SimulationResult,
        state: &ScenarioState,
    ) -> SimulationReport {
        let phases = result
            .phases
            .iter()
            .map(|d| PhaseRow {
                id: d.phase,
                name: d.phase.label(),
                original: round1(d.original),
                optimized: round1(d.optimized),
                delta: round1(d.delta),
            })
            .collect();

        SimulationReport {
            original: result.original,
            optimized: result.optimized,
            phases,
            total_delta: result.total_delta,
            scenario: self
                .model
                .keys()
                .map(|k| (k.to_string(), state.is_active(k)))
                .collect(),
        }
    }

    /// Encodes every registered toggle as `key=1` or `key=0`, in registry
    /// order.
    #[must_use]
    pub fn encode_scenario(&self, state: &ScenarioState) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for key in self.model.keys() {
            query.append_pair(key, if state.is_active(key) { "1" } else { "0" });
        }
        query.finish()
    }

    /// Decodes a query string (with or without a leading `?`).
    ///
    /// Only the exact value `"1"` turns a toggle on. Registered toggles that
    /// are absent decode as off. Unknown keys are collected in
    /// [`DecodedScenario::unknown`] and otherwise ignored; the `url`
    /// parameter is returned as the target page.
    #[must_use]
    pub fn decode_scenario(&self, query: &str) -> DecodedScenario {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = ScenarioState::all_off(self.model);
        let mut unknown = Vec::new();
        let mut target_url = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key == TARGET_URL_PARAM {
                target_url = Some(value.into_owned());
            } else if self.model.get(&key).is_some() {
                state.set(&*key, value == "1");
            } else {
                let toggle = UnknownToggle {
                    suggestion: self.model.suggest(&key),
                    key: key.into_owned(),
                };
                debug!(key = %toggle.key, "ignoring unknown toggle in scenario query");
                unknown.push(toggle);
            }
        }

        DecodedScenario {
            state,
            unknown,
            target_url,
        }
    }

    /// Builds a shareable link: `base?url=<target>&tls_warm=1&...`.
    ///
    /// Any query already present on `base` is replaced.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if `base` is not an absolute URL.
    pub fn permalink(
        &self,
        base: &str,
        target_url: &str,
        state: &ScenarioState,
    ) -> Result<String, url::ParseError> {
        let mut link = Url::parse(base)?;
        {
            let mut pairs = link.query_pairs_mut();
            pairs.clear();
            pairs.append_pair(TARGET_URL_PARAM, target_url);
            for key in self.model.keys() {
                pairs.append_pair(key, if state.is_active(key) { "1" } else { "0" });
            }
        }
        Ok(link.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::PhaseSample;
    use crate::scenario::{DEFER_JS, EARLY_HINTS, EDGE_CACHE, TLS_WARM};
    use crate::simulation::SimulationEngine;
    use proptest::prelude::*;

    fn baseline() -> PhaseBreakdown {
        let sample =
            PhaseSample::from_durations([0.0, 20.04, 30.0, 80.0, 150.0, 100.0, 50.0]).unwrap();
        PhaseBreakdown::from(&sample)
    }

    #[test]
    fn encode_lists_every_toggle_in_order() {
        let state = ScenarioState::new().with(TLS_WARM, true).with(DEFER_JS, true);
        assert_eq!(
            ReportAssembler::default().encode_scenario(&state),
            "tls_warm=1&edge_cache=0&defer_js=1&early_hints=0"
        );
    }

    #[test]
    fn decode_is_permissive() {
        let decoded = ReportAssembler::default()
            .decode_scenario("?tls_warm=1&edge_cache=true&defer_js=yes&bogus=1&tls_wram=1");
        assert!(decoded.state.is_active(TLS_WARM));
        assert!(!decoded.state.is_active(EDGE_CACHE));
        assert!(!decoded.state.is_active(DEFER_JS));
        assert!(!decoded.state.is_active(EARLY_HINTS));
        assert_eq!(decoded.unknown.len(), 2);
        assert_eq!(decoded.unknown[0].key, "bogus");
        assert_eq!(decoded.unknown[1].suggestion.as_deref(), Some(TLS_WARM));
        assert!(decoded.target_url.is_none());
    }

    #[test]
    fn decode_empty_query_is_all_off() {
        let decoded = ReportAssembler::default().decode_scenario("");
        assert_eq!(decoded.state, ScenarioState::all_off(ScenarioModel::builtin()));
        assert!(decoded.unknown.is_empty());
    }

    #[test]
    fn permalink_round_trips_through_decode() {
        let assembler = ReportAssembler::default();
        let state = ScenarioState::all_off(ScenarioModel::builtin()).with(EARLY_HINTS, true);
        let link = assembler
            .permalink("https://audit.example.com/simulate?stale=1", "https://shop.example.com/?q=a b", &state)
            .unwrap();
        assert!(link.starts_with("https://audit.example.com/simulate?url="));
        assert!(!link.contains("stale"));

        let query = Url::parse(&link).unwrap().query().unwrap().to_string();
        let decoded = assembler.decode_scenario(&query);
        assert_eq!(decoded.state, state);
        assert_eq!(decoded.target_url.as_deref(), Some("https://shop.example.com/?q=a b"));
        assert!(decoded.unknown.is_empty());
    }

    #[test]
    fn permalink_rejects_relative_base() {
        let state = ScenarioState::new();
        assert!(ReportAssembler::default().permalink("/simulate", "https://x.test", &state).is_err());
    }

    #[test]
    fn report_matches_renderer_shape() {
        let state = ScenarioState::new().with(TLS_WARM, true);
        let result = SimulationEngine::default().simulate_breakdown(&baseline(), &state);
        let report = ReportAssembler::default().simulation_report(&result, &state);
        let v = serde_json::to_value(&report).unwrap();

        assert!(v["original"]["total"].is_number());
        assert!(v["optimized"]["total"].is_number());
        let rows = v["phases"].as_array().unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[1]["id"], "dns");
        assert_eq!(rows[1]["name"], "DNS");
        assert_eq!(rows[1]["original"], 20.0);
        assert_eq!(rows[3]["name"], "TLS Handshake");
        assert_eq!(rows[3]["optimized"], 1.0);
        assert_eq!(rows[3]["delta"], -79.0);
        assert_eq!(v["scenario"]["tls_warm"], true);
        assert_eq!(v["scenario"]["early_hints"], false);
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(mask in 0u8..16) {
            let assembler = ReportAssembler::default();
            let state: ScenarioState = ScenarioModel::builtin()
                .keys()
                .enumerate()
                .map(|(i, k)| (k.to_string(), mask & (1 << i) != 0))
                .collect();
            let decoded = assembler.decode_scenario(&assembler.encode_scenario(&state));
            prop_assert_eq!(decoded.state, state);
            prop_assert!(decoded.unknown.is_empty());
        }
    }
}
