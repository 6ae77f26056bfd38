//! Load phases and per-trial samples
//!
//! A [`PhaseSample`] is the timing breakdown of one browser navigation.
//! Samples are validated on construction and immutable afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SampleError;

// ============================================================================
// Phase
// ============================================================================

/// A named segment of page-load time.
///
/// Variants are declared in load order; [`Phase::ALL`] is the canonical
/// iteration order used everywhere a breakdown is summed or reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Time spent following HTTP redirects.
    Redirect = 0,
    /// DNS lookup.
    Dns = 1,
    /// TCP connection establishment.
    #[serde(alias = "connect")]
    Tcp = 2,
    /// TLS handshake.
    Tls = 3,
    /// Wait between sending the request and the first response byte.
    #[serde(alias = "http_wait")]
    Ttfb = 4,
    /// Response body transfer.
    Download = 5,
    /// Client-side work between the end of the response and the load event.
    #[serde(alias = "client_render")]
    Render = 6,
}

impl Phase {
    /// Number of phases.
    pub const COUNT: usize = 7;

    /// All phases in canonical order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Redirect,
        Self::Dns,
        Self::Tcp,
        Self::Tls,
        Self::Ttfb,
        Self::Download,
        Self::Render,
    ];

    /// Returns the snake_case identifier used in JSON and query strings.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Dns => "dns",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Ttfb => "ttfb",
            Self::Download => "download",
            Self::Render => "render",
        }
    }

    /// Returns the human-readable label shown in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Redirect => "Redirect",
            Self::Dns => "DNS",
            Self::Tcp => "TCP Connect",
            Self::Tls => "TLS Handshake",
            Self::Ttfb => "HTTP Wait",
            Self::Download => "Download",
            Self::Render => "Client Render",
        }
    }

    /// Returns `true` for the phases that precede the first response byte.
    ///
    /// Their sum is the full time-to-first-byte including connection setup.
    #[must_use]
    pub const fn is_connection_setup(self) -> bool {
        matches!(
            self,
            Self::Redirect | Self::Dns | Self::Tcp | Self::Tls | Self::Ttfb
        )
    }

    /// Position of the phase in [`Phase::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redirect" => Ok(Self::Redirect),
            "dns" => Ok(Self::Dns),
            "tcp" | "connect" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            "ttfb" | "http_wait" => Ok(Self::Ttfb),
            "download" => Ok(Self::Download),
            "render" | "client_render" => Ok(Self::Render),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

// ============================================================================
// Navigation Timing
// ============================================================================

/// The subset of a W3C `PerformanceNavigationTiming` entry needed to derive
/// phase durations.
///
/// Browser drivers emit this object as-is; absent fields default to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationTiming {
    pub redirect_start: f64,
    pub redirect_end: f64,
    pub redirect_count: u32,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub secure_connection_start: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub load_event_end: f64,
}

fn span(start: f64, end: f64) -> f64 {
    (end - start).max(0.0)
}

// ============================================================================
// PhaseSample
// ============================================================================

/// One trial's measured phase durations, in milliseconds.
///
/// Invariants: every duration is finite and `>= 0`, and `total` equals the
/// sum of the durations taken in [`Phase::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSample {
    durations: [f64; Phase::COUNT],
    total: f64,
}

impl PhaseSample {
    /// Builds a sample from durations indexed by [`Phase::index`].
    ///
    /// # Errors
    ///
    /// Returns `SampleError::InvalidDuration` if any value is negative or not
    /// finite, and `SampleError::TotalOverflow` if the sum is not finite.
    pub fn from_durations(durations: [f64; Phase::COUNT]) -> Result<Self, SampleError> {
        for phase in Phase::ALL {
            let value = durations[phase.index()];
            if !value.is_finite() || value < 0.0 {
                return Err(SampleError::InvalidDuration { phase, value });
            }
        }
        let total: f64 = durations.iter().sum();
        if !total.is_finite() {
            return Err(SampleError::TotalOverflow);
        }
        Ok(Self { durations, total })
    }

    /// Builds a sample from `(phase, ms)` pairs. Phases not mentioned are zero;
    /// a phase mentioned twice keeps the last value.
    ///
    /// # Errors
    ///
    /// Returns `SampleError::InvalidDuration` if any value is negative or not
    /// finite.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Phase, f64)>) -> Result<Self, SampleError> {
        let mut durations = [0.0; Phase::COUNT];
        for (phase, value) in pairs {
            durations[phase.index()] = value;
        }
        Self::from_durations(durations)
    }

    /// Derives a sample from a navigation timing entry.
    ///
    /// TLS time is only counted when a secure connection was started, and
    /// redirect time only when at least one redirect happened. Negative spans
    /// (unset or out-of-order marks) clamp to zero.
    ///
    /// # Errors
    ///
    /// Returns `SampleError::TotalOverflow` if the derived phases sum to a
    /// non-finite total.
    pub fn from_navigation_timing(nav: &NavigationTiming) -> Result<Self, SampleError> {
        let mut durations = [0.0; Phase::COUNT];
        durations[Phase::Dns.index()] = span(nav.domain_lookup_start, nav.domain_lookup_end);
        durations[Phase::Tcp.index()] = span(nav.connect_start, nav.connect_end);
        if nav.secure_connection_start > 0.0 {
            durations[Phase::Tls.index()] = span(nav.secure_connection_start, nav.connect_end);
        }
        durations[Phase::Ttfb.index()] = span(nav.request_start, nav.response_start);
        durations[Phase::Download.index()] = span(nav.response_start, nav.response_end);
        durations[Phase::Render.index()] = span(nav.response_end, nav.load_event_end);
        if nav.redirect_count > 0 {
            durations[Phase::Redirect.index()] = span(nav.redirect_start, nav.redirect_end);
        }
        // NaN marks survive `max`, so sanitize before the invariant check.
        for value in &mut durations {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        Self::from_durations(durations)
    }

    /// Duration of one phase in milliseconds.
    #[must_use]
    pub const fn get(&self, phase: Phase) -> f64 {
        self.durations[phase.index()]
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

impl Serialize for PhaseSample {
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
// Sample Files
// ============================================================================

/// Keys that are derived rather than measured; ignored in phase maps.
const DERIVED_KEYS: [&str; 2] = ["total", "full_ttfb"];

/// Parses a JSON array of samples.
///
/// Each element is either a phase map (`{"dns": 20.0, ...}`, aliases such as
/// `http_wait` accepted, `total`/`full_ttfb` ignored) or a navigation timing
/// entry, recognised by a `requestStart` or `responseStart` key.
///
/// # Errors
///
/// Returns `SampleError::Malformed` if the document is not an array of
/// objects, names an unknown phase, or carries a non-numeric duration, and
/// `SampleError::InvalidDuration` for negative phase-map values.
pub fn parse_samples(json: &str) -> Result<Vec<PhaseSample>, SampleError> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| SampleError::Malformed {
            index: 0,
            message: e.to_string(),
        })?;
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_sample_entry(index, entry))
        .collect()
}

/// Parses a single JSON object in either accepted sample form.
///
/// # Errors
///
/// Same as [`parse_samples`], with index 0.
pub fn parse_sample(json: &str) -> Result<PhaseSample, SampleError> {
    let entry: serde_json::Value =
        serde_json::from_str(json).map_err(|e| SampleError::Malformed {
            index: 0,
            message: e.to_string(),
        })?;
    parse_sample_entry(0, entry)
}

fn parse_sample_entry(index: usize, entry: serde_json::Value) -> Result<PhaseSample, SampleError> {
    let malformed = |message: String| SampleError::Malformed { index, message };

    let serde_json::Value::Object(map) = entry else {
        return Err(malformed("expected a JSON object".to_string()));
    };

    if map.contains_key("requestStart") || map.contains_key("responseStart") {
        let nav: NavigationTiming = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| malformed(e.to_string()))?;
        return PhaseSample::from_navigation_timing(&nav);
    }

    let mut pairs = BTreeMap::new();
    for (key, value) in map {
        if DERIVED_KEYS.contains(&key.as_str()) || value.is_null() {
            continue;
        }
        let phase = key.parse::<Phase>().map_err(malformed)?;
        let ms = value
            .as_f64()
            .ok_or_else(|| malformed(format!("phase '{key}' is not a number")))?;
        pairs.insert(phase, ms);
    }
    PhaseSample::from_pairs(pairs)
}
