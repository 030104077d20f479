//! Grasp scenarios for deterministic simulation.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// HG-001: Grip-only input converges to the expected curls
    CurlBlend,

    /// HG-002: Open pinch, stabilizer re-solves once at the timeout
    SettleTimeout,

    /// HG-003: Release before the grip settles, no re-solve
    EarlyRelease,

    /// HG-004: Fingers close, stabilizer re-solves before the timeout
    PinchClose,

    /// HG-005: Second grasp supersedes the first stabilizer
    Regrab,

    /// HG-006: Object without shapes, pinch axis parallel to up
    NoColliders,

    /// HG-007: Authored attach pose bypasses the dynamic attach
    AuthoredAttach,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CurlBlend,
            ScenarioId::SettleTimeout,
            ScenarioId::EarlyRelease,
            ScenarioId::PinchClose,
            ScenarioId::Regrab,
            ScenarioId::NoColliders,
            ScenarioId::AuthoredAttach,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CurlBlend => "curl_blend",
            ScenarioId::SettleTimeout => "settle_timeout",
            ScenarioId::EarlyRelease => "early_release",
            ScenarioId::PinchClose => "pinch_close",
            ScenarioId::Regrab => "regrab",
            ScenarioId::NoColliders => "no_colliders",
            ScenarioId::AuthoredAttach => "authored_attach",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CurlBlend => "grip=1, trigger=0: index 0, middle/ring/little 1, thumb 0.6",
            ScenarioId::SettleTimeout => "tips stay 5cm apart: exactly one re-solve at ~80ms",
            ScenarioId::EarlyRelease => "grasp-end at 30ms: stabilizer cancels, attach resets",
            ScenarioId::PinchClose => "tips close within 30ms: re-solve before the timeout",
            ScenarioId::Regrab => "second grasp at 40ms: only the new session re-solves",
            ScenarioId::NoColliders => "no shapes, pinch parallel to up: finite frame at the midpoint",
            ScenarioId::AuthoredAttach => "authored pose kept: no pinch, no session",
        }
    }

    /// Simulated seconds the scenario needs by default.
    pub fn default_duration(&self) -> f64 {
        match self {
            ScenarioId::CurlBlend => 0.6,
            ScenarioId::Regrab => 0.5,
            _ => 0.4,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "curl_blend" | "curlblend" | "hg-001" => Ok(ScenarioId::CurlBlend),
            "settle_timeout" | "settletimeout" | "hg-002" => Ok(ScenarioId::SettleTimeout),
            "early_release" | "earlyrelease" | "hg-003" => Ok(ScenarioId::EarlyRelease),
            "pinch_close" | "pinchclose" | "hg-004" => Ok(ScenarioId::PinchClose),
            "regrab" | "hg-005" => Ok(ScenarioId::Regrab),
            "no_colliders" | "nocolliders" | "hg-006" => Ok(ScenarioId::NoColliders),
            "authored_attach" | "authoredattach" | "hg-007" => Ok(ScenarioId::AuthoredAttach),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
