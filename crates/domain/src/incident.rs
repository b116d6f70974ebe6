use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Incident severity. The derived `Ord` gives the escalation order
/// low < medium < high < critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Error)]
#[error("unknown severity: {0}")]
pub struct SeverityParseError(pub String);

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(SeverityParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Threshold above which incidents are escalated to the forge.
/// `None` disables escalation entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationThreshold {
    AtLeast(Severity),
    None,
}

impl EscalationThreshold {
    pub fn admits(&self, severity: Severity) -> bool {
        match self {
            Self::AtLeast(floor) => severity >= *floor,
            Self::None => false,
        }
    }
}

impl FromStr for EscalationThreshold {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else {
            Ok(Self::AtLeast(s.parse()?))
        }
    }
}

/// Minimum severity at which the auto-fix engine engages. `all` admits
/// every severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFixFloor {
    AtLeast(Severity),
    All,
}

impl AutoFixFloor {
    pub fn admits(&self, severity: Severity) -> bool {
        match self {
            Self::AtLeast(floor) => severity >= *floor,
            Self::All => true,
        }
    }
}

impl FromStr for AutoFixFloor {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::AtLeast(s.parse()?))
        }
    }
}

/// A cluster of related log events detected in one workflow run.
///
/// Incidents are per-run: the same underlying fault produces a fresh
/// incident (with a fresh id) on every detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    /// Signal bucket key, e.g. `error_burst:/api/orders`.
    pub key: String,
    /// Signal label, e.g. `error_burst`, `latency`, `auth`.
    pub label: String,
    pub title: String,
    pub severity: Severity,
    /// Up to five representative messages.
    pub evidence: Vec<String>,
    /// Nanosecond decimal strings, numerically smallest/largest in the bucket.
    pub first_seen: String,
    pub last_seen: String,
    pub count: u64,
}

/// LLM-produced enrichment of an incident. Present only when a provider is
/// configured and its reply validated against the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    pub summary: String,
    pub root_cause: String,
    pub recommended_actions: Vec<String>,
    pub suggested_severity: Severity,
    #[serde(default)]
    pub suggested_labels: Vec<String>,
    pub confidence: f64,
}
