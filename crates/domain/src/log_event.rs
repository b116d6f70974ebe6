use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single log line returned by a range query against the log backend.
///
/// `timestamp` is nanoseconds since the Unix epoch rendered as a decimal
/// string, exactly as the backend returns it. Widths may differ between
/// events, so ordering comparisons must parse it numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub message: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl LogEvent {
    /// Numeric timestamp for ordering. Events with an unparseable timestamp
    /// sort first.
    pub fn timestamp_ns(&self) -> i128 {
        self.timestamp.parse().unwrap_or(i128::MIN)
    }
}
