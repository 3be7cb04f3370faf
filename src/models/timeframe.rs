use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An explicit date range derived from a natural-language time expression.
///
/// Invariant: `start <= end`. The interpreter guarantees this for every
/// timeframe it produces, including fallback and clamped windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
}

impl TimeFrame {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, description: impl Into<String>) -> Self {
        debug_assert!(start <= end, "timeframe start must not exceed end");
        Self {
            start,
            end,
            description: description.into(),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}
