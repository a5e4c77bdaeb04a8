// Rate limit record: the per-identifier request history kept in the store

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Request history for a single client identifier.
///
/// `timestamps` is in arrival order for the in-memory store. The Redis store
/// returns them ordered by instant, which matches arrival order unless the
/// clocks of two instances disagree; counting never depends on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Opaque client key (sanitized IP)
    pub identifier: String,
    /// Admitted request instants
    pub timestamps: Vec<DateTime<Utc>>,
}

impl RateLimitRecord {
    /// Record for an identifier that has never been seen
    pub fn empty(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            timestamps: Vec::new(),
        }
    }

    /// Timestamps that still fall inside `window` as seen from `now`.
    ///
    /// A timestamp ahead of `now` (clock skew between instances) yields a
    /// negative delta and is counted as active.
    pub fn active_timestamps(&self, now: DateTime<Utc>, window: Duration) -> Vec<DateTime<Utc>> {
        self.timestamps
            .iter()
            .copied()
            .filter(|t| now - *t < window)
            .collect()
    }
}
