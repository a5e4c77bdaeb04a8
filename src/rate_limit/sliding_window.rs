use crate::config::RateLimitConfig;
use crate::errors::{AppError, Result};
use crate::store::{AppendOutcome, AppendRequest};
use chrono::{DateTime, Utc};
use std::time::Duration;

// Records outlive the window slightly so a late reader still sees them
const TTL_BUFFER: Duration = Duration::from_secs(60);

/// Sliding window quota, immutable after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Admitted requests allowed per window (exclusive upper bound)
    pub max_requests: u64,
    pub window: Duration,
    /// Delete stale timestamps in the same write that appends a new one
    pub compact_on_write: bool,
}

impl Policy {
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(AppError::Configuration(
                "max_requests must be positive".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(AppError::Configuration(
                "window must be positive".to_string(),
            ));
        }

        Ok(Self {
            max_requests,
            window,
            compact_on_write: true,
        })
    }

    pub fn with_compaction(mut self, compact_on_write: bool) -> Self {
        self.compact_on_write = compact_on_write;
        self
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Ok(Self::new(config.max_requests, config.window())?
            .with_compaction(config.compact_on_write))
    }

    pub fn window_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX)
    }

    /// Instant at or before which a timestamp no longer counts
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window_delta())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Store operation that admits a request at `now` if the quota allows
    pub fn admission(&self, identifier: &str, now: DateTime<Utc>) -> AppendRequest {
        AppendRequest {
            identifier: identifier.to_string(),
            timestamp: now,
            stale_cutoff: self.stale_cutoff(now),
            max_requests: self.max_requests,
            compact: self.compact_on_write,
            ttl: self.window + TTL_BUFFER,
        }
    }

    /// Turn the store's verdict into the caller-facing decision
    pub fn decide(&self, outcome: AppendOutcome, now: DateTime<Utc>) -> Decision {
        match outcome {
            AppendOutcome::Appended { active_before } => Decision::Admitted {
                remaining: self
                    .max_requests
                    .saturating_sub(active_before)
                    .saturating_sub(1),
            },
            AppendOutcome::Rejected { oldest_active, .. } => {
                let elapsed = oldest_active
                    .and_then(|oldest| (now - oldest).to_std().ok())
                    .unwrap_or(Duration::ZERO);

                Decision::Denied {
                    retry_after: self.window.saturating_sub(elapsed),
                }
            }
        }
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted { remaining: u64 },
    Denied { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Admitted { remaining } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Admitted { .. } => None,
            Decision::Denied { retry_after } => Some(*retry_after),
        }
    }
}
