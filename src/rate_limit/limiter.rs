use crate::config::RateLimitConfig;
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;
use crate::rate_limit::sliding_window::{Decision, Policy};
use crate::store::{AppendOutcome, RecordStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-identifier sliding window limiter over a shared record store.
///
/// Holds no mutable state; the count-compare-append runs as one atomic store
/// operation, so one instance is shared across all request tasks and across
/// horizontally scaled processes.
pub struct RateLimiter {
    store: Arc<dyn RecordStore>,
    policy: Policy,
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(store: Arc<dyn RecordStore>, policy: Policy, store_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            store_timeout,
        }
    }

    pub fn from_config(
        store: Arc<dyn RecordStore>,
        config: &RateLimitConfig,
        store_timeout: Duration,
    ) -> Result<Self> {
        let policy = Policy::from_config(config)?;
        Ok(Self::new(store, policy, store_timeout))
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Check the quota for `identifier` at the current time
    pub async fn check(&self, identifier: &str) -> Result<Decision> {
        self.check_and_record(identifier, Utc::now()).await
    }

    /// Decide whether a request at `now` fits the quota and, if it does,
    /// persist it. A denial never writes to the store.
    pub async fn check_and_record(&self, identifier: &str, now: DateTime<Utc>) -> Result<Decision> {
        if identifier.is_empty() {
            return Err(AppError::Validation(
                "identifier must not be empty".to_string(),
            ));
        }

        tracing::debug!(
            identifier = %identifier,
            limit = %self.policy.max_requests,
            window_seconds = %self.policy.window.as_secs(),
            "Checking rate limit"
        );

        let request = self.policy.admission(identifier, now);
        let outcome = self
            .with_timeout("check_and_append", self.store.check_and_append(request))
            .await?;
        let decision = self.policy.decide(outcome, now);

        match outcome {
            AppendOutcome::Appended { active_before } => {
                MetricsRecorder::record_decision("admitted");
                tracing::debug!(
                    identifier = %identifier,
                    current = %(active_before + 1),
                    remaining = %decision.remaining(),
                    "Request admitted"
                );
            }
            AppendOutcome::Rejected { active, .. } => {
                MetricsRecorder::record_decision("denied");
                tracing::warn!(
                    identifier = %identifier,
                    limit = %self.policy.max_requests,
                    current = %active,
                    retry_after_seconds = ?decision.retry_after().map(|d| d.as_secs()),
                    "Rate limit exceeded"
                );
            }
        }

        Ok(decision)
    }

    /// Number of requests counted against `identifier` at `now`
    pub async fn active_count(&self, identifier: &str, now: DateTime<Utc>) -> Result<u64> {
        let window = self.policy.window_delta();

        let count = self
            .with_timeout("get", self.store.get(identifier))
            .await?
            .map(|record| record.active_timestamps(now, window).len() as u64)
            .unwrap_or(0);

        Ok(count)
    }

    /// Forget every recorded request for `identifier`
    pub async fn reset(&self, identifier: &str) -> Result<()> {
        self.with_timeout("remove", self.store.remove(identifier)).await?;

        tracing::info!(identifier = %identifier, "Rate limit reset");

        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        let outcome = match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        outcome.map_err(|e| {
            MetricsRecorder::record_store_error(operation);
            tracing::error!(operation = %operation, error = %e, "Rate limit store failure");
            AppError::from(e)
        })
    }
}
