// In-process record store for single-instance deployments and tests

use super::{AppendOutcome, AppendRequest, RecordStore, StoreResult};
use crate::domain::RateLimitRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// Sweep expired records once per this many appends
const PURGE_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: RateLimitRecord,
    expires_at: Instant,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap`-backed store. The per-key entry lock makes each
/// check-and-append atomic with respect to every other one on the same
/// identifier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, StoredRecord>,
    appends: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Drop every record whose TTL has passed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, stored| !stored.is_expired(now));
        let purged = before.saturating_sub(self.records.len());

        if purged > 0 {
            tracing::debug!(
                purged = %purged,
                remaining = %self.len(),
                "Expired rate limit records purged"
            );
        }

        purged
    }

    fn append_locked(&self, request: &AppendRequest, now: Instant) -> AppendOutcome {
        let mut entry = self
            .records
            .entry(request.identifier.clone())
            .or_insert_with(|| StoredRecord {
                record: RateLimitRecord::empty(request.identifier.as_str()),
                expires_at: now,
            });
        let stored = entry.value_mut();

        if stored.is_expired(now) {
            stored.record.timestamps.clear();
        }

        let active: Vec<_> = stored
            .record
            .timestamps
            .iter()
            .copied()
            .filter(|t| request.is_active(*t))
            .collect();
        let active_count = active.len() as u64;

        if active_count >= request.max_requests {
            return AppendOutcome::Rejected {
                active: active_count,
                oldest_active: active.into_iter().min(),
            };
        }

        if request.compact {
            stored.record.timestamps.retain(|t| request.is_active(*t));
        }
        stored.record.timestamps.push(request.timestamp);
        stored.expires_at = now + request.ttl;

        AppendOutcome::Appended {
            active_before: active_count,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, identifier: &str) -> StoreResult<Option<RateLimitRecord>> {
        let now = Instant::now();

        if let Some(stored) = self.records.get(identifier) {
            if !stored.is_expired(now) {
                return Ok(Some(stored.record.clone()));
            }
        }

        self.records.remove_if(identifier, |_, stored| stored.is_expired(now));

        Ok(None)
    }

    async fn check_and_append(&self, request: AppendRequest) -> StoreResult<AppendOutcome> {
        let now = Instant::now();
        let outcome = self.append_locked(&request, now);

        if self.appends.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }

        Ok(outcome)
    }

    async fn remove(&self, identifier: &str) -> StoreResult<()> {
        self.records.remove(identifier);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
