// Persistence boundary for rate limit records

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::domain::RateLimitRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store round trip exceeded {0:?}")]
    Timeout(Duration),

    #[error("corrupt record for '{identifier}': {reason}")]
    Corrupt { identifier: String, reason: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One admission attempt against one record
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub identifier: String,
    pub timestamp: DateTime<Utc>,
    /// Timestamps at or before this instant are not counted
    pub stale_cutoff: DateTime<Utc>,
    pub max_requests: u64,
    /// Delete the uncounted timestamps in the same write as the append
    pub compact: bool,
    /// Store-level expiry refreshed on every append
    pub ttl: Duration,
}

impl AppendRequest {
    /// Whether `t` still counts against the quota. Timestamps ahead of the
    /// request instant (clock skew between instances) count.
    pub fn is_active(&self, t: DateTime<Utc>) -> bool {
        t > self.stale_cutoff
    }
}

/// Result of a check-and-append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The timestamp was stored; `active_before` excludes it
    Appended { active_before: u64 },
    /// The quota is full; nothing was written
    Rejected {
        active: u64,
        oldest_active: Option<DateTime<Utc>>,
    },
}

/// Key-value / document store holding one record per identifier.
///
/// `check_and_append` is a single atomic store operation: counting the
/// active timestamps, comparing against `max_requests`, pruning and appending
/// all happen without another writer interleaving. A rejection writes nothing.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, identifier: &str) -> StoreResult<Option<RateLimitRecord>>;

    async fn check_and_append(&self, request: AppendRequest) -> StoreResult<AppendOutcome>;

    async fn remove(&self, identifier: &str) -> StoreResult<()>;

    /// Round trip used by the readiness check
    async fn ping(&self) -> StoreResult<()>;
}

/// Build the configured store backend
pub async fn create_store(config: &StoreConfig) -> crate::errors::Result<Arc<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory rate limit store; quotas are not shared between instances");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
