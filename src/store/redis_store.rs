// Redis record store shared by every instance of the service

use super::{AppendOutcome, AppendRequest, RecordStore, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::domain::RateLimitRecord;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Client, Script};
use std::time::Duration;
use uuid::Uuid;

// Count, compare, prune and append in one atomic step
// KEYS[1] = timestamp sorted set
// ARGV = stale cutoff (ms), limit, score (ms), member, compact (1/0), ttl (ms)
const CHECK_AND_APPEND_SCRIPT: &str = r#"
local key = KEYS[1]
local cutoff = ARGV[1]
local limit = tonumber(ARGV[2])

-- Entries strictly after the cutoff are active, future ones included
local active = redis.call('ZCOUNT', key, '(' .. cutoff, '+inf')

if active >= limit then
    local oldest = redis.call('ZRANGEBYSCORE', key, '(' .. cutoff, '+inf', 'WITHSCORES', 'LIMIT', 0, 1)
    local oldest_score = -1
    if #oldest > 0 then
        oldest_score = tonumber(oldest[2])
    end
    return {0, active, oldest_score}
end

if ARGV[5] == '1' then
    redis.call('ZREMRANGEBYSCORE', key, '-inf', cutoff)
end

redis.call('ZADD', key, ARGV[3], ARGV[4])
redis.call('PEXPIRE', key, ARGV[6])

return {1, active, -1}
"#;

/// Sorted-set backed store.
///
/// Each record is one sorted set of request instants scored by epoch
/// milliseconds, so `get` returns them ordered by instant.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    key_prefix: String,
    append_script: Script,
}

impl RedisStore {
    /// Open a connection manager for the configured Redis URL
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        tracing::info!("Creating Redis client");

        let url = config.url.as_deref().ok_or_else(|| {
            AppError::ConfigurationMissing("store.url is required for the redis backend".to_string())
        })?;

        let client = Client::open(url).map_err(StoreError::from)?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(StoreError::from)?;

        tracing::info!("Redis client connected");

        Ok(Self::new(manager, config.key_prefix.clone()))
    }

    pub fn new(manager: ConnectionManager, key_prefix: String) -> Self {
        Self {
            manager,
            key_prefix,
            append_script: Script::new(CHECK_AND_APPEND_SCRIPT),
        }
    }

    fn record_key(&self, identifier: &str) -> String {
        format!("{}{}", self.key_prefix, identifier)
    }

    fn parse_millis(identifier: &str, millis: i64) -> StoreResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
            identifier: identifier.to_string(),
            reason: format!("invalid score {}", millis),
        })
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, identifier: &str) -> StoreResult<Option<RateLimitRecord>> {
        let mut conn = self.manager.clone();

        let entries: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(self.record_key(identifier))
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        if entries.is_empty() {
            return Ok(None);
        }

        let timestamps = entries
            .into_iter()
            .map(|(_, score)| Self::parse_millis(identifier, score as i64))
            .collect::<StoreResult<Vec<DateTime<Utc>>>>()?;

        Ok(Some(RateLimitRecord {
            identifier: identifier.to_string(),
            timestamps,
        }))
    }

    async fn check_and_append(&self, request: AppendRequest) -> StoreResult<AppendOutcome> {
        let mut conn = self.manager.clone();

        let score = request.timestamp.timestamp_millis();
        let member = format!("{}-{}", score, Uuid::new_v4());
        let ttl_ms = request.ttl.as_millis().max(1) as u64;

        let result: Vec<i64> = self
            .append_script
            .key(self.record_key(&request.identifier))
            .arg(request.stale_cutoff.timestamp_millis())
            .arg(request.max_requests)
            .arg(score)
            .arg(member)
            .arg(if request.compact { 1 } else { 0 })
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        match result.as_slice() {
            [1, active, _] => Ok(AppendOutcome::Appended {
                active_before: *active as u64,
            }),
            [0, active, oldest] => {
                let oldest_active = if *oldest >= 0 {
                    Some(Self::parse_millis(&request.identifier, *oldest)?)
                } else {
                    None
                };
                Ok(AppendOutcome::Rejected {
                    active: *active as u64,
                    oldest_active,
                })
            }
            other => Err(StoreError::Corrupt {
                identifier: request.identifier.clone(),
                reason: format!("unexpected script reply {:?}", other),
            }),
        }
    }

    async fn remove(&self, identifier: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.record_key(identifier))
            .query_async(&mut conn)
            .await?;

        tracing::info!(identifier = %identifier, "Rate limit record removed");

        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use std::sync::Arc;

    fn redis_config() -> StoreConfig {
        StoreConfig {
            backend: StoreBackend::Redis,
            url: Some("redis://localhost:6379".to_string()),
            key_prefix: "test:ratelimit:".to_string(),
            timeout_ms: 2000,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn request(identifier: &str, secs: i64, max_requests: u64) -> AppendRequest {
        AppendRequest {
            identifier: identifier.to_string(),
            timestamp: at(secs),
            stale_cutoff: at(secs - 3600),
            max_requests,
            compact: true,
            ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_append_and_get() {
        let store = RedisStore::connect(&redis_config()).await.unwrap();
        let identifier = "redis_append_and_get";
        store.remove(identifier).await.unwrap();

        let outcome = store.check_and_append(request(identifier, 0, 5)).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended { active_before: 0 });

        let record = store.get(identifier).await.unwrap().unwrap();
        assert_eq!(record.timestamps, vec![at(0)]);

        store.remove(identifier).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_full_quota_rejects_without_mutation() {
        let store = RedisStore::connect(&redis_config()).await.unwrap();
        let identifier = "redis_reject";
        store.remove(identifier).await.unwrap();

        store.check_and_append(request(identifier, 0, 2)).await.unwrap();
        store.check_and_append(request(identifier, 1, 2)).await.unwrap();
        let before = store.get(identifier).await.unwrap();

        let outcome = store.check_and_append(request(identifier, 2, 2)).await.unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Rejected {
                active: 2,
                oldest_active: Some(at(0))
            }
        );
        assert_eq!(store.get(identifier).await.unwrap(), before);

        store.remove(identifier).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_prune_happens_with_append() {
        let store = RedisStore::connect(&redis_config()).await.unwrap();
        let identifier = "redis_prune";
        store.remove(identifier).await.unwrap();

        store.check_and_append(request(identifier, 0, 5)).await.unwrap();
        store.check_and_append(request(identifier, 10, 5)).await.unwrap();

        // Cutoff lands exactly on t=0, which is stale and gets removed
        let outcome = store.check_and_append(request(identifier, 3600, 5)).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended { active_before: 1 });

        let record = store.get(identifier).await.unwrap().unwrap();
        assert_eq!(record.timestamps, vec![at(10), at(3600)]);

        store.remove(identifier).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_append_refreshes_ttl() {
        let store = RedisStore::connect(&redis_config()).await.unwrap();
        let identifier = "redis_ttl";
        store.remove(identifier).await.unwrap();

        store.check_and_append(request(identifier, 0, 5)).await.unwrap();

        let mut conn = store.manager.clone();
        let pttl: i64 = redis::cmd("PTTL")
            .arg(store.record_key(identifier))
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(pttl > 0 && pttl <= 60_000);

        store.remove(identifier).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires Redis
    async fn test_concurrent_appends_stop_at_quota() {
        let store = Arc::new(RedisStore::connect(&redis_config()).await.unwrap());
        let identifier = "redis_concurrent";
        store.remove(identifier).await.unwrap();

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.check_and_append(request(identifier, 0, 5)).await
                })
            })
            .collect();

        let mut appended = 0;
        for handle in futures::future::join_all(handles).await {
            if let AppendOutcome::Appended { .. } = handle.unwrap().unwrap() {
                appended += 1;
            }
        }

        assert_eq!(appended, 5);
        let record = store.get(identifier).await.unwrap().unwrap();
        assert_eq!(record.timestamps.len(), 5);

        store.remove(identifier).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_ping() {
        let store = RedisStore::connect(&redis_config()).await.unwrap();
        assert!(store.ping().await.is_ok());
    }
}
