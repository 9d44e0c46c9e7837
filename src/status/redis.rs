//! Redis-backed status cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{status_key, CacheError, JobStatusRecord, StatusCache};

/// Status cache backed by Redis string keys with expiration.
///
/// Each job's record is one JSON value written with `SET .. EX`, so
/// last-write-wins and TTL semantics come directly from Redis.
pub struct RedisStatusCache {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Key prefix shared with the queue, so one Redis instance can host
    /// several deployments.
    prefix: String,
}

impl RedisStatusCache {
    /// Connects to Redis and creates a new status cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` if the connection fails.
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(redis, prefix))
    }

    /// Creates a status cache from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection with the job queue.
    pub fn from_connection(redis: ConnectionManager, prefix: &str) -> Self {
        Self {
            redis,
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn set(
        &self,
        job_id: Uuid,
        record: &JobStatusRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = status_key(&self.prefix, job_id);
        let value = serde_json::to_string(record)?;
        let ttl_secs = ttl.as_secs().max(1) as u64;

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobStatusRecord>, CacheError> {
        let key = status_key(&self.prefix, job_id);

        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(&key).await?;

        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn expire(&self, job_id: Uuid) -> Result<(), CacheError> {
        let key = status_key(&self.prefix, job_id);

        let mut conn = self.redis.clone();
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }
}
