//! Redis-based job queue with reliable dequeue and per-kind retry backoff.
//!
//! This module provides a distributed work queue backed by Redis that
//! supports:
//!
//! - Atomic dequeue using BRPOPLPUSH
//! - Delayed retries via a sorted set scored by ready-at time
//! - Dead letter queue after exhausted attempts
//! - Completion bookkeeping pruned to a retention bound
//!
//! # Queue Structure
//!
//! The queue uses five Redis keys:
//!
//! - `{queue_name}`: main queue where entries are enqueued
//! - `{queue_name}:processing`: entries being processed (for crash recovery)
//! - `{queue_name}:delayed`: sorted set of entries waiting out a backoff
//! - `{queue_name}:dead_letter`: entries that failed after max attempts
//! - `{queue_name}:completed`: recent completions, pruned past retention
//!
//! # Reliability
//!
//! Entries are atomically moved from the main queue to the processing queue
//! when dequeued, so at most one worker holds an entry at a time. If a
//! worker crashes, entries in the processing queue are recovered and
//! requeued on the next pool start. Retried entries re-invoke the same
//! handler against the same durable job row; the handler's version
//! allocation is conflict-checked, so re-execution is safe.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

use super::job::QueueEntry;

/// How many completion records are kept before pruning.
const COMPLETED_RETENTION: isize = 1000;

/// How many delayed entries are promoted per sweep.
const PROMOTE_BATCH: isize = 100;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Failed to serialize entry data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Entry not found in the queue.
    #[error("Entry for job {0} not found")]
    EntryNotFound(Uuid),
}

/// The work-queue capability consumed by the dispatcher and worker pool.
///
/// Delivery is at-least-once: an entry is held by at most one consumer at a
/// time, and re-delivered after a crash or an explicit `retry_later`.
/// Implemented by the Redis [`JobQueue`] in production and by
/// [`super::memory_queue::MemoryQueue`] in tests.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a new entry.
    async fn push(&self, entry: &QueueEntry) -> Result<(), QueueError>;

    /// Dequeues the next entry, blocking up to `timeout`.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError>;

    /// Records an entry as done and releases its in-flight hold.
    async fn complete(&self, entry: &QueueEntry) -> Result<(), QueueError>;

    /// Schedules an entry for re-delivery after a backoff delay.
    async fn retry_later(&self, entry: &QueueEntry, delay: Duration) -> Result<(), QueueError>;

    /// Parks an entry that exhausted its attempts.
    async fn dead_letter(&self, entry: &QueueEntry, error: &str) -> Result<(), QueueError>;

    /// Requeues entries orphaned by crashed consumers.
    async fn recover_processing_entries(&self) -> Result<usize, QueueError>;

    /// Returns the number of entries waiting in the main queue.
    async fn len(&self) -> Result<usize, QueueError>;
}

/// Redis-based job queue with reliable dequeue.
pub struct JobQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the main queue.
    queue_name: String,
    /// Name of the processing queue.
    processing_queue: String,
    /// Name of the delayed sorted set.
    delayed_queue: String,
    /// Name of the dead letter queue.
    dead_letter_queue: String,
    /// Name of the completion list.
    completed_queue: String,
}

impl JobQueue {
    /// Connects to Redis and creates a new job queue.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `queue_name` - Name of the queue (used as prefix for Redis keys)
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a JobQueue from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection with the status cache.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            delayed_queue: format!("{}:delayed", queue_name),
            dead_letter_queue: format!("{}:dead_letter", queue_name),
            completed_queue: format!("{}:completed", queue_name),
        }
    }

    /// Enqueues a new entry.
    ///
    /// Entries are added to the left of the queue (LPUSH) so they can be
    /// dequeued from the right in FIFO order.
    pub async fn push(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(entry)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Dequeues the next entry, blocking until one is available or timeout.
    ///
    /// Due delayed entries are promoted first, then BRPOPLPUSH atomically
    /// moves the next entry to the processing queue so it survives a worker
    /// crash.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(entry))` if an entry was dequeued
    /// - `Ok(None)` if the timeout expired with no entries available
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        self.promote_due().await?;

        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(data) => {
                let entry: QueueEntry = serde_json::from_str(&data)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Records an entry as done and removes it from the processing queue.
    ///
    /// A small completion record is kept on a retention-pruned list; the
    /// durable job row remains the audit trail.
    pub async fn complete(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        self.remove_from_processing(entry.job_id).await?;

        let record = serde_json::json!({
            "job_id": entry.job_id,
            "kind": entry.kind(),
            "attempts": entry.attempts,
            "finished_at": Utc::now().to_rfc3339(),
        });
        let serialized = serde_json::to_string(&record)?;

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(&self.completed_queue, serialized)
            .ltrim(&self.completed_queue, 0, COMPLETED_RETENTION - 1);
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    /// Schedules an entry for retry after a backoff delay.
    ///
    /// The entry leaves the processing queue and parks in the delayed set;
    /// `promote_due` moves it back to the main queue once the delay passes.
    /// The entry's attempt counter should already be incremented.
    pub async fn retry_later(&self, entry: &QueueEntry, delay: Duration) -> Result<(), QueueError> {
        self.remove_from_processing(entry.job_id).await?;

        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let serialized = serde_json::to_string(entry)?;

        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(&self.delayed_queue, serialized, ready_at)
            .await?;

        Ok(())
    }

    /// Moves an entry to the dead letter queue after exhausting attempts.
    pub async fn dead_letter(&self, entry: &QueueEntry, error: &str) -> Result<(), QueueError> {
        self.remove_from_processing(entry.job_id).await?;

        let dead_letter_entry = serde_json::json!({
            "entry": entry,
            "error": error,
            "moved_at": Utc::now().to_rfc3339(),
        });
        let serialized = serde_json::to_string(&dead_letter_entry)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.dead_letter_queue, serialized)
            .await?;

        Ok(())
    }

    /// Promotes delayed entries whose backoff has elapsed.
    ///
    /// Promoted entries go to the front of the main queue (RPUSH) so a
    /// retry runs before newly enqueued work.
    ///
    /// # Returns
    ///
    /// The number of entries promoted.
    pub async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.redis.clone();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.delayed_queue)
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for data in due {
            // ZREM result guards against a concurrent promoter moving the
            // same member; only the winner pushes.
            let removed: i64 = conn.zrem(&self.delayed_queue, &data).await?;
            if removed > 0 {
                conn.rpush::<_, _, ()>(&self.queue_name, &data).await?;
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    /// Returns the number of entries in the main queue.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Returns the number of entries currently being processed.
    pub async fn processing_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.processing_queue).await?;
        Ok(len)
    }

    /// Returns the number of entries waiting out a backoff.
    pub async fn delayed_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.zcard(&self.delayed_queue).await?;
        Ok(len)
    }

    /// Returns the number of entries in the dead letter queue.
    pub async fn dead_letter_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.dead_letter_queue).await?;
        Ok(len)
    }

    /// Returns whether the main queue is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Recovers entries stuck in the processing queue.
    ///
    /// Called on pool startup to recover entries from workers that crashed.
    /// Recoverable entries are requeued; exhausted ones are dead-lettered.
    ///
    /// # Returns
    ///
    /// The number of entries recovered.
    pub async fn recover_processing_entries(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let mut recovered = 0;

        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in entries {
            if let Ok(mut entry) = serde_json::from_str::<QueueEntry>(&data) {
                // This is effectively a retry of the interrupted attempt.
                entry.increment_attempts();

                if entry.should_retry() {
                    let serialized = serde_json::to_string(&entry)?;

                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .lrem(&self.processing_queue, 1, &data)
                        .rpush(&self.queue_name, &serialized);
                    pipe.query_async::<_, ()>(&mut conn).await?;

                    recovered += 1;
                } else {
                    self.dead_letter(&entry, "Recovered from processing queue after max attempts")
                        .await?;
                }
            }
        }

        Ok(recovered)
    }

    /// Clears all queues (main, processing, delayed, dead letter, completed).
    ///
    /// **Warning**: This permanently deletes all entries. Use with caution.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        pipe.del(&self.queue_name)
            .del(&self.processing_queue)
            .del(&self.delayed_queue)
            .del(&self.dead_letter_queue)
            .del(&self.completed_queue);
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    /// Returns queue statistics.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (pending, processing, delayed, dead_letter) = tokio::try_join!(
            self.len(),
            self.processing_len(),
            self.delayed_len(),
            self.dead_letter_len()
        )?;

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending_entries: pending,
            processing_entries: processing,
            delayed_entries: delayed,
            dead_letter_entries: dead_letter,
        })
    }

    /// Peeks at entries in the dead letter queue without removing them.
    pub async fn peek_dead_letter(
        &self,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, QueueError> {
        let mut conn = self.redis.clone();
        let data: Vec<String> = conn
            .lrange(&self.dead_letter_queue, 0, limit as isize - 1)
            .await?;

        let entries: Result<Vec<serde_json::Value>, _> =
            data.iter().map(|s| serde_json::from_str(s)).collect();

        Ok(entries?)
    }

    /// Helper to remove an entry from the processing queue by job id.
    async fn remove_from_processing(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in entries {
            if let Ok(entry) = serde_json::from_str::<QueueEntry>(&data) {
                if entry.job_id == job_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                        .await?;
                    return Ok(());
                }
            }
        }

        // Entry not found is not an error - it might have been removed already.
        Ok(())
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl WorkQueue for JobQueue {
    async fn push(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        JobQueue::push(self, entry).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        JobQueue::dequeue(self, timeout).await
    }

    async fn complete(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        JobQueue::complete(self, entry).await
    }

    async fn retry_later(&self, entry: &QueueEntry, delay: Duration) -> Result<(), QueueError> {
        JobQueue::retry_later(self, entry, delay).await
    }

    async fn dead_letter(&self, entry: &QueueEntry, error: &str) -> Result<(), QueueError> {
        JobQueue::dead_letter(self, entry, error).await
    }

    async fn recover_processing_entries(&self) -> Result<usize, QueueError> {
        JobQueue::recover_processing_entries(self).await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        JobQueue::len(self).await
    }
}

/// Statistics about queue state.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Name of the queue.
    pub queue_name: String,
    /// Entries waiting to be processed.
    pub pending_entries: usize,
    /// Entries currently being processed.
    pub processing_entries: usize,
    /// Entries waiting out a retry backoff.
    pub delayed_entries: usize,
    /// Entries in the dead letter queue.
    pub dead_letter_entries: usize,
}

impl QueueStats {
    /// Returns the total number of live entries across all queues.
    pub fn total_entries(&self) -> usize {
        self.pending_entries + self.processing_entries + self.delayed_entries
            + self.dead_letter_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignConstraints, DetailLevel, InputKind, ScaleProfile};
    use crate::scheduler::job::{GenerationPayload, JobPayload};

    fn create_test_entry() -> QueueEntry {
        QueueEntry::new(
            Uuid::new_v4(),
            JobPayload::GenerateDesign(GenerationPayload {
                request_id: Uuid::new_v4(),
                input_kind: InputKind::Prompt,
                content: "Build a chat app".to_string(),
                constraints: DesignConstraints::default(),
                scale_profile: ScaleProfile::Dau1k,
                detail_level: DetailLevel::Standard,
                enhancements: Vec::new(),
                refinement: None,
            }),
        )
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = QueueError::EntryNotFound(Uuid::new_v4());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_queue_stats_total() {
        let stats = QueueStats {
            queue_name: "designs".to_string(),
            pending_entries: 10,
            processing_entries: 5,
            delayed_entries: 3,
            dead_letter_entries: 2,
        };

        assert_eq!(stats.total_entries(), 20);
    }

    #[test]
    fn test_entry_serialization_roundtrip() {
        let entry = create_test_entry();
        let serialized = serde_json::to_string(&entry).expect("serialization should work");
        let deserialized: QueueEntry =
            serde_json::from_str(&serialized).expect("deserialization should work");

        assert_eq!(entry.job_id, deserialized.job_id);
        assert_eq!(entry.payload, deserialized.payload);
    }

    #[test]
    fn test_dead_letter_entry_structure() {
        let entry = create_test_entry();
        let error = "Test error message";

        let dead = serde_json::json!({
            "entry": entry,
            "error": error,
            "moved_at": Utc::now().to_rfc3339(),
        });

        let serialized = serde_json::to_string(&dead).expect("entry should serialize");
        let parsed: serde_json::Value =
            serde_json::from_str(&serialized).expect("should parse back");

        assert!(parsed.get("entry").is_some());
        assert!(parsed.get("error").is_some());
        assert!(parsed.get("moved_at").is_some());
    }
}
