//! Ephemeral job status mirroring with durable fallback.
//!
//! Job progress is polled frequently, so the pipeline mirrors every status
//! transition into a TTL-bounded cache keyed by job id. The cache is an
//! injected capability, never a singleton:
//!
//! - **StatusCache**: the {set, get, expire} capability trait
//! - **RedisStatusCache**: production implementation (SET with EX)
//! - **MemoryStatusCache**: test implementation with a manually advanced
//!   clock for TTL control
//! - **StatusReader**: cache-first reads that fall back to the job record
//!   store and repair the cache on the way out
//!
//! Absence from the cache is never an error; the job row is authoritative.

pub mod memory;
pub mod reader;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::job::{JobRecord, JobState};

pub use memory::MemoryStatusCache;
pub use reader::{StatusError, StatusReader};
pub use self::redis::RedisStatusCache;

/// Default time-to-live for cached status records.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(3600);

/// Errors that can occur during status cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Failed to (de)serialize a status record.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ephemeral mirror of a job's live status.
///
/// Last-write-wins per job id; a bounded TTL guarantees orphaned keys
/// eventually disappear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    /// Mirrored lifecycle state.
    pub status: JobState,
    /// Mirrored progress 0-100.
    pub progress: u8,
    /// Short human-readable phase description.
    pub message: String,
    /// When this record was written.
    pub updated_at: DateTime<Utc>,
}

impl JobStatusRecord {
    /// Creates a record for a given state, progress, and message.
    pub fn new(status: JobState, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }

    /// Record seeded at enqueue time.
    pub fn queued() -> Self {
        Self::new(JobState::Pending, 0, "queued")
    }

    /// Record for a completed job.
    pub fn completed() -> Self {
        Self::new(JobState::Completed, 100, "completed")
    }

    /// Record for a failed job with a cause.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(JobState::Failed, 0, error)
    }

    /// Derives the record a poller should see from the durable job row.
    ///
    /// Used on cache miss; the message is reconstructed from the row since
    /// the row does not store transient phase messages.
    pub fn from_job(job: &JobRecord) -> Self {
        let message = match job.status {
            JobState::Pending => "queued".to_string(),
            JobState::Processing => "processing".to_string(),
            JobState::Completed => "completed".to_string(),
            JobState::Failed => job
                .error
                .clone()
                .unwrap_or_else(|| "failed".to_string()),
        };

        Self {
            status: job.status,
            progress: job.progress,
            message,
            updated_at: job.updated_at,
        }
    }
}

/// The status cache capability consumed by the pipeline and readers.
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Writes a record for a job with the given TTL, replacing any
    /// previous value (last-write-wins).
    async fn set(
        &self,
        job_id: Uuid,
        record: &JobStatusRecord,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Reads the record for a job. `None` means expired or never written;
    /// callers fall back to the durable store.
    async fn get(&self, job_id: Uuid) -> Result<Option<JobStatusRecord>, CacheError>;

    /// Drops the record for a job immediately.
    async fn expire(&self, job_id: Uuid) -> Result<(), CacheError>;
}

/// Redis key for a job's status record.
pub(crate) fn status_key(prefix: &str, job_id: Uuid) -> String {
    format!("{}:status:{}", prefix, job_id)
}
