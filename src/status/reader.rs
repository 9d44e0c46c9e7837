//! Cache-first status reads with durable fallback and read-repair.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::storage::{Datastore, StoreError};

use super::{JobStatusRecord, StatusCache, DEFAULT_STATUS_TTL};

/// Errors surfaced by status reads.
///
/// Cache failures are never surfaced; the durable store is authoritative.
#[derive(Debug, Error)]
pub enum StatusError {
    /// No job row exists for the id.
    #[error("Unknown job {0}")]
    UnknownJob(Uuid),

    /// The durable store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Reads job status cache-first, falling back to the job record store.
///
/// On a cache miss the derived record is written back (read-repair) so
/// subsequent polls within the TTL hit the cache again. A cache write or
/// read failure degrades to the durable path; it never fails the read.
pub struct StatusReader {
    cache: Arc<dyn StatusCache>,
    store: Arc<dyn Datastore>,
    ttl: Duration,
}

impl StatusReader {
    /// Creates a reader with the default status TTL.
    pub fn new(cache: Arc<dyn StatusCache>, store: Arc<dyn Datastore>) -> Self {
        Self {
            cache,
            store,
            ttl: DEFAULT_STATUS_TTL,
        }
    }

    /// Sets the TTL used for read-repair writes.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the live status of a job.
    pub async fn job_status(&self, job_id: Uuid) -> Result<JobStatusRecord, StatusError> {
        match self.cache.get(job_id).await {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "Status cache read failed, falling back");
            }
        }

        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(StatusError::UnknownJob(job_id))?;
        let record = JobStatusRecord::from_job(&job);

        // Read-repair so the next poll is served from cache again.
        if let Err(e) = self.cache.set(job_id, &record, self.ttl).await {
            debug!(job_id = %job_id, error = %e, "Status cache repair failed");
        }

        Ok(record)
    }
}
