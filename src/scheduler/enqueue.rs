//! Enqueue helpers: durable job row first, queue entry second, status seed
//! third.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::status::{JobStatusRecord, StatusCache, DEFAULT_STATUS_TTL};
use crate::storage::{Datastore, StoreError};

use super::job::{JobPayload, NewJob, QueueEntry};
use super::queue::{QueueError, WorkQueue};

/// Errors surfaced by job dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The durable job row could not be created. Nothing was enqueued.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The queue push failed after the job row was committed.
    ///
    /// The PENDING row is left behind for an external reconciliation sweep;
    /// there is no compensating delete or outbox relay here.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The payload could not be serialized for the metadata column.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Accepts logical units of work and hands them to the queue.
///
/// `enqueue` is fire-and-forget with respect to workers: it returns as soon
/// as the row is committed and the entry is pushed, never blocking on
/// execution. Ordering matters: a store failure aborts before any queue
/// push, so no queue entry can reference a job row that does not exist.
pub struct JobDispatcher {
    store: Arc<dyn Datastore>,
    queue: Arc<dyn WorkQueue>,
    cache: Arc<dyn StatusCache>,
    status_ttl: Duration,
}

impl JobDispatcher {
    /// Creates a dispatcher over the given capabilities.
    pub fn new(
        store: Arc<dyn Datastore>,
        queue: Arc<dyn WorkQueue>,
        cache: Arc<dyn StatusCache>,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            status_ttl: DEFAULT_STATUS_TTL,
        }
    }

    /// Sets the TTL for the seeded status record.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    /// Creates a PENDING job row for the payload, pushes a queue entry
    /// carrying it, and seeds the status cache.
    ///
    /// Returns the new job id.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<Uuid, DispatchError> {
        let kind = payload.kind();
        let request_id = payload.request_id();
        let metadata = serde_json::to_value(&payload)?;

        let job = self
            .store
            .create_job(NewJob {
                kind,
                request_id,
                metadata,
            })
            .await?;

        let entry = QueueEntry::new(job.id, payload);
        self.queue.push(&entry).await?;

        // Seeding the cache is best-effort: pollers fall back to the row.
        if let Err(e) = self
            .cache
            .set(job.id, &JobStatusRecord::queued(), self.status_ttl)
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to seed status cache");
        }

        info!(
            job_id = %job.id,
            request_id = %request_id,
            kind = %kind,
            "Job enqueued"
        );

        Ok(job.id)
    }
}
