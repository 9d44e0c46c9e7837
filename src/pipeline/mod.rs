//! Worker pipelines that turn queue entries into versioned artifacts.
//!
//! The [`JobProcessor`] is the unit of work executed by the worker pool.
//! It dispatches on the entry's payload:
//!
//! - **Design generation** (`run_generation`): producer call, design
//!   version persist, diagram render, diagram version persist
//! - **Diagram re-rendering** (`run_render`): render an existing source and
//!   persist a new diagram version
//!
//! Every status transition is written to the durable job row first and the
//! status cache second, so pollers see progress before the next slow step
//! begins and the durable row never lags behind a terminal cache state.
//!
//! Failure handling is centralized in [`JobProcessor::execute`]: any error
//! from a handler marks the job FAILED in both stores and is re-raised so
//! the queue's retry/backoff policy applies. Handlers are safe to re-run
//! because version allocation is conflict-checked: a retried execution that
//! races an earlier partial attempt loses the insert and retries against
//! the new maximum.

pub mod generation;
pub mod rendering;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::design::{ArchitectureDesign, DesignVersion, DiagramVersion};
use crate::metrics;
use crate::producer::{DesignProducer, ProducerError};
use crate::renderer::DiagramRenderer;
use crate::scheduler::job::{JobPayload, JobState, QueueEntry};
use crate::status::{JobStatusRecord, StatusCache, DEFAULT_STATUS_TTL};
use crate::storage::{Datastore, StoreError};

/// How many times a version-allocation conflict is retried before the job
/// execution fails.
pub const MAX_VERSION_CONFLICT_RETRIES: u32 = 3;

/// Progress milestones reported by the pipelines.
pub mod progress {
    /// Worker picked the job up.
    pub const STARTED: u8 = 10;
    /// Producer call in flight.
    pub const PRODUCING: u8 = 30;
    /// Producer returned a design.
    pub const DESIGN_READY: u8 = 50;
    /// Design version persisted.
    pub const DESIGN_PERSISTED: u8 = 70;
    /// Diagram render in flight.
    pub const RENDERING: u8 = 85;
    /// Terminal success.
    pub const DONE: u8 = 100;
    /// Single mid-point used by the re-render pipeline.
    pub const RENDER_ACTIVE: u8 = 50;
}

/// Errors that fail a job execution.
///
/// Producer errors only appear here when an unwrapped producer is used; the
/// resilient wrapper absorbs them into fallback designs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Durable storage failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Producer failed without a fallback absorbing it.
    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),

    /// Version allocation kept conflicting past the retry bound.
    #[error("Version allocation for request {request_id} still conflicted after {attempts} attempts")]
    VersionConflictExhausted {
        /// Request whose numbering space was contended.
        request_id: Uuid,
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Executes queue entries. Implemented by [`JobProcessor`]; the worker pool
/// depends on this trait so tests can substitute scripted executors.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs one entry to a terminal job state.
    async fn execute(&self, entry: &QueueEntry) -> Result<(), PipelineError>;
}

/// Drives queue entries through the generation and rendering pipelines.
pub struct JobProcessor {
    pub(crate) store: Arc<dyn Datastore>,
    pub(crate) cache: Arc<dyn StatusCache>,
    pub(crate) producer: Arc<dyn DesignProducer>,
    pub(crate) renderer: Arc<dyn DiagramRenderer>,
    pub(crate) status_ttl: Duration,
}

impl JobProcessor {
    /// Creates a processor over the given capabilities.
    pub fn new(
        store: Arc<dyn Datastore>,
        cache: Arc<dyn StatusCache>,
        producer: Arc<dyn DesignProducer>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Self {
        Self {
            store,
            cache,
            producer,
            renderer,
            status_ttl: DEFAULT_STATUS_TTL,
        }
    }

    /// Sets the TTL for status cache writes.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    /// Writes a status record to the cache. Best-effort: the durable row is
    /// authoritative, so a cache failure is logged and swallowed.
    pub(crate) async fn write_cache(&self, job_id: Uuid, record: JobStatusRecord) {
        if let Err(e) = self.cache.set(job_id, &record, self.status_ttl).await {
            warn!(job_id = %job_id, error = %e, "Status cache write failed");
        }
    }

    /// Marks the job processing at its first milestone, in both stores.
    pub(crate) async fn report_started(
        &self,
        job_id: Uuid,
        progress: u8,
        message: &str,
    ) -> Result<(), PipelineError> {
        self.store.mark_job_processing(job_id, progress).await?;
        self.write_cache(
            job_id,
            JobStatusRecord::new(JobState::Processing, progress, message),
        )
        .await;
        Ok(())
    }

    /// Advances progress, in both stores.
    pub(crate) async fn report_progress(
        &self,
        job_id: Uuid,
        progress: u8,
        message: &str,
    ) -> Result<(), PipelineError> {
        self.store.update_job_progress(job_id, progress).await?;
        self.write_cache(
            job_id,
            JobStatusRecord::new(JobState::Processing, progress, message),
        )
        .await;
        Ok(())
    }

    /// Marks the job completed, in both stores.
    pub(crate) async fn report_completed(&self, job_id: Uuid) -> Result<(), PipelineError> {
        self.store.complete_job(job_id).await?;
        self.write_cache(job_id, JobStatusRecord::completed()).await;
        Ok(())
    }

    /// Persists a design version, retrying allocation conflicts.
    pub(crate) async fn persist_design_version(
        &self,
        request_id: Uuid,
        design: &ArchitectureDesign,
    ) -> Result<DesignVersion, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.insert_design_version(request_id, design).await {
                Ok(version) => return Ok(version),
                Err(e) if e.is_version_conflict() => {
                    metrics::record_version_conflict();
                    if attempt >= MAX_VERSION_CONFLICT_RETRIES {
                        return Err(PipelineError::VersionConflictExhausted {
                            request_id,
                            attempts: attempt,
                        });
                    }
                    warn!(
                        request_id = %request_id,
                        attempt = attempt,
                        "Design version allocation conflicted, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Persists a diagram version, retrying allocation conflicts.
    pub(crate) async fn persist_diagram_version(
        &self,
        request_id: Uuid,
        design_version_id: Option<Uuid>,
        source: &str,
        artifact: Option<&str>,
    ) -> Result<DiagramVersion, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .insert_diagram_version(request_id, design_version_id, source, artifact)
                .await
            {
                Ok(version) => return Ok(version),
                Err(e) if e.is_version_conflict() => {
                    metrics::record_version_conflict();
                    if attempt >= MAX_VERSION_CONFLICT_RETRIES {
                        return Err(PipelineError::VersionConflictExhausted {
                            request_id,
                            attempts: attempt,
                        });
                    }
                    warn!(
                        request_id = %request_id,
                        attempt = attempt,
                        "Diagram version allocation conflicted, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl JobExecutor for JobProcessor {
    async fn execute(&self, entry: &QueueEntry) -> Result<(), PipelineError> {
        let result = match &entry.payload {
            JobPayload::GenerateDesign(payload) => {
                self.run_generation(entry.job_id, payload).await
            }
            JobPayload::RenderDiagram(payload) => self.run_render(entry.job_id, payload).await,
        };

        if let Err(e) = &result {
            let cause = e.to_string();
            // Single failure path: both stores record the terminal state,
            // then the error is re-raised for the queue's retry accounting.
            if let Err(store_err) = self.store.fail_job(entry.job_id, &cause).await {
                error!(
                    job_id = %entry.job_id,
                    error = %store_err,
                    "Failed to record job failure in durable store"
                );
            }
            self.write_cache(entry.job_id, JobStatusRecord::failed(cause.as_str()))
                .await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::FallbackDesigner;
    use crate::renderer::SourceOnlyRenderer;
    use crate::status::MemoryStatusCache;
    use crate::storage::MemoryDatastore;

    fn processor_with(store: Arc<MemoryDatastore>) -> JobProcessor {
        JobProcessor::new(
            store,
            Arc::new(MemoryStatusCache::new()),
            Arc::new(FallbackDesigner::new()),
            Arc::new(SourceOnlyRenderer::new()),
        )
    }

    #[tokio::test]
    async fn test_persist_design_version_retries_conflicts() {
        let store = Arc::new(MemoryDatastore::new());
        let request = store
            .create_request(crate::design::NewDesignRequest::from_prompt(
                "t",
                "p",
                Uuid::new_v4(),
                Uuid::new_v4(),
            ))
            .await
            .expect("request");

        store.inject_design_version_conflicts(MAX_VERSION_CONFLICT_RETRIES as usize - 1);

        let processor = processor_with(store);
        let version = processor
            .persist_design_version(request.id, &ArchitectureDesign::default())
            .await
            .expect("retried to success");
        assert_eq!(version.version, 1);
    }

    #[tokio::test]
    async fn test_persist_design_version_exhausts_retries() {
        let store = Arc::new(MemoryDatastore::new());
        let request = store
            .create_request(crate::design::NewDesignRequest::from_prompt(
                "t",
                "p",
                Uuid::new_v4(),
                Uuid::new_v4(),
            ))
            .await
            .expect("request");

        store.inject_design_version_conflicts(MAX_VERSION_CONFLICT_RETRIES as usize);

        let processor = processor_with(store);
        let err = processor
            .persist_design_version(request.id, &ArchitectureDesign::default())
            .await
            .expect_err("exhausted");
        assert!(matches!(
            err,
            PipelineError::VersionConflictExhausted { .. }
        ));
    }
}
