//! The `Datastore` capability consumed by the pipeline core.
//!
//! Implementations persist design requests, jobs, and versioned artifacts.
//! The version-insert operations allocate `max(version) + 1` themselves and
//! surface allocation races as `StoreError::VersionConflict` so callers can
//! retry; version numbers are never client-supplied.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::design::{ArchitectureDesign, DesignRequest, DesignVersion, DiagramVersion,
    NewDesignRequest};
use crate::scheduler::job::{JobRecord, NewJob};

/// Errors that can occur during datastore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the backing store failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// A referenced record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Serialization of a JSON payload column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two writers raced to allocate the same version number.
    ///
    /// Retryable: the loser re-reads the max and tries again.
    #[error("Version {version} already exists for request {request_id}")]
    VersionConflict {
        /// Request whose numbering space was contended.
        request_id: Uuid,
        /// The version number both writers computed.
        version: i32,
    },

    /// A persisted row failed to decode into its domain type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),

    /// The store is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns whether this error is a retryable version-allocation race.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Persistent storage operations consumed by the pipeline core.
///
/// The production implementation is [`super::PgDatastore`]; tests use
/// [`super::MemoryDatastore`].
#[async_trait]
pub trait Datastore: Send + Sync {
    // Design requests

    /// Creates a design request row.
    async fn create_request(&self, req: NewDesignRequest) -> Result<DesignRequest, StoreError>;

    /// Fetches a design request by id.
    async fn get_request(&self, id: Uuid) -> Result<Option<DesignRequest>, StoreError>;

    /// Deletes a request and, by cascade, its versions and jobs.
    ///
    /// Returns whether a row was deleted.
    async fn delete_request(&self, id: Uuid) -> Result<bool, StoreError>;

    // Jobs

    /// Creates a job row in the `Pending` state at progress 0.
    async fn create_job(&self, job: NewJob) -> Result<JobRecord, StoreError>;

    /// Fetches a job by id.
    async fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError>;

    /// Marks a job `Processing` at the given progress and stamps
    /// `started_at` if not already set.
    ///
    /// Re-executed entries call this again; the row is updated in place.
    async fn mark_job_processing(&self, id: Uuid, progress: u8) -> Result<(), StoreError>;

    /// Updates the progress of a `Processing` job.
    async fn update_job_progress(&self, id: Uuid, progress: u8) -> Result<(), StoreError>;

    /// Marks a job `Completed` at progress 100 and stamps `completed_at`.
    async fn complete_job(&self, id: Uuid) -> Result<(), StoreError>;

    /// Marks a job `Failed` at progress 0 with a human-readable cause and
    /// stamps `completed_at`.
    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    // Design versions

    /// Persists a new design version at `max(version) + 1` for the request.
    ///
    /// Allocation and insert are effectively atomic; a concurrent allocation
    /// of the same number surfaces as `StoreError::VersionConflict`.
    async fn insert_design_version(
        &self,
        request_id: Uuid,
        design: &ArchitectureDesign,
    ) -> Result<DesignVersion, StoreError>;

    /// Lists all design versions of a request in version order.
    async fn list_design_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DesignVersion>, StoreError>;

    /// Fetches one design version of a request.
    async fn get_design_version(
        &self,
        request_id: Uuid,
        version: i32,
    ) -> Result<Option<DesignVersion>, StoreError>;

    /// Fetches the highest-numbered design version of a request.
    async fn latest_design_version(
        &self,
        request_id: Uuid,
    ) -> Result<Option<DesignVersion>, StoreError>;

    // Diagram versions

    /// Persists a new diagram version at `max(version) + 1` for the request.
    ///
    /// Diagram numbering is independent of design numbering. Same conflict
    /// semantics as `insert_design_version`.
    async fn insert_diagram_version(
        &self,
        request_id: Uuid,
        design_version_id: Option<Uuid>,
        source: &str,
        artifact: Option<&str>,
    ) -> Result<DiagramVersion, StoreError>;

    /// Lists all diagram versions of a request in version order.
    async fn list_diagram_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DiagramVersion>, StoreError>;

    /// Fetches one diagram version of a request.
    async fn get_diagram_version(
        &self,
        request_id: Uuid,
        version: i32,
    ) -> Result<Option<DiagramVersion>, StoreError>;

    /// Fetches the highest-numbered diagram version of a request.
    async fn latest_diagram_version(
        &self,
        request_id: Uuid,
    ) -> Result<Option<DiagramVersion>, StoreError>;
}
