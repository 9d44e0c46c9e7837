//! In-memory datastore.
//!
//! Implements [`Datastore`] over process-local maps. Used by the test suite
//! and by examples that run the pipeline without PostgreSQL. Version
//! allocation happens under one lock, so it is naturally serialized; tests
//! exercising the conflict-retry path inject synthetic conflicts with
//! [`MemoryDatastore::inject_design_version_conflicts`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::design::{
    ArchitectureDesign, DesignRequest, DesignVersion, DiagramVersion, NewDesignRequest,
};
use crate::scheduler::job::{JobRecord, JobState, NewJob};

use super::store::{Datastore, StoreError};

#[derive(Default)]
struct Inner {
    requests: HashMap<Uuid, DesignRequest>,
    jobs: HashMap<Uuid, JobRecord>,
    design_versions: HashMap<Uuid, Vec<DesignVersion>>,
    diagram_versions: HashMap<Uuid, Vec<DiagramVersion>>,
}

/// Process-local [`Datastore`] implementation.
#[derive(Default)]
pub struct MemoryDatastore {
    inner: Mutex<Inner>,
    design_conflicts: AtomicUsize,
    diagram_conflicts: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryDatastore {
    /// Creates an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` design-version inserts fail with a
    /// `VersionConflict`, simulating a concurrent allocation race.
    pub fn inject_design_version_conflicts(&self, count: usize) {
        self.design_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` diagram-version inserts fail with a
    /// `VersionConflict`.
    pub fn inject_diagram_version_conflicts(&self, count: usize) {
        self.diagram_conflicts.store(count, Ordering::SeqCst);
    }

    /// Simulates the store being unreachable. While set, every operation
    /// fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    /// Consumes one injected conflict if any are pending.
    fn take_conflict(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn with_job<F>(&self, id: Uuid, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;
        mutate(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn create_request(&self, req: NewDesignRequest) -> Result<DesignRequest, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let request = DesignRequest {
            id: Uuid::new_v4(),
            title: req.title,
            input_kind: req.input_kind,
            prompt_text: req.prompt_text,
            repo_url: req.repo_url,
            scale_profile: req.scale_profile,
            detail_level: req.detail_level,
            constraints: req.constraints,
            project_id: req.project_id,
            user_id: req.user_id,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<DesignRequest>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.requests.get(&id).cloned())
    }

    async fn delete_request(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let existed = inner.requests.remove(&id).is_some();
        if existed {
            // Cascade, mirroring the schema's ON DELETE CASCADE.
            inner.design_versions.remove(&id);
            inner.diagram_versions.remove(&id);
            inner.jobs.retain(|_, job| job.request_id != id);
        }
        Ok(existed)
    }

    async fn create_job(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            kind: job.kind,
            status: JobState::Pending,
            progress: 0,
            request_id: job.request_id,
            metadata: job.metadata,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn mark_job_processing(&self, id: Uuid, progress: u8) -> Result<(), StoreError> {
        self.check_available()?;
        self.with_job(id, |job| {
            job.status = JobState::Processing;
            job.progress = progress;
            job.error = None;
            job.started_at.get_or_insert_with(Utc::now);
        })
    }

    async fn update_job_progress(&self, id: Uuid, progress: u8) -> Result<(), StoreError> {
        self.check_available()?;
        self.with_job(id, |job| {
            job.progress = progress;
        })
    }

    async fn complete_job(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;
        self.with_job(id, |job| {
            job.status = JobState::Completed;
            job.progress = 100;
            job.error = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let error = error.to_string();
        self.with_job(id, move |job| {
            job.status = JobState::Failed;
            job.progress = 0;
            job.error = Some(error);
            job.completed_at = Some(Utc::now());
        })
    }

    async fn insert_design_version(
        &self,
        request_id: Uuid,
        design: &ArchitectureDesign,
    ) -> Result<DesignVersion, StoreError> {
        self.check_available()?;

        let mut inner = self.inner.lock().expect("store lock poisoned");
        let versions = inner.design_versions.entry(request_id).or_default();
        let next = versions.last().map(|v| v.version).unwrap_or(0) + 1;

        if Self::take_conflict(&self.design_conflicts) {
            return Err(StoreError::VersionConflict {
                request_id,
                version: next,
            });
        }

        let version = DesignVersion {
            id: Uuid::new_v4(),
            request_id,
            version: next,
            design: design.clone(),
            created_at: Utc::now(),
        };
        versions.push(version.clone());
        Ok(version)
    }

    async fn list_design_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DesignVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .design_versions
            .get(&request_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_design_version(
        &self,
        request_id: Uuid,
        version: i32,
    ) -> Result<Option<DesignVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .design_versions
            .get(&request_id)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn latest_design_version(
        &self,
        request_id: Uuid,
    ) -> Result<Option<DesignVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .design_versions
            .get(&request_id)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn insert_diagram_version(
        &self,
        request_id: Uuid,
        design_version_id: Option<Uuid>,
        source: &str,
        artifact: Option<&str>,
    ) -> Result<DiagramVersion, StoreError> {
        self.check_available()?;

        let mut inner = self.inner.lock().expect("store lock poisoned");
        let versions = inner.diagram_versions.entry(request_id).or_default();
        let next = versions.last().map(|v| v.version).unwrap_or(0) + 1;

        if Self::take_conflict(&self.diagram_conflicts) {
            return Err(StoreError::VersionConflict {
                request_id,
                version: next,
            });
        }

        let version = DiagramVersion {
            id: Uuid::new_v4(),
            request_id,
            design_version_id,
            version: next,
            source: source.to_string(),
            artifact: artifact.map(str::to_string),
            created_at: Utc::now(),
        };
        versions.push(version.clone());
        Ok(version)
    }

    async fn list_diagram_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DiagramVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .diagram_versions
            .get(&request_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_diagram_version(
        &self,
        request_id: Uuid,
        version: i32,
    ) -> Result<Option<DiagramVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .diagram_versions
            .get(&request_id)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn latest_diagram_version(
        &self,
        request_id: Uuid,
    ) -> Result<Option<DiagramVersion>, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .diagram_versions
            .get(&request_id)
            .and_then(|versions| versions.last())
            .cloned())
    }
}
