//! External interface of the pipeline core.
//!
//! [`DesignService`] is what the HTTP/RPC layer talks to: it validates
//! input, creates jobs through the dispatcher, answers status polls, and
//! reads versioned artifacts. Validation failures are rejected here,
//! synchronously, before any job row or queue entry exists.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::design::{
    DesignConstraints, DesignRequest, DesignVersion, DetailLevel, DiagramVersion, InputKind,
    NewDesignRequest, ScaleProfile,
};
use crate::scheduler::{
    DispatchError, GenerationPayload, JobDispatcher, JobPayload, RefinementContext, RenderPayload,
    WorkQueue,
};
use crate::status::{JobStatusRecord, StatusCache, StatusError, StatusReader};
use crate::storage::{Datastore, StoreError};

/// Errors surfaced to the API layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A prompt request is missing its prompt text.
    #[error("Prompt input requires prompt text")]
    MissingPrompt,

    /// A repository request is missing its URL.
    #[error("Repository input requires a repository URL")]
    MissingRepoUrl,

    /// Both prompt text and repository URL were supplied.
    #[error("Exactly one of prompt text or repository URL must be present")]
    ConflictingInput,

    /// Generation content was empty.
    #[error("Input content must not be empty")]
    EmptyContent,

    /// Refinement instruction was empty.
    #[error("Refinement instruction must not be empty")]
    EmptyInstruction,

    /// Diagram source for a render job was empty.
    #[error("Diagram source must not be empty")]
    EmptyDiagramSource,

    /// The referenced request does not exist.
    #[error("Unknown design request {0}")]
    UnknownRequest(Uuid),

    /// Refinement requires at least one existing design version.
    #[error("No existing design version for request {0}")]
    NoExistingVersion(Uuid),

    /// Status read failed.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Durable storage failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Job dispatch failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Facade over the pipeline core for the API layer.
pub struct DesignService {
    store: Arc<dyn Datastore>,
    dispatcher: JobDispatcher,
    status: StatusReader,
}

impl DesignService {
    /// Creates a service over the given capabilities.
    pub fn new(
        store: Arc<dyn Datastore>,
        queue: Arc<dyn WorkQueue>,
        cache: Arc<dyn StatusCache>,
    ) -> Self {
        let dispatcher = JobDispatcher::new(store.clone(), queue, cache.clone());
        let status = StatusReader::new(cache, store.clone());

        Self {
            store,
            dispatcher,
            status,
        }
    }

    /// Sets the status TTL used for cache seeds and read-repair.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_status_ttl(ttl);
        self.status = self.status.with_ttl(ttl);
        self
    }

    // Request lifecycle

    /// Accepts a new design request after validating that exactly the
    /// content matching the input kind is present.
    pub async fn create_request(
        &self,
        req: NewDesignRequest,
    ) -> Result<DesignRequest, ServiceError> {
        match req.input_kind {
            InputKind::Prompt => {
                if req.repo_url.is_some() {
                    return Err(ServiceError::ConflictingInput);
                }
                if req.prompt_text.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(ServiceError::MissingPrompt);
                }
            }
            InputKind::RepoUrl => {
                if req.prompt_text.is_some() {
                    return Err(ServiceError::ConflictingInput);
                }
                if req.repo_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                    return Err(ServiceError::MissingRepoUrl);
                }
            }
        }

        let request = self.store.create_request(req).await?;
        info!(request_id = %request.id, "Design request created");
        Ok(request)
    }

    /// Fetches a request.
    pub async fn get_request(&self, id: Uuid) -> Result<Option<DesignRequest>, ServiceError> {
        Ok(self.store.get_request(id).await?)
    }

    /// Deletes a request and everything it owns.
    pub async fn delete_request(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.store.delete_request(id).await?)
    }

    // Job creation

    /// Enqueues a fresh design generation for a request.
    ///
    /// Returns the job id; the job runs asynchronously.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_design_job(
        &self,
        request_id: Uuid,
        input_kind: InputKind,
        content: String,
        constraints: DesignConstraints,
        scale_profile: ScaleProfile,
        detail_level: DetailLevel,
        enhancements: Vec<String>,
    ) -> Result<Uuid, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::EmptyContent);
        }
        self.require_request(request_id).await?;

        let payload = JobPayload::GenerateDesign(GenerationPayload {
            request_id,
            input_kind,
            content,
            constraints,
            scale_profile,
            detail_level,
            enhancements,
            refinement: None,
        });

        Ok(self.dispatcher.enqueue(payload).await?)
    }

    /// Enqueues a refinement of the latest design version.
    ///
    /// Fails synchronously with [`ServiceError::NoExistingVersion`] when the
    /// request has never produced a design; no job row is created.
    pub async fn create_refinement_job(
        &self,
        request_id: Uuid,
        instruction: String,
        detail_level: Option<DetailLevel>,
        enhancements: Vec<String>,
    ) -> Result<Uuid, ServiceError> {
        if instruction.trim().is_empty() {
            return Err(ServiceError::EmptyInstruction);
        }

        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(ServiceError::UnknownRequest(request_id))?;

        let prior = self
            .store
            .latest_design_version(request_id)
            .await?
            .ok_or(ServiceError::NoExistingVersion(request_id))?;

        let payload = JobPayload::GenerateDesign(GenerationPayload {
            request_id,
            input_kind: request.input_kind,
            content: request.content().to_string(),
            constraints: request.constraints.clone(),
            scale_profile: request.scale_profile,
            detail_level: detail_level.unwrap_or(request.detail_level),
            enhancements,
            refinement: Some(RefinementContext {
                instruction,
                prior_design: prior.design,
            }),
        });

        Ok(self.dispatcher.enqueue(payload).await?)
    }

    /// Enqueues a re-render of an existing diagram source.
    pub async fn create_render_job(
        &self,
        request_id: Uuid,
        source: String,
    ) -> Result<Uuid, ServiceError> {
        if source.trim().is_empty() {
            return Err(ServiceError::EmptyDiagramSource);
        }
        self.require_request(request_id).await?;

        let payload = JobPayload::RenderDiagram(RenderPayload { request_id, source });
        Ok(self.dispatcher.enqueue(payload).await?)
    }

    // Reads

    /// Returns the live status of a job, cache-first.
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<JobStatusRecord, ServiceError> {
        Ok(self.status.job_status(job_id).await?)
    }

    /// Lists all design versions of a request in version order.
    pub async fn list_design_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DesignVersion>, ServiceError> {
        Ok(self.store.list_design_versions(request_id).await?)
    }

    /// Fetches one design version, or the latest when `version` is omitted.
    pub async fn get_design_version(
        &self,
        request_id: Uuid,
        version: Option<i32>,
    ) -> Result<Option<DesignVersion>, ServiceError> {
        let found = match version {
            Some(version) => self.store.get_design_version(request_id, version).await?,
            None => self.store.latest_design_version(request_id).await?,
        };
        Ok(found)
    }

    /// Lists all diagram versions of a request in version order.
    pub async fn list_diagram_versions(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DiagramVersion>, ServiceError> {
        Ok(self.store.list_diagram_versions(request_id).await?)
    }

    /// Fetches one diagram version, or the latest when `version` is omitted.
    pub async fn get_diagram_version(
        &self,
        request_id: Uuid,
        version: Option<i32>,
    ) -> Result<Option<DiagramVersion>, ServiceError> {
        let found = match version {
            Some(version) => self.store.get_diagram_version(request_id, version).await?,
            None => self.store.latest_diagram_version(request_id).await?,
        };
        Ok(found)
    }

    async fn require_request(&self, request_id: Uuid) -> Result<(), ServiceError> {
        self.store
            .get_request(request_id)
            .await?
            .map(|_| ())
            .ok_or(ServiceError::UnknownRequest(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobState, MemoryQueue};
    use crate::status::MemoryStatusCache;
    use crate::storage::MemoryDatastore;

    fn service() -> (Arc<MemoryDatastore>, Arc<MemoryQueue>, DesignService) {
        let store = Arc::new(MemoryDatastore::new());
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryStatusCache::new());
        let service = DesignService::new(store.clone(), queue.clone(), cache);
        (store, queue, service)
    }

    fn prompt_request() -> NewDesignRequest {
        NewDesignRequest::from_prompt("Chat app", "Build a chat app", Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_request_validates_content() {
        let (_, _, service) = service();

        let mut missing = prompt_request();
        missing.prompt_text = Some("   ".to_string());
        assert!(matches!(
            service.create_request(missing).await,
            Err(ServiceError::MissingPrompt)
        ));

        let mut conflicting = prompt_request();
        conflicting.repo_url = Some("https://example.com/repo.git".to_string());
        assert!(matches!(
            service.create_request(conflicting).await,
            Err(ServiceError::ConflictingInput)
        ));

        let mut missing_url = NewDesignRequest::from_repo_url(
            "svc",
            "https://example.com/repo.git",
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        missing_url.repo_url = None;
        assert!(matches!(
            service.create_request(missing_url).await,
            Err(ServiceError::MissingRepoUrl)
        ));

        service.create_request(prompt_request()).await.expect("valid");
    }

    #[tokio::test]
    async fn test_create_design_job_enqueues() {
        let (store, queue, service) = service();
        let request = service.create_request(prompt_request()).await.expect("request");

        let job_id = service
            .create_design_job(
                request.id,
                InputKind::Prompt,
                "Build a chat app".to_string(),
                DesignConstraints::default(),
                ScaleProfile::Dau1k,
                DetailLevel::Standard,
                Vec::new(),
            )
            .await
            .expect("job");

        let job = store.get_job(job_id).await.expect("get").expect("exists");
        assert_eq!(job.status, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(queue.len().await.expect("len"), 1);

        // The enqueue seeded the cache; status reads answer immediately.
        let status = service.get_job_status(job_id).await.expect("status");
        assert_eq!(status.status, JobState::Pending);
        assert_eq!(status.message, "queued");
    }

    #[tokio::test]
    async fn test_refinement_without_prior_version_fails_synchronously() {
        let (store, queue, service) = service();
        let request = service.create_request(prompt_request()).await.expect("request");

        let err = service
            .create_refinement_job(request.id, "add a cache".to_string(), None, Vec::new())
            .await
            .expect_err("no prior version");
        assert!(matches!(err, ServiceError::NoExistingVersion(_)));

        // No job row, no queue entry.
        assert_eq!(queue.len().await.expect("len"), 0);
        assert!(store
            .list_design_versions(request.id)
            .await
            .expect("list")
            .is_empty());
    }

    #[tokio::test]
    async fn test_refinement_carries_prior_snapshot() {
        let (store, queue, service) = service();
        let request = service.create_request(prompt_request()).await.expect("request");

        let design = crate::design::ArchitectureDesign {
            components: vec![crate::design::ComponentSpec::new("web", "frontend")],
            ..Default::default()
        };
        store
            .insert_design_version(request.id, &design)
            .await
            .expect("seed version");

        service
            .create_refinement_job(request.id, "add search".to_string(), None, Vec::new())
            .await
            .expect("refinement");

        let entry = queue
            .dequeue(std::time::Duration::from_millis(50))
            .await
            .expect("dequeue")
            .expect("entry");
        match entry.payload {
            JobPayload::GenerateDesign(payload) => {
                let refinement = payload.refinement.expect("refinement context");
                assert_eq!(refinement.instruction, "add search");
                assert_eq!(refinement.prior_design, design);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_request_rejected() {
        let (_, _, service) = service();

        let err = service
            .create_design_job(
                Uuid::new_v4(),
                InputKind::Prompt,
                "content".to_string(),
                DesignConstraints::default(),
                ScaleProfile::Prototype,
                DetailLevel::Overview,
                Vec::new(),
            )
            .await
            .expect_err("unknown request");
        assert!(matches!(err, ServiceError::UnknownRequest(_)));
    }

    #[tokio::test]
    async fn test_render_job_validation() {
        let (_, _, service) = service();
        let request = service.create_request(prompt_request()).await.expect("request");

        let err = service
            .create_render_job(request.id, "  ".to_string())
            .await
            .expect_err("empty source");
        assert!(matches!(err, ServiceError::EmptyDiagramSource));

        service
            .create_render_job(request.id, "flowchart TD\n a --> b".to_string())
            .await
            .expect("valid");
    }

    #[tokio::test]
    async fn test_get_design_version_latest_if_omitted() {
        let (store, _, service) = service();
        let request = service.create_request(prompt_request()).await.expect("request");

        for _ in 0..3 {
            store
                .insert_design_version(request.id, &Default::default())
                .await
                .expect("insert");
        }

        let latest = service
            .get_design_version(request.id, None)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(latest.version, 3);

        let second = service
            .get_design_version(request.id, Some(2))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(second.version, 2);

        assert!(service
            .get_design_version(request.id, Some(9))
            .await
            .expect("get")
            .is_none());
    }
}
