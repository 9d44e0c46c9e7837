//! End-to-end pipeline tests over the in-memory capability implementations.
//!
//! These tests run the real dispatcher, queue semantics, worker pool, and
//! pipelines; only the storage, cache, producer, and renderer capabilities
//! are process-local. No PostgreSQL or Redis is required.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use archforge::design::{
    ArchitectureDesign, ComponentSpec, DesignConstraints, DetailLevel, InputKind,
    NewDesignRequest, ScaleProfile,
};
use archforge::pipeline::{JobExecutor, JobProcessor};
use archforge::producer::{
    DesignProducer, FallbackDesigner, ProducedDesign, ProducerError, ProducerInput,
    ResilientProducer,
};
use archforge::renderer::{DiagramRenderer, RenderOutcome, SourceOnlyRenderer};
use archforge::scheduler::{JobState, MemoryQueue, WorkQueue, WorkerPool, WorkerPoolConfig};
use archforge::service::{DesignService, ServiceError};
use archforge::status::{JobStatusRecord, MemoryStatusCache, StatusCache};
use archforge::storage::MemoryDatastore;

/// Producer that always fails, exercising the fallback path.
struct BrokenProducer;

#[async_trait]
impl DesignProducer for BrokenProducer {
    async fn produce(&self, _input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
        Err(ProducerError::RequestFailed("provider timeout".to_string()))
    }
}

/// Renderer that always reports invalid source, exercising the
/// null-artifact path.
struct InvalidSourceRenderer;

#[async_trait]
impl DiagramRenderer for InvalidSourceRenderer {
    async fn render(&self, source: &str) -> RenderOutcome {
        RenderOutcome::failed(source, "invalid")
    }
}

/// Status cache wrapper that records every write for a job.
struct RecordingCache {
    inner: MemoryStatusCache,
    writes: Mutex<Vec<JobStatusRecord>>,
}

impl RecordingCache {
    fn new() -> Self {
        Self {
            inner: MemoryStatusCache::new(),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> Vec<JobStatusRecord> {
        self.writes.lock().expect("writes lock").clone()
    }
}

#[async_trait]
impl StatusCache for RecordingCache {
    async fn set(
        &self,
        job_id: Uuid,
        record: &JobStatusRecord,
        ttl: Duration,
    ) -> Result<(), archforge::status::CacheError> {
        self.writes.lock().expect("writes lock").push(record.clone());
        self.inner.set(job_id, record, ttl).await
    }

    async fn get(
        &self,
        job_id: Uuid,
    ) -> Result<Option<JobStatusRecord>, archforge::status::CacheError> {
        self.inner.get(job_id).await
    }

    async fn expire(&self, job_id: Uuid) -> Result<(), archforge::status::CacheError> {
        self.inner.expire(job_id).await
    }
}

struct Harness {
    store: Arc<MemoryDatastore>,
    queue: Arc<MemoryQueue>,
    cache: Arc<MemoryStatusCache>,
    service: DesignService,
    pool: WorkerPool,
}

impl Harness {
    /// Builds a running two-worker harness over in-memory capabilities.
    async fn start(
        producer: Arc<dyn DesignProducer>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Self {
        let store = Arc::new(MemoryDatastore::new());
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryStatusCache::new());

        let service = DesignService::new(
            store.clone(),
            queue.clone() as Arc<dyn WorkQueue>,
            cache.clone() as Arc<dyn StatusCache>,
        );

        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            cache.clone() as Arc<dyn StatusCache>,
            producer,
            renderer,
        ));

        let pool_config = WorkerPoolConfig::new(2)
            .with_poll_interval(Duration::from_millis(20))
            .with_shutdown_timeout(Duration::from_secs(5));
        let mut pool = WorkerPool::with_queue(
            pool_config,
            queue.clone() as Arc<dyn WorkQueue>,
            processor,
        );
        pool.start().await.expect("pool starts");

        Self {
            store,
            queue,
            cache,
            service,
            pool,
        }
    }

    async fn default_start() -> Self {
        Self::start(
            Arc::new(ResilientProducer::new(Arc::new(FallbackDesigner::new()))),
            Arc::new(SourceOnlyRenderer::new()),
        )
        .await
    }

    async fn submit_request(&self) -> Uuid {
        let request = self
            .service
            .create_request(
                NewDesignRequest::from_prompt(
                    "Chat app",
                    "Build a chat app",
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                )
                .with_scale_profile(ScaleProfile::Dau1k),
            )
            .await
            .expect("request accepted");
        request.id
    }

    async fn submit_generation(&self, request_id: Uuid) -> Uuid {
        self.service
            .create_design_job(
                request_id,
                InputKind::Prompt,
                "Build a chat app".to_string(),
                DesignConstraints::default(),
                ScaleProfile::Dau1k,
                DetailLevel::Standard,
                Vec::new(),
            )
            .await
            .expect("job enqueued")
    }

    async fn wait_terminal(&self, job_id: Uuid) -> JobStatusRecord {
        for _ in 0..500 {
            let record = self
                .service
                .get_job_status(job_id)
                .await
                .expect("status readable");
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    async fn stop(mut self) {
        self.pool.shutdown().await.expect("pool stops");
    }
}

#[tokio::test]
async fn round_trip_generation_produces_linked_first_versions() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    let job_id = harness.submit_generation(request_id).await;
    let terminal = harness.wait_terminal(job_id).await;

    assert_eq!(terminal.status, JobState::Completed);
    assert_eq!(terminal.progress, 100);

    let designs = harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs");
    assert_eq!(designs.len(), 1);
    assert_eq!(designs[0].version, 1);
    assert!(designs[0].design.has_components());

    let diagrams = harness
        .service
        .list_diagram_versions(request_id)
        .await
        .expect("diagrams");
    assert_eq!(diagrams.len(), 1);
    assert_eq!(diagrams[0].version, 1);
    assert_eq!(diagrams[0].design_version_id, Some(designs[0].id));

    assert_eq!(harness.queue.completed_count(), 1);
    harness.stop().await;
}

#[tokio::test]
async fn concurrent_refinements_yield_gapless_versions() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    // Seed version 1 and wait for it so refinements have a prior version.
    let first = harness.submit_generation(request_id).await;
    assert_eq!(harness.wait_terminal(first).await.status, JobState::Completed);

    // Fire refinements back-to-back; both workers race on the same request.
    let mut jobs = Vec::new();
    for i in 0..5 {
        let job_id = harness
            .service
            .create_refinement_job(
                request_id,
                format!("refinement {}", i),
                None,
                Vec::new(),
            )
            .await
            .expect("refinement enqueued");
        jobs.push(job_id);
    }

    for job_id in jobs {
        let terminal = harness.wait_terminal(job_id).await;
        assert_eq!(terminal.status, JobState::Completed);
    }

    let versions: Vec<i32> = harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs")
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);

    harness.stop().await;
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let store = Arc::new(MemoryDatastore::new());
    let queue = Arc::new(MemoryQueue::new());
    let cache = Arc::new(RecordingCache::new());

    let service = DesignService::new(
        store.clone(),
        queue.clone() as Arc<dyn WorkQueue>,
        cache.clone() as Arc<dyn StatusCache>,
    );
    let processor = JobProcessor::new(
        store.clone(),
        cache.clone() as Arc<dyn StatusCache>,
        Arc::new(ResilientProducer::new(Arc::new(FallbackDesigner::new()))),
        Arc::new(SourceOnlyRenderer::new()),
    );

    let request = service
        .create_request(NewDesignRequest::from_prompt(
            "t",
            "Build a chat app",
            Uuid::new_v4(),
            Uuid::new_v4(),
        ))
        .await
        .expect("request");
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

    let entry = queue
        .dequeue(Duration::from_millis(100))
        .await
        .expect("dequeue")
        .expect("entry");
    assert_eq!(entry.job_id, job_id);
    processor.execute(&entry).await.expect("pipeline");

    let writes = cache.writes();
    assert!(writes.len() >= 2);

    // Non-decreasing progress, terminal exactly 100.
    let mut last = 0;
    for record in &writes {
        assert!(record.progress >= last, "progress went backwards");
        last = record.progress;

        // Intermediate values only occur while processing.
        if !record.status.is_terminal() && record.status != JobState::Pending {
            assert_eq!(record.status, JobState::Processing);
        }
    }
    let terminal = writes.last().expect("terminal write");
    assert_eq!(terminal.status, JobState::Completed);
    assert_eq!(terminal.progress, 100);
}

#[tokio::test]
async fn terminal_status_survives_cache_eviction() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    let job_id = harness.submit_generation(request_id).await;
    let from_cache = harness.wait_terminal(job_id).await;

    // Force eviction; the durable store must answer identically.
    harness.cache.expire(job_id).await.expect("evict");
    let from_store = harness
        .service
        .get_job_status(job_id)
        .await
        .expect("fallback status");

    assert_eq!(from_cache.status, from_store.status);
    assert_eq!(from_cache.progress, from_store.progress);

    // TTL-based expiry behaves the same as explicit eviction.
    harness.cache.advance(Duration::from_secs(7200));
    let after_ttl = harness
        .service
        .get_job_status(job_id)
        .await
        .expect("status after ttl");
    assert_eq!(after_ttl.status, from_store.status);

    harness.stop().await;
}

#[tokio::test]
async fn broken_producer_still_completes_via_fallback() {
    let harness = Harness::start(
        Arc::new(ResilientProducer::new(Arc::new(BrokenProducer))),
        Arc::new(SourceOnlyRenderer::new()),
    )
    .await;
    let request_id = harness.submit_request().await;

    let job_id = harness.submit_generation(request_id).await;
    let terminal = harness.wait_terminal(job_id).await;
    assert_eq!(terminal.status, JobState::Completed);

    let designs = harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs");
    assert_eq!(designs.len(), 1);
    assert!(
        designs[0].design.has_components(),
        "fallback must produce a syntactically valid design"
    );

    harness.stop().await;
}

#[tokio::test]
async fn renderer_error_persists_null_artifact_and_completes() {
    let harness = Harness::start(
        Arc::new(ResilientProducer::new(Arc::new(FallbackDesigner::new()))),
        Arc::new(InvalidSourceRenderer),
    )
    .await;
    let request_id = harness.submit_request().await;

    let job_id = harness.submit_generation(request_id).await;
    let terminal = harness.wait_terminal(job_id).await;
    assert_eq!(terminal.status, JobState::Completed);

    let diagrams = harness
        .service
        .list_diagram_versions(request_id)
        .await
        .expect("diagrams");
    assert_eq!(diagrams.len(), 1);
    assert!(diagrams[0].artifact.is_none());
    assert!(!diagrams[0].source.is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn refinement_without_prior_version_creates_nothing() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    let err = harness
        .service
        .create_refinement_job(request_id, "add a cache".to_string(), None, Vec::new())
        .await
        .expect_err("must fail synchronously");
    assert!(matches!(err, ServiceError::NoExistingVersion(_)));

    assert_eq!(harness.queue.len().await.expect("len"), 0);
    assert!(harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs")
        .is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn rerender_job_produces_unlinked_diagram_version() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    // First generation produces diagram version 1 (linked).
    let generation = harness.submit_generation(request_id).await;
    harness.wait_terminal(generation).await;

    let render_job = harness
        .service
        .create_render_job(request_id, "flowchart TD\n a --> b".to_string())
        .await
        .expect("render job");
    let terminal = harness.wait_terminal(render_job).await;
    assert_eq!(terminal.status, JobState::Completed);

    let diagrams = harness
        .service
        .list_diagram_versions(request_id)
        .await
        .expect("diagrams");
    assert_eq!(diagrams.len(), 2);
    assert_eq!(diagrams[1].version, 2);
    assert!(diagrams[1].design_version_id.is_none());

    // Design numbering was untouched by the re-render.
    let designs = harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs");
    assert_eq!(designs.len(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn allocation_conflicts_are_retried_internally() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    // Two injected conflicts stay under the retry bound; the job must
    // still complete and the sequence must stay gapless.
    harness.store.inject_design_version_conflicts(2);

    let job_id = harness.submit_generation(request_id).await;
    let terminal = harness.wait_terminal(job_id).await;
    assert_eq!(terminal.status, JobState::Completed);

    let versions: Vec<i32> = harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs")
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, vec![1]);

    harness.stop().await;
}

#[tokio::test]
async fn constraint_aware_generation_round_trip() {
    let harness = Harness::default_start().await;
    let request = harness
        .service
        .create_request(
            NewDesignRequest::from_prompt(
                "Analytics",
                "Build an analytics platform",
                Uuid::new_v4(),
                Uuid::new_v4(),
            )
            .with_scale_profile(ScaleProfile::Dau1m)
            .with_constraints(
                DesignConstraints::new()
                    .with_must_use("Kafka")
                    .with_avoid("Redis")
                    .with_preferred_language("Rust"),
            ),
        )
        .await
        .expect("request");

    let job_id = harness
        .service
        .create_design_job(
            request.id,
            InputKind::Prompt,
            "Build an analytics platform".to_string(),
            request.constraints.clone(),
            ScaleProfile::Dau1m,
            DetailLevel::Detailed,
            Vec::new(),
        )
        .await
        .expect("job");
    harness.wait_terminal(job_id).await;

    let design = harness
        .service
        .get_design_version(request.id, None)
        .await
        .expect("get")
        .expect("present")
        .design;

    assert!(design
        .components
        .iter()
        .any(|c| c.technology.as_deref() == Some("Kafka")));
    assert!(!design
        .data_stores
        .iter()
        .any(|s| s.engine.eq_ignore_ascii_case("redis")));

    harness.stop().await;
}

#[tokio::test]
async fn refined_design_carries_prior_content_forward() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    let first = harness.submit_generation(request_id).await;
    harness.wait_terminal(first).await;

    let refinement = harness
        .service
        .create_refinement_job(request_id, "add full text search".to_string(), None, Vec::new())
        .await
        .expect("refinement");
    harness.wait_terminal(refinement).await;

    let latest = harness
        .service
        .get_design_version(request_id, None)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(latest.version, 2);
    assert!(latest
        .design
        .scaling_notes
        .iter()
        .any(|n| n.contains("add full text search")));

    harness.stop().await;
}

#[tokio::test]
async fn deleting_a_request_cascades_to_versions_and_jobs() {
    let harness = Harness::default_start().await;
    let request_id = harness.submit_request().await;

    let job_id = harness.submit_generation(request_id).await;
    harness.wait_terminal(job_id).await;

    assert!(harness
        .service
        .delete_request(request_id)
        .await
        .expect("delete"));

    assert!(harness
        .service
        .list_design_versions(request_id)
        .await
        .expect("designs")
        .is_empty());

    // The cached status outlives the row until its TTL; once evicted, the
    // durable store is authoritative and the job is gone.
    harness.cache.expire(job_id).await.expect("evict");
    assert!(matches!(
        harness.service.get_job_status(job_id).await,
        Err(ServiceError::Status(_))
    ));

    harness.stop().await;
}

#[tokio::test]
async fn seeded_design_survives_unrelated_component_edits() {
    // Guard against refinement mutating the prior snapshot in place.
    let designer = FallbackDesigner::new();
    let input = ProducerInput {
        input_kind: InputKind::Prompt,
        content: "Build a chat app".to_string(),
        constraints: DesignConstraints::default(),
        scale_profile: ScaleProfile::Dau1k,
        detail_level: DetailLevel::Standard,
        enhancements: Vec::new(),
        refinement: None,
    };

    let prior = designer.design(&input).design;
    let snapshot = prior.clone();

    let mut refine_input = input;
    refine_input.refinement = Some(archforge::scheduler::RefinementContext {
        instruction: "tighten security".to_string(),
        prior_design: prior.clone(),
    });
    let _refined = designer.design(&refine_input);

    assert_eq!(prior, snapshot);
    let _ = ArchitectureDesign {
        components: vec![ComponentSpec::new("unused", "type exercise")],
        ..Default::default()
    };
}
