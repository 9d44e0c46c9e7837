//! Diagram re-rendering pipeline.

use tracing::{info, warn};
use uuid::Uuid;

use crate::scheduler::job::RenderPayload;

use super::{progress, JobProcessor, PipelineError};

impl JobProcessor {
    /// Runs a re-render job to completion.
    ///
    /// Single-purpose variant of the generation pipeline: no producer call,
    /// no design version, no design link on the stored diagram. Milestones:
    /// 50 rendering, 100 completed.
    pub(crate) async fn run_render(
        &self,
        job_id: Uuid,
        payload: &RenderPayload,
    ) -> Result<(), PipelineError> {
        let request_id = payload.request_id;

        self.report_started(job_id, progress::RENDER_ACTIVE, "rendering diagram")
            .await?;

        let outcome = self.renderer.render(&payload.source).await;
        if let Some(reason) = &outcome.error {
            warn!(job_id = %job_id, reason = %reason, "Diagram rendered without artifact");
        }

        let diagram_version = self
            .persist_diagram_version(request_id, None, &outcome.source, outcome.artifact.as_deref())
            .await?;

        self.report_completed(job_id).await?;

        info!(
            job_id = %job_id,
            request_id = %request_id,
            diagram_version = diagram_version.version,
            "Diagram re-render completed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::design::NewDesignRequest;
    use crate::pipeline::JobExecutor;
    use crate::producer::FallbackDesigner;
    use crate::renderer::{DiagramRenderer, RenderOutcome, SourceOnlyRenderer};
    use crate::scheduler::job::{JobKind, JobPayload, JobState, NewJob, QueueEntry};
    use crate::status::MemoryStatusCache;
    use crate::storage::{Datastore, MemoryDatastore};
    use async_trait::async_trait;

    struct FailingRenderer;

    #[async_trait]
    impl DiagramRenderer for FailingRenderer {
        async fn render(&self, source: &str) -> RenderOutcome {
            RenderOutcome::failed(source, "invalid")
        }
    }

    async fn setup(renderer: Arc<dyn DiagramRenderer>) -> (Arc<MemoryDatastore>, JobProcessor, Uuid) {
        let store = Arc::new(MemoryDatastore::new());
        let request = store
            .create_request(NewDesignRequest::from_prompt(
                "t",
                "p",
                Uuid::new_v4(),
                Uuid::new_v4(),
            ))
            .await
            .expect("request");

        let processor = JobProcessor::new(
            store.clone(),
            Arc::new(MemoryStatusCache::new()),
            Arc::new(FallbackDesigner::new()),
            renderer,
        );

        (store, processor, request.id)
    }

    async fn render_entry(store: &MemoryDatastore, request_id: Uuid, source: &str) -> QueueEntry {
        let job = store
            .create_job(NewJob {
                kind: JobKind::RenderDiagram,
                request_id,
                metadata: serde_json::json!({"source": source}),
            })
            .await
            .expect("job");

        QueueEntry::new(
            job.id,
            JobPayload::RenderDiagram(RenderPayload {
                request_id,
                source: source.to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn test_render_persists_unlinked_diagram() {
        let (store, processor, request_id) = setup(Arc::new(SourceOnlyRenderer::new())).await;
        let entry = render_entry(&store, request_id, "flowchart TD\n a --> b").await;

        processor.execute(&entry).await.expect("pipeline");

        let diagrams = store
            .list_diagram_versions(request_id)
            .await
            .expect("diagrams");
        assert_eq!(diagrams.len(), 1);
        assert_eq!(diagrams[0].version, 1);
        assert!(diagrams[0].design_version_id.is_none());

        let job = store
            .get_job(entry.job_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobState::Completed);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn test_render_error_still_completes_with_null_artifact() {
        let (store, processor, request_id) = setup(Arc::new(FailingRenderer)).await;
        let entry = render_entry(&store, request_id, "not a diagram").await;

        processor.execute(&entry).await.expect("render errors are not failures");

        let diagrams = store
            .list_diagram_versions(request_id)
            .await
            .expect("diagrams");
        assert_eq!(diagrams.len(), 1);
        assert!(diagrams[0].artifact.is_none());

        let job = store
            .get_job(entry.job_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(job.status, JobState::Completed);
    }
}
