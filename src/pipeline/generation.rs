//! Design-generation pipeline.

use tracing::{info, warn};
use uuid::Uuid;

use crate::producer::ProducerInput;
use crate::scheduler::job::GenerationPayload;

use super::{progress, JobProcessor, PipelineError};

impl JobProcessor {
    /// Runs a generation (or refinement) job to completion.
    ///
    /// Milestones: 10 starting, 30 producing, 50 design ready, 70 design
    /// persisted, 85 rendering, 100 completed. The producer is consumed
    /// through its resilient wrapper, so only storage problems and conflict
    /// exhaustion can fail the run.
    pub(crate) async fn run_generation(
        &self,
        job_id: Uuid,
        payload: &GenerationPayload,
    ) -> Result<(), PipelineError> {
        let request_id = payload.request_id;

        self.report_started(job_id, progress::STARTED, "starting")
            .await?;

        self.report_progress(job_id, progress::PRODUCING, "generating design")
            .await?;
        let input = ProducerInput::from(payload);
        let produced = self.producer.produce(&input).await?;

        self.report_progress(job_id, progress::DESIGN_READY, "design produced")
            .await?;
        let design_version = self
            .persist_design_version(request_id, &produced.design)
            .await?;
        self.report_progress(job_id, progress::DESIGN_PERSISTED, "design version saved")
            .await?;

        self.report_progress(job_id, progress::RENDERING, "rendering diagram")
            .await?;
        let outcome = self.renderer.render(&produced.diagram_source).await;
        if let Some(reason) = &outcome.error {
            // Not a failure: the diagram version is stored without an
            // artifact and clients render from source.
            warn!(job_id = %job_id, reason = %reason, "Diagram rendered without artifact");
        }

        let diagram_version = self
            .persist_diagram_version(
                request_id,
                Some(design_version.id),
                &outcome.source,
                outcome.artifact.as_deref(),
            )
            .await?;

        self.report_completed(job_id).await?;

        info!(
            job_id = %job_id,
            request_id = %request_id,
            design_version = design_version.version,
            diagram_version = diagram_version.version,
            refinement = payload.is_refinement(),
            "Design generation completed"
        );

        Ok(())
    }
}
