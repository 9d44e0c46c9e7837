//! The design-producer capability.
//!
//! A [`DesignProducer`] turns a structured request (or a refinement of a
//! prior design) into an [`crate::design::ArchitectureDesign`] plus diagram
//! source. Producers may fail; the pipeline always consumes them through
//! [`ResilientProducer`], which absorbs any producer error by falling back
//! to the deterministic [`FallbackDesigner`]. The pipeline's failure path is
//! therefore reserved for genuinely unrecoverable conditions such as storage
//! being unavailable.

pub mod fallback;
pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::design::{ArchitectureDesign, DesignConstraints, DetailLevel, InputKind, ScaleProfile};
use crate::metrics;
use crate::scheduler::job::{GenerationPayload, RefinementContext};

pub use fallback::FallbackDesigner;
pub use http::{HttpDesignProducer, HttpProducerConfig};

/// Errors a producer implementation can surface.
///
/// All of these are absorbed by [`ResilientProducer`]; they only reach the
/// pipeline when a producer is used unwrapped.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// API key not configured.
    #[error("Missing API key for design producer")]
    MissingApiKey,

    /// Base URL not configured.
    #[error("Missing API base URL for design producer")]
    MissingApiBase,

    /// HTTP transport failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Provider returned a non-success status.
    #[error("API error ({code}): {message}")]
    ApiError {
        /// HTTP status code.
        code: u16,
        /// Provider error body.
        message: String,
    },

    /// Provider response could not be parsed into a design.
    #[error("Failed to parse producer response: {0}")]
    ParseError(String),

    /// Provider response parsed but violated the output contract.
    #[error("Invalid producer output: {0}")]
    InvalidOutput(String),

    /// Prompt template rendering failed.
    #[error("Prompt template error: {0}")]
    Template(#[from] tera::Error),
}

/// Structured input handed to a producer.
#[derive(Debug, Clone)]
pub struct ProducerInput {
    /// How the system was described.
    pub input_kind: InputKind,
    /// Prompt text or repository URL.
    pub content: String,
    /// Technology constraints.
    pub constraints: DesignConstraints,
    /// Target load profile.
    pub scale_profile: ScaleProfile,
    /// Output verbosity.
    pub detail_level: DetailLevel,
    /// Quick-enhancement directives.
    pub enhancements: Vec<String>,
    /// Present for refinement calls.
    pub refinement: Option<RefinementContext>,
}

impl From<&GenerationPayload> for ProducerInput {
    fn from(payload: &GenerationPayload) -> Self {
        Self {
            input_kind: payload.input_kind,
            content: payload.content.clone(),
            constraints: payload.constraints.clone(),
            scale_profile: payload.scale_profile,
            detail_level: payload.detail_level,
            enhancements: payload.enhancements.clone(),
            refinement: payload.refinement.clone(),
        }
    }
}

/// A produced design plus its diagram source.
#[derive(Debug, Clone)]
pub struct ProducedDesign {
    /// The structured design payload. Structural arrays are always present.
    pub design: ArchitectureDesign,
    /// Diagram source text describing the design.
    pub diagram_source: String,
}

/// Generates or refines a design from structured input.
#[async_trait]
pub trait DesignProducer: Send + Sync {
    /// Produces a design for the given input.
    ///
    /// When `input.refinement` is present this is a refinement call and the
    /// producer must incorporate the prior design.
    async fn produce(&self, input: &ProducerInput) -> Result<ProducedDesign, ProducerError>;
}

/// Wraps a producer so that any error falls back to the deterministic
/// synthetic designer, making the combination total.
pub struct ResilientProducer {
    inner: Arc<dyn DesignProducer>,
    fallback: FallbackDesigner,
}

impl ResilientProducer {
    /// Wraps a producer with the default fallback designer.
    pub fn new(inner: Arc<dyn DesignProducer>) -> Self {
        Self {
            inner,
            fallback: FallbackDesigner::new(),
        }
    }
}

#[async_trait]
impl DesignProducer for ResilientProducer {
    async fn produce(&self, input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
        match self.inner.produce(input).await {
            Ok(produced) if produced.design.has_components() => {
                metrics::record_producer_request("ok");
                Ok(produced)
            }
            Ok(_) => {
                warn!("Producer returned a design with no components, using fallback");
                metrics::record_producer_request("fallback");
                Ok(self.fallback.design(input))
            }
            Err(e) => {
                warn!(error = %e, "Producer failed, using deterministic fallback");
                metrics::record_producer_request("fallback");
                Ok(self.fallback.design(input))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::DesignConstraints;
    use uuid::Uuid;

    struct AlwaysFails;

    #[async_trait]
    impl DesignProducer for AlwaysFails {
        async fn produce(&self, _input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
            Err(ProducerError::RequestFailed("simulated outage".to_string()))
        }
    }

    struct EmptyDesign;

    #[async_trait]
    impl DesignProducer for EmptyDesign {
        async fn produce(&self, _input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
            Ok(ProducedDesign {
                design: ArchitectureDesign::default(),
                diagram_source: String::new(),
            })
        }
    }

    fn sample_input() -> ProducerInput {
        ProducerInput {
            input_kind: InputKind::Prompt,
            content: "Build a chat app".to_string(),
            constraints: DesignConstraints::default(),
            scale_profile: ScaleProfile::Dau1k,
            detail_level: DetailLevel::Standard,
            enhancements: Vec::new(),
            refinement: None,
        }
    }

    #[tokio::test]
    async fn test_resilient_producer_absorbs_errors() {
        let producer = ResilientProducer::new(Arc::new(AlwaysFails));
        let produced = producer.produce(&sample_input()).await.expect("total");

        assert!(produced.design.has_components());
        assert!(!produced.diagram_source.is_empty());
    }

    #[tokio::test]
    async fn test_resilient_producer_rejects_empty_designs() {
        let producer = ResilientProducer::new(Arc::new(EmptyDesign));
        let produced = producer.produce(&sample_input()).await.expect("total");

        assert!(produced.design.has_components());
    }

    #[test]
    fn test_input_from_payload() {
        let payload = GenerationPayload {
            request_id: Uuid::new_v4(),
            input_kind: InputKind::RepoUrl,
            content: "https://example.com/repo.git".to_string(),
            constraints: DesignConstraints::new().with_must_use("Kafka"),
            scale_profile: ScaleProfile::Dau1m,
            detail_level: DetailLevel::Detailed,
            enhancements: vec!["add-caching".to_string()],
            refinement: None,
        };

        let input = ProducerInput::from(&payload);
        assert_eq!(input.input_kind, InputKind::RepoUrl);
        assert_eq!(input.content, payload.content);
        assert_eq!(input.constraints.must_use, vec!["Kafka".to_string()]);
        assert_eq!(input.enhancements, vec!["add-caching".to_string()]);
    }
}
