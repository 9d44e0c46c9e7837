//! Deterministic, constraint-aware synthetic designer.
//!
//! The fallback is the reason the producer capability is total: whatever the
//! upstream provider does, this designer always yields a syntactically valid
//! design with non-empty structural arrays. The same input always yields the
//! same design; the only variation comes from a content hash, so behavior is
//! reproducible across runs and processes.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::design::{ApiSpec, ArchitectureDesign, ComponentSpec, DataStoreSpec, DetailLevel,
    ScaleProfile};

use super::{DesignProducer, ProducedDesign, ProducerError, ProducerInput};

/// Cloud providers the fallback rotates through deterministically.
const CLOUD_PROVIDERS: [&str; 3] = ["aws", "gcp", "azure"];

/// Deterministic synthetic designer. Infallible by construction.
#[derive(Debug, Default, Clone)]
pub struct FallbackDesigner;

impl FallbackDesigner {
    /// Creates a fallback designer.
    pub fn new() -> Self {
        Self
    }

    /// Produces a design for the input. Never fails.
    pub fn design(&self, input: &ProducerInput) -> ProducedDesign {
        let design = match &input.refinement {
            Some(refinement) => self.refine(input, &refinement.prior_design, &refinement.instruction),
            None => self.synthesize(input),
        };

        let diagram_source = render_diagram_source(&design);
        ProducedDesign {
            design,
            diagram_source,
        }
    }

    /// Builds a fresh design from scratch.
    fn synthesize(&self, input: &ProducerInput) -> ArchitectureDesign {
        let seed = content_seed(&input.content);
        let mut design = ArchitectureDesign {
            architecture_style: Some(style_for(input.scale_profile).to_string()),
            cloud_provider: Some(CLOUD_PROVIDERS[seed as usize % CLOUD_PROVIDERS.len()].to_string()),
            ..Default::default()
        };

        self.add_topology(input, &mut design);
        self.add_apis(input, &mut design);
        self.add_notes(input, &mut design);
        self.apply_constraints(input, &mut design);

        design
    }

    /// Applies a refinement instruction to a prior design.
    ///
    /// The prior design is carried forward unchanged apart from a recorded
    /// scale note; a synthetic designer cannot interpret free-form
    /// instructions, but it must still incorporate the prior snapshot and
    /// keep the structural arrays valid.
    fn refine(
        &self,
        input: &ProducerInput,
        prior: &ArchitectureDesign,
        instruction: &str,
    ) -> ArchitectureDesign {
        let mut design = prior.clone();
        design
            .scaling_notes
            .push(format!("Requested change: {}", instruction));

        if !design.has_components() {
            design
                .components
                .push(ComponentSpec::new("Application", "Core application service"));
        }

        self.apply_constraints(input, &mut design);
        design
    }

    /// Adds components and data stores for the target scale.
    fn add_topology(&self, input: &ProducerInput, design: &mut ArchitectureDesign) {
        let db_engine = self.pick_database(input);

        match input.scale_profile {
            ScaleProfile::Prototype => {
                design.components.push(
                    ComponentSpec::new("Application", "Single deployable serving UI and API")
                        .with_technology(self.pick_language(input)),
                );
                design.data_stores.push(DataStoreSpec::new(
                    "primary database",
                    db_engine.as_str(),
                    "All application state",
                ));
            }
            ScaleProfile::Dau1k => {
                design.components.push(
                    ComponentSpec::new("Web Application", "Serves client traffic")
                        .with_technology(self.pick_language(input)),
                );
                design.components.push(ComponentSpec::new(
                    "Background Worker",
                    "Handles asynchronous tasks off the request path",
                ));
                design.data_stores.push(DataStoreSpec::new(
                    "primary database",
                    db_engine.as_str(),
                    "Durable application state",
                ));
                if !input.constraints.avoids("Redis") {
                    design.data_stores.push(DataStoreSpec::new(
                        "cache",
                        "Redis",
                        "Hot reads and session data",
                    ));
                }
            }
            ScaleProfile::Dau1m => {
                design
                    .components
                    .push(ComponentSpec::new("CDN", "Edge caching for static assets"));
                design.components.push(ComponentSpec::new(
                    "Load Balancer",
                    "Distributes traffic across service replicas",
                ));
                design.components.push(
                    ComponentSpec::new("API Service", "Stateless horizontally scaled API tier")
                        .with_technology(self.pick_language(input)),
                );
                design.components.push(ComponentSpec::new(
                    "Worker Fleet",
                    "Consumes queued work independently of the API tier",
                ));
                design.components.push(ComponentSpec::new(
                    "Message Queue",
                    "Decouples request acceptance from processing",
                ));
                design.data_stores.push(DataStoreSpec::new(
                    "primary database",
                    db_engine.as_str(),
                    "Durable state with read replicas",
                ));
                if !input.constraints.avoids("Redis") {
                    design.data_stores.push(DataStoreSpec::new(
                        "cache",
                        "Redis",
                        "Hot paths, rate limits, session data",
                    ));
                }
            }
        }
    }

    /// Adds API surfaces.
    fn add_apis(&self, input: &ProducerInput, design: &mut ArchitectureDesign) {
        design.apis.push(ApiSpec::new(
            "public API",
            "REST",
            "Primary client-facing interface",
        ));

        if input.scale_profile == ScaleProfile::Dau1m
            && input.detail_level != DetailLevel::Overview
        {
            design.apis.push(ApiSpec::new(
                "events",
                "WebSocket",
                "Server-initiated updates to connected clients",
            ));
        }
    }

    /// Adds security and scaling notes scaled to the detail level.
    fn add_notes(&self, input: &ProducerInput, design: &mut ArchitectureDesign) {
        design
            .security_notes
            .push("Terminate TLS at the edge; encrypt internal traffic".to_string());
        design
            .security_notes
            .push("Authenticate every API call; scope tokens per client".to_string());

        if input.detail_level == DetailLevel::Detailed {
            design
                .security_notes
                .push("Store secrets in a managed secret store, never in config".to_string());
        }

        let scale_note = match input.scale_profile {
            ScaleProfile::Prototype => "Vertical scaling is sufficient at this stage",
            ScaleProfile::Dau1k => "Add read replicas and a cache before sharding anything",
            ScaleProfile::Dau1m => {
                "Scale the stateless tiers horizontally; partition the database by tenant"
            }
        };
        design.scaling_notes.push(scale_note.to_string());

        for enhancement in &input.enhancements {
            design
                .scaling_notes
                .push(format!("Enhancement applied: {}", enhancement));
        }
    }

    /// Ensures every must-use technology appears and avoided ones do not.
    fn apply_constraints(&self, input: &ProducerInput, design: &mut ArchitectureDesign) {
        design
            .components
            .retain(|c| !matches_avoided(input, c.technology.as_deref()));
        design
            .data_stores
            .retain(|s| !input.constraints.avoids(&s.engine));

        for tech in &input.constraints.must_use {
            let present = design
                .components
                .iter()
                .any(|c| c.technology.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(tech)))
                || design
                    .data_stores
                    .iter()
                    .any(|s| s.engine.eq_ignore_ascii_case(tech));

            if !present {
                design.components.push(
                    ComponentSpec::new(tech.clone(), "Required by request constraints")
                        .with_technology(tech.clone()),
                );
            }
        }

        if !design.has_components() {
            design
                .components
                .push(ComponentSpec::new("Application", "Core application service"));
        }
    }

    /// Picks a database engine honoring constraints.
    fn pick_database(&self, input: &ProducerInput) -> String {
        for tech in &input.constraints.must_use {
            let lowered = tech.to_lowercase();
            if lowered.contains("postgres")
                || lowered.contains("mysql")
                || lowered.contains("sqlite")
                || lowered.contains("mongo")
            {
                return tech.clone();
            }
        }

        if !input.constraints.avoids("PostgreSQL") {
            "PostgreSQL".to_string()
        } else {
            "MySQL".to_string()
        }
    }

    /// Picks an implementation language honoring the preference.
    fn pick_language(&self, input: &ProducerInput) -> String {
        input
            .constraints
            .preferred_language
            .clone()
            .unwrap_or_else(|| "TypeScript".to_string())
    }
}

#[async_trait]
impl DesignProducer for FallbackDesigner {
    async fn produce(&self, input: &ProducerInput) -> Result<ProducedDesign, ProducerError> {
        Ok(self.design(input))
    }
}

/// Returns whether a component technology is on the avoid list.
fn matches_avoided(input: &ProducerInput, technology: Option<&str>) -> bool {
    technology.is_some_and(|t| input.constraints.avoids(t))
}

/// Architecture style label for a scale profile.
fn style_for(profile: ScaleProfile) -> &'static str {
    match profile {
        ScaleProfile::Prototype => "monolith",
        ScaleProfile::Dau1k => "modular monolith",
        ScaleProfile::Dau1m => "microservices",
    }
}

/// First byte of the content hash, used for deterministic choices.
fn content_seed(content: &str) -> u8 {
    let digest = Sha256::digest(content.as_bytes());
    digest[0]
}

/// Renders Mermaid flowchart source from a design.
///
/// Components chain left to right; every data store hangs off the last
/// component. Node ids are positional so arbitrary names cannot break the
/// syntax.
pub fn render_diagram_source(design: &ArchitectureDesign) -> String {
    let mut lines = vec!["flowchart TD".to_string()];
    lines.push("    client([Client])".to_string());

    let mut prev = "client".to_string();
    for (idx, component) in design.components.iter().enumerate() {
        let id = format!("c{}", idx);
        lines.push(format!("    {}[{}]", id, sanitize_label(&component.name)));
        lines.push(format!("    {} --> {}", prev, id));
        prev = id;
    }

    for (idx, store) in design.data_stores.iter().enumerate() {
        let id = format!("s{}", idx);
        lines.push(format!("    {}[({})]", id, sanitize_label(&store.name)));
        lines.push(format!("    {} --> {}", prev, id));
    }

    lines.join("\n")
}

/// Strips characters that would terminate a Mermaid node label.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '"'))
        .collect()
}
