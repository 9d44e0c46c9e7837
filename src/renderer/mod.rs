//! The diagram-renderer capability.
//!
//! A [`DiagramRenderer`] converts diagram source text into a displayable
//! artifact. Rendering is total: implementations return a
//! [`RenderOutcome`] carrying either an artifact, or a null artifact plus an
//! error description, and never fail the calling pipeline. A null artifact
//! means "store source only, render client-side" and is a normal terminal
//! outcome.

pub mod http;

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

pub use http::HttpDiagramRenderer;

/// Result of a rendering attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    /// The (possibly normalized) diagram source.
    pub source: String,
    /// Rendered artifact (e.g., SVG text), or `None` when the client should
    /// render from source.
    pub artifact: Option<String>,
    /// Why no artifact was produced, when applicable.
    pub error: Option<String>,
}

impl RenderOutcome {
    /// Outcome carrying a rendered artifact.
    pub fn rendered(source: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            artifact: Some(artifact.into()),
            error: None,
        }
    }

    /// Outcome without an artifact; the source is still stored.
    pub fn source_only(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            artifact: None,
            error: None,
        }
    }

    /// Outcome without an artifact, with a reason.
    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            artifact: None,
            error: Some(error.into()),
        }
    }
}

/// Converts diagram source into a displayable artifact.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Renders the source. Never fails; problems are reported in the
    /// outcome's `error` field with a null artifact.
    async fn render(&self, source: &str) -> RenderOutcome;
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(graph|flowchart|sequenceDiagram|classDiagram|stateDiagram|stateDiagram-v2|erDiagram|journey|gantt|pie|C4Context)\b",
        )
        .expect("header regex is valid")
    })
}

/// Validates that source begins with a recognized diagram-type declaration.
///
/// Returns the trimmed source, or a descriptive error for empty or
/// unrecognized input.
pub fn validate_source(source: &str) -> Result<&str, String> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err("diagram source is empty".to_string());
    }

    if !header_regex().is_match(trimmed) {
        let first_line = trimmed.lines().next().unwrap_or_default();
        return Err(format!(
            "diagram source does not start with a recognized diagram type: '{}'",
            first_line
        ));
    }

    Ok(trimmed)
}

/// Renderer that validates and normalizes source but never produces an
/// artifact. Used when clients render diagrams themselves.
#[derive(Debug, Default, Clone)]
pub struct SourceOnlyRenderer;

impl SourceOnlyRenderer {
    /// Creates a source-only renderer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagramRenderer for SourceOnlyRenderer {
    async fn render(&self, source: &str) -> RenderOutcome {
        match validate_source(source) {
            Ok(normalized) => RenderOutcome::source_only(normalized),
            Err(reason) => RenderOutcome::failed(source, reason),
        }
    }
}
