//! Generated artifacts: structured designs and their versioned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One component of a generated architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component name (e.g., "API Gateway").
    pub name: String,
    /// What the component does.
    pub description: String,
    /// Suggested technology, if the producer named one.
    #[serde(default)]
    pub technology: Option<String>,
}

impl ComponentSpec {
    /// Creates a component without a technology suggestion.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            technology: None,
        }
    }

    /// Sets the suggested technology.
    pub fn with_technology(mut self, tech: impl Into<String>) -> Self {
        self.technology = Some(tech.into());
        self
    }
}

/// One data store of a generated architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreSpec {
    /// Store name (e.g., "primary database").
    pub name: String,
    /// Engine or product (e.g., "PostgreSQL").
    pub engine: String,
    /// What the store holds and why.
    pub purpose: String,
}

impl DataStoreSpec {
    /// Creates a data store spec.
    pub fn new(
        name: impl Into<String>,
        engine: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            purpose: purpose.into(),
        }
    }
}

/// One API surface of a generated architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    /// API name (e.g., "public REST API").
    pub name: String,
    /// Protocol or style (e.g., "REST", "gRPC", "WebSocket").
    pub protocol: String,
    /// What the API exposes.
    pub description: String,
}

impl ApiSpec {
    /// Creates an API spec.
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            description: description.into(),
        }
    }
}

/// The structured design payload produced for a request.
///
/// The structural arrays are always present; a minimal architecture still
/// carries at least one component. `serde(default)` keeps older persisted
/// payloads readable if optional fields were absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDesign {
    /// Components of the architecture.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    /// Data stores backing the components.
    #[serde(default)]
    pub data_stores: Vec<DataStoreSpec>,
    /// API surfaces exposed by the system.
    #[serde(default)]
    pub apis: Vec<ApiSpec>,
    /// Security considerations.
    #[serde(default)]
    pub security_notes: Vec<String>,
    /// What changes as load grows.
    #[serde(default)]
    pub scaling_notes: Vec<String>,
    /// Suggested cloud provider, if any.
    #[serde(default)]
    pub cloud_provider: Option<String>,
    /// Architecture style label (e.g., "microservices", "modular monolith").
    #[serde(default)]
    pub architecture_style: Option<String>,
}

impl ArchitectureDesign {
    /// Returns whether the design carries at least one component.
    pub fn has_components(&self) -> bool {
        !self.components.is_empty()
    }

    /// Returns the names of all components.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }
}

/// An immutable snapshot of a generated design for a request.
///
/// Version numbers for a given request form a gapless increasing sequence
/// starting at 1, allocated by the storage layer at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignVersion {
    /// Unique identifier of this snapshot.
    pub id: Uuid,
    /// Parent request.
    pub request_id: Uuid,
    /// Sequential version number, starting at 1.
    pub version: i32,
    /// The structured design payload.
    pub design: ArchitectureDesign,
    /// When the snapshot was persisted.
    pub created_at: DateTime<Utc>,
}

/// An immutable snapshot of a rendered or renderable diagram.
///
/// Numbered in its own space per request, independent of design versions.
/// `artifact` is `None` when the client is expected to render from source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramVersion {
    /// Unique identifier of this snapshot.
    pub id: Uuid,
    /// Parent request.
    pub request_id: Uuid,
    /// Owning design version, if the diagram was produced alongside one.
    pub design_version_id: Option<Uuid>,
    /// Sequential version number, starting at 1.
    pub version: i32,
    /// Diagram source text.
    pub source: String,
    /// Rendered artifact (e.g., SVG text), or `None` for client-side rendering.
    pub artifact: Option<String>,
    /// When the snapshot was persisted.
    pub created_at: DateTime<Utc>,
}
