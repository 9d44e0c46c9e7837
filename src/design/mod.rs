//! Domain types for design requests and generated artifacts.
//!
//! This module defines the core data model of the design pipeline:
//!
//! - `DesignRequest`: a user's standing request for an architecture
//! - `ArchitectureDesign`: the structured design payload produced for a request
//! - `DesignVersion` / `DiagramVersion`: immutable, sequentially numbered
//!   snapshots of generated content
//!
//! A request is created once and never mutated; refinement produces new
//! versions anchored to the same request. Version numbers are allocated by
//! the storage layer, never supplied by callers.

pub mod artifact;
pub mod request;

pub use artifact::{
    ApiSpec, ArchitectureDesign, ComponentSpec, DataStoreSpec, DesignVersion, DiagramVersion,
};
pub use request::{
    DesignConstraints, DesignRequest, DetailLevel, InputKind, NewDesignRequest, ScaleProfile,
};
