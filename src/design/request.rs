//! Design request types.
//!
//! A `DesignRequest` anchors everything the pipeline produces: design
//! versions, diagram versions, and jobs all reference a request id. The
//! request itself is immutable after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the user described the system to design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Free-form product description.
    Prompt,
    /// URL of an existing repository to analyze.
    RepoUrl,
}

impl InputKind {
    /// Returns the storage representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Prompt => "prompt",
            InputKind::RepoUrl => "repo_url",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prompt" => Some(InputKind::Prompt),
            "repo_url" => Some(InputKind::RepoUrl),
            _ => None,
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target load the generated architecture should handle.
///
/// Influences generated content only, never pipeline mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleProfile {
    /// Throwaway prototype, minimal topology.
    Prototype,
    /// Roughly one thousand daily active users.
    Dau1k,
    /// Roughly one million daily active users.
    Dau1m,
}

impl ScaleProfile {
    /// Returns the storage representation of this profile.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleProfile::Prototype => "prototype",
            ScaleProfile::Dau1k => "dau_1k",
            ScaleProfile::Dau1m => "dau_1m",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prototype" => Some(ScaleProfile::Prototype),
            "dau_1k" => Some(ScaleProfile::Dau1k),
            "dau_1m" => Some(ScaleProfile::Dau1m),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScaleProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verbosity of the generated architecture and diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// High-level component sketch.
    Overview,
    /// Components plus data stores and APIs.
    Standard,
    /// Full detail including security and scaling notes per component.
    Detailed,
}

impl DetailLevel {
    /// Returns the storage representation of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Overview => "overview",
            DetailLevel::Standard => "standard",
            DetailLevel::Detailed => "detailed",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "overview" => Some(DetailLevel::Overview),
            "standard" => Some(DetailLevel::Standard),
            "detailed" => Some(DetailLevel::Detailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Technology constraints attached to a request. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignConstraints {
    /// Technologies the design must include.
    #[serde(default)]
    pub must_use: Vec<String>,
    /// Technologies the design must avoid.
    #[serde(default)]
    pub avoid: Vec<String>,
    /// Preferred implementation language, if any.
    #[serde(default)]
    pub preferred_language: Option<String>,
}

impl DesignConstraints {
    /// Creates an empty constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a must-use technology.
    pub fn with_must_use(mut self, tech: impl Into<String>) -> Self {
        self.must_use.push(tech.into());
        self
    }

    /// Adds a technology to avoid.
    pub fn with_avoid(mut self, tech: impl Into<String>) -> Self {
        self.avoid.push(tech.into());
        self
    }

    /// Sets the preferred language.
    pub fn with_preferred_language(mut self, lang: impl Into<String>) -> Self {
        self.preferred_language = Some(lang.into());
        self
    }

    /// Returns whether a technology name is on the avoid list.
    ///
    /// Matching is case-insensitive.
    pub fn avoids(&self, tech: &str) -> bool {
        self.avoid.iter().any(|t| t.eq_ignore_ascii_case(tech))
    }
}

/// A user's standing request for an architecture.
///
/// Immutable after creation: refinement creates new versions anchored to
/// this request, never a new request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignRequest {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable title.
    pub title: String,
    /// How the system was described.
    pub input_kind: InputKind,
    /// Product description; present iff `input_kind` is `Prompt`.
    pub prompt_text: Option<String>,
    /// Repository URL; present iff `input_kind` is `RepoUrl`.
    pub repo_url: Option<String>,
    /// Target load profile.
    pub scale_profile: ScaleProfile,
    /// Output verbosity.
    pub detail_level: DetailLevel,
    /// Technology constraints.
    pub constraints: DesignConstraints,
    /// Owning project.
    pub project_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request row was last touched.
    pub updated_at: DateTime<Utc>,
}

impl DesignRequest {
    /// Returns the prompt text or repository URL, whichever is present.
    pub fn content(&self) -> &str {
        match self.input_kind {
            InputKind::Prompt => self.prompt_text.as_deref().unwrap_or(""),
            InputKind::RepoUrl => self.repo_url.as_deref().unwrap_or(""),
        }
    }
}

/// Parameters for creating a new design request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDesignRequest {
    /// Human-readable title.
    pub title: String,
    /// How the system is described.
    pub input_kind: InputKind,
    /// Product description for `Prompt` requests.
    pub prompt_text: Option<String>,
    /// Repository URL for `RepoUrl` requests.
    pub repo_url: Option<String>,
    /// Target load profile.
    pub scale_profile: ScaleProfile,
    /// Output verbosity.
    pub detail_level: DetailLevel,
    /// Technology constraints.
    pub constraints: DesignConstraints,
    /// Owning project.
    pub project_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
}

impl NewDesignRequest {
    /// Creates a prompt-backed request with standard detail.
    pub fn from_prompt(
        title: impl Into<String>,
        prompt: impl Into<String>,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Self {
        Self {
            title: title.into(),
            input_kind: InputKind::Prompt,
            prompt_text: Some(prompt.into()),
            repo_url: None,
            scale_profile: ScaleProfile::Prototype,
            detail_level: DetailLevel::Standard,
            constraints: DesignConstraints::default(),
            project_id,
            user_id,
        }
    }

    /// Creates a repository-backed request with standard detail.
    pub fn from_repo_url(
        title: impl Into<String>,
        url: impl Into<String>,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Self {
        Self {
            title: title.into(),
            input_kind: InputKind::RepoUrl,
            prompt_text: None,
            repo_url: Some(url.into()),
            scale_profile: ScaleProfile::Prototype,
            detail_level: DetailLevel::Standard,
            constraints: DesignConstraints::default(),
            project_id,
            user_id,
        }
    }

    /// Sets the scale profile.
    pub fn with_scale_profile(mut self, profile: ScaleProfile) -> Self {
        self.scale_profile = profile;
        self
    }

    /// Sets the detail level.
    pub fn with_detail_level(mut self, level: DetailLevel) -> Self {
        self.detail_level = level;
        self
    }

    /// Sets the constraints.
    pub fn with_constraints(mut self, constraints: DesignConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Returns the content for the configured input kind, if present.
    pub fn content(&self) -> Option<&str> {
        match self.input_kind {
            InputKind::Prompt => self.prompt_text.as_deref(),
            InputKind::RepoUrl => self.repo_url.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_kind_roundtrip() {
        for kind in [InputKind::Prompt, InputKind::RepoUrl] {
            assert_eq!(InputKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(InputKind::parse("bogus"), None);
    }

    #[test]
    fn test_scale_profile_roundtrip() {
        for profile in [
            ScaleProfile::Prototype,
            ScaleProfile::Dau1k,
            ScaleProfile::Dau1m,
        ] {
            assert_eq!(ScaleProfile::parse(profile.as_str()), Some(profile));
        }
        assert_eq!(ScaleProfile::parse(""), None);
    }

    #[test]
    fn test_detail_level_roundtrip() {
        for level in [
            DetailLevel::Overview,
            DetailLevel::Standard,
            DetailLevel::Detailed,
        ] {
            assert_eq!(DetailLevel::parse(level.as_str()), Some(level));
        }
    }

    #[test]
    fn test_constraints_builder() {
        let constraints = DesignConstraints::new()
            .with_must_use("PostgreSQL")
            .with_avoid("MongoDB")
            .with_preferred_language("Rust");

        assert_eq!(constraints.must_use, vec!["PostgreSQL".to_string()]);
        assert!(constraints.avoids("mongodb"));
        assert!(!constraints.avoids("PostgreSQL"));
        assert_eq!(constraints.preferred_language.as_deref(), Some("Rust"));
    }

    #[test]
    fn test_new_request_from_prompt() {
        let req = NewDesignRequest::from_prompt(
            "Chat app",
            "Build a chat app",
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .with_scale_profile(ScaleProfile::Dau1k)
        .with_detail_level(DetailLevel::Detailed);

        assert_eq!(req.input_kind, InputKind::Prompt);
        assert_eq!(req.content(), Some("Build a chat app"));
        assert!(req.repo_url.is_none());
        assert_eq!(req.scale_profile, ScaleProfile::Dau1k);
        assert_eq!(req.detail_level, DetailLevel::Detailed);
    }

    #[test]
    fn test_new_request_from_repo_url() {
        let req = NewDesignRequest::from_repo_url(
            "Existing service",
            "https://example.com/repo.git",
            Uuid::new_v4(),
            Uuid::new_v4(),
        );

        assert_eq!(req.input_kind, InputKind::RepoUrl);
        assert_eq!(req.content(), Some("https://example.com/repo.git"));
        assert!(req.prompt_text.is_none());
    }

    #[test]
    fn test_constraints_serde_defaults() {
        let constraints: DesignConstraints = serde_json::from_str("{}").expect("parse");
        assert!(constraints.must_use.is_empty());
        assert!(constraints.avoid.is_empty());
        assert!(constraints.preferred_language.is_none());
    }
}
