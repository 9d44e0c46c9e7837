//! Job definitions for the scheduler.
//!
//! This module defines the core job types used by the queue and workers:
//!
//! - `JobRecord`: the durable job row, the source of truth for job state
//! - `JobPayload`: serializable work description carried by queue entries
//! - `QueueEntry`: one unit of queued work with retry accounting
//! - `RetryPolicy`: per-kind attempt bounds and backoff shape

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::design::{ArchitectureDesign, DesignConstraints, DetailLevel, InputKind, ScaleProfile};

/// Maximum attempts for design-generation queue entries.
const GENERATE_MAX_ATTEMPTS: u32 = 4;

/// Maximum attempts for diagram-rendering queue entries.
const RENDER_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff on generation retries.
const GENERATE_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Ceiling for generation retry delays.
const GENERATE_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Fixed delay between rendering retries.
const RENDER_BACKOFF: Duration = Duration::from_secs(10);

/// Kind of asynchronous work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Produce a new design version (fresh generation or refinement).
    GenerateDesign,
    /// Re-render an existing diagram source into a new diagram version.
    RenderDiagram,
}

impl JobKind {
    /// Returns the storage representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GenerateDesign => "generate_design",
            JobKind::RenderDiagram => "render_diagram",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generate_design" => Some(JobKind::GenerateDesign),
            "render_diagram" => Some(JobKind::RenderDiagram),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// Transitions are strictly `Pending -> Processing -> Completed | Failed`;
/// terminal states are final. Queue-level retries of the same entry update
/// the same job row in place rather than creating a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created and enqueued, not yet picked up by a worker.
    Pending,
    /// A worker is executing the pipeline.
    Processing,
    /// Pipeline finished successfully.
    Completed,
    /// Pipeline failed; `error` on the job row carries the cause.
    Failed,
}

impl JobState {
    /// Returns the storage representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    /// Returns whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Refinement context carried by a generation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementContext {
    /// Natural-language change instruction.
    pub instruction: String,
    /// Snapshot of the design being refined.
    pub prior_design: ArchitectureDesign,
}

/// Work description for a design-generation job.
///
/// Carries everything the worker needs so it never re-queries the submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    /// Request the produced versions will belong to.
    pub request_id: Uuid,
    /// How the system was described.
    pub input_kind: InputKind,
    /// Prompt text or repository URL.
    pub content: String,
    /// Technology constraints.
    #[serde(default)]
    pub constraints: DesignConstraints,
    /// Target load profile.
    pub scale_profile: ScaleProfile,
    /// Output verbosity.
    pub detail_level: DetailLevel,
    /// Quick-enhancement directives forwarded to the producer.
    #[serde(default)]
    pub enhancements: Vec<String>,
    /// Present for refinement jobs; absent for fresh generation.
    #[serde(default)]
    pub refinement: Option<RefinementContext>,
}

impl GenerationPayload {
    /// Returns whether this payload describes a refinement call.
    pub fn is_refinement(&self) -> bool {
        self.refinement.is_some()
    }
}

/// Work description for a diagram re-rendering job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    /// Request the produced diagram version will belong to.
    pub request_id: Uuid,
    /// Diagram source to render.
    pub source: String,
}

/// Serializable payload carried by a queue entry and stored as job metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Produce a new design version.
    GenerateDesign(GenerationPayload),
    /// Re-render an existing diagram source.
    RenderDiagram(RenderPayload),
}

impl JobPayload {
    /// Returns the job kind this payload describes.
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::GenerateDesign(_) => JobKind::GenerateDesign,
            JobPayload::RenderDiagram(_) => JobKind::RenderDiagram,
        }
    }

    /// Returns the owning request id.
    pub fn request_id(&self) -> Uuid {
        match self {
            JobPayload::GenerateDesign(p) => p.request_id,
            JobPayload::RenderDiagram(p) => p.request_id,
        }
    }
}

/// Durable job row. The source of truth for job state; the status cache
/// only mirrors it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// What kind of work this job performs.
    pub kind: JobKind,
    /// Current lifecycle state.
    pub status: JobState,
    /// Progress 0-100; intermediate values only while `Processing`.
    pub progress: u8,
    /// Owning design request.
    pub request_id: Uuid,
    /// The original job input, kept for audit and queue-level retries.
    pub metadata: serde_json::Value,
    /// Human-readable failure cause, set when `status` is `Failed`.
    pub error: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
    /// When a worker first started processing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a job row. New rows always start `Pending` at
/// progress 0.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// What kind of work the job performs.
    pub kind: JobKind,
    /// Owning design request.
    pub request_id: Uuid,
    /// The original job input.
    pub metadata: serde_json::Value,
}

/// One unit of queued work, serialized into the Redis queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Durable job row this entry executes.
    pub job_id: Uuid,
    /// The work description.
    pub payload: JobPayload,
    /// Number of times this entry has been attempted.
    pub attempts: u32,
    /// Maximum attempts before the entry is dead-lettered.
    pub max_attempts: u32,
    /// When the entry was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Creates a queue entry with the retry bound for its kind.
    pub fn new(job_id: Uuid, payload: JobPayload) -> Self {
        let max_attempts = RetryPolicy::for_kind(payload.kind()).max_attempts;
        Self {
            job_id,
            payload,
            attempts: 0,
            max_attempts,
            enqueued_at: Utc::now(),
        }
    }

    /// Overrides the maximum attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns the job kind of this entry.
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Increments the attempt counter. Called before each execution attempt.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    /// Returns whether the entry should be retried after a failure.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Returns the number of remaining attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Returns how long ago the entry was first enqueued.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.enqueued_at
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Delay doubles per attempt up to a ceiling.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Ceiling for the computed delay.
        max: Duration,
    },
}

/// Retry bounds and backoff for one job kind.
///
/// Generation is expensive and external-service dependent, so it gets more
/// attempts with exponential backoff. Rendering is cheap and deterministic,
/// so it gets fewer attempts with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts before dead-lettering.
    pub max_attempts: u32,
    /// Delay shape between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Returns the policy for a job kind.
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::GenerateDesign => Self {
                max_attempts: GENERATE_MAX_ATTEMPTS,
                backoff: Backoff::Exponential {
                    base: GENERATE_BACKOFF_BASE,
                    max: GENERATE_BACKOFF_MAX,
                },
            },
            JobKind::RenderDiagram => Self {
                max_attempts: RENDER_MAX_ATTEMPTS,
                backoff: Backoff::Fixed(RENDER_BACKOFF),
            },
        }
    }

    /// Computes the delay before the given retry attempt, with jitter.
    ///
    /// `attempt` is the number of attempts already made (so the first retry
    /// passes 1). Jitter of up to 20% is added so simultaneous failures do
    /// not retry in lockstep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                let scaled = base.saturating_mul(1u32 << shift);
                scaled.min(max)
            }
        };

        let jitter_ms = (base.as_millis() as u64 / 5).max(1);
        let extra = rand::rng().random_range(0..jitter_ms);
        base + Duration::from_millis(extra)
    }
}
