//! Asynchronous job scheduling: queue, dispatch, and worker pool.
//!
//! This module provides the infrastructure that turns a design request into
//! a durable, resumable background task:
//!
//! - **JobQueue**: Redis-based work queue with reliable dequeue (BRPOPLPUSH),
//!   delayed retries, and a dead letter queue
//! - **JobDispatcher**: creates the durable job row, pushes the queue entry,
//!   and seeds the status cache
//! - **WorkerPool**: workers that pull entries and drive the pipelines, with
//!   per-kind concurrency caps
//! - **Job types**: payloads, the durable job row, and per-kind retry
//!   policies
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  API layer   │
//!                      │ (dispatcher) │
//!                      └──────┬───────┘
//!              job row ┌──────▼───────┐ status seed
//!          PostgreSQL ◄┤    Redis     ├► status cache
//!                      │    queue     │
//!                      └──────┬───────┘
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Reliability Features
//!
//! - **Atomic dequeue**: BRPOPLPUSH moves entries to a processing list, so
//!   each entry is held by at most one worker at a time
//! - **Crash recovery**: processing-list entries are requeued on pool start
//! - **Per-kind backoff**: generation retries back off exponentially,
//!   rendering retries at a fixed interval
//! - **Dead letter queue**: entries that exhaust their attempts are parked
//!   for analysis; the job row stays FAILED as the audit record

pub mod enqueue;
pub mod job;
pub mod memory_queue;
pub mod queue;
pub mod worker_pool;

// Re-export main types for convenience
pub use enqueue::{DispatchError, JobDispatcher};
pub use job::{
    Backoff, GenerationPayload, JobKind, JobPayload, JobRecord, JobState, NewJob, QueueEntry,
    RefinementContext, RenderPayload, RetryPolicy,
};
pub use memory_queue::MemoryQueue;
pub use queue::{JobQueue, QueueError, QueueStats, WorkQueue};
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
