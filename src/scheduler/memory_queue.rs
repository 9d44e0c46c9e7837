//! In-memory work queue.
//!
//! Implements [`WorkQueue`] over process-local state for the test suite and
//! for running the pipeline without Redis. Semantics mirror the Redis
//! queue: single in-flight delivery per entry, delayed re-delivery after
//! `retry_later`, and a dead-letter side list.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::job::QueueEntry;
use super::queue::{QueueError, WorkQueue};

/// How often a blocking dequeue re-checks for work.
const POLL_STEP: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Inner {
    ready: VecDeque<QueueEntry>,
    delayed: Vec<(Instant, QueueEntry)>,
    in_flight: Vec<QueueEntry>,
    dead_letter: Vec<(QueueEntry, String)>,
    completed: u64,
}

/// Process-local [`WorkQueue`] implementation.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries whose backoff has not yet elapsed.
    pub fn delayed_len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").delayed.len()
    }

    /// Returns the dead-lettered entries with their final errors.
    pub fn dead_letters(&self) -> Vec<(QueueEntry, String)> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .dead_letter
            .clone()
    }

    /// Returns how many entries were completed.
    pub fn completed_count(&self) -> u64 {
        self.inner.lock().expect("queue lock poisoned").completed
    }

    /// Moves due delayed entries to the front of the ready queue.
    fn promote_due(inner: &mut Inner) {
        let now = Instant::now();
        let mut idx = 0;
        while idx < inner.delayed.len() {
            if inner.delayed[idx].0 <= now {
                let (_, entry) = inner.delayed.remove(idx);
                inner.ready.push_back(entry);
            } else {
                idx += 1;
            }
        }
    }

    fn remove_in_flight(inner: &mut Inner, entry: &QueueEntry) {
        inner.in_flight.retain(|e| e.job_id != entry.job_id);
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.ready.push_back(entry.clone());
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                Self::promote_due(&mut inner);
                if let Some(entry) = inner.ready.pop_front() {
                    inner.in_flight.push(entry.clone());
                    return Ok(Some(entry));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn complete(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::remove_in_flight(&mut inner, entry);
        inner.completed += 1;
        Ok(())
    }

    async fn retry_later(&self, entry: &QueueEntry, delay: Duration) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::remove_in_flight(&mut inner, entry);
        inner.delayed.push((Instant::now() + delay, entry.clone()));
        Ok(())
    }

    async fn dead_letter(&self, entry: &QueueEntry, error: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::remove_in_flight(&mut inner, entry);
        inner.dead_letter.push((entry.clone(), error.to_string()));
        Ok(())
    }

    async fn recover_processing_entries(&self) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let orphaned: Vec<QueueEntry> = inner.in_flight.drain(..).collect();
        let recovered = orphaned.len();
        for mut entry in orphaned {
            entry.increment_attempts();
            if entry.should_retry() {
                inner.ready.push_back(entry);
            } else {
                inner
                    .dead_letter
                    .push((entry, "Recovered after max attempts".to_string()));
            }
        }
        Ok(recovered)
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        Ok(inner.ready.len())
    }
}
