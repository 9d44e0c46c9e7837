//! Worker pool for processing queue entries.
//!
//! This module provides a pool of workers that process entries from a shared
//! Redis queue. Each worker runs as an independent async task.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Per-kind concurrency caps (generation is capped lower than rendering,
//!   reflecting external-service cost)
//! - Graceful shutdown with broadcast channel
//! - Backoff retry via the queue's delayed set, dead letter after max
//!   attempts
//! - Pool statistics tracking

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::pipeline::JobExecutor;

use super::job::{JobKind, QueueEntry, RetryPolicy};
use super::queue::{JobQueue, QueueError, WorkQueue};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to connect to the job queue.
    #[error("Queue connection failed: {0}")]
    QueueConnection(#[from] QueueError),

    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Redis connection URL.
    pub redis_url: String,
    /// Name of the job queue.
    pub queue_name: String,
    /// How long a dequeue blocks waiting for work.
    pub poll_interval: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
    /// Concurrent design-generation executions allowed across the pool.
    pub generation_concurrency: usize,
    /// Concurrent diagram-render executions allowed across the pool.
    pub render_concurrency: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "designs".to_string(),
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
            generation_concurrency: 2,
            render_concurrency: 8,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the per-kind concurrency caps.
    pub fn with_concurrency(mut self, generation: usize, render: usize) -> Self {
        self.generation_concurrency = generation;
        self.render_concurrency = render;
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing entries.
    pub active_workers: usize,
    /// Total number of entries completed successfully.
    pub jobs_completed: u64,
    /// Total number of entry executions that failed.
    pub jobs_failed: u64,
    /// Average execution duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of executions (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            jobs_completed: completed,
            jobs_failed: failed,
            average_job_duration: average_duration,
        }
    }
}

/// Per-kind concurrency limits shared across workers.
struct KindLimits {
    generation: Semaphore,
    render: Semaphore,
}

impl KindLimits {
    fn new(generation: usize, render: usize) -> Self {
        Self {
            generation: Semaphore::new(generation.max(1)),
            render: Semaphore::new(render.max(1)),
        }
    }

    fn for_kind(&self, kind: JobKind) -> &Semaphore {
        match kind {
            JobKind::GenerateDesign => &self.generation,
            JobKind::RenderDiagram => &self.render,
        }
    }
}

/// Worker pool that manages multiple workers processing queue entries.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<dyn WorkQueue>,
    executor: Arc<dyn JobExecutor>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    limits: Arc<KindLimits>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a new worker pool, connecting to the queue.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if the queue connection fails.
    pub async fn new(
        config: WorkerPoolConfig,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<Self, PoolError> {
        let queue = JobQueue::connect(&config.redis_url, &config.queue_name).await?;
        let queue: Arc<dyn WorkQueue> = Arc::new(queue);
        Ok(Self::with_queue(config, queue, executor))
    }

    /// Creates a worker pool with an existing queue.
    pub fn with_queue(
        config: WorkerPoolConfig,
        queue: Arc<dyn WorkQueue>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        // Buffer size of 1 is sufficient since we only send once.
        let (shutdown_tx, _) = broadcast::channel(1);
        let limits = Arc::new(KindLimits::new(
            config.generation_concurrency,
            config.render_concurrency,
        ));

        Self {
            config,
            queue,
            executor,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            limits,
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// Entries stuck in the processing queue from a previous run are
    /// recovered first.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        match self.queue.recover_processing_entries().await {
            Ok(recovered) => {
                if recovered > 0 {
                    info!(recovered = recovered, "Recovered entries from processing queue");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to recover processing entries");
            }
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue_name: self.config.queue_name.clone(),
                queue: Arc::clone(&self.queue),
                executor: Arc::clone(&self.executor),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
                stats: Arc::clone(&self.stats),
                limits: Arc::clone(&self.limits),
            };

            let handle = tokio::spawn(async move {
                worker.run().await;
            });

            self.worker_handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Worker pool started");

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");

        // Ignore send error - workers may have already stopped.
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.worker_handles.drain(..).collect();
        let shutdown_future = async {
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Returns a reference to the job queue.
    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }
}

/// A single worker that processes entries from the queue.
struct Worker {
    /// Unique identifier for this worker.
    id: String,
    /// Queue name, used as the metrics label.
    queue_name: String,
    /// Reference to the job queue.
    queue: Arc<dyn WorkQueue>,
    /// Executor that runs entries to a terminal job state.
    executor: Arc<dyn JobExecutor>,
    /// Receiver for shutdown signal.
    shutdown_rx: broadcast::Receiver<()>,
    /// How long a dequeue blocks when the queue is empty.
    poll_interval: Duration,
    /// Shared statistics.
    stats: Arc<SharedPoolStats>,
    /// Per-kind concurrency limits.
    limits: Arc<KindLimits>,
}

impl Worker {
    /// Main worker loop.
    ///
    /// Continuously polls for entries and processes them until a shutdown
    /// signal is received.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            // Check for shutdown signal (non-blocking).
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(entry)) => {
                    self.process_entry(entry).await;
                    if let Ok(depth) = self.queue.len().await {
                        metrics::record_queue_depth(&self.queue_name, depth);
                    }
                }
                Ok(None) => {
                    // No entry available, the dequeue already waited.
                    debug!(worker_id = %self.id, "No entries available");
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue entry");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Processes a single entry.
    async fn process_entry(&self, mut entry: QueueEntry) {
        let kind = entry.kind();

        // The per-kind cap is taken after dequeue; the entry is parked on
        // the processing list while it waits for a slot.
        let permit = self
            .limits
            .for_kind(kind)
            .acquire()
            .await
            .expect("semaphore never closed");

        entry.increment_attempts();

        info!(
            worker_id = %self.id,
            job_id = %entry.job_id,
            kind = %kind,
            attempt = entry.attempts,
            "Processing entry"
        );

        self.stats.increment_active();
        metrics::set_jobs_in_progress(1.0);
        let start_time = Instant::now();

        let result = self.executor.execute(&entry).await;

        let duration = start_time.elapsed();
        metrics::set_jobs_in_progress(-1.0);
        self.stats.decrement_active();
        drop(permit);

        match result {
            Ok(()) => {
                self.stats.record_completion(duration);
                metrics::record_job(kind.as_str(), "completed", duration.as_secs_f64());

                if let Err(e) = self.queue.complete(&entry).await {
                    error!(
                        worker_id = %self.id,
                        job_id = %entry.job_id,
                        error = %e,
                        "Failed to mark entry complete"
                    );
                }

                info!(
                    worker_id = %self.id,
                    job_id = %entry.job_id,
                    duration_ms = duration.as_millis(),
                    "Entry completed"
                );
            }
            Err(e) => {
                self.stats.record_failure(duration);
                metrics::record_job(kind.as_str(), "failed", duration.as_secs_f64());

                if entry.should_retry() {
                    let delay = RetryPolicy::for_kind(kind).delay_for(entry.attempts);
                    warn!(
                        worker_id = %self.id,
                        job_id = %entry.job_id,
                        error = %e,
                        remaining_attempts = entry.remaining_attempts(),
                        delay_ms = delay.as_millis(),
                        "Entry failed, scheduling retry"
                    );

                    if let Err(retry_err) = self.queue.retry_later(&entry, delay).await {
                        error!(
                            worker_id = %self.id,
                            job_id = %entry.job_id,
                            error = %retry_err,
                            "Failed to schedule retry"
                        );
                    }
                } else {
                    error!(
                        worker_id = %self.id,
                        job_id = %entry.job_id,
                        error = %e,
                        "Entry failed, moving to dead letter queue"
                    );

                    if let Err(dlq_err) = self.queue.dead_letter(&entry, &e.to_string()).await {
                        error!(
                            worker_id = %self.id,
                            job_id = %entry.job_id,
                            error = %dlq_err,
                            "Failed to move entry to dead letter queue"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();

        assert_eq!(config.num_workers, 4);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.queue_name, "designs");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
        // Generation is the expensive kind; its cap stays below rendering.
        assert!(config.generation_concurrency < config.render_concurrency);
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(8)
            .with_redis_url("redis://custom:6380")
            .with_queue_name("my_queue")
            .with_poll_interval(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(120))
            .with_concurrency(1, 4);

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.redis_url, "redis://custom:6380");
        assert_eq!(config.queue_name, "my_queue");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(120));
        assert_eq!(config.generation_concurrency, 1);
        assert_eq!(config.render_concurrency, 4);
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            num_workers: 4,
            active_workers: 2,
            jobs_completed: 80,
            jobs_failed: 20,
            average_job_duration: Duration::from_secs(60),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_stats_empty() {
        let stats = PoolStats::default();
        assert_eq!(stats.total_processed(), 0);
        assert!((stats.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_pool_stats() {
        let stats = SharedPoolStats::new();

        stats.record_completion(Duration::from_secs(10));
        stats.record_completion(Duration::from_secs(20));
        stats.record_failure(Duration::from_secs(5));

        let pool_stats = stats.to_pool_stats(4);

        assert_eq!(pool_stats.num_workers, 4);
        assert_eq!(pool_stats.jobs_completed, 2);
        assert_eq!(pool_stats.jobs_failed, 1);
        // Average: (10000 + 20000 + 5000) / 3 = 11666 ms
        assert!(pool_stats.average_job_duration.as_millis() > 11000);
        assert!(pool_stats.average_job_duration.as_millis() < 12000);
    }

    #[test]
    fn test_shared_pool_stats_active_workers() {
        let stats = SharedPoolStats::new();

        assert_eq!(stats.active_workers.load(Ordering::SeqCst), 0);

        stats.increment_active();
        stats.increment_active();
        assert_eq!(stats.active_workers.load(Ordering::SeqCst), 2);

        stats.decrement_active();
        assert_eq!(stats.active_workers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kind_limits_distinct_semaphores() {
        let limits = KindLimits::new(2, 8);
        assert_eq!(limits.for_kind(JobKind::GenerateDesign).available_permits(), 2);
        assert_eq!(limits.for_kind(JobKind::RenderDiagram).available_permits(), 8);
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));

        let err = PoolError::NotRunning;
        assert!(err.to_string().contains("not running"));

        let err = PoolError::ShutdownTimeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60"));
    }
}
