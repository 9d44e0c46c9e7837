//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by archforge and provides
//! functions for initializing, registering, and exporting metrics. The
//! record helpers are no-ops until [`init_metrics`] runs, so library code
//! can call them unconditionally.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all archforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of jobs processed, labeled by kind and status.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job execution duration in seconds, labeled by kind.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of entries in queue, labeled by queue name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Number of jobs currently being processed.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Total design-producer calls, labeled by outcome (ok/fallback).
pub static PRODUCER_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total version-allocation conflicts retried.
pub static VERSION_CONFLICTS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// This function should be called once at application startup.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due
/// to duplicate metric names.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let jobs_total = CounterVec::new(
        Opts::new("archforge_jobs_total", "Total number of jobs processed"),
        &["kind", "status"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "archforge_job_duration_seconds",
            "Job execution duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["kind"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("archforge_queue_depth", "Number of entries in queue"),
        &["queue"],
    )?;

    let jobs_in_progress = Gauge::new(
        "archforge_jobs_in_progress",
        "Number of jobs currently being processed",
    )?;

    let producer_requests = CounterVec::new(
        Opts::new(
            "archforge_producer_requests_total",
            "Design producer calls by outcome",
        ),
        &["outcome"],
    )?;

    let version_conflicts = Counter::new(
        "archforge_version_conflicts_total",
        "Version allocation conflicts retried",
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(producer_requests.clone()))?;
    registry.register(Box::new(version_conflicts.clone()))?;

    // OnceLock set errors mean init ran twice; keep the first registration.
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = PRODUCER_REQUESTS_TOTAL.set(producer_requests);
    let _ = VERSION_CONFLICTS_TOTAL.set(version_conflicts);

    Ok(())
}

/// Records a finished job with its duration.
pub fn record_job(kind: &str, status: &str, duration_secs: f64) {
    if let Some(counter) = JOBS_TOTAL.get() {
        counter.with_label_values(&[kind, status]).inc();
    }
    if let Some(histogram) = JOB_DURATION.get() {
        histogram.with_label_values(&[kind]).observe(duration_secs);
    }
}

/// Adjusts the in-progress gauge.
pub fn set_jobs_in_progress(delta: f64) {
    if let Some(gauge) = JOBS_IN_PROGRESS.get() {
        gauge.add(delta);
    }
}

/// Records queue depth for a named queue.
pub fn record_queue_depth(queue: &str, depth: usize) {
    if let Some(gauge) = QUEUE_DEPTH.get() {
        gauge.with_label_values(&[queue]).set(depth as f64);
    }
}

/// Records a producer call outcome ("ok" or "fallback").
pub fn record_producer_request(outcome: &str) {
    if let Some(counter) = PRODUCER_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Records a version-allocation conflict retry.
pub fn record_version_conflict() {
    if let Some(counter) = VERSION_CONFLICTS_TOTAL.get() {
        counter.inc();
    }
}

/// Exports all registered metrics in Prometheus text format.
///
/// Returns an empty string when metrics were never initialized.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
