//! Service configuration.
//!
//! Configuration for the worker runtime: store and queue endpoints, worker
//! counts, per-kind concurrency, status TTL, and the optional external
//! producer/renderer endpoints.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Offending variable name.
        key: String,
        /// Parse failure description.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the archforge service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    // Storage settings
    /// PostgreSQL database connection URL.
    pub database_url: String,
    /// Redis connection URL (queue and status cache).
    pub redis_url: String,
    /// Queue name, also used as the Redis key prefix.
    pub queue_name: String,

    // Worker settings
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// How long a dequeue blocks waiting for work.
    pub poll_interval: Duration,
    /// Timeout for graceful worker shutdown.
    pub shutdown_timeout: Duration,
    /// Concurrent design-generation executions across the pool.
    pub generation_concurrency: usize,
    /// Concurrent diagram-render executions across the pool.
    pub render_concurrency: usize,

    // Status settings
    /// TTL for status cache records.
    pub status_ttl: Duration,

    // External capability settings
    /// Base URL of the LLM producer; fallback-only generation when absent.
    pub llm_api_base: Option<String>,
    /// API key for the LLM producer.
    pub llm_api_key: Option<String>,
    /// Model identifier for the LLM producer.
    pub llm_model: Option<String>,
    /// Base URL of the diagram render service; source-only when absent.
    pub renderer_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/archforge".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "designs".to_string(),

            num_workers: 4,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
            generation_concurrency: 2,
            render_concurrency: 8,

            status_ttl: Duration::from_secs(3600),

            llm_api_base: None,
            llm_api_key: None,
            llm_model: None,
            renderer_url: None,
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    /// - `REDIS_URL`: Redis connection URL (required)
    /// - `ARCHFORGE_QUEUE_NAME`: queue name (default: designs)
    /// - `ARCHFORGE_NUM_WORKERS`: worker count (default: 4)
    /// - `ARCHFORGE_POLL_INTERVAL_SECS`: dequeue wait (default: 1)
    /// - `ARCHFORGE_SHUTDOWN_TIMEOUT_SECS`: shutdown wait (default: 60)
    /// - `ARCHFORGE_GENERATION_CONCURRENCY`: generation cap (default: 2)
    /// - `ARCHFORGE_RENDER_CONCURRENCY`: render cap (default: 8)
    /// - `ARCHFORGE_STATUS_TTL_SECS`: status cache TTL (default: 3600)
    /// - `ARCHFORGE_LLM_API_BASE`: LLM endpoint (optional)
    /// - `ARCHFORGE_LLM_API_KEY`: LLM bearer token (optional)
    /// - `ARCHFORGE_LLM_MODEL`: LLM model identifier (optional)
    /// - `ARCHFORGE_RENDERER_URL`: Kroki-style render endpoint (optional)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have
    /// invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;
        config.redis_url = std::env::var("REDIS_URL")
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?;

        if let Ok(val) = std::env::var("ARCHFORGE_QUEUE_NAME") {
            config.queue_name = val;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_NUM_WORKERS") {
            config.num_workers = parse_env_value(&val, "ARCHFORGE_NUM_WORKERS")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_POLL_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "ARCHFORGE_POLL_INTERVAL_SECS")?;
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("ARCHFORGE_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "ARCHFORGE_SHUTDOWN_TIMEOUT_SECS")?;
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("ARCHFORGE_GENERATION_CONCURRENCY") {
            config.generation_concurrency =
                parse_env_value(&val, "ARCHFORGE_GENERATION_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_RENDER_CONCURRENCY") {
            config.render_concurrency = parse_env_value(&val, "ARCHFORGE_RENDER_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("ARCHFORGE_STATUS_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "ARCHFORGE_STATUS_TTL_SECS")?;
            config.status_ttl = Duration::from_secs(secs);
        }

        config.llm_api_base = std::env::var("ARCHFORGE_LLM_API_BASE").ok();
        config.llm_api_key = std::env::var("ARCHFORGE_LLM_API_KEY").ok();
        config.llm_model = std::env::var("ARCHFORGE_LLM_MODEL").ok();
        config.renderer_url = std::env::var("ARCHFORGE_RENDERER_URL").ok();

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.generation_concurrency == 0 || self.render_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency caps must be greater than 0".to_string(),
            ));
        }

        if self.queue_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.status_ttl.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "status_ttl must be greater than 0".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
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

    /// Sets the number of workers.
    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Sets the status TTL.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }
}

/// Parses an environment variable value with a typed error.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
