//! CLI command definitions for archforge.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use redis::aio::ConnectionManager;
use tracing::info;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::design::{DesignConstraints, DetailLevel, NewDesignRequest, ScaleProfile};
use crate::metrics;
use crate::pipeline::JobProcessor;
use crate::producer::{
    DesignProducer, FallbackDesigner, HttpDesignProducer, HttpProducerConfig, ResilientProducer,
};
use crate::renderer::{DiagramRenderer, HttpDiagramRenderer, SourceOnlyRenderer};
use crate::scheduler::{JobQueue, WorkQueue, WorkerPool, WorkerPoolConfig};
use crate::service::DesignService;
use crate::status::{RedisStatusCache, StatusCache};
use crate::storage::{Datastore, PgDatastore};

/// Asynchronous design-generation pipeline.
#[derive(Parser)]
#[command(name = "archforge")]
#[command(about = "Durable job pipeline for AI-generated software architectures")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Apply database migrations and exit.
    Migrate,

    /// Run the worker pool until interrupted.
    Worker(WorkerArgs),

    /// Submit a design request and enqueue its first generation job.
    Submit(SubmitArgs),

    /// Print the live status of a job.
    Status(StatusArgs),
}

/// Worker pool arguments.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Override the configured number of workers.
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Submission arguments.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Title of the design request.
    #[arg(long)]
    pub title: String,

    /// Product description (exclusive with --repo-url).
    #[arg(long)]
    pub prompt: Option<String>,

    /// Repository URL to analyze (exclusive with --prompt).
    #[arg(long)]
    pub repo_url: Option<String>,

    /// Target scale profile: prototype, dau_1k, dau_1m.
    #[arg(long, default_value = "prototype")]
    pub scale: String,

    /// Detail level: overview, standard, detailed.
    #[arg(long, default_value = "standard")]
    pub detail: String,

    /// Technology the design must include (repeatable).
    #[arg(long = "must-use")]
    pub must_use: Vec<String>,

    /// Technology the design must avoid (repeatable).
    #[arg(long)]
    pub avoid: Vec<String>,

    /// Preferred implementation language.
    #[arg(long)]
    pub language: Option<String>,
}

/// Status arguments.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Job id to look up.
    #[arg(long)]
    pub job_id: Uuid,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Migrate => run_migrate().await,
        Commands::Worker(args) => run_worker(args).await,
        Commands::Submit(args) => run_submit(args).await,
        Commands::Status(args) => run_status(args).await,
    }
}

/// Connects the shared Redis components.
async fn connect_redis(config: &ServiceConfig) -> anyhow::Result<(Arc<dyn WorkQueue>, Arc<dyn StatusCache>)> {
    let client = redis::Client::open(config.redis_url.as_str()).context("invalid REDIS_URL")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("connecting to Redis")?;

    let queue: Arc<dyn WorkQueue> =
        Arc::new(JobQueue::from_connection(conn.clone(), &config.queue_name));
    let cache: Arc<dyn StatusCache> =
        Arc::new(RedisStatusCache::from_connection(conn, &config.queue_name));
    Ok((queue, cache))
}

/// Builds the producer chain from configuration.
fn build_producer(config: &ServiceConfig) -> anyhow::Result<Arc<dyn DesignProducer>> {
    let producer: Arc<dyn DesignProducer> = match &config.llm_api_base {
        Some(base) => {
            let mut producer_config = HttpProducerConfig::new(base);
            if let Some(key) = &config.llm_api_key {
                producer_config = producer_config.with_api_key(key);
            }
            if let Some(model) = &config.llm_model {
                producer_config = producer_config.with_model(model);
            }
            let http = HttpDesignProducer::new(producer_config).context("building LLM producer")?;
            Arc::new(ResilientProducer::new(Arc::new(http)))
        }
        None => {
            info!("No LLM endpoint configured, generating with the deterministic designer");
            Arc::new(ResilientProducer::new(Arc::new(FallbackDesigner::new())))
        }
    };
    Ok(producer)
}

async fn run_migrate() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    let store = PgDatastore::connect(&config.database_url).await?;
    store.run_migrations().await?;
    info!("Migrations applied");
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }

    metrics::init_metrics().context("initializing metrics")?;

    let store = Arc::new(PgDatastore::connect(&config.database_url).await?);
    store.run_migrations().await?;
    let store: Arc<dyn Datastore> = store;

    let (queue, cache) = connect_redis(&config).await?;
    let producer = build_producer(&config)?;
    let renderer: Arc<dyn DiagramRenderer> = match &config.renderer_url {
        Some(url) => Arc::new(HttpDiagramRenderer::new(url)),
        None => Arc::new(SourceOnlyRenderer::new()),
    };

    let processor = Arc::new(
        JobProcessor::new(store, cache, producer, renderer).with_status_ttl(config.status_ttl),
    );

    let pool_config = WorkerPoolConfig::new(config.num_workers)
        .with_redis_url(&config.redis_url)
        .with_queue_name(&config.queue_name)
        .with_poll_interval(config.poll_interval)
        .with_shutdown_timeout(config.shutdown_timeout)
        .with_concurrency(config.generation_concurrency, config.render_concurrency);

    let mut pool = WorkerPool::with_queue(pool_config, queue, processor);
    pool.start().await?;

    info!("Worker pool running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    pool.shutdown().await?;
    Ok(())
}

async fn run_submit(args: SubmitArgs) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    let Some(scale) = ScaleProfile::parse(&args.scale) else {
        bail!("unknown scale profile '{}'", args.scale);
    };
    let Some(detail) = DetailLevel::parse(&args.detail) else {
        bail!("unknown detail level '{}'", args.detail);
    };

    let store: Arc<dyn Datastore> = Arc::new(PgDatastore::connect(&config.database_url).await?);
    let (queue, cache) = connect_redis(&config).await?;
    let service =
        DesignService::new(store, queue, cache).with_status_ttl(config.status_ttl);

    let mut constraints = DesignConstraints::new();
    for tech in args.must_use {
        constraints = constraints.with_must_use(tech);
    }
    for tech in args.avoid {
        constraints = constraints.with_avoid(tech);
    }
    if let Some(language) = args.language {
        constraints = constraints.with_preferred_language(language);
    }

    // Operational submissions have no project/user context.
    let project_id = Uuid::nil();
    let user_id = Uuid::nil();

    let new_request = match (&args.prompt, &args.repo_url) {
        (Some(prompt), None) => NewDesignRequest::from_prompt(
            args.title.as_str(),
            prompt.as_str(),
            project_id,
            user_id,
        ),
        (None, Some(url)) => NewDesignRequest::from_repo_url(
            args.title.as_str(),
            url.as_str(),
            project_id,
            user_id,
        ),
        _ => bail!("exactly one of --prompt or --repo-url must be given"),
    }
    .with_scale_profile(scale)
    .with_detail_level(detail)
    .with_constraints(constraints.clone());

    let request = service.create_request(new_request).await?;
    let content = request.content().to_string();
    let job_id = service
        .create_design_job(
            request.id,
            request.input_kind,
            content,
            constraints,
            scale,
            detail,
            Vec::new(),
        )
        .await?;

    println!("request: {}", request.id);
    println!("job:     {}", job_id);
    Ok(())
}

async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    let store: Arc<dyn Datastore> = Arc::new(PgDatastore::connect(&config.database_url).await?);
    let (queue, cache) = connect_redis(&config).await?;
    let service =
        DesignService::new(store, queue, cache).with_status_ttl(config.status_ttl);

    let record = service.get_job_status(args.job_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_worker_command() {
        let cli = Cli::try_parse_from(["archforge", "worker", "--workers", "2"]).expect("parse");
        match cli.command {
            Commands::Worker(args) => assert_eq!(args.workers, Some(2)),
            _ => panic!("expected worker command"),
        }
    }

    #[test]
    fn test_cli_parses_submit_command() {
        let cli = Cli::try_parse_from([
            "archforge",
            "submit",
            "--title",
            "Chat app",
            "--prompt",
            "Build a chat app",
            "--scale",
            "dau_1k",
            "--must-use",
            "PostgreSQL",
        ])
        .expect("parse");

        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.title, "Chat app");
                assert_eq!(args.prompt.as_deref(), Some("Build a chat app"));
                assert_eq!(args.scale, "dau_1k");
                assert_eq!(args.must_use, vec!["PostgreSQL".to_string()]);
            }
            _ => panic!("expected submit command"),
        }
    }

    #[test]
    fn test_cli_global_log_level() {
        let cli =
            Cli::try_parse_from(["archforge", "migrate", "--log-level", "debug"]).expect("parse");
        assert_eq!(cli.log_level, "debug");
    }
}
