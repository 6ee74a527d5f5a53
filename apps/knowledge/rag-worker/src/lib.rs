//! RAG Worker Service
//!
//! Keeps the RAGFlow vector index in step with published knowledge-base
//! documents.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (knowledge:vector_tasks)
//!   ↓ (Consumer Group: rag_workers)
//! StreamWorker<SyncRequest, SyncDispatcher>
//!   ↓ (upsert / delete / summary)
//! RAGFlow datasets + OpenAI-compatible chat model
//!   ↓
//! PostgreSQL (doc ids, summaries, categories)
//! ```
//!
//! ## Features
//!
//! - At-most-once delivery: every entry is acked, failures are counted as dropped
//! - Abandoned entries of crashed consumers are claimed at startup and periodically
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Health, readiness and Prometheus endpoints
//! - `classify`, `replay` and `migrate` maintenance subcommands

mod cli;
mod config;
mod probe;

pub use cli::{Cli, Command};
pub use config::WorkerSettings;
pub use probe::PostgresProbe;

use axum::Router;
use core_config::{app_info, Environment, FromEnv, HealthServerConfig};
use database::{
    postgres::{connect_from_config_with_retry, run_migrations, PostgresConfig},
    redis::RedisConfig,
};
use domain_knowledge::{
    Classifier, LlmConfig, OpenAiChatClient, PgKnowledgeBaseRepository, PgModelRepository,
    PgNodeRepository, RagConfig, RagFlowClient, RepositoryModelResolver, SyncContext,
    SyncDispatcher, SyncEvent, SyncEventPublisher, SyncRequest, VectorTaskStream,
};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use stream_worker::{health_router, metrics, HealthState, StreamWorker, WorkerConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Dispatch a parsed command line. No subcommand means `run`.
pub async fn run(cli: Cli) -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_worker(environment).await,
        Command::Classify { kb_id } => classify(&kb_id).await,
        command @ Command::Replay { .. } => match command.replay_request() {
            Some(request) => replay(request).await,
            None => Ok(()),
        },
        Command::Migrate => migrate().await,
    }
}

/// Consume the sync stream until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if configuration is invalid, PostgreSQL or Redis cannot
/// be reached, or the worker fails fatally.
async fn run_worker(environment: Environment) -> Result<()> {
    metrics::init_metrics().wrap_err("Failed to initialize metrics")?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting RAG worker");
    info!("Environment: {:?}", environment);

    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker configuration")?;
    let db = connect_postgres().await?;
    let redis = connect_redis().await?;
    let ctx = build_context(db.clone())?;

    let worker_config = WorkerConfig::from_stream_def::<VectorTaskStream>()
        .with_blocking(settings.block_ms)
        .with_batch_size(settings.batch_size)
        // Keep below the DB pool size
        .with_max_concurrent_jobs(settings.max_concurrent_jobs);
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        block_ms = worker_config.block_ms,
        batch_size = worker_config.batch_size,
        max_concurrent_jobs = worker_config.max_concurrent_jobs,
        claim_timeout_ms = worker_config.claim_timeout_ms,
        "Worker configuration loaded"
    );

    let dispatcher = Arc::new(SyncDispatcher::new(&ctx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        Arc::new(redis.clone()),
        app_info.name,
        app_info.version,
        &worker_config,
    )
    .with_probe(Arc::new(PostgresProbe::new(db)));

    let health_config = settings.health.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_config).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Starting sync request processor...");
    let worker = StreamWorker::<SyncRequest, _>::new(redis, dispatcher, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .wrap_err("Stream worker stopped with an error")?;

    info!("RAG worker stopped");
    Ok(())
}

/// Run one classification pass and print the report as JSON.
async fn classify(kb_id: &str) -> Result<()> {
    let db = connect_postgres().await?;
    let ctx = build_context(db)?;

    let report = Classifier::new(&ctx)
        .auto_classify(kb_id)
        .await
        .wrap_err_with(|| format!("Classification of knowledge base {} failed", kb_id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Validate a hand-built request and publish it onto the sync stream.
async fn replay(request: SyncRequest) -> Result<()> {
    let event = SyncEvent::try_from(&request).wrap_err("Invalid replay request")?;

    let redis = connect_redis().await?;
    let publisher = SyncEventPublisher::new(redis);
    let entry_id = publisher
        .publish(&event)
        .await
        .wrap_err("Failed to publish sync request")?;

    println!("{}", entry_id);
    Ok(())
}

async fn migrate() -> Result<()> {
    let db = connect_postgres().await?;
    run_migrations::<migration::Migrator>(&db, &app_info!().name)
        .await
        .wrap_err("Failed to apply migrations")?;
    Ok(())
}

async fn connect_postgres() -> Result<DatabaseConnection> {
    let pg_config =
        PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;

    info!("Connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");
    Ok(db)
}

async fn connect_redis() -> Result<ConnectionManager> {
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

    info!("Connecting to Redis...");
    let redis = database::redis::connect_from_config_with_retry(redis_config, None)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");
    Ok(redis)
}

/// Wire the Postgres repositories, RAGFlow client and chat client together.
fn build_context(db: DatabaseConnection) -> Result<SyncContext> {
    let rag_config = RagConfig::from_env().wrap_err("Failed to load RAGFlow configuration")?;
    let llm_config = LlmConfig::from_env().wrap_err("Failed to load LLM configuration")?;
    info!(base_url = %rag_config.base_url, chunk_method = %rag_config.chunk_method, "RAGFlow configured");

    let index = RagFlowClient::new(rag_config).wrap_err("Failed to build RAGFlow client")?;
    let llm = OpenAiChatClient::new().wrap_err("Failed to build chat client")?;
    let models = RepositoryModelResolver::new(Arc::new(PgModelRepository::new(db.clone())));

    Ok(SyncContext {
        nodes: Arc::new(PgNodeRepository::new(db.clone())),
        knowledge_bases: Arc::new(PgKnowledgeBaseRepository::new(db)),
        index: Arc::new(index),
        llm: Arc::new(llm),
        models: Arc::new(models),
        llm_config,
    })
}

/// Serve `/health`, `/ready`, `/stream/info` and `/metrics`.
async fn start_health_server(health_state: HealthState, config: HealthServerConfig) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(address = %addr, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
