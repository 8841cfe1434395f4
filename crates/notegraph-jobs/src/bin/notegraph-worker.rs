//! notegraph enrichment worker.
//!
//! Runs the batch enrichment orchestrator against the queue, either as a
//! long-running poller (`WORKER_MODE=loop`) or once per invocation
//! (`WORKER_MODE=once`) for external schedulers.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notegraph_db::{Database, PoolConfig};
use notegraph_inference::{EmbeddingBackend, ExtractionBackend, LlmExtractor, OpenAIBackend};
use notegraph_jobs::{
    channel_from_config, EnrichmentConfig, NotificationConfig, WorkerBuilder, WorkerConfig,
    WorkerEvent, WorkerMode,
};
use notegraph_suggest::SuggestionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "notegraph_jobs=info,notegraph_db=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notegraph_jobs=info,notegraph_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notegraph-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/notegraph".to_string());

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database connected and migrated");

    let backend = Arc::new(OpenAIBackend::from_env()?);
    let extractor: Arc<dyn ExtractionBackend> = Arc::new(LlmExtractor::new(backend.clone()));
    let embedder: Arc<dyn EmbeddingBackend> = backend;
    info!(
        model = extractor.model_name(),
        embed_model = embedder.model_name(),
        "Inference backend configured"
    );

    let channel = channel_from_config(&NotificationConfig::from_env())?;
    let suggestion_config = SuggestionConfig::from_env()?;
    let worker_config = WorkerConfig::from_env();
    let mode = worker_config.mode;

    let worker = WorkerBuilder::new(db, extractor, embedder)
        .with_config(worker_config)
        .with_enrichment_config(EnrichmentConfig::from_env())
        .with_suggestion_config(suggestion_config)
        .with_notification_channel(channel)
        .build();

    match mode {
        WorkerMode::Once => {
            let report = worker.run_once().await?;
            info!(
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                stale_reset = report.stale_reset,
                groups = report.groups,
                "Single enrichment run finished"
            );
        }
        WorkerMode::Loop => {
            let handle = worker.start();
            let mut events = handle.events();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let WorkerEvent::BatchFailed { error } = event {
                        warn!(error = %error, "Enrichment batch failed");
                    }
                }
            });

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
            handle.shutdown().await?;
            handle.join().await?;
        }
    }

    Ok(())
}
