//! Polling worker driving the enrichment orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use notegraph_core::{defaults, EmbeddingBackend, Error, ExtractionBackend, NotificationChannel, Result};
use notegraph_db::Database;
use notegraph_suggest::SuggestionConfig;

use crate::clarification::ClarificationWorkflow;
use crate::config::EnrichmentConfig;
use crate::notify::LogChannel;
use crate::orchestrator::{BatchReport, EnrichmentOrchestrator};
use crate::suggestions::SuggestionService;

/// How the worker is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Poll until shut down.
    #[default]
    Loop,
    /// One orchestrator run, for external schedulers.
    Once,
}

impl std::str::FromStr for WorkerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "loop" => Ok(WorkerMode::Loop),
            "once" => Ok(WorkerMode::Once),
            other => Err(Error::Config(format!("unknown worker mode: {}", other))),
        }
    }
}

/// Configuration for the enrichment worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Whether to process the queue at all.
    pub enabled: bool,
    pub mode: WorkerMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            enabled: true,
            mode: WorkerMode::Loop,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable queue processing |
    /// | `WORKER_POLL_INTERVAL_MS` | `5000` | Sleep between polls when the queue is empty |
    /// | `WORKER_MODE` | `loop` | `loop` or `once` |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WORKER_POLL_INTERVAL_MS);

        let mode = std::env::var("WORKER_MODE")
            .ok()
            .and_then(|v| v.parse::<WorkerMode>().ok())
            .unwrap_or_default();

        Self {
            poll_interval_ms,
            enabled,
            mode,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_mode(mut self, mode: WorkerMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Event emitted by the enrichment worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    WorkerStarted,
    /// A run claimed at least one item.
    BatchCompleted { report: BatchReport },
    /// A run could not read or update the queue.
    BatchFailed { error: String },
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down after the current run.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))
    }
}

/// Worker that repeatedly runs the orchestrator.
pub struct EnrichmentWorker {
    orchestrator: EnrichmentOrchestrator,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl EnrichmentWorker {
    pub fn new(orchestrator: EnrichmentOrchestrator, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            orchestrator,
            config,
            event_tx,
        }
    }

    pub fn orchestrator(&self) -> &EnrichmentOrchestrator {
        &self.orchestrator
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Perform a single orchestrator run.
    pub async fn run_once(&self) -> Result<BatchReport> {
        let outcome = self.orchestrator.run().await;
        self.publish(&outcome);
        outcome
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        let task = tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Run until shutdown. Sleeps only when a run claimed nothing or failed,
    /// so a backlog drains without waiting between batches.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Enrichment worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.orchestrator.config().batch_size,
            max_concurrent_groups = self.orchestrator.config().max_concurrent_groups,
            "Enrichment worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Enrichment worker received shutdown signal");
                break;
            }

            let idle = match self.run_once().await {
                Ok(report) => report.claimed == 0,
                Err(e) => {
                    error!(error = %e, "Enrichment run failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Enrichment worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Enrichment worker stopped");
    }

    fn publish(&self, outcome: &Result<BatchReport>) {
        let event = match outcome {
            Ok(report) if report.claimed == 0 => return,
            Ok(report) => WorkerEvent::BatchCompleted {
                report: report.clone(),
            },
            Err(e) => WorkerEvent::BatchFailed {
                error: e.to_string(),
            },
        };
        let _ = self.event_tx.send(event);
    }
}

/// Builder for an enrichment worker and its collaborators.
pub struct WorkerBuilder {
    db: Database,
    extractor: Arc<dyn ExtractionBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: WorkerConfig,
    enrichment: EnrichmentConfig,
    suggestion: SuggestionConfig,
    channel: Arc<dyn NotificationChannel>,
}

impl WorkerBuilder {
    pub fn new(
        db: Database,
        extractor: Arc<dyn ExtractionBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            config: WorkerConfig::default(),
            enrichment: EnrichmentConfig::default(),
            suggestion: SuggestionConfig::default(),
            channel: Arc::new(LogChannel),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_enrichment_config(mut self, config: EnrichmentConfig) -> Self {
        self.enrichment = config;
        self
    }

    pub fn with_suggestion_config(mut self, config: SuggestionConfig) -> Self {
        self.suggestion = config;
        self
    }

    /// Channel used to deliver clarification questions.
    pub fn with_notification_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channel = channel;
        self
    }

    /// Build and return the worker.
    pub fn build(self) -> EnrichmentWorker {
        let clarifications = ClarificationWorkflow::new(self.db.clone(), self.channel);
        let suggestions = SuggestionService::new(self.db.clone(), self.suggestion);
        let orchestrator = EnrichmentOrchestrator::new(
            self.db,
            self.extractor,
            self.embedder,
            clarifications,
            suggestions,
            self.enrichment,
        );
        EnrichmentWorker::new(orchestrator, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 5_000);
        assert!(config.enabled);
        assert_eq!(config.mode, WorkerMode::Loop);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(250)
            .with_enabled(false)
            .with_mode(WorkerMode::Once);
        assert_eq!(config.poll_interval_ms, 250);
        assert!(!config.enabled);
        assert_eq!(config.mode, WorkerMode::Once);
    }

    #[test]
    fn test_worker_mode_parse() {
        assert_eq!("once".parse::<WorkerMode>().unwrap(), WorkerMode::Once);
        assert_eq!(" LOOP ".parse::<WorkerMode>().unwrap(), WorkerMode::Loop);
        assert!(matches!(
            "cron".parse::<WorkerMode>(),
            Err(Error::Config(_))
        ));
    }
}
