//! # notegraph-jobs
//!
//! Batch enrichment for notegraph.
//!
//! This crate provides:
//! - The batch enrichment orchestrator (claim, extract, embed, persist)
//! - The clarification workflow and its notification channels
//! - Store-backed project suggestions
//! - A polling worker with broadcast events and graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use notegraph_jobs::{WorkerBuilder, WorkerConfig};
//! use notegraph_inference::{LlmExtractor, OpenAIBackend};
//! use notegraph_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let backend = Arc::new(OpenAIBackend::from_env()?);
//!
//! let worker = WorkerBuilder::new(db, Arc::new(LlmExtractor::new(backend.clone())), backend)
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .build();
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod clarification;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod suggestions;
pub mod worker;

// Re-export core types
pub use notegraph_core::*;

pub use clarification::ClarificationWorkflow;
pub use config::{EnrichmentConfig, NotificationConfig};
pub use notify::{channel_from_config, LogChannel, WebhookChannel};
pub use orchestrator::{create_project_question, group_by_user, BatchReport, EnrichmentOrchestrator};
pub use suggestions::SuggestionService;
pub use worker::{EnrichmentWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle, WorkerMode};
