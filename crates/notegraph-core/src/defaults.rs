//! Centralized default constants for notegraph.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// QUEUE
// =============================================================================

/// Number of queue items claimed per orchestrator run.
pub const QUEUE_BATCH_SIZE: i64 = 10;

/// Seconds after which a `processing` item is considered abandoned.
pub const QUEUE_STALE_AFTER_SECS: i64 = 600;

/// Smallest accepted staleness window. Shorter windows would reset live claims.
pub const QUEUE_MIN_STALE_AFTER_SECS: i64 = 60;

/// Maximum stored length of a queue item's `last_error`.
pub const QUEUE_MAX_ERROR_CHARS: usize = 1_024;

/// Priority used when an answered clarification re-enqueues its note.
pub const QUEUE_REENRICH_PRIORITY: i32 = 10;

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Upper bound for one extraction call (one user group).
pub const EXTRACTION_TIMEOUT_SECS: u64 = 120;

/// Upper bound for one embedding call (one note).
pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// User groups processed concurrently within one run.
pub const MAX_CONCURRENT_GROUPS: usize = 2;

/// Known entity names per kind passed to extraction as context.
pub const KNOWLEDGE_CONTEXT_LIMIT: i64 = 50;

/// Characters of a malformed payload kept in logs.
pub const RAW_LOG_PREFIX_CHARS: usize = 200;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Maximum characters of note text sent to the embedding model.
pub const EMBED_MAX_CHARS: usize = 8_000;

// =============================================================================
// PROJECT SUGGESTIONS
// =============================================================================

/// Maximum number of ranked project candidates returned.
pub const SUGGESTION_LIMIT: usize = 5;

// =============================================================================
// WORKER
// =============================================================================

/// Polling interval when the queue is empty (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 5_000;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Timeout for a single notification delivery.
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;
