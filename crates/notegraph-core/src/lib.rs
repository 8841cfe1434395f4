//! # notegraph-core
//!
//! Core types, traits, and abstractions for the notegraph enrichment pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other notegraph crates depend on.
//!
//! ## Logging
//!
//! Every crate logs through `tracing` with the structured fields `subsystem`,
//! `component` and `op`, plus `note_id`, `queue_item_id`, `user_id`,
//! `batch_size`, `result_count`, `duration_ms` and `error` where they apply.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Isolated failure (one note, one entity), best-effort step skipped |
//! | INFO  | Lifecycle events, batch completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration (entities, signals) |

pub mod defaults;
pub mod entities;
pub mod error;
pub mod extraction;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use entities::{normalize_name, EntityExtra, EntityKind};
pub use error::{Error, Result};
pub use extraction::*;
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
