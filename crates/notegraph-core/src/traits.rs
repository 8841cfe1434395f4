//! Core traits for notegraph abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::extraction::{ExtractionRequest, ExtractionResponse};
use crate::models::*;

// =============================================================================
// QUEUE STORE
// =============================================================================

/// Durable enrichment work queue.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Idempotent submission. Resets a `failed` item to `pending`; otherwise
    /// only raises priority.
    async fn enqueue(&self, note_id: Uuid, user_id: Uuid, priority: i32) -> Result<Uuid>;

    /// Move a finished item back to `pending` for re-enrichment.
    async fn requeue(&self, note_id: Uuid, priority: i32) -> Result<Uuid>;

    /// Claim up to `limit` pending items, skipping rows locked by other claimers.
    async fn claim_batch(&self, limit: i64) -> Result<Vec<ClaimedItem>>;

    /// Mark `processing` items completed. No-op on an empty slice.
    async fn complete(&self, ids: &[Uuid]) -> Result<u64>;

    /// Mark one `processing` item failed with an error message. Items in any
    /// other state are left unchanged.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    /// Complete only the items still held by these claims.
    async fn complete_claims(&self, claims: &[Claim]) -> Result<u64>;

    /// Fail an item only while this claim still holds it. Returns `false`
    /// when the claim was lost to a stale reset.
    async fn fail_claim(&self, claim: Claim, error: &str) -> Result<bool>;

    /// Return abandoned `processing` items to `pending`.
    async fn reset_stale(&self, stale_after_secs: i64) -> Result<u64>;

    /// Count items per status.
    async fn stats(&self) -> Result<QueueStats>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>>;

    async fn get_for_note(&self, note_id: Uuid) -> Result<Option<QueueItem>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with the backend's JSON output mode, when it has one.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Structured extraction for a group of notes belonging to one user.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// One call per user group. Per-note entries may be missing or malformed;
    /// the caller validates each one.
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse>;

    fn model_name(&self) -> &str;
}

// =============================================================================
// NOTIFICATION TRAITS
// =============================================================================

/// A question delivered to a human through an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub text: String,
    /// Opaque data echoed back with the reply.
    pub correlation: JsonValue,
}

/// External delivery channel for clarification questions.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver the notification and return the channel's message reference.
    async fn send(&self, notification: &Notification) -> Result<String>;

    fn name(&self) -> &str;
}
