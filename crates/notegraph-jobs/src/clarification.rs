//! Clarification workflow: raise, notify, answer, apply.
//!
//! Questions are persisted first and delivered second. Delivery is best
//! effort; a clarification whose notification failed stays `pending` without
//! a message reference and can still be answered by note id.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notegraph_core::{defaults, Clarification, Notification, NotificationChannel, QueueRepository, Result};
use notegraph_db::Database;

/// Coordinates clarification persistence, delivery, and re-enrichment.
#[derive(Clone)]
pub struct ClarificationWorkflow {
    db: Database,
    channel: Arc<dyn NotificationChannel>,
}

impl ClarificationWorkflow {
    pub fn new(db: Database, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { db, channel }
    }

    /// Create a pending clarification. Returns `None` when the note already
    /// has one pending or the same question is still open.
    pub async fn raise(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        question: &str,
    ) -> Result<Option<Clarification>> {
        let raised = self.db.clarifications.raise(note_id, user_id, question).await?;
        if raised.is_none() {
            debug!(
                subsystem = "jobs",
                component = "clarification",
                note_id = %note_id,
                "Clarification skipped, one is already pending or was asked"
            );
        }
        Ok(raised)
    }

    /// Raise a clarification and deliver it through the notification channel.
    ///
    /// The returned clarification carries the message reference when delivery
    /// succeeded.
    pub async fn raise_and_notify(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        question: &str,
    ) -> Result<Option<Clarification>> {
        let Some(mut clarification) = self.raise(note_id, user_id, question).await? else {
            return Ok(None);
        };

        let notification = Notification {
            recipient: user_id.to_string(),
            text: clarification.question.clone(),
            correlation: json!({
                "clarification_id": clarification.id,
                "note_id": note_id,
            }),
        };

        match self.channel.send(&notification).await {
            Ok(message_ref) => {
                self.db
                    .clarifications
                    .set_message_ref(clarification.id, &message_ref)
                    .await?;
                info!(
                    subsystem = "jobs",
                    component = "clarification",
                    note_id = %note_id,
                    channel = self.channel.name(),
                    message_ref = %message_ref,
                    "Clarification sent"
                );
                clarification.message_ref = Some(message_ref);
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "clarification",
                    note_id = %note_id,
                    channel = self.channel.name(),
                    error = %e,
                    "Clarification notification failed"
                );
            }
        }
        Ok(Some(clarification))
    }

    /// Answer the most recent pending clarification for a note and queue the
    /// note for re-enrichment.
    pub async fn answer(&self, note_id: Uuid, text: &str) -> Result<Option<Clarification>> {
        let answered = self.db.clarifications.answer(note_id, text).await?;
        if let Some(c) = &answered {
            self.requeue(c).await?;
        }
        Ok(answered)
    }

    /// Answer the clarification delivered as `message_ref`.
    pub async fn answer_by_message_ref(
        &self,
        message_ref: &str,
        text: &str,
    ) -> Result<Option<Clarification>> {
        let answered = self
            .db
            .clarifications
            .answer_by_message_ref(message_ref, text)
            .await?;
        if let Some(c) = &answered {
            self.requeue(c).await?;
        }
        Ok(answered)
    }

    /// Mark a note's answered clarifications as applied.
    pub async fn apply(&self, note_id: Uuid) -> Result<u64> {
        self.db.clarifications.apply(note_id).await
    }

    pub async fn pending_for_user(&self, user_id: Uuid) -> Result<Vec<Clarification>> {
        self.db.clarifications.pending_for_user(user_id).await
    }

    async fn requeue(&self, clarification: &Clarification) -> Result<()> {
        let item = self
            .db
            .queue
            .requeue(clarification.note_id, defaults::QUEUE_REENRICH_PRIORITY)
            .await?;
        info!(
            subsystem = "jobs",
            component = "clarification",
            note_id = %clarification.note_id,
            queue_item_id = %item,
            "Clarification answered, note queued for re-enrichment"
        );
        Ok(())
    }
}
