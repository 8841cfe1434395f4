//! Clarification persistence.
//!
//! A partial unique index keeps at most one `pending` clarification per note;
//! `raise` relies on it instead of a read-then-insert.

use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notegraph_core::{new_v7, Clarification, ClarificationStatus, Error, Result};

const CLARIFICATION_COLUMNS: &str = "id, note_id, user_id, question, answer, message_ref, status, \
                                     created_at, answered_at, applied_at";

/// PostgreSQL clarification repository.
#[derive(Clone)]
pub struct PgClarificationRepository {
    pool: Pool<Postgres>,
}

impl PgClarificationRepository {
    /// Create a new PgClarificationRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Clarification {
        let status: String = row.get("status");
        Clarification {
            id: row.get("id"),
            note_id: row.get("note_id"),
            user_id: row.get("user_id"),
            question: row.get("question"),
            answer: row.get("answer"),
            message_ref: row.get("message_ref"),
            status: status.parse().unwrap_or(ClarificationStatus::Pending),
            created_at: row.get("created_at"),
            answered_at: row.get("answered_at"),
            applied_at: row.get("applied_at"),
        }
    }

    /// Create a pending clarification unless the note already has one pending.
    /// Returns `None` when skipped.
    ///
    /// The same question is also skipped while an earlier copy is pending or
    /// answered, or was applied since the note last changed. Enrichment
    /// commits before answers are applied, so a question repeated on the pass
    /// that applied its answer is dropped, while a later pass may ask it again.
    pub async fn raise(
        &self,
        note_id: Uuid,
        user_id: Uuid,
        question: &str,
    ) -> Result<Option<Clarification>> {
        let row = sqlx::query(&format!(
            "INSERT INTO clarification (id, note_id, user_id, question)
             SELECT $1, $2, $3, $4
             WHERE NOT EXISTS (
                 SELECT 1 FROM clarification c
                 WHERE c.note_id = $2 AND c.question = $4
                   AND (c.status <> 'applied'
                        OR c.applied_at >= (SELECT updated_at FROM note WHERE id = $2))
             )
             ON CONFLICT (note_id) WHERE status = 'pending' DO NOTHING
             RETURNING {}",
            CLARIFICATION_COLUMNS
        ))
        .bind(new_v7())
        .bind(note_id)
        .bind(user_id)
        .bind(question.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Store the external channel's message reference.
    pub async fn set_message_ref(&self, id: Uuid, message_ref: &str) -> Result<()> {
        let result = sqlx::query("UPDATE clarification SET message_ref = $2 WHERE id = $1")
            .bind(id)
            .bind(message_ref)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("clarification {}", id)));
        }
        Ok(())
    }

    /// Answer the most recent pending clarification for a note.
    pub async fn answer(&self, note_id: Uuid, answer: &str) -> Result<Option<Clarification>> {
        let row = sqlx::query(&format!(
            "UPDATE clarification
             SET status = 'answered', answer = $2, answered_at = now()
             WHERE id = (
                 SELECT id FROM clarification
                 WHERE note_id = $1 AND status = 'pending'
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1
                 FOR UPDATE
             )
             RETURNING {}",
            CLARIFICATION_COLUMNS
        ))
        .bind(note_id)
        .bind(answer)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Answer the pending clarification delivered as `message_ref`.
    pub async fn answer_by_message_ref(
        &self,
        message_ref: &str,
        answer: &str,
    ) -> Result<Option<Clarification>> {
        let row = sqlx::query(&format!(
            "UPDATE clarification
             SET status = 'answered', answer = $2, answered_at = now()
             WHERE message_ref = $1 AND status = 'pending'
             RETURNING {}",
            CLARIFICATION_COLUMNS
        ))
        .bind(message_ref)
        .bind(answer)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Mark every answered clarification of a note as applied.
    pub async fn apply(&self, note_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE clarification SET status = 'applied', applied_at = now()
             WHERE note_id = $1 AND status = 'answered'",
        )
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    /// Mark specific answered clarifications as applied.
    pub async fn apply_ids(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE clarification SET status = 'applied', applied_at = now()
             WHERE id = ANY($1) AND status = 'answered'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    /// Answered, not yet applied clarifications for a set of notes.
    pub async fn answered_for_notes(&self, note_ids: &[Uuid]) -> Result<Vec<Clarification>> {
        if note_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM clarification
             WHERE note_id = ANY($1) AND status = 'answered'
             ORDER BY answered_at, id",
            CLARIFICATION_COLUMNS
        ))
        .bind(note_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn pending_for_user(&self, user_id: Uuid) -> Result<Vec<Clarification>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM clarification
             WHERE user_id = $1 AND status = 'pending'
             ORDER BY created_at, id",
            CLARIFICATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Clarification>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM clarification WHERE note_id = $1 ORDER BY created_at, id",
            CLARIFICATION_COLUMNS
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Clarification>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM clarification WHERE id = $1",
            CLARIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }
}
