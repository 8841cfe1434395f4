//! Enrichment queue repository.
//!
//! Queue items are rows, one per note. Claims lock rows with
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the same item.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use notegraph_core::defaults::QUEUE_MAX_ERROR_CHARS;
use notegraph_core::{
    new_v7, Claim, ClaimedItem, Error, QueueItem, QueueRepository, QueueStats, QueueStatus, Result,
};

const QUEUE_COLUMNS: &str = "id, note_id, user_id, status::text AS status, priority, attempts, \
                             created_at, started_at, completed_at, last_error";

/// PostgreSQL implementation of QueueRepository.
#[derive(Clone)]
pub struct PgQueueRepository {
    pool: Pool<Postgres>,
}

impl PgQueueRepository {
    /// Create a new PgQueueRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_queue_row(row: sqlx::postgres::PgRow) -> QueueItem {
        let status: String = row.get("status");
        QueueItem {
            id: row.get("id"),
            note_id: row.get("note_id"),
            user_id: row.get("user_id"),
            status: status.parse().unwrap_or(QueueStatus::Pending),
            priority: row.get("priority"),
            attempts: row.get("attempts"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            last_error: row.get("last_error"),
        }
    }

    fn parse_claimed_row(row: sqlx::postgres::PgRow) -> ClaimedItem {
        ClaimedItem {
            queue_item_id: row.get("id"),
            note_id: row.get("note_id"),
            user_id: row.get("user_id"),
            priority: row.get("priority"),
            attempts: row.get("attempts"),
            created_at: row.get("created_at"),
            title: row.get("title"),
            content: row.get("content"),
            project_label: row.get("project_label"),
            has_embedding: row.get("has_embedding"),
        }
    }
}

/// Truncate an error message to the stored maximum, on a char boundary.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(QUEUE_MAX_ERROR_CHARS) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn enqueue(&self, note_id: Uuid, user_id: Uuid, priority: i32) -> Result<Uuid> {
        // Existing rows keep their status unless failed; priority only rises.
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO enrichment_queue (id, note_id, user_id, priority)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (note_id) DO UPDATE SET
                 priority = GREATEST(enrichment_queue.priority, EXCLUDED.priority),
                 status = CASE WHEN enrichment_queue.status = 'failed'
                               THEN 'pending'::enrichment_status
                               ELSE enrichment_queue.status END,
                 last_error = CASE WHEN enrichment_queue.status = 'failed'
                                   THEN NULL ELSE enrichment_queue.last_error END,
                 started_at = CASE WHEN enrichment_queue.status = 'failed'
                                   THEN NULL ELSE enrichment_queue.started_at END,
                 completed_at = CASE WHEN enrichment_queue.status = 'failed'
                                     THEN NULL ELSE enrichment_queue.completed_at END
             RETURNING id",
        )
        .bind(new_v7())
        .bind(note_id)
        .bind(user_id)
        .bind(priority)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "queue",
            op = "enqueue",
            note_id = %note_id,
            queue_item_id = %id,
            priority,
            "Note enqueued for enrichment"
        );
        Ok(id)
    }

    async fn requeue(&self, note_id: Uuid, priority: i32) -> Result<Uuid> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO enrichment_queue (id, note_id, user_id, priority)
             SELECT $1, n.id, n.user_id, $3 FROM note n WHERE n.id = $2
             ON CONFLICT (note_id) DO UPDATE SET
                 priority = GREATEST(enrichment_queue.priority, EXCLUDED.priority),
                 status = CASE WHEN enrichment_queue.status IN ('completed', 'failed')
                               THEN 'pending'::enrichment_status
                               ELSE enrichment_queue.status END,
                 last_error = CASE WHEN enrichment_queue.status IN ('completed', 'failed')
                                   THEN NULL ELSE enrichment_queue.last_error END,
                 started_at = CASE WHEN enrichment_queue.status IN ('completed', 'failed')
                                   THEN NULL ELSE enrichment_queue.started_at END,
                 completed_at = CASE WHEN enrichment_queue.status IN ('completed', 'failed')
                                     THEN NULL ELSE enrichment_queue.completed_at END
             RETURNING id",
        )
        .bind(new_v7())
        .bind(note_id)
        .bind(priority)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let id = id.ok_or(Error::NoteNotFound(note_id))?;
        info!(
            subsystem = "db",
            component = "queue",
            op = "requeue",
            note_id = %note_id,
            queue_item_id = %id,
            priority,
            "Note requeued for re-enrichment"
        );
        Ok(id)
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<ClaimedItem>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "WITH claimable AS (
                 SELECT id FROM enrichment_queue
                 WHERE status = 'pending'::enrichment_status
                 ORDER BY priority DESC, created_at ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE enrichment_queue q
             SET status = 'processing'::enrichment_status,
                 started_at = now(),
                 completed_at = NULL,
                 attempts = q.attempts + 1
             FROM claimable, note n
             WHERE q.id = claimable.id AND n.id = q.note_id
             RETURNING q.id, q.note_id, q.user_id, q.priority, q.attempts, q.created_at,
                       n.title, n.content, n.project_label,
                       (n.embedding IS NOT NULL) AS has_embedding",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        // UPDATE ... RETURNING does not preserve the CTE's ordering.
        let mut items: Vec<ClaimedItem> = rows.into_iter().map(Self::parse_claimed_row).collect();
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.queue_item_id.cmp(&b.queue_item_id))
        });

        debug!(
            subsystem = "db",
            component = "queue",
            op = "claim_batch",
            batch_size = limit,
            result_count = items.len(),
            "Claimed queue items"
        );
        Ok(items)
    }

    async fn complete(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'completed'::enrichment_status, completed_at = now(), last_error = NULL
             WHERE id = ANY($1) AND status = 'processing'::enrichment_status",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'failed'::enrichment_status, completed_at = now(), last_error = $2
             WHERE id = $1 AND status = 'processing'::enrichment_status",
        )
        .bind(id)
        .bind(truncate_error(error))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            let item = self.get(id).await?.ok_or(Error::QueueItemNotFound(id))?;
            warn!(
                subsystem = "db",
                component = "queue",
                op = "fail",
                queue_item_id = %id,
                status = %item.status,
                "Queue item is not processing, failure not recorded"
            );
        }
        Ok(())
    }

    async fn complete_claims(&self, claims: &[Claim]) -> Result<u64> {
        if claims.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = claims.iter().map(|c| c.queue_item_id).collect();
        let attempts: Vec<i32> = claims.iter().map(|c| c.attempts).collect();
        let result = sqlx::query(
            "UPDATE enrichment_queue q
             SET status = 'completed'::enrichment_status, completed_at = now(), last_error = NULL
             FROM UNNEST($1::uuid[], $2::int4[]) AS c(id, attempts)
             WHERE q.id = c.id AND q.attempts = c.attempts
               AND q.status = 'processing'::enrichment_status",
        )
        .bind(&ids)
        .bind(&attempts)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let updated = result.rows_affected();
        if updated < claims.len() as u64 {
            warn!(
                subsystem = "db",
                component = "queue",
                op = "complete_claims",
                batch_size = claims.len(),
                result_count = updated,
                "Some claims were lost before completion"
            );
        }
        Ok(updated)
    }

    async fn fail_claim(&self, claim: Claim, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'failed'::enrichment_status, completed_at = now(), last_error = $3
             WHERE id = $1 AND attempts = $2 AND status = 'processing'::enrichment_status",
        )
        .bind(claim.queue_item_id)
        .bind(claim.attempts)
        .bind(truncate_error(error))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_stale(&self, stale_after_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'pending'::enrichment_status, started_at = NULL
             WHERE status = 'processing'::enrichment_status
               AND started_at < now() - ($1::double precision * interval '1 second')",
        )
        .bind(stale_after_secs as f64)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let count = result.rows_affected();
        if count > 0 {
            info!(
                subsystem = "db",
                component = "queue",
                op = "reset_stale",
                result_count = count,
                stale_after_secs,
                "Returned stale queue items to pending"
            );
        }
        Ok(count)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending'::enrichment_status) AS pending,
                 COUNT(*) FILTER (WHERE status = 'processing'::enrichment_status) AS processing,
                 COUNT(*) FILTER (WHERE status = 'completed'::enrichment_status) AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed'::enrichment_status) AS failed,
                 COUNT(*) AS total
             FROM enrichment_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            total: row.get("total"),
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM enrichment_queue WHERE id = $1",
            QUEUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_queue_row))
    }

    async fn get_for_note(&self, note_id: Uuid) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM enrichment_queue WHERE note_id = $1",
            QUEUE_COLUMNS
        ))
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_queue_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_short_message_unchanged() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn test_truncate_error_long_message() {
        let long = "x".repeat(QUEUE_MAX_ERROR_CHARS + 50);
        assert_eq!(truncate_error(&long).chars().count(), QUEUE_MAX_ERROR_CHARS);
    }

    #[test]
    fn test_truncate_error_multibyte_boundary() {
        let long = "é".repeat(QUEUE_MAX_ERROR_CHARS + 1);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), QUEUE_MAX_ERROR_CHARS);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
