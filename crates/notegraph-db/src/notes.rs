//! Note reads and enrichment writes.
//!
//! Note creation and editing belong to the CRUD layer; this module only
//! touches the fields enrichment owns.

use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use notegraph_core::{Error, Note, Result};

/// Persist the summary and stamp `enriched_at`. Fails when the note is gone.
pub async fn apply_summary_in(
    conn: &mut PgConnection,
    note_id: Uuid,
    summary: &JsonValue,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE note SET summary = $2, enriched_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(note_id)
    .bind(summary)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;

    if result.rows_affected() == 0 {
        return Err(Error::NoteNotFound(note_id));
    }
    Ok(())
}

/// Append tags not already present (case-insensitive), keeping input order.
/// Returns the number of tags added.
pub async fn merge_tags_in(conn: &mut PgConnection, note_id: Uuid, tags: &[String]) -> Result<u64> {
    if tags.is_empty() {
        return Ok(0);
    }

    let added: Option<i32> = sqlx::query_scalar(
        "WITH additions AS (
             SELECT ARRAY(
                 SELECT t FROM unnest($2::text[]) WITH ORDINALITY AS u(t, ord)
                 WHERE lower(t) <> ALL (SELECT lower(x) FROM unnest(n.tags) AS x)
                 ORDER BY ord
             ) AS tags
             FROM note n WHERE n.id = $1
         )
         UPDATE note
         SET tags = note.tags || additions.tags, updated_at = now()
         FROM additions
         WHERE note.id = $1
         RETURNING cardinality(additions.tags)",
    )
    .bind(note_id)
    .bind(tags)
    .fetch_optional(&mut *conn)
    .await
    .map_err(Error::Database)?;

    match added {
        Some(n) => Ok(n.max(0) as u64),
        None => Err(Error::NoteNotFound(note_id)),
    }
}

/// Store an embedding only if the note has none. Returns true when written.
pub async fn store_embedding_if_missing_in(
    conn: &mut PgConnection,
    note_id: Uuid,
    embedding: &Vector,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE note SET embedding = $2, embedded_at = now()
         WHERE id = $1 AND embedding IS NULL",
    )
    .bind(note_id)
    .bind(embedding)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() == 1)
}

/// PostgreSQL note repository.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, content, category, tags, project_label, summary,
                    enriched_at, embedding, source, created_at, updated_at
             FROM note WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| Note {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            content: row.get("content"),
            category: row.get("category"),
            tags: row.get("tags"),
            project_label: row.get("project_label"),
            summary: row.get("summary"),
            enriched_at: row.get("enriched_at"),
            embedding: row.get("embedding"),
            source: row.get("source"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn store_embedding_if_missing(&self, note_id: Uuid, embedding: &Vector) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        store_embedding_if_missing_in(&mut conn, note_id, embedding).await
    }
}
