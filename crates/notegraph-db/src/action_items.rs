//! Action item persistence.

use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use notegraph_core::{new_v7, ActionItem, Error, Result};

/// Fields for a new action item.
#[derive(Debug, Clone)]
pub struct NewActionItem<'a> {
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub text: &'a str,
    pub assignee_person_id: Option<Uuid>,
    pub priority: Option<&'a str>,
    pub source: &'a str,
    pub due_date: Option<&'a str>,
}

/// Insert an action item, ignoring an existing `(note_id, text)`.
/// Returns true when a row was inserted.
pub async fn insert_in(conn: &mut PgConnection, item: &NewActionItem<'_>) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO action_item
             (id, note_id, user_id, text, assignee_person_id, priority, source, due_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (note_id, text) DO NOTHING",
    )
    .bind(new_v7())
    .bind(item.note_id)
    .bind(item.user_id)
    .bind(item.text.trim())
    .bind(item.assignee_person_id)
    .bind(item.priority)
    .bind(item.source)
    .bind(item.due_date)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() == 1)
}

/// PostgreSQL action item repository.
#[derive(Clone)]
pub struct PgActionItemRepository {
    pool: Pool<Postgres>,
}

impl PgActionItemRepository {
    /// Create a new PgActionItemRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<ActionItem>> {
        let rows = sqlx::query(
            "SELECT id, note_id, user_id, text, assignee_person_id, priority, source, due_date,
                    created_at
             FROM action_item WHERE note_id = $1 ORDER BY created_at, id",
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ActionItem {
                id: row.get("id"),
                note_id: row.get("note_id"),
                user_id: row.get("user_id"),
                text: row.get("text"),
                assignee_person_id: row.get("assignee_person_id"),
                priority: row.get("priority"),
                source: row.get("source"),
                due_date: row.get("due_date"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
