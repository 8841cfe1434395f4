//! Entity relationship persistence.
//!
//! A relationship's confirmation counter grows once per distinct note that
//! reports it. Evidence rows record which notes already confirmed it, so
//! re-enriching the same note leaves the counter unchanged.

use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use notegraph_core::{new_v7, EntityKind, EntityRef, EntityRelationship, Error, Result};

/// Result of a relationship upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipUpsert {
    pub id: Uuid,
    pub is_new: bool,
    pub confirmation_count: i32,
}

/// Canonical label stored for a relationship.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Upsert a relationship observed in `note_id`.
pub async fn upsert_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    source: EntityRef,
    target: EntityRef,
    relationship: &str,
    context: Option<&str>,
    note_id: Uuid,
) -> Result<RelationshipUpsert> {
    let label = normalize_label(relationship);
    if label.is_empty() {
        return Err(Error::InvalidInput("relationship label is empty".to_string()));
    }

    let row = sqlx::query(
        "INSERT INTO entity_relationship
             (id, user_id, source_kind, source_id, target_kind, target_id, relationship, context)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (user_id, source_kind, source_id, target_kind, target_id, relationship)
         DO UPDATE SET context = COALESCE(EXCLUDED.context, entity_relationship.context),
                       updated_at = now()
         RETURNING id, confirmation_count, (xmax = 0) AS inserted",
    )
    .bind(new_v7())
    .bind(user_id)
    .bind(source.kind.as_str())
    .bind(source.id)
    .bind(target.kind.as_str())
    .bind(target.id)
    .bind(&label)
    .bind(context)
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)?;

    let id: Uuid = row.get("id");
    let is_new: bool = row.get("inserted");
    let mut confirmation_count: i32 = row.get("confirmation_count");

    let evidence = sqlx::query(
        "INSERT INTO entity_relationship_evidence (relationship_id, note_id)
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(note_id)
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;

    if evidence.rows_affected() == 1 && !is_new {
        confirmation_count = sqlx::query_scalar(
            "UPDATE entity_relationship SET confirmation_count = confirmation_count + 1
             WHERE id = $1 RETURNING confirmation_count",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }

    Ok(RelationshipUpsert {
        id,
        is_new,
        confirmation_count,
    })
}

/// PostgreSQL relationship repository.
#[derive(Clone)]
pub struct PgRelationshipRepository {
    pool: Pool<Postgres>,
}

impl PgRelationshipRepository {
    /// Create a new PgRelationshipRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Relationships touching an entity, either side.
    pub async fn list_for_entity(&self, entity: EntityRef) -> Result<Vec<EntityRelationship>> {
        let rows = sqlx::query(
            "SELECT id, user_id, source_kind, source_id, target_kind, target_id, relationship,
                    context, confirmation_count, created_at, updated_at
             FROM entity_relationship
             WHERE (source_kind = $1 AND source_id = $2) OR (target_kind = $1 AND target_id = $2)
             ORDER BY confirmation_count DESC, id",
        )
        .bind(entity.kind.as_str())
        .bind(entity.id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let source_kind: String = row.get("source_kind");
                let target_kind: String = row.get("target_kind");
                Ok(EntityRelationship {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    source: EntityRef {
                        kind: source_kind.parse::<EntityKind>()?,
                        id: row.get("source_id"),
                    },
                    target: EntityRef {
                        kind: target_kind.parse::<EntityKind>()?,
                        id: row.get("target_id"),
                    },
                    relationship: row.get("relationship"),
                    context: row.get("context"),
                    confirmation_count: row.get("confirmation_count"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Works At"), "works_at");
        assert_eq!(normalize_label("  reports   to "), "reports_to");
        assert_eq!(normalize_label("manages"), "manages");
        assert_eq!(normalize_label("   "), "");
    }
}
