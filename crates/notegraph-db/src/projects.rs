//! Project catalog loading and suggestion persistence.

use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notegraph_core::{
    Error, NoteContext, ProjectProfile, ProjectSuggestion, ProjectSuggestions, Result,
    SuggestionSignal,
};

/// PostgreSQL project repository.
#[derive(Clone)]
pub struct PgProjectRepository {
    pool: Pool<Postgres>,
}

impl PgProjectRepository {
    /// Create a new PgProjectRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Load what the suggestion engine needs to know about a note.
    pub async fn note_context(&self, note_id: Uuid) -> Result<NoteContext> {
        let row = sqlx::query(
            "SELECT n.id, n.title, n.content, n.project_label, n.embedding,
                    ARRAY(SELECT person_id FROM note_person WHERE note_id = n.id) AS person_ids,
                    ARRAY(SELECT company_id FROM note_company WHERE note_id = n.id) AS company_ids,
                    ARRAY(SELECT project_id FROM note_project WHERE note_id = n.id) AS project_ids
             FROM note n WHERE n.id = $1",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::NoteNotFound(note_id))?;

        let embedding: Option<Vector> = row.get("embedding");
        Ok(NoteContext {
            note_id,
            title: row.get("title"),
            content: row.get("content"),
            project_label: row.get("project_label"),
            person_ids: row.get("person_ids"),
            company_ids: row.get("company_ids"),
            linked_project_ids: row.get("project_ids"),
            embedding: embedding.map(|v| v.to_vec()),
        })
    }

    /// Every non-archived project of the user, with people, companies, and the
    /// mean embedding gathered from its notes other than `exclude_note_id`.
    pub async fn project_profiles(
        &self,
        user_id: Uuid,
        exclude_note_id: Uuid,
    ) -> Result<Vec<ProjectProfile>> {
        let rows = sqlx::query(
            "SELECT p.id, p.name,
                    ARRAY(
                        SELECT DISTINCT npe.person_id
                        FROM note_project np JOIN note_person npe ON npe.note_id = np.note_id
                        WHERE np.project_id = p.id AND np.note_id <> $2
                    ) AS person_ids,
                    ARRAY(
                        SELECT DISTINCT nc.company_id
                        FROM note_project np JOIN note_company nc ON nc.note_id = np.note_id
                        WHERE np.project_id = p.id AND np.note_id <> $2
                    ) AS company_ids,
                    (
                        SELECT AVG(n.embedding)
                        FROM note_project np JOIN note n ON n.id = np.note_id
                        WHERE np.project_id = p.id AND np.note_id <> $2
                          AND n.embedding IS NOT NULL
                    ) AS centroid
             FROM project p
             WHERE p.user_id = $1 AND p.status <> 'archived'
             ORDER BY p.name, p.id",
        )
        .bind(user_id)
        .bind(exclude_note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let centroid: Option<Vector> = row.get("centroid");
                ProjectProfile {
                    id: row.get("id"),
                    name: row.get("name"),
                    person_ids: row.get("person_ids"),
                    company_ids: row.get("company_ids"),
                    centroid: centroid.map(|v| v.to_vec()),
                }
            })
            .collect())
    }

    /// Replace the stored suggestions for a note with a new ranking.
    pub async fn replace_suggestions(&self, suggestions: &ProjectSuggestions) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM note_project_suggestion WHERE note_id = $1")
            .bind(suggestions.note_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for (rank, s) in suggestions.suggestions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO note_project_suggestion
                     (note_id, project_id, confidence, reason, signal, rank)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(suggestions.note_id)
            .bind(s.project_id)
            .bind(s.confidence)
            .bind(&s.reason)
            .bind(s.signal.as_str())
            .bind(rank as i32)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Stored suggestions for a note, best first.
    pub async fn list_suggestions(&self, note_id: Uuid) -> Result<Vec<ProjectSuggestion>> {
        let rows = sqlx::query(
            "SELECT s.project_id, p.name AS project_name, s.confidence, s.reason, s.signal
             FROM note_project_suggestion s JOIN project p ON p.id = s.project_id
             WHERE s.note_id = $1
             ORDER BY s.rank",
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let signal: String = row.get("signal");
                Ok(ProjectSuggestion {
                    project_id: row.get("project_id"),
                    project_name: row.get("project_name"),
                    confidence: row.get("confidence"),
                    reason: row.get("reason"),
                    signal: signal
                        .parse::<SuggestionSignal>()
                        .map_err(Error::Internal)?,
                })
            })
            .collect()
    }
}
