//! Project suggestions backed by the store.

use tracing::{debug, instrument};
use uuid::Uuid;

use notegraph_core::{ProjectSuggestions, Result};
use notegraph_db::Database;
use notegraph_suggest::{suggest_projects, SuggestionConfig};

/// Loads a note's context and its owner's project catalog, then ranks.
#[derive(Clone)]
pub struct SuggestionService {
    db: Database,
    config: SuggestionConfig,
}

impl SuggestionService {
    pub fn new(db: Database, config: SuggestionConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    /// Rank candidate projects for a note.
    ///
    /// `label` overrides the note's stored free-text project label.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "suggest", op = "suggest_for_note"))]
    pub async fn suggest_for_note(
        &self,
        user_id: Uuid,
        note_id: Uuid,
        label: Option<&str>,
    ) -> Result<ProjectSuggestions> {
        let context = self.db.projects.note_context(note_id).await?;
        let projects = self.db.projects.project_profiles(user_id, note_id).await?;
        let label = label.or(context.project_label.as_deref());

        let suggestions = suggest_projects(&context, label, &projects, &self.config);
        debug!(
            candidates = projects.len(),
            result_count = suggestions.suggestions.len(),
            should_create_new = suggestions.should_create_new,
            "Ranked project suggestions"
        );
        Ok(suggestions)
    }

    /// Rank and persist, replacing any earlier ranking for the note.
    pub async fn suggest_and_store(
        &self,
        user_id: Uuid,
        note_id: Uuid,
        label: Option<&str>,
    ) -> Result<ProjectSuggestions> {
        let suggestions = self.suggest_for_note(user_id, note_id, label).await?;
        self.db.projects.replace_suggestions(&suggestions).await?;
        Ok(suggestions)
    }
}
