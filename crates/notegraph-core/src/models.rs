//! Domain models for the enrichment pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entities::EntityKind;

pub use pgvector::Vector;

// =============================================================================
// NOTE
// =============================================================================

/// A user-owned free-text record; the unit of enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Free-text project label typed by the author, if any.
    pub project_label: Option<String>,
    /// Summary object written by enrichment.
    pub summary: Option<JsonValue>,
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// QUEUE
// =============================================================================

/// Lifecycle state of an enrichment queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {}", other)),
        }
    }
}

/// Work-tracking row for one note's enrichment. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub status: QueueStatus,
    pub priority: i32,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// A queue item returned by a claim, joined with its note payload.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub queue_item_id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub priority: i32,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub project_label: Option<String>,
    pub has_embedding: bool,
}

impl ClaimedItem {
    pub fn claim(&self) -> Claim {
        Claim {
            queue_item_id: self.queue_item_id,
            attempts: self.attempts,
        }
    }
}

/// Identifies one claim of a queue item.
///
/// `attempts` is bumped on every claim, so a worker whose claim was reset and
/// handed to another worker no longer matches the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Claim {
    pub queue_item_id: Uuid,
    pub attempts: i32,
}

/// Count of queue items per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Canonical person, company, or project record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub normalized_name: String,
    /// Company category tag.
    pub category: Option<String>,
    /// Project status.
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a find-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub id: Uuid,
    /// Display name after the upsert (latest mention's casing).
    pub name: String,
    /// True when this call inserted the row.
    pub is_new: bool,
}

/// Typed pointer to an entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

/// Names of a user's known entities, passed to extraction as context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownNames {
    pub people: Vec<String>,
    pub companies: Vec<String>,
    pub projects: Vec<String>,
}

impl KnownNames {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty() && self.companies.is_empty() && self.projects.is_empty()
    }
}

/// Relationship between two entities, confirmed once per distinct note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: EntityRef,
    pub target: EntityRef,
    pub relationship: String,
    pub context: Option<String>,
    pub confirmation_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted action item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub assignee_person_id: Option<Uuid>,
    pub priority: Option<String>,
    pub source: String,
    pub due_date: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CLARIFICATIONS
// =============================================================================

/// Clarification lifecycle: pending -> answered -> applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClarificationStatus {
    Pending,
    Answered,
    Applied,
}

impl ClarificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClarificationStatus::Pending => "pending",
            ClarificationStatus::Answered => "answered",
            ClarificationStatus::Applied => "applied",
        }
    }
}

impl FromStr for ClarificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ClarificationStatus::Pending),
            "answered" => Ok(ClarificationStatus::Answered),
            "applied" => Ok(ClarificationStatus::Applied),
            other => Err(format!("unknown clarification status: {}", other)),
        }
    }
}

/// A question raised when extraction could not resolve an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub id: Uuid,
    pub note_id: Uuid,
    pub user_id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    /// External channel message reference used to correlate replies.
    pub message_ref: Option<String>,
    pub status: ClarificationStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
}

// =============================================================================
// PROJECT SUGGESTIONS
// =============================================================================

/// Evidence source behind a suggested project link.
///
/// Declaration order is the tie-break priority: earlier variants are more
/// specific evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSignal {
    NameMatch,
    EntityOverlap,
    KeywordMatch,
    SemanticSimilarity,
}

impl SuggestionSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSignal::NameMatch => "name_match",
            SuggestionSignal::EntityOverlap => "entity_overlap",
            SuggestionSignal::KeywordMatch => "keyword_match",
            SuggestionSignal::SemanticSimilarity => "semantic_similarity",
        }
    }
}

impl FromStr for SuggestionSignal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name_match" => Ok(SuggestionSignal::NameMatch),
            "entity_overlap" => Ok(SuggestionSignal::EntityOverlap),
            "keyword_match" => Ok(SuggestionSignal::KeywordMatch),
            "semantic_similarity" => Ok(SuggestionSignal::SemanticSimilarity),
            other => Err(format!("unknown suggestion signal: {}", other)),
        }
    }
}

/// One ranked project candidate for a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSuggestion {
    pub project_id: Uuid,
    pub project_name: String,
    pub confidence: f32,
    pub reason: String,
    pub signal: SuggestionSignal,
}

/// Ranked candidates plus the create-new recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSuggestions {
    pub note_id: Uuid,
    pub suggestions: Vec<ProjectSuggestion>,
    pub should_create_new: bool,
    /// The label that would name a new project.
    pub proposed_label: Option<String>,
}

/// What the suggestion engine knows about the note being scored.
#[derive(Debug, Clone, Default)]
pub struct NoteContext {
    pub note_id: Uuid,
    pub title: String,
    pub content: String,
    pub project_label: Option<String>,
    pub person_ids: Vec<Uuid>,
    pub company_ids: Vec<Uuid>,
    /// Projects the note is already linked to.
    pub linked_project_ids: Vec<Uuid>,
    pub embedding: Option<Vec<f32>>,
}

/// A candidate project with evidence gathered from its other notes.
#[derive(Debug, Clone, Default)]
pub struct ProjectProfile {
    pub id: Uuid,
    pub name: String,
    pub person_ids: Vec<Uuid>,
    pub company_ids: Vec<Uuid>,
    /// Mean embedding of the project's other notes.
    pub centroid: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_round_trip_str() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_queue_status_rejects_unknown() {
        assert!("running".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_queue_status_serde_lowercase() {
        let json = serde_json::to_string(&QueueStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_clarification_status_parse() {
        assert_eq!(
            "Answered".parse::<ClarificationStatus>().unwrap(),
            ClarificationStatus::Answered
        );
        assert!("closed".parse::<ClarificationStatus>().is_err());
    }

    #[test]
    fn test_signal_priority_order() {
        assert!(SuggestionSignal::NameMatch < SuggestionSignal::EntityOverlap);
        assert!(SuggestionSignal::EntityOverlap < SuggestionSignal::KeywordMatch);
        assert!(SuggestionSignal::KeywordMatch < SuggestionSignal::SemanticSimilarity);
    }

    #[test]
    fn test_signal_str_matches_serde() {
        let json = serde_json::to_string(&SuggestionSignal::EntityOverlap).unwrap();
        assert_eq!(json, format!("\"{}\"", SuggestionSignal::EntityOverlap.as_str()));
        assert_eq!(
            "semantic_similarity".parse::<SuggestionSignal>().unwrap(),
            SuggestionSignal::SemanticSimilarity
        );
    }

    #[test]
    fn test_known_names_is_empty() {
        let mut names = KnownNames::default();
        assert!(names.is_empty());
        names.projects.push("Atlas".to_string());
        assert!(!names.is_empty());
    }
}
