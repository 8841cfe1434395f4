//! Extraction collaborator contract and payload validation.
//!
//! The extraction model returns loosely structured JSON per note. Each entry
//! is decoded into [`NoteExtraction`] and validated before anything touches
//! the database; entries that fail are treated as that note's failure.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::KnownNames;

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// A previously answered clarification fed back into extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredClarification {
    pub question: String,
    pub answer: String,
}

/// One note submitted for extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionNote {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clarifications: Vec<AnsweredClarification>,
}

/// Extraction input for one user group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub user_id: Uuid,
    pub notes: Vec<ExtractionNote>,
    pub knowledge: KnownNames,
}

/// Raw per-note extraction entries keyed by note id.
///
/// Entries stay untyped here so one malformed note cannot poison the rest.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResponse {
    pub results: HashMap<Uuid, JsonValue>,
}

impl ExtractionResponse {
    /// Decode and validate the entry for `note_id`.
    pub fn for_note(&self, note_id: Uuid) -> Result<NoteExtraction> {
        let raw = self
            .results
            .get(&note_id)
            .ok_or_else(|| Error::Extraction(format!("no extraction returned for note {}", note_id)))?;
        NoteExtraction::from_value(raw.clone())
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Validated extraction result for one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteExtraction {
    pub summary: Summary,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_items: Vec<ExtractedActionItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: Vec<ExtractedRelationship>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ambiguities: Vec<Ambiguity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Free-text project the model thinks the note belongs to.
    #[serde(default)]
    pub project_label: Option<String>,
}

impl NoteExtraction {
    /// Decode a raw entry and validate it.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let extraction: NoteExtraction = serde_json::from_value(value)
            .map_err(|e| Error::Extraction(format!("malformed extraction: {}", e)))?;
        extraction.validate()?;
        Ok(extraction)
    }

    /// Reject payloads that cannot be persisted.
    pub fn validate(&self) -> Result<()> {
        if self.summary.text().trim().is_empty() {
            return Err(Error::Extraction("summary is empty".to_string()));
        }
        Ok(())
    }

    /// Tags trimmed, lowercased, and deduplicated in first-seen order.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !out.contains(&tag) {
                out.push(tag);
            }
        }
        out
    }

    /// Non-blank ambiguity questions, deduplicated.
    pub fn questions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for ambiguity in &self.ambiguities {
            let q = ambiguity.question.trim();
            if !q.is_empty() && !out.contains(&q) {
                out.push(q);
            }
        }
        out
    }
}

/// Summary as either plain text or a structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Text(String),
    Structured {
        #[serde(alias = "summary")]
        text: String,
        #[serde(default, rename = "keyPoints", alias = "key_points")]
        key_points: Vec<String>,
    },
}

impl Summary {
    pub fn text(&self) -> &str {
        match self {
            Summary::Text(t) => t,
            Summary::Structured { text, .. } => text,
        }
    }

    pub fn key_points(&self) -> &[String] {
        match self {
            Summary::Text(_) => &[],
            Summary::Structured { key_points, .. } => key_points,
        }
    }

    /// Stored representation of the summary.
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "text": self.text().trim(),
            "keyPoints": self.key_points(),
        })
    }
}

/// Extracted entity mentions grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default, deserialize_with = "null_as_default")]
    pub people: Vec<EntityMention>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub companies: Vec<EntityMention>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: Vec<EntityMention>,
}

/// An entity mention. Accepts a bare string or an object with a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityMention {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl<'de> Deserialize<'de> for EntityMention {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Detailed {
                name: String,
                #[serde(default)]
                category: Option<String>,
                #[serde(default)]
                status: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) => EntityMention {
                name,
                category: None,
                status: None,
            },
            Repr::Detailed {
                name,
                category,
                status,
            } => EntityMention {
                name,
                category,
                status,
            },
        })
    }
}

/// Where an action item came from in the note text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// Someone explicitly asked for it.
    #[serde(alias = "explicit", alias = "explicitRequest")]
    ExplicitRequest,
    /// Someone committed to doing it.
    Commitment,
    /// The model inferred it.
    #[default]
    Inferred,
    #[serde(other)]
    Other,
}

impl ActionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSource::ExplicitRequest => "explicit_request",
            ActionSource::Commitment => "commitment",
            ActionSource::Inferred => "inferred",
            ActionSource::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedActionItem {
    pub text: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub source: ActionSource,
    #[serde(default)]
    pub certain: bool,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl ExtractedActionItem {
    /// Certain items and explicit requests are persisted; the rest are dropped.
    pub fn should_persist(&self) -> bool {
        !self.text.trim().is_empty() && (self.certain || self.source == ActionSource::ExplicitRequest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelationship {
    pub source: String,
    pub source_type: String,
    pub target: String,
    pub target_type: String,
    pub relationship: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub certain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiguity {
    pub question: String,
    #[serde(default)]
    pub entity: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Truncate a raw payload for logging, respecting char boundaries.
pub fn log_prefix(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> JsonValue {
        json!({
            "summary": {"text": "Kickoff with Acme", "keyPoints": ["budget approved"]},
            "entities": {
                "people": ["Sarah Johnson", {"name": "Raj Patel"}],
                "companies": [{"name": "Acme Corp", "category": "client"}],
                "projects": ["TechRidge Phase 2"]
            },
            "actionItems": [
                {"text": "Send SOW", "assignee": "Sarah Johnson", "priority": "high",
                 "source": "explicit_request", "certain": false, "dueDate": "2026-11-01"},
                {"text": "Maybe book venue", "source": "inferred", "certain": false}
            ],
            "relationships": [
                {"source": "Sarah Johnson", "sourceType": "person", "target": "Acme Corp",
                 "targetType": "company", "relationship": "works_at", "context": "intro", "certain": true}
            ],
            "ambiguities": [{"question": "Which Raj?"}],
            "tags": ["Client", "kickoff", "client "],
            "projectLabel": "TechRidge Phase 2"
        })
    }

    #[test]
    fn test_parse_full_payload() {
        let ex = NoteExtraction::from_value(full_payload()).unwrap();
        assert_eq!(ex.summary.text(), "Kickoff with Acme");
        assert_eq!(ex.summary.key_points(), &["budget approved".to_string()]);
        assert_eq!(ex.entities.people.len(), 2);
        assert_eq!(ex.entities.people[1].name, "Raj Patel");
        assert_eq!(ex.entities.companies[0].category.as_deref(), Some("client"));
        assert_eq!(ex.action_items[0].source, ActionSource::ExplicitRequest);
        assert_eq!(ex.action_items[0].due_date.as_deref(), Some("2026-11-01"));
        assert!(ex.relationships[0].certain);
        assert_eq!(ex.project_label.as_deref(), Some("TechRidge Phase 2"));
    }

    #[test]
    fn test_parse_string_summary_and_missing_lists() {
        let ex = NoteExtraction::from_value(json!({"summary": "Short note"})).unwrap();
        assert_eq!(ex.summary.text(), "Short note");
        assert!(ex.entities.people.is_empty());
        assert!(ex.action_items.is_empty());
        assert!(ex.tags.is_empty());
    }

    #[test]
    fn test_null_lists_are_empty() {
        let ex = NoteExtraction::from_value(json!({
            "summary": "x",
            "actionItems": null,
            "tags": null,
            "entities": {"people": null}
        }))
        .unwrap();
        assert!(ex.action_items.is_empty());
        assert!(ex.entities.people.is_empty());
    }

    #[test]
    fn test_missing_summary_rejected() {
        let err = NoteExtraction::from_value(json!({"tags": ["a"]})).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_blank_summary_rejected() {
        let err = NoteExtraction::from_value(json!({"summary": "   "})).unwrap_err();
        assert!(err.to_string().contains("summary is empty"));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        assert!(NoteExtraction::from_value(json!("just a string")).is_err());
        assert!(NoteExtraction::from_value(json!({"summary": 42})).is_err());
        assert!(NoteExtraction::from_value(json!({"summary": "x", "actionItems": "none"})).is_err());
    }

    #[test]
    fn test_unknown_action_source_is_other() {
        let item: ExtractedActionItem =
            serde_json::from_value(json!({"text": "x", "source": "hallway chat"})).unwrap();
        assert_eq!(item.source, ActionSource::Other);
        assert!(!item.should_persist());
    }

    #[test]
    fn test_action_item_persist_gate() {
        let ex = NoteExtraction::from_value(full_payload()).unwrap();
        assert!(ex.action_items[0].should_persist());
        assert!(!ex.action_items[1].should_persist());

        let certain = ExtractedActionItem {
            text: "Ship it".into(),
            assignee: None,
            priority: None,
            source: ActionSource::Inferred,
            certain: true,
            due_date: None,
        };
        assert!(certain.should_persist());
    }

    #[test]
    fn test_normalized_tags_dedup() {
        let ex = NoteExtraction::from_value(full_payload()).unwrap();
        assert_eq!(ex.normalized_tags(), vec!["client", "kickoff"]);
    }

    #[test]
    fn test_questions_skip_blank_and_duplicates() {
        let ex = NoteExtraction::from_value(json!({
            "summary": "x",
            "ambiguities": [{"question": "Which Raj?"}, {"question": " "}, {"question": "Which Raj? "}]
        }))
        .unwrap();
        assert_eq!(ex.questions(), vec!["Which Raj?"]);
    }

    #[test]
    fn test_response_for_note_missing_entry() {
        let response = ExtractionResponse::default();
        let err = response.for_note(Uuid::nil()).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_summary_to_json() {
        let s = Summary::Text(" hello ".into());
        assert_eq!(s.to_json(), json!({"text": "hello", "keyPoints": []}));
    }

    #[test]
    fn test_log_prefix_char_boundary() {
        assert_eq!(log_prefix("héllo", 2), "hé");
        assert_eq!(log_prefix("abc", 10), "abc");
    }
}
