//! Structured extraction over a text generation backend.
//!
//! One prompt carries every note in a user group together with the names the
//! user already has on file. The model answers with one JSON entry per note.
//! Entries stay raw here; the orchestrator validates each one separately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use notegraph_core::defaults::RAW_LOG_PREFIX_CHARS;
use notegraph_core::{
    log_prefix, Error, ExtractionBackend, ExtractionRequest, ExtractionResponse,
    GenerationBackend, Result,
};

/// System prompt describing the response contract.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured knowledge from personal work notes.

You receive JSON with "knowledge" (names of people, companies and projects the user already tracks) and "notes" (each with id, title, content and optionally answered clarifications).
Reuse a known name verbatim whenever a note refers to that person, company or project.
When a note carries clarifications, treat each answer as authoritative.

Respond with a single JSON object of the form {"results": {"<note id>": <extraction>, ...}} containing one entry for every note id.

Each <extraction> is:
{
  "summary": {"text": "two or three sentences", "keyPoints": ["..."]},
  "entities": {
    "people": [{"name": "Full Name"}],
    "companies": [{"name": "Company", "category": "client|vendor|partner|other"}],
    "projects": [{"name": "Project", "status": "active|planned|done"}]
  },
  "actionItems": [{"text": "...", "assignee": "person name or null", "priority": "high|medium|low or null", "source": "explicit_request|commitment|inferred", "certain": true, "dueDate": "YYYY-MM-DD or null"}],
  "relationships": [{"source": "name", "sourceType": "person|company|project", "target": "name", "targetType": "person|company|project", "relationship": "works_at", "context": "short quote or null", "certain": true}],
  "ambiguities": [{"question": "a question for the user that would resolve the ambiguity", "entity": "name or null"}],
  "tags": ["lowercase-topic"],
  "projectLabel": "project this note belongs to, or null"
}

Only mark facts as certain when the note states them directly. Do not invent entities. Output JSON only."#;

/// Build the user prompt for one extraction request.
pub fn build_prompt(request: &ExtractionRequest) -> Result<String> {
    let payload = json!({
        "knowledge": request.knowledge,
        "notes": request.notes,
    });
    let body = serde_json::to_string_pretty(&payload)?;
    Ok(format!(
        "Extract knowledge from the following {} note(s).\n\n{}",
        request.notes.len(),
        body
    ))
}

/// Strip markdown code fences and any prose around the JSON body.
fn json_body(raw: &str) -> &str {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if cleaned.starts_with('{') || cleaned.starts_with('[') {
        return cleaned;
    }
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    }
}

fn entry_id(entry: &JsonValue) -> Option<Uuid> {
    ["id", "noteId", "note_id"]
        .iter()
        .find_map(|key| entry.get(key)?.as_str()?.parse().ok())
}

/// Accepts an id-keyed object, a list of entries carrying their note id, or
/// either form wrapped under `results` or `notes`.
fn collect_entries(value: JsonValue, out: &mut HashMap<Uuid, JsonValue>) -> Result<()> {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                match entry_id(&item) {
                    Some(id) => {
                        out.insert(id, item);
                    }
                    None => warn!("Dropping extraction entry without a note id"),
                }
            }
            Ok(())
        }
        JsonValue::Object(mut map) => {
            for wrapper in ["results", "notes"] {
                if let Some(inner) = map.remove(wrapper) {
                    return collect_entries(inner, out);
                }
            }
            for (key, entry) in map {
                match key.parse::<Uuid>() {
                    Ok(id) => {
                        out.insert(id, entry);
                    }
                    Err(_) => warn!(key = %key, "Dropping extraction entry with a non-uuid key"),
                }
            }
            Ok(())
        }
        other => Err(Error::Extraction(format!(
            "unexpected extraction response shape: {}",
            match other {
                JsonValue::Null => "null",
                JsonValue::Bool(_) => "bool",
                JsonValue::Number(_) => "number",
                _ => "string",
            }
        ))),
    }
}

/// Decode a raw model reply into per-note entries for the notes requested.
pub fn parse_response(raw: &str, request: &ExtractionRequest) -> Result<ExtractionResponse> {
    let value: JsonValue = serde_json::from_str(json_body(raw)).map_err(|e| {
        warn!(
            raw_prefix = log_prefix(raw, RAW_LOG_PREFIX_CHARS),
            error = %e,
            "Extraction response is not valid JSON"
        );
        Error::Extraction(format!("response is not valid JSON: {}", e))
    })?;

    let requested: HashSet<Uuid> = request.notes.iter().map(|n| n.id).collect();

    // A single-note request answered with a bare extraction object.
    if request.notes.len() == 1 && value.get("summary").is_some() {
        let mut results = HashMap::new();
        results.insert(request.notes[0].id, value);
        return Ok(ExtractionResponse { results });
    }

    let mut entries = HashMap::new();
    collect_entries(value, &mut entries)?;

    let mut results = HashMap::with_capacity(entries.len());
    for (id, entry) in entries {
        if requested.contains(&id) {
            results.insert(id, entry);
        } else {
            warn!(note_id = %id, "Dropping extraction entry for a note that was not requested");
        }
    }
    Ok(ExtractionResponse { results })
}

/// [`ExtractionBackend`] that prompts a generation model for JSON.
pub struct LlmExtractor {
    generator: Arc<dyn GenerationBackend>,
}

impl LlmExtractor {
    pub fn new(generator: Arc<dyn GenerationBackend>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ExtractionBackend for LlmExtractor {
    #[instrument(skip(self, request), fields(subsystem = "inference", component = "extractor", op = "extract", user_id = %request.user_id, batch_size = request.notes.len()))]
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse> {
        if request.notes.is_empty() {
            return Ok(ExtractionResponse::default());
        }

        let prompt = build_prompt(request)?;
        let raw = self
            .generator
            .generate_json_with_system(EXTRACTION_SYSTEM_PROMPT, &prompt)
            .await?;
        let response = parse_response(&raw, request)?;

        debug!(
            result_count = response.results.len(),
            "Extraction response decoded"
        );
        Ok(response)
    }

    fn model_name(&self) -> &str {
        self.generator.model_name()
    }
}
