//! Project suggestion scoring.
//!
//! Each signal proposes `(project, confidence, reason)` candidates on its own.
//! Candidates merge by project keeping the highest confidence; on a tie the
//! earlier signal (name, overlap, keyword, semantic) keeps the slot.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};
use uuid::Uuid;

use notegraph_core::{
    normalize_name, NoteContext, ProjectProfile, ProjectSuggestion, ProjectSuggestions,
    SuggestionSignal,
};

use crate::config::SuggestionConfig;
use crate::similarity::cosine_similarity;

/// Rank the user's projects as link candidates for a note.
///
/// `label` is the free-text project label proposed for the note, if any.
/// Projects already linked to the note are never suggested.
pub fn suggest_projects(
    note: &NoteContext,
    label: Option<&str>,
    projects: &[ProjectProfile],
    config: &SuggestionConfig,
) -> ProjectSuggestions {
    let label = label.map(str::trim).filter(|l| !l.is_empty());
    let linked: HashSet<Uuid> = note.linked_project_ids.iter().copied().collect();
    let candidates: Vec<&ProjectProfile> = projects
        .iter()
        .filter(|p| !linked.contains(&p.id))
        .collect();

    let mut merged: HashMap<Uuid, ProjectSuggestion> = HashMap::new();
    let signals = [
        name_match(label, &candidates, config),
        entity_overlap(note, &candidates, config),
        keyword_match(note, &candidates, config),
        semantic_similarity(note, &candidates, config),
    ];
    for candidate in signals.into_iter().flatten() {
        trace!(
            subsystem = "suggest",
            project_id = %candidate.project_id,
            signal = candidate.signal.as_str(),
            confidence = candidate.confidence,
            "Candidate scored"
        );
        match merged.get(&candidate.project_id) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                merged.insert(candidate.project_id, candidate);
            }
        }
    }

    let mut suggestions: Vec<ProjectSuggestion> = merged.into_values().collect();
    suggestions.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.signal.cmp(&b.signal))
            .then_with(|| a.project_name.cmp(&b.project_name))
            .then(a.project_id.cmp(&b.project_id))
    });
    suggestions.truncate(config.max_suggestions);

    let strong_match = suggestions
        .iter()
        .any(|s| s.confidence >= config.create_new_threshold);
    let should_create_new = label.is_some() && !strong_match;

    debug!(
        subsystem = "suggest",
        note_id = %note.note_id,
        candidates = candidates.len(),
        result_count = suggestions.len(),
        should_create_new,
        "Project suggestions ranked"
    );

    ProjectSuggestions {
        note_id: note.note_id,
        suggestions,
        should_create_new,
        proposed_label: if should_create_new {
            label.map(str::to_string)
        } else {
            None
        },
    }
}

fn candidate(
    project: &ProjectProfile,
    confidence: f32,
    reason: String,
    signal: SuggestionSignal,
) -> ProjectSuggestion {
    ProjectSuggestion {
        project_id: project.id,
        project_name: project.name.clone(),
        confidence,
        reason,
        signal,
    }
}

fn name_match(
    label: Option<&str>,
    projects: &[&ProjectProfile],
    config: &SuggestionConfig,
) -> Vec<ProjectSuggestion> {
    let Some(label) = label else {
        return Vec::new();
    };
    let Ok(wanted) = normalize_name(label) else {
        return Vec::new();
    };

    projects
        .iter()
        .filter_map(|project| {
            let name = normalize_name(&project.name).ok()?;
            if name == wanted {
                Some(candidate(
                    project,
                    config.name_exact,
                    format!("Project name matches \"{}\"", label),
                    SuggestionSignal::NameMatch,
                ))
            } else if name.contains(&wanted) || wanted.contains(&name) {
                Some(candidate(
                    project,
                    config.name_partial,
                    format!("Project name partially matches \"{}\"", label),
                    SuggestionSignal::NameMatch,
                ))
            } else {
                None
            }
        })
        .collect()
}

fn entity_overlap(
    note: &NoteContext,
    projects: &[&ProjectProfile],
    config: &SuggestionConfig,
) -> Vec<ProjectSuggestion> {
    if note.person_ids.is_empty() && note.company_ids.is_empty() {
        return Vec::new();
    }
    let people: HashSet<&Uuid> = note.person_ids.iter().collect();
    let companies: HashSet<&Uuid> = note.company_ids.iter().collect();

    projects
        .iter()
        .filter_map(|project| {
            let shared_people = project
                .person_ids
                .iter()
                .filter(|id| people.contains(id))
                .count();
            let shared_companies = project
                .company_ids
                .iter()
                .filter(|id| companies.contains(id))
                .count();
            let shared = shared_people + shared_companies;
            if shared == 0 {
                return None;
            }
            let confidence = (config.overlap_base + (shared - 1) as f32 * config.overlap_step)
                .min(config.overlap_cap);
            Some(candidate(
                project,
                confidence,
                format!(
                    "Shares {} people and {} companies with notes in this project",
                    shared_people, shared_companies
                ),
                SuggestionSignal::EntityOverlap,
            ))
        })
        .collect()
}

/// Words of the project name long enough to count as keywords, lowercased.
pub fn project_keywords(name: &str, min_len: usize) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > min_len)
    {
        let word = word.to_lowercase();
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

fn keyword_match(
    note: &NoteContext,
    projects: &[&ProjectProfile],
    config: &SuggestionConfig,
) -> Vec<ProjectSuggestion> {
    let text = format!("{} {}", note.title, note.content).to_lowercase();
    if text.trim().is_empty() {
        return Vec::new();
    }

    projects
        .iter()
        .filter_map(|project| {
            let words = project_keywords(&project.name, config.keyword_min_len);
            if words.is_empty() {
                return None;
            }
            let matched = words.iter().filter(|w| text.contains(w.as_str())).count();
            if matched == 0 {
                return None;
            }
            let ratio = matched as f32 / words.len() as f32;
            Some(candidate(
                project,
                config.keyword_base + ratio * config.keyword_span,
                format!("Note mentions {} of {} project keywords", matched, words.len()),
                SuggestionSignal::KeywordMatch,
            ))
        })
        .collect()
}

fn semantic_similarity(
    note: &NoteContext,
    projects: &[&ProjectProfile],
    config: &SuggestionConfig,
) -> Vec<ProjectSuggestion> {
    let Some(embedding) = note.embedding.as_deref() else {
        return Vec::new();
    };

    projects
        .iter()
        .filter_map(|project| {
            let centroid = project.centroid.as_deref()?;
            let similarity = cosine_similarity(embedding, centroid)?;
            if similarity <= config.semantic_threshold {
                return None;
            }
            let confidence = (config.semantic_base
                + (similarity - config.semantic_threshold) * config.semantic_scale)
                .min(config.semantic_cap);
            Some(candidate(
                project,
                confidence,
                format!("Content is similar to this project's notes ({:.2})", similarity),
                SuggestionSignal::SemanticSimilarity,
            ))
        })
        .collect()
}
