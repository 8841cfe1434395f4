//! # notegraph-suggest
//!
//! Project suggestion engine for notegraph.
//!
//! Scores a user's existing projects as link candidates for a note using four
//! independent signals:
//!
//! - name match between the proposed project label and each project name
//! - people and companies the note shares with a project's other notes
//! - project-name keywords mentioned in the note
//! - embedding similarity to the centroid of a project's other notes
//!
//! The engine is pure: callers load [`NoteContext`] and [`ProjectProfile`]s
//! from storage and persist the result themselves.

pub mod config;
pub mod engine;
pub mod similarity;

pub use config::{SuggestionConfig, SUGGESTION_CONFIG_ENV};
pub use engine::{project_keywords, suggest_projects};
pub use similarity::cosine_similarity;

pub use notegraph_core::{
    NoteContext, ProjectProfile, ProjectSuggestion, ProjectSuggestions, SuggestionSignal,
};
