//! Scoring weights for project suggestions.
//!
//! The constants are tuning choices rather than invariants, so every one of
//! them can be overridden. `SUGGESTION_CONFIG` takes a JSON object; fields
//! left out keep their defaults.

use serde::{Deserialize, Serialize};

use notegraph_core::defaults::SUGGESTION_LIMIT;
use notegraph_core::{Error, Result};

/// Environment variable holding a JSON override.
pub const SUGGESTION_CONFIG_ENV: &str = "SUGGESTION_CONFIG";

/// Weights and thresholds for the four suggestion signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Confidence when the label and project name normalize identically.
    pub name_exact: f32,
    /// Confidence when one normalized name contains the other.
    pub name_partial: f32,

    /// Confidence for a single shared person or company.
    pub overlap_base: f32,
    /// Added per additional shared entity.
    pub overlap_step: f32,
    /// Upper bound for entity overlap.
    pub overlap_cap: f32,

    /// Confidence floor when any keyword matched.
    pub keyword_base: f32,
    /// Added in proportion to the share of keywords matched.
    pub keyword_span: f32,
    /// Project-name words must be longer than this to count as keywords.
    pub keyword_min_len: usize,

    /// Similarity must exceed this for the semantic signal to fire.
    pub semantic_threshold: f32,
    /// Confidence at the threshold.
    pub semantic_base: f32,
    /// Slope above the threshold.
    pub semantic_scale: f32,
    /// Upper bound for semantic similarity.
    pub semantic_cap: f32,

    /// A candidate at or above this suppresses the create-new recommendation.
    pub create_new_threshold: f32,
    /// Maximum ranked candidates returned.
    pub max_suggestions: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            name_exact: 0.9,
            name_partial: 0.75,
            overlap_base: 0.6,
            overlap_step: 0.1,
            overlap_cap: 0.85,
            keyword_base: 0.4,
            keyword_span: 0.2,
            keyword_min_len: 3,
            semantic_threshold: 0.3,
            semantic_base: 0.3,
            semantic_scale: 0.3,
            semantic_cap: 0.5,
            create_new_threshold: 0.7,
            max_suggestions: SUGGESTION_LIMIT,
        }
    }
}

impl SuggestionConfig {
    /// Parse a JSON override on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SuggestionConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid {}: {}", SUGGESTION_CONFIG_ENV, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `SUGGESTION_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SUGGESTION_CONFIG_ENV) {
            Ok(json) if !json.trim().is_empty() => Self::from_json(&json),
            _ => Ok(Self::default()),
        }
    }

    /// Reject weights outside [0, 1] and a zero result limit.
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("name_exact", self.name_exact),
            ("name_partial", self.name_partial),
            ("overlap_base", self.overlap_base),
            ("overlap_step", self.overlap_step),
            ("overlap_cap", self.overlap_cap),
            ("keyword_base", self.keyword_base),
            ("keyword_span", self.keyword_span),
            ("semantic_threshold", self.semantic_threshold),
            ("semantic_base", self.semantic_base),
            ("semantic_scale", self.semantic_scale),
            ("semantic_cap", self.semantic_cap),
            ("create_new_threshold", self.create_new_threshold),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "suggestion weight {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.max_suggestions == 0 {
            return Err(Error::Config("max_suggestions must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_max_suggestions(mut self, n: usize) -> Self {
        self.max_suggestions = n;
        self
    }

    pub fn with_create_new_threshold(mut self, threshold: f32) -> Self {
        self.create_new_threshold = threshold;
        self
    }
}
