//! Entity kinds and name normalization.
//!
//! People, companies, and projects share one resolution path. Everything
//! kind-specific (table names, the optional extra attribute) hangs off
//! [`EntityKind`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The three kinds of canonical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Company,
    Project,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Person, EntityKind::Company, EntityKind::Project];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Company => "company",
            EntityKind::Project => "project",
        }
    }

    /// Table holding canonical rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Company => "company",
            EntityKind::Project => "project",
        }
    }

    /// Junction table linking notes to this kind.
    pub fn link_table(&self) -> &'static str {
        match self {
            EntityKind::Person => "note_person",
            EntityKind::Company => "note_company",
            EntityKind::Project => "note_project",
        }
    }

    /// Foreign key column inside [`EntityKind::link_table`].
    pub fn link_column(&self) -> &'static str {
        match self {
            EntityKind::Person => "person_id",
            EntityKind::Company => "company_id",
            EntityKind::Project => "project_id",
        }
    }

    /// Kind-specific attribute column, if the kind has one.
    pub fn extra_column(&self) -> Option<&'static str> {
        match self {
            EntityKind::Person => None,
            EntityKind::Company => Some("category"),
            EntityKind::Project => Some("status"),
        }
    }

    /// Value written to the extra column on insert when none was supplied.
    pub fn default_extra(&self) -> Option<&'static str> {
        match self {
            EntityKind::Project => Some("active"),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "person" | "people" => Ok(EntityKind::Person),
            "company" | "companies" | "organization" | "organisation" | "org" => {
                Ok(EntityKind::Company)
            }
            "project" | "projects" => Ok(EntityKind::Project),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {}", other))),
        }
    }
}

/// Kind-specific attribute supplied alongside a mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityExtra {
    /// Company category tag.
    Category(String),
    /// Project status.
    Status(String),
}

impl EntityExtra {
    /// The value to store, if it applies to `kind`.
    pub fn value_for(&self, kind: EntityKind) -> Option<&str> {
        match (self, kind) {
            (EntityExtra::Category(v), EntityKind::Company) => Some(v.as_str()),
            (EntityExtra::Status(v), EntityKind::Project) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Deduplication key for an entity name: lowercase, ASCII alphanumerics only.
///
/// Returns [`Error::InvalidEntityName`] when nothing survives.
pub fn normalize_name(name: &str) -> Result<String> {
    let normalized: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();

    if normalized.is_empty() {
        return Err(Error::InvalidEntityName(name.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_name("Sarah Johnson").unwrap(), "sarahjohnson");
    }

    #[test]
    fn test_normalize_variants_collapse() {
        let a = normalize_name("  sarah   JOHNSON ").unwrap();
        let b = normalize_name("Sarah-Johnson.").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_project_slug_matches_label() {
        assert_eq!(
            normalize_name("TechRidge Phase 2").unwrap(),
            normalize_name("techridge-phase-2").unwrap()
        );
    }

    #[test]
    fn test_normalize_drops_non_ascii() {
        assert_eq!(normalize_name("Zoë Müller").unwrap(), "zomller");
    }

    #[test]
    fn test_normalize_empty_is_error() {
        for input in ["", "   ", "!!!", "—", "日本"] {
            match normalize_name(input) {
                Err(Error::InvalidEntityName(raw)) => assert_eq!(raw, input),
                other => panic!("expected InvalidEntityName for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_kind_tables() {
        assert_eq!(EntityKind::Person.link_table(), "note_person");
        assert_eq!(EntityKind::Company.link_column(), "company_id");
        assert_eq!(EntityKind::Project.extra_column(), Some("status"));
        assert_eq!(EntityKind::Person.extra_column(), None);
    }

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!("Organization".parse::<EntityKind>().unwrap(), EntityKind::Company);
        assert_eq!("people".parse::<EntityKind>().unwrap(), EntityKind::Person);
        assert!("place".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_extra_only_applies_to_matching_kind() {
        let category = EntityExtra::Category("client".to_string());
        assert_eq!(category.value_for(EntityKind::Company), Some("client"));
        assert_eq!(category.value_for(EntityKind::Project), None);

        let status = EntityExtra::Status("paused".to_string());
        assert_eq!(status.value_for(EntityKind::Project), Some("paused"));
        assert_eq!(status.value_for(EntityKind::Person), None);
    }

    #[test]
    fn test_project_default_status() {
        assert_eq!(EntityKind::Project.default_extra(), Some("active"));
        assert_eq!(EntityKind::Company.default_extra(), None);
    }
}
