//! YAML outcome catalogs.
//!
//! A catalog attaches a list of outcomes to one context:
//!
//! ```yaml
//! context: CS101
//! outcomes:
//!   - id: cs101-co1
//!     code: CO1
//!     level: co
//!     statement: Explain the fetch-decode-execute cycle.
//! ```
//!
//! Upstream record sources repeat entries, so catalogs are de-duplicated here,
//! once, by id and by a derived `(level, code)` key. Readers of the provider
//! never re-filter.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::{Level, Outcome};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid glob `{pattern}`: {message}")]
    Glob { pattern: String, message: String },
    #[error("outcome `{code}` has unknown level `{level}`")]
    InvalidLevel { code: String, level: String },
    #[error("catalog for context `{context}` contains an outcome with an empty code")]
    EmptyCode { context: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeCatalog {
    pub context: String,
    pub outcomes: Vec<Outcome>,
    pub duplicates: Vec<DuplicateOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOutcome {
    pub id: String,
    pub reference_code: String,
    pub reason: DuplicateReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    SameId,
    SameCode,
}

impl DuplicateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SameId => "same_id",
            Self::SameCode => "same_code",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    context: String,
    #[serde(default)]
    outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Deserialize)]
struct RawOutcome {
    #[serde(default)]
    id: Option<String>,
    code: String,
    #[serde(default)]
    statement: String,
    level: String,
    #[serde(default, rename = "type")]
    outcome_type: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
}

pub fn load_catalog(path: &Path) -> Result<OutcomeCatalog, CatalogError> {
    let content = fs::read_to_string(path)?;
    parse_catalog(&content)
}

pub fn parse_catalog(content: &str) -> Result<OutcomeCatalog, CatalogError> {
    let raw: RawCatalog = serde_yaml::from_str(content)?;
    let context = raw.context.trim().to_string();
    let mut outcomes = Vec::with_capacity(raw.outcomes.len());
    for item in raw.outcomes {
        let code = item.code.trim().to_string();
        if code.is_empty() {
            return Err(CatalogError::EmptyCode { context });
        }
        let level = Level::parse(&item.level).ok_or_else(|| CatalogError::InvalidLevel {
            code: code.clone(),
            level: item.level.clone(),
        })?;
        let id = item
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{context}:{code}").to_ascii_lowercase());
        outcomes.push(Outcome {
            id,
            reference_code: code,
            statement: item.statement.trim().to_string(),
            level,
            outcome_type: item.outcome_type,
            flags: item.flags,
        });
    }
    let (outcomes, duplicates) = dedup_outcomes(outcomes);
    Ok(OutcomeCatalog {
        context,
        outcomes,
        duplicates,
    })
}

/// Keeps the first occurrence of every id and every `(level, code)` key.
pub fn dedup_outcomes(outcomes: Vec<Outcome>) -> (Vec<Outcome>, Vec<DuplicateOutcome>) {
    let mut seen_ids = HashSet::new();
    let mut seen_codes = HashSet::new();
    let mut kept = Vec::with_capacity(outcomes.len());
    let mut duplicates = Vec::new();

    for outcome in outcomes {
        let reason = if seen_ids.contains(&outcome.id) {
            Some(DuplicateReason::SameId)
        } else if seen_codes.contains(&(outcome.level, code_key(&outcome.reference_code))) {
            Some(DuplicateReason::SameCode)
        } else {
            None
        };
        if let Some(reason) = reason {
            duplicates.push(DuplicateOutcome {
                id: outcome.id,
                reference_code: outcome.reference_code,
                reason,
            });
            continue;
        }
        seen_ids.insert(outcome.id.clone());
        seen_codes.insert((outcome.level, code_key(&outcome.reference_code)));
        kept.push(outcome);
    }
    (kept, duplicates)
}

pub fn code_key(code: &str) -> String {
    code.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Expands catalog paths; entries containing glob metacharacters are globbed.
pub fn expand_catalog_paths(cwd: &Path, entries: &[String]) -> Result<Vec<PathBuf>, CatalogError> {
    let mut out = Vec::new();
    for entry in entries {
        let raw = entry.trim();
        if raw.is_empty() {
            continue;
        }
        let path = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            cwd.join(raw)
        };
        if !looks_like_glob(raw) {
            out.push(path);
            continue;
        }
        let pattern = path.to_string_lossy().into_owned();
        let paths = glob::glob(&pattern).map_err(|err| CatalogError::Glob {
            pattern: pattern.clone(),
            message: err.msg.to_string(),
        })?;
        for item in paths {
            match item {
                Ok(found) if found.is_file() => out.push(found),
                Ok(_) => {}
                Err(err) => {
                    return Err(CatalogError::Glob {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn looks_like_glob(path: &str) -> bool {
    ['*', '?', '[', ']', '{', '}']
        .iter()
        .any(|ch| path.contains(*ch))
}
