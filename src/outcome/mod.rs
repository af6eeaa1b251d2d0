pub mod catalog;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Hierarchy level of an outcome. Declaration order is the mapping direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Co,
    Po,
    Peo,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Co => "co",
            Self::Po => "po",
            Self::Peo => "peo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "co" => Some(Self::Co),
            "po" => Some(Self::Po),
            "peo" => Some(Self::Peo),
            _ => None,
        }
    }

    /// The level an outcome of this level may be mapped onto.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Co => Some(Self::Po),
            Self::Po => Some(Self::Peo),
            Self::Peo => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// An adjacent pair of levels; the only shapes a mapping edge can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelPair {
    #[serde(rename = "co-po")]
    CoPo,
    #[serde(rename = "po-peo")]
    PoPeo,
}

impl LevelPair {
    pub fn between(from: Level, to: Level) -> Result<Self, StoreError> {
        match (from, to) {
            (Level::Co, Level::Po) => Ok(Self::CoPo),
            (Level::Po, Level::Peo) => Ok(Self::PoPeo),
            _ => Err(StoreError::InvalidLevelPair { from, to }),
        }
    }

    pub fn source(self) -> Level {
        match self {
            Self::CoPo => Level::Co,
            Self::PoPeo => Level::Po,
        }
    }

    pub fn target(self) -> Level {
        match self {
            Self::CoPo => Level::Po,
            Self::PoPeo => Level::Peo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoPo => "co-po",
            Self::PoPeo => "po-peo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "co-po" | "copo" | "co_po" => Some(Self::CoPo),
            "po-peo" | "popeo" | "po_peo" => Some(Self::PoPeo),
            _ => None,
        }
    }
}

impl fmt::Display for LevelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub reference_code: String,
    pub statement: String,
    pub level: Level,
    #[serde(default, rename = "type")]
    pub outcome_type: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Supplies the outcomes attached to a context, in provider order.
pub trait OutcomeProvider {
    fn list(&self, context_id: &str) -> Result<Vec<Outcome>, StoreError>;

    fn find(&self, context_id: &str, key: &str) -> Result<Option<Outcome>, StoreError> {
        let outcomes = self.list(context_id)?;
        Ok(outcomes
            .into_iter()
            .find(|outcome| outcome.id == key || outcome.reference_code.eq_ignore_ascii_case(key)))
    }
}

/// Last run of ASCII digits in a reference code without leading zeros:
/// `PO10` -> `"10"`, `PEO-03` -> `"3"`. The run may be longer than any
/// integer type.
pub fn numeric_suffix(reference_code: &str) -> Option<&str> {
    let bytes = reference_code.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|byte| !byte.is_ascii_digit())
        .map_or(0, |idx| idx + 1);
    let digits = reference_code[start..end].trim_start_matches('0');
    Some(if digits.is_empty() { "0" } else { digits })
}

/// Without leading zeros, a shorter digit string is the smaller number and
/// equal lengths compare lexically.
fn reference_key(reference_code: &str) -> (u8, usize, &str) {
    match numeric_suffix(reference_code) {
        Some(digits) => (0, digits.len(), digits),
        None => (1, 0, ""),
    }
}

/// Orders outcomes by the numeric suffix of their reference code.
///
/// The sort is stable, so equal suffixes keep provider order. Codes without
/// any digits go after every numbered code.
pub fn order_by_reference(outcomes: &mut [Outcome]) {
    outcomes.sort_by(|a, b| {
        reference_key(&a.reference_code).cmp(&reference_key(&b.reference_code))
    });
}
