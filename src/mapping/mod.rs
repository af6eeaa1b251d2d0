pub mod editor;
pub mod matrix;
pub mod stats;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::outcome::{Level, LevelPair};

/// Ordinal contribution strength, encoded 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
}

impl Strength {
    pub const ALL: [Strength; 3] = [Strength::Weak, Strength::Moderate, Strength::Strong];

    pub fn level(self) -> u8 {
        match self {
            Self::Weak => 1,
            Self::Moderate => 2,
            Self::Strong => 3,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Weak),
            2 => Some(Self::Moderate),
            3 => Some(Self::Strong),
            _ => None,
        }
    }

    /// Accepts either the numeric encoding or the tier name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(level) = raw.parse::<u8>() {
            return Self::from_level(level);
        }
        match raw.to_ascii_lowercase().as_str() {
            "weak" | "low" => Some(Self::Weak),
            "moderate" | "medium" => Some(Self::Moderate),
            "strong" | "high" => Some(Self::Strong),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "WEAK",
            Self::Moderate => "MODERATE",
            Self::Strong => "STRONG",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope in which edge uniqueness holds: a course for CO->PO, a curriculum
/// batch for PO->PEO.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingContext {
    pub id: String,
    pub pair: LevelPair,
}

impl MappingContext {
    pub fn new(id: impl Into<String>, pair: LevelPair) -> Self {
        Self {
            id: id.into(),
            pair,
        }
    }
}

/// A validated edge ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDraft {
    pub context_id: String,
    pub source_id: String,
    pub source_level: Level,
    pub target_id: String,
    pub target_level: Level,
    pub strength: Strength,
    pub justification: String,
    pub contribution: String,
}

impl EdgeDraft {
    pub fn pair(&self) -> Result<LevelPair, StoreError> {
        LevelPair::between(self.source_level, self.target_level)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEdge {
    pub id: i64,
    pub context_id: String,
    pub pair: LevelPair,
    pub source_id: String,
    pub target_id: String,
    pub strength: Strength,
    pub justification: String,
    pub contribution: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Persistence for weighted edges between adjacent outcome levels.
pub trait MappingStore {
    /// Every edge of the context, unfiltered.
    fn get_all(&self, context: &MappingContext) -> Result<Vec<MappingEdge>, StoreError>;

    /// Inserts the edge or updates strength and text fields in place.
    fn upsert(&self, draft: &EdgeDraft) -> Result<MappingEdge, StoreError>;

    /// Removes the edge; returns whether one existed. Absent edges are not an error.
    fn delete(
        &self,
        context: &MappingContext,
        source_id: &str,
        target_id: &str,
    ) -> Result<bool, StoreError>;

    fn get(
        &self,
        context: &MappingContext,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<MappingEdge>, StoreError> {
        Ok(self
            .get_all(context)?
            .into_iter()
            .find(|edge| edge.source_id == source_id && edge.target_id == target_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_accepts_levels_and_names() {
        assert_eq!(Strength::parse("1"), Some(Strength::Weak));
        assert_eq!(Strength::parse("MODERATE"), Some(Strength::Moderate));
        assert_eq!(Strength::parse(" strong "), Some(Strength::Strong));
        assert_eq!(Strength::parse("4"), None);
        assert_eq!(Strength::parse("0"), None);
        assert_eq!(Strength::parse("very"), None);
    }

    #[test]
    fn strength_is_ordinal() {
        assert!(Strength::Weak < Strength::Moderate);
        assert!(Strength::Moderate < Strength::Strong);
        for strength in Strength::ALL {
            assert_eq!(Strength::from_level(strength.level()), Some(strength));
        }
    }

    #[test]
    fn draft_pair_rejects_skip_level() {
        let draft = EdgeDraft {
            context_id: "CS101".into(),
            source_id: "co1".into(),
            source_level: Level::Co,
            target_id: "peo1".into(),
            target_level: Level::Peo,
            strength: Strength::Strong,
            justification: "ten chars!".into(),
            contribution: String::new(),
        };
        assert!(draft.pair().is_err());
    }
}
