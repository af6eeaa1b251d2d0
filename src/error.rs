//! Shared error taxonomy.
//!
//! Every error surfaced by the core maps onto one [`ErrorKind`], which decides
//! how it is presented: validation problems block a write before any
//! persistence call, not-found lookups render as an empty state, conflicts are
//! warnings, and everything else is a retryable transport failure.

use serde::Serialize;
use thiserror::Error;

use crate::outcome::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transport => "transport",
        }
    }
}

/// Errors raised by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Source and target outcomes are not on adjacent levels.
    #[error("cannot map a {from} outcome to a {to} outcome; only CO->PO and PO->PEO are allowed")]
    InvalidLevelPair { from: Level, to: Level },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database schema version {found} is not supported; expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLevelPair { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::SchemaVersion { .. } | Self::Sqlite(_) | Self::Serialization(_) => {
                ErrorKind::Transport
            }
        }
    }
}
