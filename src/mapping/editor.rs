//! Single-buffer edge editor.
//!
//! The editor holds at most one [`EditBuffer`]. Opening another pair discards
//! whatever was open. A commit writes through the [`MappingStore`] only when
//! every field check passes; a failed commit leaves the buffer open with its
//! field errors so nothing typed is lost.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::matrix::{self, MappingMatrix};
use super::{EdgeDraft, MappingContext, MappingEdge, MappingStore, Strength};
use crate::error::{ErrorKind, StoreError};
use crate::notice::NoticeBoard;
use crate::outcome::{LevelPair, Outcome, OutcomeProvider};
use crate::session::WriteGate;

/// Inclusive character-count bounds on a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthRule {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationRules {
    pub justification: LengthRule,
    pub contribution: LengthRule,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            justification: LengthRule { min: 10, max: 500 },
            contribution: LengthRule { min: 5, max: 200 },
        }
    }
}

impl ValidationRules {
    /// PO->PEO edges must describe the contribution; CO->PO edges may.
    pub fn contribution_required(&self, pair: LevelPair) -> bool {
        pair == LevelPair::PoPeo
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Justification,
    Contribution,
    Strength,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Justification => "justification",
            Self::Contribution => "contribution",
            Self::Strength => "strength",
        }
    }
}

/// Field errors in rule order; the first entry is the one shown to the user.
pub type FieldErrors = BTreeMap<Field, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub context: MappingContext,
    pub source: Outcome,
    pub target: Outcome,
    /// Raw ordinal as entered; checked by [`validate`].
    pub strength: u8,
    pub justification: String,
    pub contribution: String,
    pub existing: Option<MappingEdge>,
    pub errors: FieldErrors,
}

impl EditBuffer {
    fn blank(context: &MappingContext, source: &Outcome, target: &Outcome) -> Self {
        Self {
            context: context.clone(),
            source: source.clone(),
            target: target.clone(),
            strength: Strength::Weak.level(),
            justification: String::new(),
            contribution: String::new(),
            existing: None,
            errors: FieldErrors::new(),
        }
    }

    fn from_edge(
        context: &MappingContext,
        source: &Outcome,
        target: &Outcome,
        edge: MappingEdge,
    ) -> Self {
        Self {
            strength: edge.strength.level(),
            justification: edge.justification.clone(),
            contribution: edge.contribution.clone(),
            existing: Some(edge),
            ..Self::blank(context, source, target)
        }
    }

    pub fn is_new(&self) -> bool {
        self.existing.is_none()
    }

    fn to_draft(&self) -> Option<EdgeDraft> {
        Some(EdgeDraft {
            context_id: self.context.id.clone(),
            source_id: self.source.id.clone(),
            source_level: self.source.level,
            target_id: self.target.id.clone(),
            target_level: self.target.level,
            strength: Strength::from_level(self.strength)?,
            justification: self.justification.trim().to_string(),
            contribution: self.contribution.trim().to_string(),
        })
    }
}

/// Runs every field rule; nothing short-circuits.
pub fn validate(buffer: &EditBuffer, rules: &ValidationRules) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if let Some(message) = check_length(
        "Justification",
        &buffer.justification,
        rules.justification,
        true,
    ) {
        errors.insert(Field::Justification, message);
    }

    let required = rules.contribution_required(buffer.context.pair);
    if let Some(message) = check_length(
        "Contribution descriptor",
        &buffer.contribution,
        rules.contribution,
        required,
    ) {
        errors.insert(Field::Contribution, message);
    }

    if Strength::from_level(buffer.strength).is_none() {
        errors.insert(
            Field::Strength,
            "Strength must be 1 (weak), 2 (moderate) or 3 (strong).".to_string(),
        );
    }
    errors
}

fn check_length(label: &str, text: &str, rule: LengthRule, required: bool) -> Option<String> {
    let len = text.trim().chars().count();
    if len == 0 {
        return required.then(|| format!("{label} is required."));
    }
    if len < rule.min {
        return Some(format!("{label} must be at least {} characters.", rule.min));
    }
    if len > rule.max {
        return Some(format!("{label} must be at most {} characters.", rule.max));
    }
    None
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("{}", first_message(.0))]
    Validation(FieldErrors),

    #[error("no mapping is open for editing")]
    NoOpenBuffer,

    #[error("another write for `{0}` is still in flight")]
    Busy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NoOpenBuffer => ErrorKind::Validation,
            Self::Busy(_) => ErrorKind::Conflict,
            Self::Store(err) => err.kind(),
        }
    }
}

fn first_message(errors: &FieldErrors) -> &str {
    errors
        .values()
        .next()
        .map_or("validation failed", String::as_str)
}

#[derive(Debug, Clone)]
pub struct Committed {
    pub edge: MappingEdge,
    pub created: bool,
    pub matrix: MappingMatrix,
}

pub struct MappingEditor {
    rules: ValidationRules,
    gate: Arc<WriteGate>,
    buffer: Option<EditBuffer>,
    notices: NoticeBoard,
}

impl MappingEditor {
    pub fn new(rules: ValidationRules) -> Self {
        Self::with_gate(rules, Arc::new(WriteGate::new()))
    }

    /// Shares `gate` with other writers of the same contexts.
    pub fn with_gate(rules: ValidationRules, gate: Arc<WriteGate>) -> Self {
        Self {
            rules,
            gate,
            buffer: None,
            notices: NoticeBoard::new(),
        }
    }

    /// Loads the stored edge for the pair, or a blank weak buffer.
    pub fn open<S>(
        &mut self,
        store: &S,
        context: &MappingContext,
        source: &Outcome,
        target: &Outcome,
    ) -> Result<&mut EditBuffer, EditorError>
    where
        S: MappingStore + ?Sized,
    {
        let pair = LevelPair::between(source.level, target.level)?;
        if pair != context.pair {
            return Err(StoreError::InvalidLevelPair {
                from: source.level,
                to: target.level,
            }
            .into());
        }
        if let Some(previous) = self.buffer.take() {
            debug!(
                source = %previous.source.id,
                target = %previous.target.id,
                "discarding open mapping buffer"
            );
        }

        let buffer = match store.get(context, &source.id, &target.id)? {
            Some(edge) => EditBuffer::from_edge(context, source, target, edge),
            None => EditBuffer::blank(context, source, target),
        };
        Ok(self.buffer.insert(buffer))
    }

    pub fn buffer(&self) -> Option<&EditBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut EditBuffer> {
        self.buffer.as_mut()
    }

    pub fn discard(&mut self) -> Option<EditBuffer> {
        self.buffer.take()
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn validate(&self) -> Result<FieldErrors, EditorError> {
        let buffer = self.buffer.as_ref().ok_or(EditorError::NoOpenBuffer)?;
        Ok(validate(buffer, &self.rules))
    }

    /// Validates, upserts, and rebuilds the matrix for the buffer's context.
    pub fn commit<S, P>(&mut self, store: &S, provider: &P) -> Result<Committed, EditorError>
    where
        S: MappingStore + ?Sized,
        P: OutcomeProvider + ?Sized,
    {
        let Some(buffer) = self.buffer.as_mut() else {
            self.notices
                .error(ErrorKind::Validation, EditorError::NoOpenBuffer.to_string());
            return Err(EditorError::NoOpenBuffer);
        };

        let errors = validate(buffer, &self.rules);
        buffer.errors = errors.clone();
        let Some(draft) = buffer.to_draft().filter(|_| errors.is_empty()) else {
            let err = EditorError::Validation(errors);
            self.notices.error(err.kind(), err.to_string());
            return Err(err);
        };

        let Some(guard) = self.gate.try_begin(&buffer.context.id) else {
            let err = EditorError::Busy(buffer.context.id.clone());
            self.notices.error(err.kind(), err.to_string());
            return Err(err);
        };
        let created = buffer.is_new();
        let stored = store.upsert(&draft);
        drop(guard);

        let edge = match stored {
            Ok(edge) => edge,
            Err(err) => {
                warn!(context = %draft.context_id, error = %err, "mapping commit failed");
                let err = EditorError::from(err);
                self.notices.error(err.kind(), err.to_string());
                return Err(err);
            }
        };
        info!(
            context = %edge.context_id,
            source = %edge.source_id,
            target = %edge.target_id,
            strength = %edge.strength,
            created,
            "committed mapping"
        );

        let context = buffer.context.clone();
        self.buffer = None;
        let matrix = matrix::build(provider, store, &context).inspect_err(|err| {
            self.notices.error(
                err.kind(),
                format!("mapping saved, but the matrix could not be refreshed: {err}"),
            );
        })?;
        Ok(Committed {
            edge,
            created,
            matrix,
        })
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }
}
