use std::collections::HashMap;

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::mapping::{EdgeDraft, MappingContext, MappingEdge, MappingStore, Strength};
use crate::outcome::catalog::{DuplicateOutcome, DuplicateReason, OutcomeCatalog, code_key};
use crate::outcome::{Level, LevelPair, Outcome, OutcomeProvider};
use crate::termplan::{
    ApprovalStatus, CurriculumInfo, CurriculumPlan, ReviewDecision, SubmitAck, TermDetail,
    TermDetailPersistence,
};

const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed outcome provider, mapping store and term-detail persistence.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub context: String,
    pub imported: usize,
    pub newly_linked: usize,
    pub duplicates: Vec<DuplicateOutcome>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            ",
        )?;

        let version: i64 = self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            self.create_schema_v1()?;
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        } else if version == SCHEMA_VERSION {
            self.create_schema_v1()?;
        } else {
            return Err(StoreError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    fn create_schema_v1(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS outcomes (
                id TEXT PRIMARY KEY,
                reference_code TEXT NOT NULL,
                statement TEXT NOT NULL,
                level TEXT NOT NULL CHECK (level IN ('co', 'po', 'peo')),
                outcome_type TEXT,
                flags TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS context_outcomes (
                context_id TEXT NOT NULL,
                outcome_id TEXT NOT NULL REFERENCES outcomes(id),
                position INTEGER NOT NULL,
                UNIQUE(context_id, outcome_id)
            );

            CREATE INDEX IF NOT EXISTS idx_context_outcomes_context ON context_outcomes(context_id);

            CREATE TABLE IF NOT EXISTS mapping_edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id TEXT NOT NULL,
                level_pair TEXT NOT NULL CHECK (level_pair IN ('co-po', 'po-peo')),
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                strength INTEGER NOT NULL CHECK (strength IN (1, 2, 3)),
                justification TEXT NOT NULL,
                contribution TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(context_id, source_id, target_id)
            );

            CREATE INDEX IF NOT EXISTS idx_mapping_edges_context ON mapping_edges(context_id, level_pair);

            CREATE TABLE IF NOT EXISTS curricula (
                curriculum_id TEXT PRIMARY KEY,
                program_owner TEXT,
                approval_status TEXT NOT NULL DEFAULT 'draft',
                submitted_by TEXT,
                submitted_at TEXT,
                approved_at TEXT,
                reviewed_by TEXT
            );

            CREATE TABLE IF NOT EXISTS term_details (
                curriculum_id TEXT NOT NULL REFERENCES curricula(curriculum_id),
                si_no INTEGER NOT NULL CHECK (si_no > 0),
                term_name TEXT NOT NULL,
                duration_weeks INTEGER NOT NULL CHECK (duration_weeks > 0),
                credits INTEGER NOT NULL CHECK (credits > 0),
                theory_course_count INTEGER NOT NULL CHECK (theory_course_count > 0),
                practical_other_count INTEGER NOT NULL CHECK (practical_other_count > 0),
                academic_start_year INTEGER NOT NULL,
                academic_end_year INTEGER NOT NULL,
                academic_year TEXT NOT NULL,
                approval_status TEXT NOT NULL,
                submitted_at TEXT,
                approved_at TEXT,
                UNIQUE(curriculum_id, si_no)
            );
            ",
        )?;
        Ok(())
    }

    /// Loads a catalog into the provider. Outcomes already attached to the
    /// context under another id but the same `(level, code)` are skipped.
    pub fn import_catalog(&self, catalog: &OutcomeCatalog) -> Result<ImportReport, StoreError> {
        let existing = self.list(&catalog.context)?;
        let mut by_code: HashMap<(Level, String), String> = existing
            .iter()
            .map(|outcome| {
                (
                    (outcome.level, code_key(&outcome.reference_code)),
                    outcome.id.clone(),
                )
            })
            .collect();
        let mut duplicates = catalog.duplicates.clone();
        let mut imported = 0usize;
        let mut newly_linked = 0usize;

        let tx = self.conn.unchecked_transaction()?;
        let mut position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) FROM context_outcomes WHERE context_id = ?1",
            params![catalog.context],
            |row| row.get(0),
        )?;
        for outcome in &catalog.outcomes {
            let key = (outcome.level, code_key(&outcome.reference_code));
            if let Some(owner) = by_code.get(&key)
                && owner != &outcome.id
            {
                duplicates.push(DuplicateOutcome {
                    id: outcome.id.clone(),
                    reference_code: outcome.reference_code.clone(),
                    reason: DuplicateReason::SameCode,
                });
                continue;
            }
            tx.execute(
                "INSERT INTO outcomes (id, reference_code, statement, level, outcome_type, flags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    reference_code = excluded.reference_code,
                    statement = excluded.statement,
                    level = excluded.level,
                    outcome_type = excluded.outcome_type,
                    flags = excluded.flags",
                params![
                    outcome.id,
                    outcome.reference_code,
                    outcome.statement,
                    outcome.level.as_str(),
                    outcome.outcome_type,
                    serde_json::to_string(&outcome.flags)?
                ],
            )?;
            imported += 1;
            let linked = tx.execute(
                "INSERT OR IGNORE INTO context_outcomes (context_id, outcome_id, position)
                 VALUES (?1, ?2, ?3)",
                params![catalog.context, outcome.id, position + 1],
            )?;
            if linked > 0 {
                position += 1;
                newly_linked += 1;
            }
            by_code.insert(key, outcome.id.clone());
        }
        tx.commit()?;

        info!(
            context = %catalog.context,
            imported,
            newly_linked,
            skipped = duplicates.len(),
            "imported outcome catalog"
        );
        Ok(ImportReport {
            context: catalog.context.clone(),
            imported,
            newly_linked,
            duplicates,
        })
    }

    /// Records the decision of the program owner on a submitted plan.
    pub fn record_review(
        &self,
        curriculum_id: &str,
        reviewer_id: &str,
        decision: ReviewDecision,
    ) -> Result<ApprovalStatus, StoreError> {
        let info = self.curriculum_info(curriculum_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("curriculum `{curriculum_id}` has no saved term plan"))
        })?;
        if info.approval_status != ApprovalStatus::Submitted {
            return Err(StoreError::Conflict(format!(
                "curriculum `{curriculum_id}` is {} and cannot be reviewed",
                info.approval_status.as_str()
            )));
        }
        if let Some(owner) = info.program_owner.as_deref()
            && owner != reviewer_id
        {
            return Err(StoreError::Conflict(format!(
                "only the program owner `{owner}` may review curriculum `{curriculum_id}`"
            )));
        }

        let (status, approved_at) = match decision {
            ReviewDecision::Approve => (ApprovalStatus::Approved, Some(now_iso8601())),
            ReviewDecision::Reject => (ApprovalStatus::Rejected, None),
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE curricula SET approval_status = ?2, approved_at = ?3, reviewed_by = ?4
             WHERE curriculum_id = ?1",
            params![curriculum_id, status.as_str(), approved_at, reviewer_id],
        )?;
        tx.execute(
            "UPDATE term_details SET approval_status = ?2, approved_at = ?3
             WHERE curriculum_id = ?1",
            params![curriculum_id, status.as_str(), approved_at],
        )?;
        tx.commit()?;
        info!(curriculum = curriculum_id, status = status.as_str(), "recorded review");
        Ok(status)
    }

    pub fn set_program_owner(&self, curriculum_id: &str, owner_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO curricula (curriculum_id, program_owner) VALUES (?1, ?2)
             ON CONFLICT(curriculum_id) DO UPDATE SET program_owner = excluded.program_owner",
            params![curriculum_id, owner_id],
        )?;
        Ok(())
    }

    fn curriculum_info(&self, curriculum_id: &str) -> Result<Option<CurriculumInfo>, StoreError> {
        let info = self
            .conn
            .query_row(
                "SELECT program_owner, approval_status, submitted_by, submitted_at, approved_at
                 FROM curricula WHERE curriculum_id = ?1",
                params![curriculum_id],
                |row| {
                    Ok(CurriculumInfo {
                        program_owner: row.get(0)?,
                        approval_status: decode_text(
                            row,
                            1,
                            "approval_status",
                            ApprovalStatus::parse,
                        )?,
                        submitted_by: row.get(2)?,
                        submitted_at: row.get(3)?,
                        approved_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    fn edge_by_key(
        &self,
        context_id: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<MappingEdge>, StoreError> {
        let edge = self
            .conn
            .query_row(
                "SELECT id, context_id, level_pair, source_id, target_id, strength,
                        justification, contribution, created_at, updated_at
                 FROM mapping_edges
                 WHERE context_id = ?1 AND source_id = ?2 AND target_id = ?3",
                params![context_id, source_id, target_id],
                edge_from_row,
            )
            .optional()?;
        Ok(edge)
    }
}

impl OutcomeProvider for SqliteStore {
    fn list(&self, context_id: &str) -> Result<Vec<Outcome>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT o.id, o.reference_code, o.statement, o.level, o.outcome_type, o.flags
             FROM context_outcomes c
             JOIN outcomes o ON o.id = c.outcome_id
             WHERE c.context_id = ?1
             ORDER BY c.position ASC",
        )?;
        let mut rows = stmt.query(params![context_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let flags: String = row.get(5)?;
            out.push(Outcome {
                id: row.get(0)?,
                reference_code: row.get(1)?,
                statement: row.get(2)?,
                level: decode_text(row, 3, "level", Level::parse)?,
                outcome_type: row.get(4)?,
                flags: serde_json::from_str(&flags)?,
            });
        }
        Ok(out)
    }
}

impl MappingStore for SqliteStore {
    fn get_all(&self, context: &MappingContext) -> Result<Vec<MappingEdge>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, context_id, level_pair, source_id, target_id, strength,
                    justification, contribution, created_at, updated_at
             FROM mapping_edges
             WHERE context_id = ?1 AND level_pair = ?2
             ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![context.id, context.pair.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(edge_from_row(row)?);
        }
        debug!(context = %context.id, pair = %context.pair, edges = out.len(), "loaded edges");
        Ok(out)
    }

    fn upsert(&self, draft: &EdgeDraft) -> Result<MappingEdge, StoreError> {
        let pair = draft.pair()?;
        let now = now_iso8601();
        self.conn.execute(
            "INSERT INTO mapping_edges (
                context_id, level_pair, source_id, target_id, strength,
                justification, contribution, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(context_id, source_id, target_id) DO UPDATE SET
                level_pair = excluded.level_pair,
                strength = excluded.strength,
                justification = excluded.justification,
                contribution = excluded.contribution,
                updated_at = excluded.updated_at",
            params![
                draft.context_id,
                pair.as_str(),
                draft.source_id,
                draft.target_id,
                i64::from(draft.strength.level()),
                draft.justification,
                draft.contribution,
                now
            ],
        )?;
        self.edge_by_key(&draft.context_id, &draft.source_id, &draft.target_id)?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "edge {} -> {} vanished after upsert",
                    draft.source_id, draft.target_id
                ))
            })
    }

    fn delete(
        &self,
        context: &MappingContext,
        source_id: &str,
        target_id: &str,
    ) -> Result<bool, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM mapping_edges
             WHERE context_id = ?1 AND level_pair = ?2 AND source_id = ?3 AND target_id = ?4",
            params![context.id, context.pair.as_str(), source_id, target_id],
        )?;
        Ok(removed > 0)
    }

    fn get(
        &self,
        context: &MappingContext,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<MappingEdge>, StoreError> {
        Ok(self
            .edge_by_key(&context.id, source_id, target_id)?
            .filter(|edge| edge.pair == context.pair))
    }
}

impl TermDetailPersistence for SqliteStore {
    fn get_by_curriculum(&self, curriculum_id: &str) -> Result<CurriculumPlan, StoreError> {
        let info = self.curriculum_info(curriculum_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("curriculum `{curriculum_id}` has no saved term plan"))
        })?;

        let mut stmt = self.conn.prepare(
            "SELECT curriculum_id, si_no, term_name, duration_weeks, credits,
                    theory_course_count, practical_other_count, academic_start_year,
                    academic_end_year, academic_year, approval_status, submitted_at, approved_at
             FROM term_details
             WHERE curriculum_id = ?1
             ORDER BY si_no ASC",
        )?;
        let mut rows = stmt.query(params![curriculum_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(TermDetail {
                curriculum_id: row.get(0)?,
                si_no: row.get(1)?,
                term_name: row.get(2)?,
                duration_weeks: row.get(3)?,
                credits: row.get(4)?,
                theory_course_count: row.get(5)?,
                practical_other_count: row.get(6)?,
                academic_start_year: row.get(7)?,
                academic_end_year: row.get(8)?,
                academic_year: row.get(9)?,
                approval_status: decode_text(row, 10, "approval_status", ApprovalStatus::parse)?,
                submitted_at: row.get(11)?,
                approved_at: row.get(12)?,
            });
        }
        Ok(CurriculumPlan { rows: out, info })
    }

    fn save_bulk(&self, curriculum_id: &str, rows: &[TermDetail]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO curricula (curriculum_id, approval_status) VALUES (?1, 'draft')
             ON CONFLICT(curriculum_id) DO UPDATE SET
                approval_status = 'draft',
                submitted_by = NULL,
                submitted_at = NULL,
                approved_at = NULL,
                reviewed_by = NULL",
            params![curriculum_id],
        )?;
        tx.execute(
            "DELETE FROM term_details WHERE curriculum_id = ?1",
            params![curriculum_id],
        )?;
        for row in rows {
            if row.curriculum_id != curriculum_id {
                return Err(StoreError::Conflict(format!(
                    "row {} belongs to curriculum `{}`, not `{curriculum_id}`",
                    row.si_no, row.curriculum_id
                )));
            }
            tx.execute(
                "INSERT INTO term_details (
                    curriculum_id, si_no, term_name, duration_weeks, credits,
                    theory_course_count, practical_other_count, academic_start_year,
                    academic_end_year, academic_year, approval_status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'draft')",
                params![
                    curriculum_id,
                    row.si_no,
                    row.term_name,
                    row.duration_weeks,
                    row.credits,
                    row.theory_course_count,
                    row.practical_other_count,
                    row.academic_start_year,
                    row.academic_end_year,
                    crate::termplan::academic_year(row.academic_start_year, row.academic_end_year)
                ],
            )?;
        }
        tx.commit()?;
        info!(curriculum = curriculum_id, rows = rows.len(), "saved term plan");
        Ok(())
    }

    fn submit_for_approval(
        &self,
        curriculum_id: &str,
        submitter_id: &str,
    ) -> Result<SubmitAck, StoreError> {
        let info = self.curriculum_info(curriculum_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("curriculum `{curriculum_id}` has no saved term plan"))
        })?;
        if matches!(
            info.approval_status,
            ApprovalStatus::Submitted | ApprovalStatus::Approved
        ) {
            return Ok(SubmitAck::AlreadySubmitted {
                status: info.approval_status,
            });
        }
        let row_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM term_details WHERE curriculum_id = ?1",
            params![curriculum_id],
            |row| row.get(0),
        )?;
        if row_count == 0 {
            return Err(StoreError::Conflict(format!(
                "curriculum `{curriculum_id}` has no saved terms to submit"
            )));
        }

        let submitted_at = now_iso8601();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE curricula SET approval_status = 'submitted', submitted_by = ?2,
                submitted_at = ?3, approved_at = NULL, reviewed_by = NULL
             WHERE curriculum_id = ?1",
            params![curriculum_id, submitter_id, submitted_at],
        )?;
        tx.execute(
            "UPDATE term_details SET approval_status = 'submitted', submitted_at = ?2,
                approved_at = NULL
             WHERE curriculum_id = ?1",
            params![curriculum_id, submitted_at],
        )?;
        tx.commit()?;
        info!(curriculum = curriculum_id, submitter = submitter_id, "submitted term plan");
        Ok(SubmitAck::Submitted { submitted_at })
    }
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<MappingEdge> {
    let strength: i64 = row.get(5)?;
    let strength = u8::try_from(strength)
        .ok()
        .and_then(Strength::from_level)
        .ok_or_else(|| unexpected_value(5, Type::Integer, "strength", strength.to_string()))?;
    Ok(MappingEdge {
        id: row.get(0)?,
        context_id: row.get(1)?,
        pair: decode_text(row, 2, "level_pair", LevelPair::parse)?,
        source_id: row.get(3)?,
        target_id: row.get(4)?,
        strength,
        justification: row.get(6)?,
        contribution: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// A stored enum value this build does not know.
#[derive(Debug, Error)]
#[error("unexpected {column} value `{value}`")]
struct UnexpectedValue {
    column: &'static str,
    value: String,
}

fn unexpected_value(idx: usize, ty: Type, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(UnexpectedValue { column, value }))
}

fn decode_text<T>(
    row: &Row<'_>,
    idx: usize,
    column: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    match parse(&raw) {
        Some(value) => Ok(value),
        None => Err(unexpected_value(idx, Type::Text, column, raw)),
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::outcome::catalog::parse_catalog;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("in-memory sqlite");
        let catalog = parse_catalog(
            r#"context: CS101
outcomes:
  - { id: co1, code: CO1, level: co, statement: Trace programs }
  - { id: co2, code: CO2, level: co, statement: Design algorithms }
  - { id: po1, code: PO1, level: po, statement: Engineering knowledge }
  - { id: po2, code: PO2, level: po, statement: Problem analysis }
"#,
        )
        .expect("catalog");
        store.import_catalog(&catalog).expect("import");
        store
    }

    fn draft(source: &str, target: &str, strength: Strength, justification: &str) -> EdgeDraft {
        EdgeDraft {
            context_id: "CS101".to_string(),
            source_id: source.to_string(),
            source_level: Level::Co,
            target_id: target.to_string(),
            target_level: Level::Po,
            strength,
            justification: justification.to_string(),
            contribution: String::new(),
        }
    }

    fn detail(curriculum: &str, si_no: u32) -> TermDetail {
        TermDetail {
            curriculum_id: curriculum.to_string(),
            si_no,
            term_name: format!("Semester {si_no}"),
            duration_weeks: 16,
            credits: 20,
            theory_course_count: 5,
            practical_other_count: 2,
            academic_start_year: 2024,
            academic_end_year: 2025,
            academic_year: "2024-2025".to_string(),
            approval_status: ApprovalStatus::Draft,
            submitted_at: None,
            approved_at: None,
        }
    }

    #[test]
    fn lists_outcomes_in_provider_order() {
        let store = seeded();
        let ids: Vec<String> = store
            .list("CS101")
            .expect("list")
            .into_iter()
            .map(|outcome| outcome.id)
            .collect();
        assert_eq!(ids, vec!["co1", "co2", "po1", "po2"]);
        assert!(store.list("UNKNOWN").expect("list unknown").is_empty());
    }

    #[test]
    fn reimport_keeps_positions_and_skips_renamed_duplicates() {
        let store = seeded();
        let again = parse_catalog(
            r#"context: CS101
outcomes:
  - { id: co1, code: CO1, level: co, statement: Trace and debug programs }
  - { id: co1-dup, code: co-1, level: co }
  - { id: po3, code: PO3, level: po }
"#,
        )
        .expect("catalog");
        let report = store.import_catalog(&again).expect("reimport");
        assert_eq!(report.imported, 2);
        assert_eq!(report.newly_linked, 1);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].id, "co1-dup");

        let outcomes = store.list("CS101").expect("list");
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[0].statement, "Trace and debug programs");
        assert_eq!(outcomes[4].id, "po3");
    }

    #[test]
    fn upsert_is_idempotent_and_updates_in_place() {
        let store = seeded();
        let context = MappingContext::new("CS101", LevelPair::CoPo);
        let first = store
            .upsert(&draft("co1", "po1", Strength::Moderate, "covers knowledge"))
            .expect("first upsert");
        let second = store
            .upsert(&draft("co1", "po1", Strength::Moderate, "covers knowledge"))
            .expect("second upsert");
        assert_eq!(first.id, second.id);
        assert_eq!(store.get_all(&context).expect("edges").len(), 1);

        let updated = store
            .upsert(&draft("co1", "po1", Strength::Strong, "covers knowledge deeply"))
            .expect("update");
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.strength, Strength::Strong);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(store.get_all(&context).expect("edges").len(), 1);
    }

    #[test]
    fn upsert_rejects_non_adjacent_levels() {
        let store = seeded();
        let mut skip = draft("co1", "peo1", Strength::Weak, "skips a level");
        skip.target_level = Level::Peo;
        let err = store.upsert(&skip).expect_err("skip-level edge");
        assert!(matches!(err, StoreError::InvalidLevelPair { .. }));

        let mut same = draft("co1", "co2", Strength::Weak, "same level edge");
        same.target_level = Level::Co;
        assert!(store.upsert(&same).is_err());
        assert!(
            store
                .get_all(&MappingContext::new("CS101", LevelPair::CoPo))
                .expect("edges")
                .is_empty()
        );
    }

    #[test]
    fn delete_is_a_no_op_when_absent() {
        let store = seeded();
        let context = MappingContext::new("CS101", LevelPair::CoPo);
        store
            .upsert(&draft("co1", "po2", Strength::Weak, "touches analysis"))
            .expect("upsert");
        assert!(store.delete(&context, "co1", "po2").expect("delete"));
        assert!(!store.delete(&context, "co1", "po2").expect("delete again"));
        assert!(store.get(&context, "co1", "po2").expect("get").is_none());
    }

    #[test]
    fn unknown_curriculum_is_not_found() {
        let store = SqliteStore::open_in_memory().expect("sqlite");
        let err = store.get_by_curriculum("B2024").expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn save_bulk_replaces_rows_atomically() {
        let store = SqliteStore::open_in_memory().expect("sqlite");
        store
            .save_bulk("B2024", &[detail("B2024", 1), detail("B2024", 2)])
            .expect("first save");

        let err = store.save_bulk("B2024", &[detail("B2024", 3), detail("B2024", 3)]);
        assert!(err.is_err());

        let plan = store.get_by_curriculum("B2024").expect("plan");
        let serials: Vec<u32> = plan.rows.iter().map(|row| row.si_no).collect();
        assert_eq!(serials, vec![1, 2]);

        store
            .save_bulk("B2024", &[detail("B2024", 5)])
            .expect("replace");
        let plan = store.get_by_curriculum("B2024").expect("plan");
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].si_no, 5);
    }

    #[test]
    fn submit_stamps_submitter_and_signals_repeat() {
        let store = SqliteStore::open_in_memory().expect("sqlite");
        store
            .save_bulk("B2024", &[detail("B2024", 1)])
            .expect("save");

        let ack = store.submit_for_approval("B2024", "u-17").expect("submit");
        assert!(matches!(ack, SubmitAck::Submitted { .. }));
        let plan = store.get_by_curriculum("B2024").expect("plan");
        assert_eq!(plan.info.approval_status, ApprovalStatus::Submitted);
        assert_eq!(plan.info.submitted_by.as_deref(), Some("u-17"));
        assert!(plan.rows[0].submitted_at.is_some());

        let again = store.submit_for_approval("B2024", "u-17").expect("resubmit");
        assert_eq!(
            again,
            SubmitAck::AlreadySubmitted {
                status: ApprovalStatus::Submitted
            }
        );
    }

    #[test]
    fn review_is_limited_to_submitted_plans_and_the_owner() {
        let store = SqliteStore::open_in_memory().expect("sqlite");
        store.set_program_owner("B2024", "owner-1").expect("owner");
        store
            .save_bulk("B2024", &[detail("B2024", 1)])
            .expect("save");
        assert!(
            store
                .record_review("B2024", "owner-1", ReviewDecision::Approve)
                .is_err()
        );

        store.submit_for_approval("B2024", "u-17").expect("submit");
        let err = store
            .record_review("B2024", "someone-else", ReviewDecision::Approve)
            .expect_err("not the owner");
        assert!(matches!(err, StoreError::Conflict(_)));

        let status = store
            .record_review("B2024", "owner-1", ReviewDecision::Reject)
            .expect("reject");
        assert_eq!(status, ApprovalStatus::Rejected);
        let plan = store.get_by_curriculum("B2024").expect("plan");
        assert_eq!(plan.info.program_owner.as_deref(), Some("owner-1"));
        assert_eq!(plan.rows[0].approval_status, ApprovalStatus::Rejected);
    }

    fn conversion_failure(err: StoreError) -> (usize, Type, String) {
        match err {
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, ty, cause)) => {
                (idx, ty, cause.to_string())
            }
            other => panic!("expected a conversion failure, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_enum_columns_are_reported_not_guessed() {
        let store = seeded();
        let context = MappingContext::new("CS101", LevelPair::CoPo);
        store
            .upsert(&draft("co1", "po1", Strength::Weak, "Covered by the weekly labs"))
            .expect("edge");
        store
            .save_bulk("B2024", &[detail("B2024", 1)])
            .expect("save");
        store
            .conn
            .execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 UPDATE outcomes SET level = 'dean' WHERE id = 'co2';
                 UPDATE mapping_edges SET strength = 7;",
            )
            .expect("corrupt rows");

        let (idx, ty, message) = conversion_failure(store.list("CS101").expect_err("level"));
        assert_eq!((idx, ty), (3, Type::Text));
        assert_eq!(message, "unexpected level value `dean`");

        let (idx, ty, message) = conversion_failure(store.get_all(&context).expect_err("strength"));
        assert_eq!((idx, ty), (5, Type::Integer));
        assert_eq!(message, "unexpected strength value `7`");

        store
            .conn
            .execute_batch(
                "UPDATE mapping_edges SET strength = 2, level_pair = 'co-peo';
                 UPDATE term_details SET approval_status = 'archived';",
            )
            .expect("corrupt rows");
        let (idx, _, message) = conversion_failure(store.get_all(&context).expect_err("pair"));
        assert_eq!(idx, 2);
        assert_eq!(message, "unexpected level_pair value `co-peo`");

        let (idx, _, message) =
            conversion_failure(store.get_by_curriculum("B2024").expect_err("row status"));
        assert_eq!(idx, 10);
        assert_eq!(message, "unexpected approval_status value `archived`");

        store
            .conn
            .execute_batch("UPDATE curricula SET approval_status = 'archived';")
            .expect("corrupt curriculum");
        let err = store.get_by_curriculum("B2024").expect_err("curriculum status");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(conversion_failure(err).0, 1);
    }

    #[test]
    fn unknown_schema_version_is_named() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("curricula.sqlite");
        let path = path.to_string_lossy().into_owned();
        Connection::open(&path)
            .and_then(|conn| conn.execute_batch("PRAGMA user_version = 99;"))
            .expect("future schema");

        let err = SqliteStore::open(&path).err().expect("version mismatch");
        assert!(matches!(
            err,
            StoreError::SchemaVersion {
                found: 99,
                expected: 1
            }
        ));
        assert_eq!(
            err.to_string(),
            "database schema version 99 is not supported; expected 1"
        );

        SqliteStore::open(&dir.path().join("fresh.sqlite").to_string_lossy())
            .expect("new databases get the current schema");
    }
}
