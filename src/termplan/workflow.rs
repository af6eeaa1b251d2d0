//! Term-plan editing and the approval workflow.
//!
//! A [`TermPlan`] owns the client-local rows of one curriculum and the
//! [`PlanState`] they are in. Every state change goes through
//! [`PlanState::transition`]; Save and Submit check their preconditions
//! locally and never call persistence when one fails.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::totals::{TermTotals, compute_totals};
use super::{
    ApprovalStatus, CurriculumInfo, CurriculumPlan, RowEdit, SubmitAck, TermDetail,
    TermDetailPersistence, TermRow,
};
use crate::error::{ErrorKind, StoreError};
use crate::identity::{IdentityError, IdentityProvider};
use crate::notice::NoticeBoard;
use crate::session::{ContextTracker, Ticket, WriteGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    DraftUnsaved,
    DraftSaved,
    Submitted,
    Approved,
    Rejected,
}

impl PlanState {
    /// The state implied by the persisted status of a curriculum.
    pub fn from_remote(status: ApprovalStatus, has_rows: bool) -> Self {
        match status {
            ApprovalStatus::Draft if has_rows => Self::DraftSaved,
            ApprovalStatus::Draft => Self::DraftUnsaved,
            ApprovalStatus::Submitted => Self::Submitted,
            ApprovalStatus::Approved => Self::Approved,
            ApprovalStatus::Rejected => Self::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DraftUnsaved => "draft_unsaved",
            Self::DraftSaved => "draft_saved",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Every state accepts edits except Approved under `lock_approved`.
    pub fn is_editable(self, lock_approved: bool) -> bool {
        !(lock_approved && self == Self::Approved)
    }

    pub fn transition(self, event: PlanEvent, lock_approved: bool) -> Result<Self, WorkflowError> {
        match event {
            PlanEvent::Edited | PlanEvent::Saved if !self.is_editable(lock_approved) => {
                Err(WorkflowError::Locked(self))
            }
            PlanEvent::Edited => Ok(Self::DraftUnsaved),
            PlanEvent::Saved => Ok(Self::DraftSaved),
            PlanEvent::Submitted if self == Self::DraftSaved => Ok(Self::Submitted),
            PlanEvent::Submitted => Err(WorkflowError::NotSaved),
            PlanEvent::Observed { status, has_rows } => Ok(Self::from_remote(status, has_rows)),
        }
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEvent {
    Edited,
    Saved,
    Submitted,
    /// Status read back from persistence; Approved and Rejected only arrive this way.
    Observed {
        status: ApprovalStatus,
        has_rows: bool,
    },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("select a curriculum first")]
    NoCurriculum,

    #[error("add at least one complete term row before saving")]
    NoCompleteRows,

    #[error("save the term plan before submitting it")]
    NotSaved,

    #[error("add term rows before submitting")]
    NoRows,

    #[error("another write for curriculum `{0}` is still in flight")]
    Busy(String),

    #[error("the term plan is {0} and cannot be changed")]
    Locked(PlanState),

    #[error("term row {0} already exists")]
    DuplicateSerial(u32),

    #[error("term row {0} does not exist")]
    UnknownRow(u32),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCurriculum
            | Self::NoCompleteRows
            | Self::NotSaved
            | Self::NoRows
            | Self::DuplicateSerial(_)
            | Self::Identity(_) => ErrorKind::Validation,
            Self::UnknownRow(_) => ErrorKind::NotFound,
            Self::Busy(_) | Self::Locked(_) => ErrorKind::Conflict,
            Self::Store(err) => err.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub si_no: u32,
    pub problems: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub saved: Vec<u32>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted {
        submitted_by: String,
        submitted_at: String,
    },
    AlreadySubmitted {
        status: ApprovalStatus,
    },
}

/// Serializable copy of a plan for client-local drafts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub curriculum_id: String,
    pub state: PlanState,
    pub info: CurriculumInfo,
    pub rows: Vec<TermRow>,
}

pub struct TermPlan {
    curriculum_id: Option<String>,
    rows: Vec<TermRow>,
    state: PlanState,
    info: CurriculumInfo,
    lock_approved: bool,
    gate: Arc<WriteGate>,
    tracker: ContextTracker,
    notices: NoticeBoard,
}

impl TermPlan {
    pub fn new(lock_approved: bool) -> Self {
        Self::with_gate(lock_approved, Arc::new(WriteGate::new()))
    }

    pub fn with_gate(lock_approved: bool, gate: Arc<WriteGate>) -> Self {
        Self {
            curriculum_id: None,
            rows: Vec::new(),
            state: PlanState::DraftUnsaved,
            info: CurriculumInfo::unsaved(),
            lock_approved,
            gate,
            tracker: ContextTracker::new(),
            notices: NoticeBoard::new(),
        }
    }

    pub fn from_snapshot(snapshot: PlanSnapshot, lock_approved: bool) -> Self {
        let mut plan = Self::new(lock_approved);
        plan.tracker.navigate(&snapshot.curriculum_id);
        plan.curriculum_id = Some(snapshot.curriculum_id);
        plan.rows = snapshot.rows;
        plan.state = snapshot.state;
        plan.info = snapshot.info;
        plan
    }

    pub fn snapshot(&self) -> Option<PlanSnapshot> {
        Some(PlanSnapshot {
            curriculum_id: self.curriculum_id.clone()?,
            state: self.state,
            info: self.info.clone(),
            rows: self.rows.clone(),
        })
    }

    pub fn curriculum_id(&self) -> Option<&str> {
        self.curriculum_id.as_deref()
    }

    pub fn rows(&self) -> &[TermRow] {
        &self.rows
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn info(&self) -> &CurriculumInfo {
        &self.info
    }

    pub fn totals(&self) -> TermTotals {
        compute_totals(&self.rows)
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }

    /// Switches to `curriculum_id` with an empty plan. Responses for the
    /// previous selection are discarded from here on.
    pub fn begin_load(&mut self, curriculum_id: &str) -> Ticket {
        self.curriculum_id = Some(curriculum_id.to_string());
        self.rows.clear();
        self.state = PlanState::DraftUnsaved;
        self.info = CurriculumInfo::unsaved();
        self.tracker.navigate(curriculum_id)
    }

    /// Installs a fetched plan. Returns `Ok(false)` when the response is stale.
    /// An unknown curriculum loads as an empty draft.
    pub fn finish_load(
        &mut self,
        ticket: &Ticket,
        response: Result<CurriculumPlan, StoreError>,
    ) -> Result<bool, WorkflowError> {
        let Some(response) = self.tracker.accept(ticket, response) else {
            return Ok(false);
        };
        match response {
            Ok(plan) => {
                self.state = PlanState::from_remote(plan.info.approval_status, !plan.rows.is_empty());
                self.rows = plan.rows.iter().map(TermRow::from_detail).collect();
                self.info = plan.info;
                debug!(
                    curriculum = ticket.context(),
                    rows = self.rows.len(),
                    state = %self.state,
                    "loaded term plan"
                );
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => {
                debug!(curriculum = ticket.context(), "no saved term plan");
                Ok(true)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    pub fn load<P>(&mut self, persistence: &P, curriculum_id: &str) -> Result<(), WorkflowError>
    where
        P: TermDetailPersistence + ?Sized,
    {
        let ticket = self.begin_load(curriculum_id);
        let response = persistence.get_by_curriculum(curriculum_id);
        self.finish_load(&ticket, response)?;
        Ok(())
    }

    /// Appends an empty row numbered after the highest existing one.
    pub fn add_row(&mut self) -> Result<u32, WorkflowError> {
        let si_no = self.rows.iter().map(|row| row.si_no).max().unwrap_or(0) + 1;
        self.insert_row(TermRow::new(si_no))?;
        Ok(si_no)
    }

    pub fn insert_row(&mut self, mut row: TermRow) -> Result<(), WorkflowError> {
        if self.rows.iter().any(|existing| existing.si_no == row.si_no) {
            return Err(self.fail(WorkflowError::DuplicateSerial(row.si_no)));
        }
        self.edited()?;
        row.saved = false;
        let at = self.rows.partition_point(|existing| existing.si_no < row.si_no);
        self.rows.insert(at, row);
        Ok(())
    }

    pub fn update_row(&mut self, si_no: u32, edit: RowEdit) -> Result<&TermRow, WorkflowError> {
        let Some(index) = self.rows.iter().position(|row| row.si_no == si_no) else {
            return Err(self.fail(WorkflowError::UnknownRow(si_no)));
        };
        self.edited()?;
        let row = &mut self.rows[index];
        row.apply(edit);
        Ok(row)
    }

    pub fn remove_row(&mut self, si_no: u32) -> Result<TermRow, WorkflowError> {
        let Some(index) = self.rows.iter().position(|row| row.si_no == si_no) else {
            return Err(self.fail(WorkflowError::UnknownRow(si_no)));
        };
        self.edited()?;
        Ok(self.rows.remove(index))
    }

    fn edited(&mut self) -> Result<(), WorkflowError> {
        match self.state.transition(PlanEvent::Edited, self.lock_approved) {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Persists every complete row as one batch; incomplete rows are reported
    /// and stay local. Nothing local changes when the batch fails.
    pub fn save<P>(&mut self, persistence: &P) -> Result<SaveReport, WorkflowError>
    where
        P: TermDetailPersistence + ?Sized,
    {
        let Some(curriculum_id) = self.curriculum_id.clone() else {
            return Err(self.fail(WorkflowError::NoCurriculum));
        };
        let next = match self.state.transition(PlanEvent::Saved, self.lock_approved) {
            Ok(next) => next,
            Err(err) => return Err(self.fail(err)),
        };

        let mut details: Vec<TermDetail> = Vec::new();
        let mut skipped = Vec::new();
        for row in &self.rows {
            match row.to_detail(&curriculum_id) {
                Some(detail) => details.push(detail),
                None => skipped.push(SkippedRow {
                    si_no: row.si_no,
                    problems: row.problems(),
                }),
            }
        }
        if details.is_empty() {
            return Err(self.fail(WorkflowError::NoCompleteRows));
        }

        let gate = Arc::clone(&self.gate);
        let Some(guard) = gate.try_begin(&curriculum_id) else {
            return Err(self.fail(WorkflowError::Busy(curriculum_id)));
        };
        let result = persistence.save_bulk(&curriculum_id, &details);
        drop(guard);
        if let Err(err) = result {
            warn!(curriculum = %curriculum_id, error = %err, "term plan save failed");
            return Err(self.fail(err.into()));
        }

        let saved: BTreeSet<u32> = details.iter().map(|detail| detail.si_no).collect();
        for row in &mut self.rows {
            row.saved = saved.contains(&row.si_no);
        }
        self.state = next;
        self.info.approval_status = ApprovalStatus::Draft;
        self.info.submitted_by = None;
        self.info.submitted_at = None;
        self.info.approved_at = None;

        info!(
            curriculum = %curriculum_id,
            saved = saved.len(),
            skipped = skipped.len(),
            "saved term plan"
        );
        if !skipped.is_empty() {
            let numbers: Vec<String> = skipped.iter().map(|row| row.si_no.to_string()).collect();
            self.notices.warn(
                ErrorKind::Validation,
                format!("incomplete term rows were not saved: {}", numbers.join(", ")),
            );
        }
        Ok(SaveReport {
            saved: saved.into_iter().collect(),
            skipped,
        })
    }

    /// Submits the saved plan for approval under the acting user's id.
    pub fn submit<P, I>(
        &mut self,
        persistence: &P,
        identity: &I,
    ) -> Result<SubmitOutcome, WorkflowError>
    where
        P: TermDetailPersistence + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let Some(curriculum_id) = self.curriculum_id.clone() else {
            return Err(self.fail(WorkflowError::NoCurriculum));
        };
        if self.state == PlanState::Submitted {
            return self.already_submitted(persistence, ApprovalStatus::Submitted);
        }
        if self.rows.is_empty() {
            return Err(self.fail(WorkflowError::NoRows));
        }
        let next = match self.state.transition(PlanEvent::Submitted, self.lock_approved) {
            Ok(next) => next,
            Err(err) => return Err(self.fail(err)),
        };
        let submitter = match identity.current_user_id() {
            Ok(id) => id,
            Err(err) => return Err(self.fail(err.into())),
        };

        let gate = Arc::clone(&self.gate);
        let Some(guard) = gate.try_begin(&curriculum_id) else {
            return Err(self.fail(WorkflowError::Busy(curriculum_id)));
        };
        let result = persistence.submit_for_approval(&curriculum_id, &submitter);
        drop(guard);

        match result {
            Ok(SubmitAck::Submitted { submitted_at }) => {
                self.state = next;
                self.info.approval_status = ApprovalStatus::Submitted;
                self.info.submitted_by = Some(submitter.clone());
                self.info.submitted_at = Some(submitted_at.clone());
                info!(curriculum = %curriculum_id, submitter = %submitter, "submitted term plan");
                Ok(SubmitOutcome::Submitted {
                    submitted_by: submitter,
                    submitted_at,
                })
            }
            Ok(SubmitAck::AlreadySubmitted { status }) => {
                self.already_submitted(persistence, status)
            }
            Err(err) => {
                warn!(curriculum = %curriculum_id, error = %err, "submit failed");
                Err(self.fail(err.into()))
            }
        }
    }

    fn already_submitted<P>(
        &mut self,
        persistence: &P,
        status: ApprovalStatus,
    ) -> Result<SubmitOutcome, WorkflowError>
    where
        P: TermDetailPersistence + ?Sized,
    {
        warn!(
            curriculum = ?self.curriculum_id,
            status = status.as_str(),
            "term plan already submitted"
        );
        self.notices.warn(
            ErrorKind::Conflict,
            format!("this term plan was already submitted (status: {})", status.as_str()),
        );
        let status = self.refresh_status(persistence)?;
        Ok(SubmitOutcome::AlreadySubmitted { status })
    }

    /// Re-reads the persisted status. Local rows are left as they are.
    pub fn refresh_status<P>(&mut self, persistence: &P) -> Result<ApprovalStatus, WorkflowError>
    where
        P: TermDetailPersistence + ?Sized,
    {
        let Some(ticket) = self.tracker.ticket() else {
            return Err(self.fail(WorkflowError::NoCurriculum));
        };
        let plan = match persistence.get_by_curriculum(ticket.context()) {
            Ok(plan) => plan,
            Err(StoreError::NotFound(_)) => return Ok(self.info.approval_status),
            Err(err) => return Err(self.fail(err.into())),
        };
        let Some(plan) = self.tracker.accept(&ticket, plan) else {
            return Ok(self.info.approval_status);
        };
        let observed = PlanEvent::Observed {
            status: plan.info.approval_status,
            has_rows: !plan.rows.is_empty(),
        };
        let observed_state = self.state.transition(observed, self.lock_approved)?;
        // Local edits stay pending until saved; only a review decision replaces them.
        let pending = self.state == PlanState::DraftUnsaved
            && matches!(observed_state, PlanState::DraftSaved | PlanState::Submitted);
        if !pending {
            self.state = observed_state;
        }
        self.info = plan.info;
        debug!(
            curriculum = ticket.context(),
            status = self.info.approval_status.as_str(),
            "refreshed term plan status"
        );
        Ok(self.info.approval_status)
    }

    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        self.notices.error(err.kind(), err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::identity::ConfiguredIdentity;
    use crate::termplan::tests::complete_row;

    /// In-memory persistence that counts calls and can fail a save mid-batch.
    #[derive(Default)]
    struct FakePersistence {
        rows: RefCell<Vec<TermDetail>>,
        info: RefCell<Option<CurriculumInfo>>,
        fail_at: Option<usize>,
        saves: Cell<usize>,
        submits: Cell<usize>,
        fetches: Cell<usize>,
    }

    impl TermDetailPersistence for FakePersistence {
        fn get_by_curriculum(&self, curriculum_id: &str) -> Result<CurriculumPlan, StoreError> {
            self.fetches.set(self.fetches.get() + 1);
            let info = self
                .info
                .borrow()
                .clone()
                .ok_or_else(|| StoreError::NotFound(curriculum_id.to_string()))?;
            Ok(CurriculumPlan {
                rows: self.rows.borrow().clone(),
                info,
            })
        }

        fn save_bulk(&self, _curriculum_id: &str, rows: &[TermDetail]) -> Result<(), StoreError> {
            self.saves.set(self.saves.get() + 1);
            let mut staged = Vec::new();
            for (index, row) in rows.iter().enumerate() {
                if self.fail_at == Some(index) {
                    return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
                }
                staged.push(row.clone());
            }
            *self.rows.borrow_mut() = staged;
            *self.info.borrow_mut() = Some(CurriculumInfo::unsaved());
            Ok(())
        }

        fn submit_for_approval(
            &self,
            _curriculum_id: &str,
            submitter_id: &str,
        ) -> Result<SubmitAck, StoreError> {
            self.submits.set(self.submits.get() + 1);
            let mut info = self.info.borrow_mut();
            let info = info
                .as_mut()
                .ok_or_else(|| StoreError::NotFound("curriculum".to_string()))?;
            if info.approval_status == ApprovalStatus::Submitted {
                return Ok(SubmitAck::AlreadySubmitted {
                    status: info.approval_status,
                });
            }
            info.approval_status = ApprovalStatus::Submitted;
            info.submitted_by = Some(submitter_id.to_string());
            info.submitted_at = Some("2026-10-19T09:00:00.000Z".to_string());
            Ok(SubmitAck::Submitted {
                submitted_at: "2026-10-19T09:00:00.000Z".to_string(),
            })
        }
    }

    fn identity() -> ConfiguredIdentity {
        ConfiguredIdentity::new(Some("u-1024".to_string()))
    }

    fn plan_with_rows(rows: &[TermRow]) -> TermPlan {
        let mut plan = TermPlan::new(false);
        plan.begin_load("B2024");
        for row in rows {
            plan.insert_row(row.clone()).expect("insert row");
        }
        plan
    }

    #[test]
    fn transition_table() {
        use PlanState::*;
        assert_eq!(DraftSaved.transition(PlanEvent::Edited, false).ok(), Some(DraftUnsaved));
        assert_eq!(Rejected.transition(PlanEvent::Edited, false).ok(), Some(DraftUnsaved));
        assert_eq!(Approved.transition(PlanEvent::Edited, false).ok(), Some(DraftUnsaved));
        assert!(matches!(
            Approved.transition(PlanEvent::Edited, true),
            Err(WorkflowError::Locked(Approved))
        ));
        assert_eq!(Submitted.transition(PlanEvent::Edited, false).ok(), Some(DraftUnsaved));
        assert_eq!(Submitted.transition(PlanEvent::Edited, true).ok(), Some(DraftUnsaved));
        assert!(matches!(
            Approved.transition(PlanEvent::Saved, true),
            Err(WorkflowError::Locked(Approved))
        ));
        assert_eq!(DraftSaved.transition(PlanEvent::Submitted, false).ok(), Some(Submitted));
        assert!(matches!(
            DraftUnsaved.transition(PlanEvent::Submitted, false),
            Err(WorkflowError::NotSaved)
        ));
        let approved = PlanEvent::Observed {
            status: ApprovalStatus::Approved,
            has_rows: true,
        };
        assert_eq!(Submitted.transition(approved, true).ok(), Some(Approved));
    }

    #[test]
    fn save_requires_a_curriculum_and_a_complete_row() {
        let persistence = FakePersistence::default();
        let mut plan = TermPlan::new(false);
        assert!(matches!(plan.save(&persistence), Err(WorkflowError::NoCurriculum)));

        plan.begin_load("B2024");
        plan.add_row().expect("add row");
        assert!(matches!(plan.save(&persistence), Err(WorkflowError::NoCompleteRows)));
        assert_eq!(persistence.saves.get(), 0);
        assert_eq!(plan.notices().active().len(), 2);
    }

    #[test]
    fn save_persists_complete_rows_and_reports_the_rest() {
        let persistence = FakePersistence::default();
        let mut plan = plan_with_rows(&[complete_row(1), complete_row(2)]);
        plan.add_row().expect("add row");

        let report = plan.save(&persistence).expect("save");
        assert_eq!(report.saved, vec![1, 2]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].si_no, 3);
        assert_eq!(plan.state(), PlanState::DraftSaved);
        let flags: Vec<bool> = plan.rows().iter().map(|row| row.saved).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(persistence.rows.borrow().len(), 2);
    }

    #[test]
    fn mid_batch_failure_leaves_rows_and_flags_untouched() {
        let persistence = FakePersistence {
            fail_at: Some(1),
            ..FakePersistence::default()
        };
        let mut plan = plan_with_rows(&[complete_row(1), complete_row(2), complete_row(3)]);
        let before = plan.rows().to_vec();

        let err = plan.save(&persistence).expect_err("batch fails");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(plan.rows(), before.as_slice());
        assert!(plan.rows().iter().all(|row| !row.saved));
        assert_eq!(plan.state(), PlanState::DraftUnsaved);
        assert!(persistence.rows.borrow().is_empty());
        assert_eq!(plan.notices().active().len(), 1);
    }

    #[test]
    fn submit_is_refused_without_a_call_until_saved() {
        let persistence = FakePersistence::default();
        let mut plan = plan_with_rows(&[complete_row(1)]);
        assert!(matches!(
            plan.submit(&persistence, &identity()),
            Err(WorkflowError::NotSaved)
        ));

        let mut empty = plan_with_rows(&[]);
        assert!(matches!(
            empty.submit(&persistence, &identity()),
            Err(WorkflowError::NoRows)
        ));
        assert_eq!(persistence.submits.get(), 0);
    }

    #[test]
    fn submit_records_the_acting_user() {
        let persistence = FakePersistence::default();
        let mut plan = plan_with_rows(&[complete_row(1)]);
        plan.save(&persistence).expect("save");

        let outcome = plan.submit(&persistence, &identity()).expect("submit");
        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                submitted_by: "u-1024".to_string(),
                submitted_at: "2026-10-19T09:00:00.000Z".to_string(),
            }
        );
        assert_eq!(plan.state(), PlanState::Submitted);
        assert_eq!(plan.info().submitted_by.as_deref(), Some("u-1024"));
    }

    #[test]
    fn editing_a_submitted_plan_returns_it_to_an_unsaved_draft() {
        let persistence = FakePersistence::default();
        let mut plan = TermPlan::new(true);
        plan.begin_load("B2024");
        plan.insert_row(complete_row(1)).expect("insert");
        plan.save(&persistence).expect("save");
        plan.submit(&persistence, &identity()).expect("submit");
        assert_eq!(plan.state(), PlanState::Submitted);

        let row = plan.update_row(1, RowEdit::Credits(5)).expect("submitted plans are editable");
        assert_eq!(row.credits, Some(5));
        assert!(!row.saved);
        assert_eq!(plan.state(), PlanState::DraftUnsaved);

        // The persisted plan is still submitted; the local edit stays pending.
        plan.refresh_status(&persistence).expect("refresh");
        assert_eq!(plan.info().approval_status, ApprovalStatus::Submitted);
        assert_eq!(plan.state(), PlanState::DraftUnsaved);
        assert!(matches!(
            plan.submit(&persistence, &identity()),
            Err(WorkflowError::NotSaved)
        ));
        assert_eq!(persistence.submits.get(), 1);

        plan.save(&persistence).expect("save again");
        assert_eq!(plan.state(), PlanState::DraftSaved);
        assert_eq!(persistence.rows.borrow()[0].credits, 5);
    }

    #[test]
    fn resubmitting_warns_refreshes_status_and_keeps_rows() {
        let persistence = FakePersistence::default();
        let mut plan = plan_with_rows(&[complete_row(1), complete_row(2)]);
        plan.save(&persistence).expect("save");
        plan.submit(&persistence, &identity()).expect("submit");
        let rows = plan.rows().to_vec();
        plan.notices_mut().clear();

        let outcome = plan.submit(&persistence, &identity()).expect("resubmit");
        assert_eq!(
            outcome,
            SubmitOutcome::AlreadySubmitted {
                status: ApprovalStatus::Submitted
            }
        );
        assert_eq!(persistence.submits.get(), 1);
        assert_eq!(plan.rows(), rows.as_slice());
        assert_eq!(plan.notices().active().len(), 1);
        assert_eq!(plan.notices().active()[0].kind, Some(ErrorKind::Conflict));
    }

    #[test]
    fn remote_already_submitted_is_a_warning_not_an_error() {
        let persistence = FakePersistence::default();
        let mut plan = plan_with_rows(&[complete_row(1)]);
        plan.save(&persistence).expect("save");
        persistence
            .info
            .borrow_mut()
            .as_mut()
            .expect("saved info")
            .approval_status = ApprovalStatus::Submitted;

        let outcome = plan.submit(&persistence, &identity()).expect("submit");
        assert!(matches!(outcome, SubmitOutcome::AlreadySubmitted { .. }));
        assert_eq!(plan.state(), PlanState::Submitted);
        assert_eq!(plan.rows().len(), 1);
    }

    #[test]
    fn approval_and_rejection_are_observed_on_fetch() {
        let persistence = FakePersistence::default();
        let mut plan = TermPlan::new(true);
        plan.begin_load("B2024");
        plan.insert_row(complete_row(1)).expect("insert");
        plan.save(&persistence).expect("save");
        plan.submit(&persistence, &identity()).expect("submit");

        persistence
            .info
            .borrow_mut()
            .as_mut()
            .expect("info")
            .approval_status = ApprovalStatus::Approved;
        assert_eq!(
            plan.refresh_status(&persistence).expect("refresh"),
            ApprovalStatus::Approved
        );
        assert!(matches!(plan.add_row(), Err(WorkflowError::Locked(PlanState::Approved))));

        persistence
            .info
            .borrow_mut()
            .as_mut()
            .expect("info")
            .approval_status = ApprovalStatus::Rejected;
        plan.refresh_status(&persistence).expect("refresh");
        assert_eq!(plan.state(), PlanState::Rejected);
        plan.update_row(1, RowEdit::Credits(18)).expect("rejected plans are editable");
        assert_eq!(plan.state(), PlanState::DraftUnsaved);
    }

    #[test]
    fn unknown_curriculum_loads_as_an_empty_draft() {
        let persistence = FakePersistence::default();
        let mut plan = TermPlan::new(false);
        plan.load(&persistence, "B2030").expect("load");
        assert!(plan.rows().is_empty());
        assert_eq!(plan.state(), PlanState::DraftUnsaved);
        assert!(plan.notices().active().is_empty());
    }

    #[test]
    fn stale_load_responses_are_discarded() {
        let persistence = FakePersistence::default();
        {
            let mut seed = plan_with_rows(&[complete_row(1)]);
            seed.save(&persistence).expect("seed");
        }
        let mut plan = TermPlan::new(false);
        let first = plan.begin_load("B2024");
        let second = plan.begin_load("B2025");
        let late = persistence.get_by_curriculum("B2024");
        assert!(!plan.finish_load(&first, late).expect("stale"));
        assert!(plan.rows().is_empty());
        assert_eq!(plan.curriculum_id(), Some("B2025"));
        assert!(
            plan.finish_load(&second, Err(StoreError::NotFound("B2025".into())))
                .expect("fresh")
        );
    }

    #[test]
    fn snapshot_restores_unsaved_edits() {
        let mut plan = plan_with_rows(&[complete_row(1)]);
        plan.update_row(1, RowEdit::TermName("Autumn".to_string()))
            .expect("edit");
        let json = serde_json::to_string(&plan.snapshot().expect("snapshot")).expect("json");

        let restored: PlanSnapshot = serde_json::from_str(&json).expect("parse");
        let plan = TermPlan::from_snapshot(restored, false);
        assert_eq!(plan.curriculum_id(), Some("B2024"));
        assert_eq!(plan.rows()[0].term_name, "Autumn");
        assert_eq!(plan.state(), PlanState::DraftUnsaved);
    }

    #[test]
    fn busy_curriculum_refuses_a_second_save() {
        let persistence = FakePersistence::default();
        let gate = Arc::new(WriteGate::new());
        let mut plan = TermPlan::with_gate(false, Arc::clone(&gate));
        plan.begin_load("B2024");
        plan.insert_row(complete_row(1)).expect("insert");

        let held = gate.try_begin("B2024").expect("hold");
        assert!(matches!(plan.save(&persistence), Err(WorkflowError::Busy(_))));
        drop(held);
        assert!(plan.save(&persistence).is_ok());
        assert_eq!(persistence.saves.get(), 1);
    }

    #[test]
    fn duplicate_serial_numbers_are_rejected() {
        let mut plan = plan_with_rows(&[complete_row(1)]);
        assert!(matches!(
            plan.insert_row(complete_row(1)),
            Err(WorkflowError::DuplicateSerial(1))
        ));
        assert_eq!(plan.add_row().expect("next"), 2);
        assert!(matches!(plan.remove_row(7), Err(WorkflowError::UnknownRow(7))));
    }
}
