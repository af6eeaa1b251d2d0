pub mod totals;
pub mod workflow;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

pub fn academic_year(start: i32, end: i32) -> String {
    format!("{start}-{end}")
}

/// A persisted term row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDetail {
    pub curriculum_id: String,
    pub si_no: u32,
    pub term_name: String,
    pub duration_weeks: u32,
    pub credits: u32,
    pub theory_course_count: u32,
    pub practical_other_count: u32,
    pub academic_start_year: i32,
    pub academic_end_year: i32,
    pub academic_year: String,
    pub approval_status: ApprovalStatus,
    pub submitted_at: Option<String>,
    pub approved_at: Option<String>,
}

/// A client-local term row. Fields stay optional until the row is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRow {
    pub si_no: u32,
    #[serde(default)]
    pub term_name: String,
    #[serde(default)]
    pub duration_weeks: Option<u32>,
    #[serde(default)]
    pub credits: Option<u32>,
    #[serde(default)]
    pub theory_course_count: Option<u32>,
    #[serde(default)]
    pub practical_other_count: Option<u32>,
    #[serde(default)]
    pub academic_start_year: Option<i32>,
    #[serde(default)]
    pub academic_end_year: Option<i32>,
    #[serde(default)]
    pub saved: bool,
}

/// One field edit on a term row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEdit {
    TermName(String),
    DurationWeeks(u32),
    Credits(u32),
    TheoryCourseCount(u32),
    PracticalOtherCount(u32),
    AcademicStartYear(i32),
    AcademicEndYear(i32),
}

impl TermRow {
    pub fn new(si_no: u32) -> Self {
        Self {
            si_no,
            term_name: String::new(),
            duration_weeks: None,
            credits: None,
            theory_course_count: None,
            practical_other_count: None,
            academic_start_year: None,
            academic_end_year: None,
            saved: false,
        }
    }

    pub fn from_detail(detail: &TermDetail) -> Self {
        Self {
            si_no: detail.si_no,
            term_name: detail.term_name.clone(),
            duration_weeks: Some(detail.duration_weeks),
            credits: Some(detail.credits),
            theory_course_count: Some(detail.theory_course_count),
            practical_other_count: Some(detail.practical_other_count),
            academic_start_year: Some(detail.academic_start_year),
            academic_end_year: Some(detail.academic_end_year),
            saved: true,
        }
    }

    pub fn apply(&mut self, edit: RowEdit) {
        match edit {
            RowEdit::TermName(name) => self.term_name = name,
            RowEdit::DurationWeeks(value) => self.duration_weeks = Some(value),
            RowEdit::Credits(value) => self.credits = Some(value),
            RowEdit::TheoryCourseCount(value) => self.theory_course_count = Some(value),
            RowEdit::PracticalOtherCount(value) => self.practical_other_count = Some(value),
            RowEdit::AcademicStartYear(value) => self.academic_start_year = Some(value),
            RowEdit::AcademicEndYear(value) => self.academic_end_year = Some(value),
        }
        self.saved = false;
    }

    pub fn academic_year(&self) -> Option<String> {
        Some(academic_year(
            self.academic_start_year?,
            self.academic_end_year?,
        ))
    }

    /// Names of fields that are absent, non-positive, or inconsistent.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.si_no == 0 {
            out.push("si_no");
        }
        if self.term_name.trim().is_empty() {
            out.push("term_name");
        }
        for (name, value) in [
            ("duration_weeks", self.duration_weeks),
            ("credits", self.credits),
            ("theory_course_count", self.theory_course_count),
            ("practical_other_count", self.practical_other_count),
        ] {
            if !matches!(value, Some(v) if v > 0) {
                out.push(name);
            }
        }
        for (name, value) in [
            ("academic_start_year", self.academic_start_year),
            ("academic_end_year", self.academic_end_year),
        ] {
            if !matches!(value, Some(v) if v > 0) {
                out.push(name);
            }
        }
        if let (Some(start), Some(end)) = (self.academic_start_year, self.academic_end_year)
            && start > 0
            && end < start
        {
            out.push("academic_end_year");
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.problems().is_empty()
    }

    /// The persisted form of a complete row.
    pub fn to_detail(&self, curriculum_id: &str) -> Option<TermDetail> {
        if !self.is_complete() {
            return None;
        }
        let start = self.academic_start_year?;
        let end = self.academic_end_year?;
        Some(TermDetail {
            curriculum_id: curriculum_id.to_string(),
            si_no: self.si_no,
            term_name: self.term_name.trim().to_string(),
            duration_weeks: self.duration_weeks?,
            credits: self.credits?,
            theory_course_count: self.theory_course_count?,
            practical_other_count: self.practical_other_count?,
            academic_start_year: start,
            academic_end_year: end,
            academic_year: academic_year(start, end),
            approval_status: ApprovalStatus::Draft,
            submitted_at: None,
            approved_at: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumInfo {
    pub program_owner: Option<String>,
    pub approval_status: ApprovalStatus,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<String>,
    pub approved_at: Option<String>,
}

impl CurriculumInfo {
    pub fn unsaved() -> Self {
        Self {
            program_owner: None,
            approval_status: ApprovalStatus::Draft,
            submitted_by: None,
            submitted_at: None,
            approved_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumPlan {
    pub rows: Vec<TermDetail>,
    pub info: CurriculumInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAck {
    Submitted { submitted_at: String },
    /// The curriculum already left the draft stage.
    AlreadySubmitted { status: ApprovalStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Persistence for term-plan rows and their curriculum status.
pub trait TermDetailPersistence {
    /// Fails with [`StoreError::NotFound`] for an unknown curriculum.
    fn get_by_curriculum(&self, curriculum_id: &str) -> Result<CurriculumPlan, StoreError>;

    /// Replaces every row of the curriculum in one atomic batch.
    fn save_bulk(&self, curriculum_id: &str, rows: &[TermDetail]) -> Result<(), StoreError>;

    fn submit_for_approval(
        &self,
        curriculum_id: &str,
        submitter_id: &str,
    ) -> Result<SubmitAck, StoreError>;
}
