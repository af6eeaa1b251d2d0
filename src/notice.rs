use serde::Serialize;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One dismissable user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub severity: Severity,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    next_id: u64,
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        severity: Severity,
        kind: Option<ErrorKind>,
        message: impl Into<String>,
    ) -> u64 {
        self.next_id += 1;
        self.notices.push(Notice {
            id: self.next_id,
            severity,
            kind,
            message: message.into(),
        });
        self.next_id
    }

    /// Records an error; conflicts are shown as warnings.
    pub fn error(&mut self, kind: ErrorKind, message: impl Into<String>) -> u64 {
        let severity = match kind {
            ErrorKind::Conflict => Severity::Warning,
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Transport => Severity::Error,
        };
        self.push(severity, Some(kind), message)
    }

    pub fn warn(&mut self, kind: ErrorKind, message: impl Into<String>) -> u64 {
        self.push(Severity::Warning, Some(kind), message)
    }

    pub fn info(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Info, None, message)
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        self.notices.len() != before
    }

    pub fn active(&self) -> &[Notice] {
        &self.notices
    }

    pub fn clear(&mut self) {
        self.notices.clear();
    }

    pub fn take(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
