//! Client-local term plan drafts: one JSON [`PlanSnapshot`] per curriculum
//! under the cache directory, resumed against the persisted status.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::termplan::TermDetailPersistence;
use crate::termplan::workflow::{PlanSnapshot, TermPlan, WorkflowError};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("failed to {action} draft `{}`: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("draft `{}` is unreadable ({source}); rerun with --reload", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode term plan draft: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl DraftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Encode(_) => ErrorKind::Transport,
            Self::Corrupt { .. } => ErrorKind::Validation,
            Self::Workflow(err) => err.kind(),
        }
    }
}

pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Curriculum ids become file names with anything outside `[A-Za-z0-9-]`
    /// replaced by `_`.
    pub fn path_for(&self, curriculum_id: &str) -> PathBuf {
        let file: String = curriculum_id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    /// The stored draft, or `None` when there is none for this curriculum.
    pub fn load(&self, curriculum_id: &str) -> Result<Option<PlanSnapshot>, DraftError> {
        let path = self.path_for(curriculum_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DraftError::Io {
                    action: "read",
                    path,
                    source,
                });
            }
        };
        let snapshot: PlanSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(source) => return Err(DraftError::Corrupt { path, source }),
        };
        // Two ids can sanitize to one file name.
        if snapshot.curriculum_id != curriculum_id {
            warn!(
                curriculum = curriculum_id,
                stored = %snapshot.curriculum_id,
                "ignoring draft written for another curriculum"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &PlanSnapshot) -> Result<PathBuf, DraftError> {
        let path = self.path_for(&snapshot.curriculum_id);
        let mut rendered = serde_json::to_vec_pretty(snapshot).map_err(DraftError::Encode)?;
        rendered.push(b'\n');
        if let Err(source) = replace_contents(&path, &rendered) {
            return Err(DraftError::Io {
                action: "write",
                path,
                source,
            });
        }
        debug!(
            curriculum = %snapshot.curriculum_id,
            rows = snapshot.rows.len(),
            state = %snapshot.state,
            "stored term plan draft"
        );
        Ok(path)
    }

    /// Stores the plan's draft. A plan with no curriculum has nothing to keep.
    pub fn store(&self, plan: &TermPlan) -> Result<(), DraftError> {
        match plan.snapshot() {
            Some(snapshot) => self.save(&snapshot).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Returns whether a draft was removed.
    pub fn discard(&self, curriculum_id: &str) -> Result<bool, DraftError> {
        let path = self.path_for(curriculum_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(DraftError::Io {
                action: "remove",
                path,
                source,
            }),
        }
    }

    /// The local draft with a freshly observed status, or the persisted plan
    /// when no draft exists.
    pub fn resume<P>(
        &self,
        persistence: &P,
        curriculum_id: &str,
        lock_approved: bool,
    ) -> Result<TermPlan, DraftError>
    where
        P: TermDetailPersistence + ?Sized,
    {
        if let Some(snapshot) = self.load(curriculum_id)? {
            let mut plan = TermPlan::from_snapshot(snapshot, lock_approved);
            plan.refresh_status(persistence)?;
            return Ok(plan);
        }
        let mut plan = TermPlan::new(lock_approved);
        plan.load(persistence, curriculum_id)?;
        Ok(plan)
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so
/// readers see either the old contents or the new ones.
pub fn replace_contents(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("`{}` is not a file path", path.display()),
        ));
    };
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        std::process::id()
    ));
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    let result = written.and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
