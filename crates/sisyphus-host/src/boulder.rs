//! Persisted plan-tracking ("boulder") state.
//!
//! A boulder is a file-backed multi-task work plan executed incrementally
//! across possibly-many sessions. This core reads the record, projects
//! checkbox progress from the active plan document, and appends session ids
//! to the tracked list — it does not otherwise own the record.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The persisted boulder record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BoulderState {
    /// Path to the active plan document, relative to the record's directory.
    pub active_plan: Option<String>,
    /// Display name of the plan.
    pub plan_name: Option<String>,
    /// Sessions that have worked this plan.
    pub session_ids: Vec<String>,
    /// When the record was last touched by this layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl BoulderState {
    /// Whether a plan is currently being executed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_plan.is_some()
    }

    /// Whether a session is already tracked.
    #[must_use]
    pub fn has_session(&self, session_id: &str) -> bool {
        self.session_ids.iter().any(|s| s == session_id)
    }
}

/// Progress projection over the active plan document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanProgress {
    /// Total checkbox tasks.
    pub total: usize,
    /// Completed checkbox tasks.
    pub completed: usize,
}

impl PlanProgress {
    /// Whether every task is checked off.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    /// Tasks still open.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// Read the boulder record, treating absence or corruption as "no boulder".
#[must_use]
pub fn read_boulder_state(path: &Path) -> Option<BoulderState> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(?path, error = %e, "malformed boulder record ignored");
            None
        }
    }
}

/// Project checkbox progress from markdown plan content.
///
/// Counts GitHub-style task-list items: `- [ ]` open, `- [x]` done
/// (case-insensitive, `*` bullets accepted).
#[must_use]
pub fn plan_progress_from_content(content: &str) -> PlanProgress {
    let mut progress = PlanProgress::default();
    for line in content.lines() {
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        let Some(rest) = rest else { continue };
        if rest.starts_with("[ ]") {
            progress.total += 1;
        } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
            progress.total += 1;
            progress.completed += 1;
        }
    }
    progress
}

/// Read the active plan document and project its progress.
///
/// `record_path` is the boulder record's own path; a relative `active_plan`
/// is resolved against its directory.
#[must_use]
pub fn get_plan_progress(record_path: &Path, state: &BoulderState) -> Option<PlanProgress> {
    let plan = state.active_plan.as_deref()?;
    let plan_path = {
        let p = Path::new(plan);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            record_path.parent().unwrap_or(Path::new(".")).join(p)
        }
    };
    let content = fs::read_to_string(&plan_path).ok()?;
    Some(plan_progress_from_content(&content))
}

/// Append a session id to the boulder record if absent.
///
/// Returns `Ok(true)` when the record was modified.
pub fn append_session_id(path: &Path, session_id: &str) -> io::Result<bool> {
    let raw = fs::read_to_string(path)?;
    let mut state: BoulderState = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if state.has_session(session_id) {
        return Ok(false);
    }
    state.session_ids.push(session_id.to_owned());
    state.updated_at = Some(chrono::Utc::now());
    let out = serde_json::to_string_pretty(&state)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, out)?;
    tracing::debug!(session_id, ?path, "session appended to boulder");
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
