//! Markdown-only write policy for the planner role.
//!
//! A planning persona produces documents, not code. Its write and edit
//! calls are restricted to `.md` files inside the reserved scratch
//! directory; everything else is rejected before the tool runs. The path
//! check is pure string policy on the requested path — no filesystem
//! access, so symlinks and nonexistent targets judge the same as real
//! files.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use sisyphus_host::MetadataStore;

use crate::tool_call::{append_prompt_directive, is_write_tool, BeforeToolCall, DELEGATE_TOOL};

/// Directory the planner is allowed to write into.
pub const RESERVED_DIR: &str = ".sisyphus";

/// Annotation appended to delegate prompts issued from a planning context.
const READ_ONLY_DIRECTIVE: &str = "IMPORTANT: This task was delegated from a planning \
     context. Treat it as read-only research: gather and report information, do not \
     create or modify files.";

/// A rejected planner write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    /// Path does not end in `.md`.
    #[error("the planner can only write/edit .md files")]
    NotMarkdown,
    /// Markdown file, but outside the reserved directory.
    #[error("the planner can only write/edit .md files inside the {RESERVED_DIR} directory")]
    OutsideReservedDir,
}

/// Normalize a path into components: both separator styles accepted,
/// `.` dropped, `..` resolved against the stack.
fn normalize(path: &str) -> Vec<&str> {
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                let _ = stack.pop();
            }
            other => stack.push(other),
        }
    }
    stack
}

/// Whether any component of the (normalized) path is the reserved
/// directory, case-insensitively.
#[must_use]
pub fn targets_reserved_dir(path: &str) -> bool {
    normalize(path)
        .iter()
        .any(|c| c.eq_ignore_ascii_case(RESERVED_DIR))
}

/// Apply the markdown-only policy to a write path.
///
/// Extension is judged before location, so a `.txt` inside the reserved
/// directory still reports the extension failure.
pub fn check_write_path(path: &str) -> Result<(), PolicyViolation> {
    let components = normalize(path);
    let Some((file, dirs)) = components.split_last() else {
        return Err(PolicyViolation::NotMarkdown);
    };
    if !file.to_ascii_lowercase().ends_with(".md") {
        return Err(PolicyViolation::NotMarkdown);
    }
    if !dirs.iter().any(|c| c.eq_ignore_ascii_case(RESERVED_DIR)) {
        return Err(PolicyViolation::OutsideReservedDir);
    }
    Ok(())
}

/// Per-call policy hook enforcing the planner's write restrictions.
pub struct MarkdownWriteGuard {
    metadata: Arc<MetadataStore>,
    planner_role: String,
}

impl MarkdownWriteGuard {
    /// Wire up the guard.
    #[must_use]
    pub fn new(metadata: Arc<MetadataStore>, planner_role: impl Into<String>) -> Self {
        Self {
            metadata,
            planner_role: planner_role.into(),
        }
    }

    /// Inspect (and possibly amend) a tool call before it executes.
    ///
    /// Returns an error when the call must be failed outright. Sessions not
    /// currently driven by the planner pass through untouched.
    pub fn on_before(&self, call: &mut BeforeToolCall) -> Result<(), PolicyViolation> {
        let agent = self
            .metadata
            .nearest_agent(&call.session_id)
            .and_then(|b| b.agent);
        if agent.as_deref() != Some(self.planner_role.as_str()) {
            return Ok(());
        }

        if is_write_tool(&call.tool) {
            let Some(path) = call.str_arg("filePath").or_else(|| call.str_arg("path")) else {
                return Ok(());
            };
            let verdict = check_write_path(path);
            if let Err(ref violation) = verdict {
                counter!("hooks_planner_writes_rejected_total").increment(1);
                debug!(
                    session_id = call.session_id,
                    path,
                    %violation,
                    "planner write rejected"
                );
            }
            return verdict;
        }

        if call.tool == DELEGATE_TOOL {
            let _ = append_prompt_directive(&mut call.args, READ_ONLY_DIRECTIVE);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
