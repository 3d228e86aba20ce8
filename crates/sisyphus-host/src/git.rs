//! Working-tree change summaries.
//!
//! Combines `git diff --numstat` (line deltas) with `git status --porcelain`
//! (add/delete/modify classification) into per-file [`GitFileStat`] records,
//! rendered as a markdown summary for splicing into delegated-task results.
//! Stats are transient — derived per tool call, never persisted.

use std::collections::HashMap;
use std::path::Path;

use tokio::process::Command;

/// Classification of a changed file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileChangeStatus {
    /// Content changed.
    Modified,
    /// New or untracked file.
    Added,
    /// Removed file.
    Deleted,
}

impl FileChangeStatus {
    fn label(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Deleted => "deleted",
        }
    }
}

/// Per-file change summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitFileStat {
    /// Path relative to the repository root.
    pub path: String,
    /// Lines added. Zero for binary files.
    pub added: u32,
    /// Lines removed. Zero for binary files.
    pub removed: u32,
    /// Change classification.
    pub status: FileChangeStatus,
}

/// Parse `git diff --numstat` output into `(path, added, removed)` triples.
///
/// Binary files report `-` for both counts; they parse as zero.
#[must_use]
pub fn parse_numstat(output: &str) -> Vec<(String, u32, u32)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let added = fields.next()?.trim();
            let removed = fields.next()?.trim();
            let path = fields.next()?.trim();
            if path.is_empty() {
                return None;
            }
            Some((
                path.to_owned(),
                added.parse().unwrap_or(0),
                removed.parse().unwrap_or(0),
            ))
        })
        .collect()
}

/// Parse `git status --porcelain` into `(path, status)` pairs.
#[must_use]
pub fn parse_porcelain(output: &str) -> Vec<(String, FileChangeStatus)> {
    output
        .lines()
        .filter_map(|line| {
            if line.len() < 4 {
                return None;
            }
            let code = &line[..2];
            let path = line[3..].trim();
            if path.is_empty() {
                return None;
            }
            // Renames report "old -> new"; keep the new path.
            let path = path.rsplit(" -> ").next().unwrap_or(path);
            let status = if code.contains('D') {
                FileChangeStatus::Deleted
            } else if code.contains('A') || code == "??" {
                FileChangeStatus::Added
            } else {
                FileChangeStatus::Modified
            };
            Some((path.to_owned(), status))
        })
        .collect()
}

/// Merge numstat deltas with porcelain classification.
///
/// Files present in only one output still appear: status defaults to
/// modified, deltas default to zero.
#[must_use]
pub fn merge_stats(
    numstat: Vec<(String, u32, u32)>,
    porcelain: Vec<(String, FileChangeStatus)>,
) -> Vec<GitFileStat> {
    let deltas: HashMap<String, (u32, u32)> = numstat
        .into_iter()
        .map(|(path, a, r)| (path, (a, r)))
        .collect();

    let mut seen: HashMap<String, GitFileStat> = HashMap::new();
    for (path, status) in porcelain {
        let (added, removed) = deltas.get(&path).copied().unwrap_or((0, 0));
        let _ = seen.insert(
            path.clone(),
            GitFileStat {
                path,
                added,
                removed,
                status,
            },
        );
    }
    for (path, (added, removed)) in deltas {
        let _ = seen.entry(path.clone()).or_insert(GitFileStat {
            path,
            added,
            removed,
            status: FileChangeStatus::Modified,
        });
    }

    let mut stats: Vec<GitFileStat> = seen.into_values().collect();
    stats.sort_by(|a, b| a.path.cmp(&b.path));
    stats
}

/// Collect change stats for the working tree at `workdir`.
///
/// Returns `None` when git is unavailable or `workdir` is not a repository —
/// callers degrade to a summary-less result rather than failing.
pub async fn collect_git_stats(workdir: &Path) -> Option<Vec<GitFileStat>> {
    let numstat = run_git(workdir, &["diff", "--numstat", "HEAD"]).await?;
    let porcelain = run_git(workdir, &["status", "--porcelain"]).await?;
    Some(merge_stats(
        parse_numstat(&numstat),
        parse_porcelain(&porcelain),
    ))
}

async fn run_git(workdir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        tracing::debug!(?args, "git command failed, skipping diff summary");
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Render stats as a markdown section.
#[must_use]
pub fn render_diff_summary(stats: &[GitFileStat]) -> String {
    if stats.is_empty() {
        return "## Working tree\n\nNo uncommitted changes detected.".to_owned();
    }
    let mut out = String::from("## Working tree changes\n\n");
    for stat in stats {
        out.push_str(&format!(
            "- {} `{}` (+{} -{})\n",
            stat.status.label(),
            stat.path,
            stat.added,
            stat.removed
        ));
    }
    let _ = out.pop();
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
