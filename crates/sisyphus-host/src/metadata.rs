//! File-backed per-session message metadata.
//!
//! The host maintains a metadata directory keyed by session id; this store
//! reads it to answer "which agent produced the most recent message?" and to
//! find oversized stored tool results for the recovery truncate tier. Reads
//! are unlocked — any race with a host write is tolerated because every
//! consumer re-validates before acting.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<session_id>/session.json                     optional session record
//! <root>/<session_id>/messages/<message_id>.json       per-message metadata
//! <root>/<session_id>/parts/<message_id>/<part_id>.json  stored tool results
//! ```
//!
//! Message ids sort lexicographically in creation order (host-issued
//! monotonic ids), so "nearest message" is the highest-sorting file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sisyphus_core::text::elide;

/// Agent/model/permission fields recorded for a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentBinding {
    /// Agent persona name.
    pub agent: Option<String>,
    /// Provider that served the message.
    pub provider_id: Option<String>,
    /// Model that produced the message.
    pub model_id: Option<String>,
    /// Whether the agent's tool permissions include file writes.
    pub can_write: bool,
}

/// Optional per-session record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecord {
    /// Parent session, set for subagent sessions.
    pub parent_id: Option<String>,
}

/// A stored tool result located by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToolResult {
    /// Owning message.
    pub message_id: String,
    /// Part identifier.
    pub part_id: String,
    /// Output size in bytes.
    pub len: usize,
}

/// On-disk shape of a stored tool result part.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ToolResultRecord {
    call_id: String,
    tool: String,
    output: String,
}

/// Read-mostly view over the host's message-metadata directory.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    /// Open a store rooted at `root`. The directory need not exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Whether the session is a subagent (child) session.
    ///
    /// A missing or unreadable session record means main session.
    #[must_use]
    pub fn is_subagent(&self, session_id: &str) -> bool {
        let path = self.session_dir(session_id).join("session.json");
        read_json::<SessionRecord>(&path)
            .map(|r| r.parent_id.is_some())
            .unwrap_or(false)
    }

    /// Find the agent binding of the most recent message that recorded one.
    ///
    /// Returns `None` when the session has no messages with agent metadata.
    #[must_use]
    pub fn nearest_agent(&self, session_id: &str) -> Option<AgentBinding> {
        let dir = self.session_dir(session_id).join("messages");
        let mut ids = list_file_stems(&dir);
        ids.sort_unstable();
        for id in ids.iter().rev() {
            let path = dir.join(format!("{id}.json"));
            if let Some(binding) = read_json::<AgentBinding>(&path) {
                if binding.agent.is_some() {
                    return Some(binding);
                }
            }
        }
        None
    }

    /// Find the single largest stored tool result for a session.
    #[must_use]
    pub fn largest_tool_result(&self, session_id: &str) -> Option<StoredToolResult> {
        let parts_dir = self.session_dir(session_id).join("parts");
        let mut largest: Option<StoredToolResult> = None;
        for message_id in list_dir_names(&parts_dir) {
            let message_dir = parts_dir.join(&message_id);
            for part_id in list_file_stems(&message_dir) {
                let path = message_dir.join(format!("{part_id}.json"));
                let Some(record) = read_json::<ToolResultRecord>(&path) else {
                    continue;
                };
                let len = record.output.len();
                if largest.as_ref().is_none_or(|cur| len > cur.len) {
                    largest = Some(StoredToolResult {
                        message_id: message_id.clone(),
                        part_id,
                        len,
                    });
                }
            }
        }
        largest
    }

    /// Truncate a stored tool result in place, keeping `keep_bytes`.
    ///
    /// Returns `Ok(false)` when the result already fits (nothing rewritten).
    pub fn truncate_tool_result(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: &str,
        keep_bytes: usize,
    ) -> io::Result<bool> {
        let path = self
            .session_dir(session_id)
            .join("parts")
            .join(message_id)
            .join(format!("{part_id}.json"));
        let raw = fs::read_to_string(&path)?;
        let mut record: ToolResultRecord = serde_json::from_str(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let Some(truncated) = elide(&record.output, keep_bytes) else {
            return Ok(false);
        };
        record.output = truncated;
        write_json(&path, &record)?;
        tracing::info!(session_id, message_id, part_id, keep_bytes, "tool result truncated");
        Ok(true)
    }

    /// Remove all metadata for a session (garbage collection on deletion).
    pub fn remove_session(&self, session_id: &str) -> io::Result<()> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Write side (host-owned; exposed for the host and tests) ─────────

    /// Record a session's parent link.
    pub fn write_session_record(
        &self,
        session_id: &str,
        record: &SessionRecord,
    ) -> io::Result<()> {
        let path = self.session_dir(session_id).join("session.json");
        write_json(&path, record)
    }

    /// Record agent metadata for a message.
    pub fn write_message_meta(
        &self,
        session_id: &str,
        message_id: &str,
        binding: &AgentBinding,
    ) -> io::Result<()> {
        let path = self
            .session_dir(session_id)
            .join("messages")
            .join(format!("{message_id}.json"));
        write_json(&path, binding)
    }

    /// Record a tool result part.
    pub fn write_tool_result(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: &str,
        call_id: &str,
        tool: &str,
        output: &str,
    ) -> io::Result<()> {
        let path = self
            .session_dir(session_id)
            .join("parts")
            .join(message_id)
            .join(format!("{part_id}.json"));
        write_json(
            &path,
            &ToolResultRecord {
                call_id: call_id.to_owned(),
                tool: tool.to_owned(),
                output: output.to_owned(),
            },
        )
    }

    /// Read a stored tool result's output (test/inspection helper).
    #[must_use]
    pub fn tool_result_output(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: &str,
    ) -> Option<String> {
        let path = self
            .session_dir(session_id)
            .join("parts")
            .join(message_id)
            .join(format!("{part_id}.json"));
        read_json::<ToolResultRecord>(&path).map(|r| r.output)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(?path, error = %e, "skipping malformed metadata file");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, raw)
}

fn list_file_stems(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_owned)
            } else {
                None
            }
        })
        .collect()
}

fn list_dir_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        (dir, store)
    }

    fn binding(agent: &str, can_write: bool) -> AgentBinding {
        AgentBinding {
            agent: Some(agent.into()),
            provider_id: Some("anthropic".into()),
            model_id: Some("claude-sonnet-4-20250514".into()),
            can_write,
        }
    }

    #[test]
    fn missing_session_is_main() {
        let (_dir, store) = store();
        assert!(!store.is_subagent("s1"));
    }

    #[test]
    fn parent_id_marks_subagent() {
        let (_dir, store) = store();
        store
            .write_session_record(
                "child",
                &SessionRecord {
                    parent_id: Some("root".into()),
                },
            )
            .unwrap();
        store
            .write_session_record("root", &SessionRecord::default())
            .unwrap();
        assert!(store.is_subagent("child"));
        assert!(!store.is_subagent("root"));
    }

    #[test]
    fn nearest_agent_none_without_messages() {
        let (_dir, store) = store();
        assert!(store.nearest_agent("s1").is_none());
    }

    #[test]
    fn nearest_agent_picks_latest_with_agent() {
        let (_dir, store) = store();
        store
            .write_message_meta("s1", "msg_001", &binding("prometheus", false))
            .unwrap();
        store
            .write_message_meta("s1", "msg_002", &binding("sisyphus", true))
            .unwrap();
        // Latest message has no agent recorded; lookup must skip it.
        store
            .write_message_meta("s1", "msg_003", &AgentBinding::default())
            .unwrap();

        let found = store.nearest_agent("s1").unwrap();
        assert_eq!(found.agent.as_deref(), Some("sisyphus"));
        assert!(found.can_write);
    }

    #[test]
    fn largest_tool_result_scan() {
        let (_dir, store) = store();
        store
            .write_tool_result("s1", "m1", "p1", "c1", "bash", &"a".repeat(100))
            .unwrap();
        store
            .write_tool_result("s1", "m2", "p2", "c2", "read", &"b".repeat(500))
            .unwrap();
        store
            .write_tool_result("s1", "m2", "p3", "c3", "grep", &"c".repeat(50))
            .unwrap();

        let largest = store.largest_tool_result("s1").unwrap();
        assert_eq!(largest.message_id, "m2");
        assert_eq!(largest.part_id, "p2");
        assert_eq!(largest.len, 500);
    }

    #[test]
    fn largest_tool_result_empty_session() {
        let (_dir, store) = store();
        assert!(store.largest_tool_result("s1").is_none());
    }

    #[test]
    fn truncate_rewrites_output() {
        let (_dir, store) = store();
        store
            .write_tool_result("s1", "m1", "p1", "c1", "bash", &"x".repeat(10_000))
            .unwrap();

        let rewritten = store.truncate_tool_result("s1", "m1", "p1", 2_000).unwrap();
        assert!(rewritten);

        let output = store.tool_result_output("s1", "m1", "p1").unwrap();
        assert!(output.len() < 10_000);
        assert!(output.contains("output truncated"));
    }

    #[test]
    fn truncate_noop_when_already_small() {
        let (_dir, store) = store();
        store
            .write_tool_result("s1", "m1", "p1", "c1", "bash", "small")
            .unwrap();
        let rewritten = store.truncate_tool_result("s1", "m1", "p1", 2_000).unwrap();
        assert!(!rewritten);
    }

    #[test]
    fn remove_session_is_idempotent() {
        let (_dir, store) = store();
        store
            .write_message_meta("s1", "m1", &binding("sisyphus", true))
            .unwrap();
        store.remove_session("s1").unwrap();
        store.remove_session("s1").unwrap();
        assert!(store.nearest_agent("s1").is_none());
    }

    #[test]
    fn malformed_metadata_skipped() {
        let (dir, store) = store();
        let messages = dir.path().join("s1").join("messages");
        fs::create_dir_all(&messages).unwrap();
        fs::write(messages.join("msg_002.json"), "{not json").unwrap();
        store
            .write_message_meta("s1", "msg_001", &binding("sisyphus", true))
            .unwrap();

        let found = store.nearest_agent("s1").unwrap();
        assert_eq!(found.agent.as_deref(), Some("sisyphus"));
    }
}
