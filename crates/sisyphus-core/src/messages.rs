//! Message roles, token usage, and todo items as reported by the host.

use serde::{Deserialize, Serialize};

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
}

/// Token usage reported for an assistant message.
///
/// All fields default to zero so partially reported usage still
/// deserializes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub input: u64,
    /// Output (completion) tokens.
    pub output: u64,
    /// Tokens served from prompt cache.
    pub cache_read: u64,
    /// Tokens written to prompt cache.
    pub cache_write: u64,
}

impl TokenUsage {
    /// Total tokens counted against the context window.
    ///
    /// Cache writes are already included in `input` by every provider we
    /// consume, so they are excluded here.
    #[must_use]
    pub fn context_total(&self) -> u64 {
        self.input + self.cache_read + self.output
    }
}

/// Status of a todo item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not yet started.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl TodoStatus {
    /// Whether this status counts as still needing work.
    #[must_use]
    pub fn is_incomplete(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A single todo item fetched from the host (read-only view).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Stable todo identifier.
    pub id: String,
    /// Human-readable task description.
    pub content: String,
    /// Current status.
    pub status: TodoStatus,
    /// Priority label as the host reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl Todo {
    /// Whether this todo still needs work.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.status.is_incomplete()
    }
}

/// Count the incomplete items in a todo list.
#[must_use]
pub fn incomplete_count(todos: &[Todo]) -> usize {
    todos.iter().filter(|t| t.is_incomplete()).count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
