//! Host lifecycle events consumed by the hook layer.
//!
//! The host delivers events as `{type, properties}` JSON objects;
//! [`HostEvent`] mirrors that tagging so a single `serde_json::from_value`
//! turns a raw host payload into a typed event. Events for one session are
//! delivered in the order the host observed them; no reordering or batching
//! happens on this side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ErrorInfo;
use crate::messages::{Role, TokenUsage};

/// Summary of a message attached to `message.updated`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageInfo {
    /// Message identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Author role. Absent for synthetic messages.
    pub role: Option<Role>,
    /// Completion timestamp (ms since epoch). `None` while streaming.
    pub completed_at: Option<i64>,
    /// Whether this message is itself a compaction summary.
    pub summary: bool,
    /// Token usage, when the provider reported it.
    pub tokens: Option<TokenUsage>,
    /// Provider that produced the message.
    pub provider_id: Option<String>,
    /// Model that produced the message.
    pub model_id: Option<String>,
    /// Agent persona recorded for the message.
    pub agent: Option<String>,
}

impl MessageInfo {
    /// Whether the message is an assistant message still streaming.
    #[must_use]
    pub fn is_streaming_assistant(&self) -> bool {
        self.role == Some(Role::Assistant) && self.completed_at.is_none()
    }

    /// Whether the message is a finished assistant turn.
    #[must_use]
    pub fn is_finished_assistant(&self) -> bool {
        self.role == Some(Role::Assistant) && self.completed_at.is_some()
    }
}

/// Summary of a message part attached to `message.part.updated`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartInfo {
    /// Part identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Owning message.
    pub message_id: String,
    /// Author role of the owning message.
    pub role: Option<Role>,
}

/// Typed lifecycle events from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum HostEvent {
    /// Session has gone idle (no in-flight turn).
    #[serde(rename = "session.idle")]
    SessionIdle {
        /// Session identifier.
        #[serde(rename = "sessionID")]
        session_id: String,
    },

    /// Session errored. `session_id` is absent for process-level errors.
    #[serde(rename = "session.error")]
    SessionError {
        /// Session identifier, when attributable.
        #[serde(rename = "sessionID", default)]
        session_id: Option<String>,
        /// Error payload.
        #[serde(default)]
        error: ErrorInfo,
    },

    /// A message was created or updated.
    #[serde(rename = "message.updated")]
    MessageUpdated {
        /// Message summary.
        info: MessageInfo,
    },

    /// A message part was updated (streaming delta, tool state change).
    #[serde(rename = "message.part.updated")]
    MessagePartUpdated {
        /// Part summary.
        part: PartInfo,
    },

    /// A tool call is about to execute.
    #[serde(rename = "tool.execute.before")]
    ToolExecuteBefore {
        /// Session identifier.
        #[serde(rename = "sessionID")]
        session_id: String,
        /// Tool call identifier.
        #[serde(rename = "callID")]
        call_id: String,
        /// Tool name.
        tool: String,
    },

    /// A tool call finished executing.
    #[serde(rename = "tool.execute.after")]
    ToolExecuteAfter {
        /// Session identifier.
        #[serde(rename = "sessionID")]
        session_id: String,
        /// Tool call identifier.
        #[serde(rename = "callID")]
        call_id: String,
        /// Tool name.
        tool: String,
    },

    /// Session was deleted; all per-session state must be released.
    #[serde(rename = "session.deleted")]
    SessionDeleted {
        /// Session identifier.
        #[serde(rename = "sessionID")]
        session_id: String,
    },

    /// Unrecognized event type, preserved for forward compatibility.
    #[serde(untagged)]
    Other(Value),
}

impl HostEvent {
    /// Session this event belongs to, when attributable.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionIdle { session_id }
            | Self::ToolExecuteBefore { session_id, .. }
            | Self::ToolExecuteAfter { session_id, .. }
            | Self::SessionDeleted { session_id } => Some(session_id),
            Self::SessionError { session_id, .. } => session_id.as_deref(),
            Self::MessageUpdated { info } => Some(&info.session_id),
            Self::MessagePartUpdated { part } => Some(&part.session_id),
            Self::Other(_) => None,
        }
    }

    /// Stable event-type string (matches the wire tag).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionIdle { .. } => "session.idle",
            Self::SessionError { .. } => "session.error",
            Self::MessageUpdated { .. } => "message.updated",
            Self::MessagePartUpdated { .. } => "message.part.updated",
            Self::ToolExecuteBefore { .. } => "tool.execute.before",
            Self::ToolExecuteAfter { .. } => "tool.execute.after",
            Self::SessionDeleted { .. } => "session.deleted",
            Self::Other(_) => "other",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
