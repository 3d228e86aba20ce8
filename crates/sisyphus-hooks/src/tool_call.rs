//! Mutable tool-call envelopes for the before/after hook points.
//!
//! Unlike the read-only event stream, these flow through the host's tool
//! pipeline synchronously: a hook that edits `args`, `notice`, or `output`
//! changes what the tool (or the model) actually sees.

use serde_json::Value;

/// Tool names that write files.
pub const WRITE_TOOLS: &[&str] = &["write", "edit", "patch"];

/// Tool name that delegates work to a subagent.
pub const DELEGATE_TOOL: &str = "task";

/// Whether a tool name is a file-writing tool.
#[must_use]
pub fn is_write_tool(tool: &str) -> bool {
    WRITE_TOOLS.contains(&tool)
}

/// Append a directive to a delegate call's `prompt` argument.
///
/// Idempotent: returns false without modifying anything when the directive
/// is already present or the argument is not a string.
pub fn append_prompt_directive(args: &mut Value, directive: &str) -> bool {
    let Some(prompt) = args.get("prompt").and_then(Value::as_str) else {
        return false;
    };
    if prompt.contains(directive) {
        return false;
    }
    let amended = format!("{prompt}\n\n{directive}");
    args["prompt"] = Value::String(amended);
    true
}

/// A tool call about to execute.
#[derive(Clone, Debug, PartialEq)]
pub struct BeforeToolCall {
    /// Owning session.
    pub session_id: String,
    /// Tool call identifier, stable across before/after.
    pub call_id: String,
    /// Tool name as the host registered it.
    pub tool: String,
    /// Tool arguments; hooks may rewrite these in place.
    pub args: Value,
    /// Warning surfaced alongside the call in the transcript, if set.
    pub notice: Option<String>,
}

impl BeforeToolCall {
    /// Build an envelope for a tool invocation.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        call_id: impl Into<String>,
        tool: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            call_id: call_id.into(),
            tool: tool.into(),
            args,
            notice: None,
        }
    }

    /// String argument by key, when present.
    #[must_use]
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// A tool call that just finished.
#[derive(Clone, Debug, PartialEq)]
pub struct AfterToolCall {
    /// Owning session.
    pub session_id: String,
    /// Tool call identifier, stable across before/after.
    pub call_id: String,
    /// Tool name as the host registered it.
    pub tool: String,
    /// Display title the tool reported.
    pub title: String,
    /// Tool output; hooks may append to or rewrite this before the model
    /// sees it.
    pub output: String,
}

impl AfterToolCall {
    /// Build an envelope for a finished tool invocation.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        call_id: impl Into<String>,
        tool: impl Into<String>,
        title: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            call_id: call_id.into(),
            tool: tool.into(),
            title: title.into(),
            output: output.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
