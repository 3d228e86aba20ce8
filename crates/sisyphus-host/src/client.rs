//! The host's RPC-style client surface.
//!
//! Transport is the host's concern; these are shapes only. All calls are
//! suspension points in the coordinators' state machines, so every caller
//! re-checks its captured version token after awaiting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sisyphus_core::{MessageInfo, Todo};

/// Errors from host RPC calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The host rejected or failed the call.
    #[error("host call failed: {0}")]
    Rpc(String),
    /// The host connection is gone.
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Toast severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    /// Neutral progress information.
    Info,
    /// Operation succeeded.
    Success,
    /// Something needs attention.
    Warning,
    /// Operation failed.
    Error,
}

/// A toast notification request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Short title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity.
    pub variant: ToastVariant,
    /// Display duration in milliseconds.
    pub duration_ms: u64,
}

impl Toast {
    /// Build a toast.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        variant: ToastVariant,
        duration_ms: u64,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            variant,
            duration_ms,
        }
    }
}

/// A new user-role message sent into a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Target session.
    pub session_id: String,
    /// Agent persona to address, when known.
    pub agent: Option<String>,
    /// Provider to route through, when known.
    pub provider_id: Option<String>,
    /// Model to use, when known.
    pub model_id: Option<String>,
    /// Message text parts.
    pub parts: Vec<String>,
}

impl PromptRequest {
    /// Build a plain-text prompt for a session.
    #[must_use]
    pub fn text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent: None,
            provider_id: None,
            model_id: None,
            parts: vec![text.into()],
        }
    }

    /// Address the prompt to a specific agent persona.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Route the prompt through a specific provider/model pair.
    #[must_use]
    pub fn with_model(mut self, provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self.model_id = Some(model_id.into());
        self
    }
}

/// Operations the hook layer consumes from the host.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Fetch the current todo list for a session.
    async fn todos(&self, session_id: &str) -> Result<Vec<Todo>, ClientError>;

    /// Fetch message summaries for a session, oldest first.
    async fn messages(&self, session_id: &str) -> Result<Vec<MessageInfo>, ClientError>;

    /// Send a new user-role message into a session.
    async fn prompt(&self, request: PromptRequest) -> Result<(), ClientError>;

    /// Request a session summarization through the given provider/model.
    async fn summarize(
        &self,
        session_id: &str,
        provider_id: &str,
        model_id: &str,
    ) -> Result<(), ClientError>;

    /// Revert a message (optionally a single part).
    async fn revert(
        &self,
        session_id: &str,
        message_id: &str,
        part_id: Option<&str>,
    ) -> Result<(), ClientError>;

    /// Show a toast in the host UI.
    async fn show_toast(&self, toast: Toast) -> Result<(), ClientError>;
}

/// Show a toast, swallowing any failure.
///
/// Toasts are UI-only; their failure must never affect a state machine's
/// transition decision.
pub async fn toast_best_effort(client: &dyn HostClient, toast: Toast) {
    if let Err(e) = client.show_toast(toast).await {
        tracing::debug!(error = %e, "toast delivery failed (ignored)");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingToastClient {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl HostClient for FailingToastClient {
        async fn todos(&self, _: &str) -> Result<Vec<Todo>, ClientError> {
            Ok(vec![])
        }
        async fn messages(&self, _: &str) -> Result<Vec<MessageInfo>, ClientError> {
            Ok(vec![])
        }
        async fn prompt(&self, _: PromptRequest) -> Result<(), ClientError> {
            Ok(())
        }
        async fn summarize(&self, _: &str, _: &str, _: &str) -> Result<(), ClientError> {
            Ok(())
        }
        async fn revert(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), ClientError> {
            Ok(())
        }
        async fn show_toast(&self, _: Toast) -> Result<(), ClientError> {
            let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Rpc("tui not attached".into()))
        }
    }

    #[tokio::test]
    async fn toast_failure_is_swallowed() {
        let client = FailingToastClient {
            attempts: AtomicU32::new(0),
        };
        toast_best_effort(
            &client,
            Toast::new("t", "m", ToastVariant::Info, 1_000),
        )
        .await;
        assert_eq!(client.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prompt_builder() {
        let req = PromptRequest::text("s1", "Continue")
            .with_agent("sisyphus")
            .with_model("anthropic", "claude-sonnet-4-20250514");
        assert_eq!(req.session_id, "s1");
        assert_eq!(req.agent.as_deref(), Some("sisyphus"));
        assert_eq!(req.model_id.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(req.parts, vec!["Continue".to_string()]);
    }
}
