//! Todo continuation: re-prompt an agent that went idle with open todos.
//!
//! Idleness starts a short countdown with progress toasts; any sign of
//! renewed activity (a new message, a streaming delta, a tool call) bumps
//! the session version and the countdown evaporates. When the countdown
//! survives, every precondition is re-validated from scratch before the
//! continuation prompt is sent — the world may have moved while we slept.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, instrument, warn};

use sisyphus_core::{incomplete_count, is_user_abort, HostEvent, Role};
use sisyphus_host::{
    toast_best_effort, HostClient, MetadataStore, PromptRequest, Toast, ToastVariant,
};
use sisyphus_settings::ContinuationSettings;

use crate::background::BackgroundTasks;
use crate::bus::EventHandler;
use crate::session::{Mode, SessionStore};

/// The todo-continuation coordinator.
#[derive(Clone)]
pub struct TodoContinuation {
    client: Arc<dyn HostClient>,
    store: Arc<SessionStore>,
    metadata: Arc<MetadataStore>,
    background: Arc<BackgroundTasks>,
    settings: ContinuationSettings,
    planner_role: String,
}

impl TodoContinuation {
    /// Wire up the coordinator.
    #[must_use]
    pub fn new(
        client: Arc<dyn HostClient>,
        store: Arc<SessionStore>,
        metadata: Arc<MetadataStore>,
        background: Arc<BackgroundTasks>,
        settings: ContinuationSettings,
        planner_role: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            metadata,
            background,
            settings,
            planner_role: planner_role.into(),
        }
    }

    /// React to a session going idle: maybe start a countdown.
    #[instrument(skip(self))]
    async fn handle_idle(&self, session_id: &str) {
        if self.store.mode(session_id) != Mode::Idle {
            debug!(session_id, "busy, idle ignored");
            return;
        }
        if self.metadata.is_subagent(session_id) {
            return;
        }
        let todos = match self.client.todos(session_id).await {
            Ok(todos) => todos,
            Err(e) => {
                warn!(session_id, error = %e, "todo fetch failed");
                return;
            }
        };
        let remaining = incomplete_count(&todos);
        if remaining == 0 {
            return;
        }
        if self.background.has_running(session_id) {
            debug!(session_id, "background tasks running, not continuing");
            return;
        }
        // The awaits above were suspension points; begin_countdown re-checks
        // that the session is still idle before committing.
        let Some(version) = self.store.begin_countdown(session_id) else {
            return;
        };
        debug!(session_id, version, remaining, "countdown started");

        let this = self.clone();
        let sid = session_id.to_owned();
        let task = tokio::spawn(async move {
            this.countdown(&sid, version, remaining).await;
        });
        self.store.set_timer(session_id, task.abort_handle());
    }

    /// Tick down with progress toasts, then attempt the injection.
    async fn countdown(&self, session_id: &str, version: u64, remaining: usize) {
        let tick = self.settings.tick_ms.max(1);
        let mut left = self.settings.countdown_ms;
        while left > 0 {
            if !self.store.is_current(session_id, version, Mode::CountingDown) {
                return;
            }
            let secs = left.div_ceil(1_000);
            toast_best_effort(
                self.client.as_ref(),
                Toast::new(
                    "Todo continuation",
                    format!("Continuing in {secs}s ({remaining} remaining)"),
                    ToastVariant::Info,
                    self.settings.toast_duration_ms,
                ),
            )
            .await;
            let step = left.min(tick);
            tokio::time::sleep(Duration::from_millis(step)).await;
            left -= step;
        }
        self.try_inject(session_id, version).await;
    }

    /// Re-validate everything and send the continuation prompt.
    async fn try_inject(&self, session_id: &str, version: u64) {
        let min_interval = Duration::from_millis(self.settings.min_injection_interval_ms);
        if !self.store.begin_injection(session_id, version, min_interval) {
            return;
        }

        // Conditions observed before the countdown may no longer hold.
        let remaining = match self.client.todos(session_id).await {
            Ok(todos) => incomplete_count(&todos),
            Err(e) => {
                warn!(session_id, error = %e, "todo re-fetch failed");
                self.store.end_injection(session_id, version);
                return;
            }
        };
        if remaining == 0
            || self.background.has_running(session_id)
            || !self.store.is_current(session_id, version, Mode::Injecting)
        {
            self.store.end_injection(session_id, version);
            return;
        }

        let Some(binding) = self.metadata.nearest_agent(session_id) else {
            debug!(session_id, "no agent binding, not continuing");
            self.store.end_injection(session_id, version);
            return;
        };
        let agent = binding.agent.as_deref().unwrap_or_default().to_owned();
        if !binding.can_write || agent == self.planner_role {
            debug!(session_id, agent, "agent not eligible for continuation");
            self.store.end_injection(session_id, version);
            return;
        }

        let text = format!(
            "Continue with the incomplete items on your todo list \
             ({remaining} remaining). Mark each item completed as you finish it."
        );
        let mut request = PromptRequest::text(session_id, text).with_agent(agent);
        if let (Some(provider), Some(model)) = (binding.provider_id, binding.model_id) {
            request = request.with_model(provider, model);
        }
        match self.client.prompt(request).await {
            Ok(()) => {
                counter!("hooks_continuations_total").increment(1);
                debug!(session_id, remaining, "continuation prompt sent");
            }
            Err(e) => warn!(session_id, error = %e, "continuation prompt failed"),
        }
        self.store.end_injection(session_id, version);
    }
}

#[async_trait]
impl EventHandler for TodoContinuation {
    fn name(&self) -> &str {
        "todo-continuation"
    }

    async fn on_event(&self, event: &HostEvent) {
        match event {
            HostEvent::SessionIdle { session_id } => self.handle_idle(session_id).await,

            HostEvent::MessageUpdated { info } => {
                if info.role == Some(Role::User) {
                    self.store.clear_error_bypass(&info.session_id);
                    let _ = self.store.invalidate(&info.session_id);
                } else if info.is_streaming_assistant() {
                    let _ = self.store.invalidate(&info.session_id);
                }
            }

            HostEvent::MessagePartUpdated { part } => {
                if part.role == Some(Role::Assistant) {
                    let _ = self.store.invalidate(&part.session_id);
                }
            }

            HostEvent::ToolExecuteBefore { session_id, .. }
            | HostEvent::ToolExecuteAfter { session_id, .. } => {
                let _ = self.store.invalidate(session_id);
            }

            HostEvent::SessionError { session_id, error } => {
                if let Some(session_id) = session_id {
                    self.store.mark_error(session_id, is_user_abort(error));
                }
            }

            HostEvent::SessionDeleted { session_id } => {
                self.store.remove(session_id);
                self.background.clear_session(session_id);
            }

            HostEvent::Other(_) => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
