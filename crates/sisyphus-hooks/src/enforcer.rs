//! Orchestrator policy: delegate, don't implement.
//!
//! The orchestrator persona exists to split work across subagents. This
//! hook pair keeps it honest: direct file writes outside the scratch
//! directory get warned (not blocked) and tagged with a reminder on the
//! result; delegate calls get a one-atomic-task directive; and every
//! completed delegation is enriched with a live git diff summary plus a
//! demand for independent verification — subagent self-reports are not
//! trusted.
//!
//! An event-driven half keeps multi-session plans ("boulders") rolling:
//! when a tracked session idles with the plan unfinished, a continuation
//! prompt is injected, throttled through the shared session store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use sisyphus_core::HostEvent;
use sisyphus_host::{
    append_session_id, collect_git_stats, get_plan_progress, read_boulder_state,
    render_diff_summary, HostClient, MetadataStore, PromptRequest,
};

use crate::background::BackgroundTasks;
use crate::bus::EventHandler;
use crate::guard::targets_reserved_dir;
use crate::session::SessionStore;
use crate::tool_call::{
    append_prompt_directive, is_write_tool, AfterToolCall, BeforeToolCall, DELEGATE_TOOL,
};

/// Directive appended to every delegate prompt. Doubles as the idempotency
/// marker.
const SINGLE_TASK_DIRECTIVE: &str = "IMPORTANT: Delegate exactly ONE atomic task per \
     subagent invocation. If this prompt covers more than one task, stop and split it \
     into separate invocations.";

/// Warning attached to a direct write by the orchestrator.
const WRITE_WARNING: &str = "The orchestrator must delegate implementation work to \
     subagents instead of writing files directly. Proceeding, but this should have \
     been a delegation.";

/// Reminder appended to the result of such a write.
fn write_reminder(path: &str) -> String {
    format!(
        "Reminder: `{path}` was written directly by the orchestrator, bypassing \
         delegation. Delegate follow-up implementation work to a subagent and verify \
         its output independently."
    )
}

/// Pending before/after correlations are dropped after this long without a
/// matching after event (host crashed mid-call, most likely).
const PENDING_WRITE_TTL: Duration = Duration::from_secs(600);

struct PendingWrite {
    session_id: String,
    path: String,
    at: Instant,
}

/// Static wiring for the policy enforcer.
#[derive(Clone, Debug, Default)]
pub struct PolicyConfig {
    /// Role name the policy applies to.
    pub orchestrator_role: String,
    /// Path to the boulder record, when plan tracking is enabled.
    pub boulder_path: Option<PathBuf>,
    /// Working tree to summarize after delegations.
    pub workdir: Option<PathBuf>,
    /// Minimum spacing between boulder continuation prompts.
    pub min_prompt_interval_ms: u64,
}

/// The orchestrator policy enforcer.
pub struct OrchestratorPolicy {
    client: Arc<dyn HostClient>,
    metadata: Arc<MetadataStore>,
    store: Arc<SessionStore>,
    background: Arc<BackgroundTasks>,
    config: PolicyConfig,
    pending_writes: Mutex<HashMap<String, PendingWrite>>,
}

impl OrchestratorPolicy {
    /// Wire up the enforcer.
    #[must_use]
    pub fn new(
        client: Arc<dyn HostClient>,
        metadata: Arc<MetadataStore>,
        store: Arc<SessionStore>,
        background: Arc<BackgroundTasks>,
        config: PolicyConfig,
    ) -> Self {
        Self {
            client,
            metadata,
            store,
            background,
            config,
            pending_writes: Mutex::new(HashMap::new()),
        }
    }

    fn acting_as_orchestrator(&self, session_id: &str) -> bool {
        self.metadata
            .nearest_agent(session_id)
            .and_then(|b| b.agent)
            .is_some_and(|a| a == self.config.orchestrator_role)
    }

    /// Inspect and possibly amend a tool call before it executes.
    ///
    /// Never rejects; the orchestrator is warned, not blocked.
    pub fn on_before(&self, call: &mut BeforeToolCall) {
        if !self.acting_as_orchestrator(&call.session_id) {
            return;
        }

        if is_write_tool(&call.tool) {
            let Some(path) = call
                .str_arg("filePath")
                .or_else(|| call.str_arg("path"))
                .map(str::to_owned)
            else {
                return;
            };
            if targets_reserved_dir(&path) {
                return;
            }
            counter!("hooks_orchestrator_direct_writes_total").increment(1);
            debug!(session_id = call.session_id, path, "orchestrator direct write");
            call.notice = Some(WRITE_WARNING.to_owned());

            let mut pending = self.pending_writes.lock();
            pending.retain(|_, w| w.at.elapsed() < PENDING_WRITE_TTL);
            let _ = pending.insert(
                call.call_id.clone(),
                PendingWrite {
                    session_id: call.session_id.clone(),
                    path,
                    at: Instant::now(),
                },
            );
        } else if call.tool == DELEGATE_TOOL {
            let _ = append_prompt_directive(&mut call.args, SINGLE_TASK_DIRECTIVE);
        }
    }

    /// Enrich a tool result after execution.
    pub async fn on_after(&self, call: &mut AfterToolCall) {
        let pending = self.pending_writes.lock().remove(&call.call_id);
        if let Some(write) = pending {
            call.output = format!("{}\n\n{}", call.output, write_reminder(&write.path));
        }

        if call.tool != DELEGATE_TOOL || !self.acting_as_orchestrator(&call.session_id) {
            return;
        }
        if is_background_ack(&call.output) {
            return;
        }

        let mut sections: Vec<String> = Vec::new();
        if let Some(workdir) = &self.config.workdir {
            if let Some(stats) = collect_git_stats(workdir).await {
                if !stats.is_empty() {
                    sections.push(render_diff_summary(&stats));
                }
            }
        }
        sections.push(self.verification_reminder(&call.session_id));

        call.output = format!("{}\n\n{}", call.output, sections.join("\n\n"));
        counter!("hooks_delegations_enriched_total").increment(1);
    }

    /// Boulder-aware verification text for a finished delegation.
    fn verification_reminder(&self, session_id: &str) -> String {
        if let Some(path) = &self.config.boulder_path {
            if let Some(state) = read_boulder_state(path) {
                if state.is_active() {
                    if let Err(e) = append_session_id(path, session_id) {
                        warn!(session_id, error = %e, "boulder session append failed");
                    }
                    if let Some(progress) = get_plan_progress(path, &state) {
                        let name = state.plan_name.as_deref().unwrap_or("active plan");
                        return format!(
                            "## Plan Progress\nPlan: {name}\nCompleted {} of {} tasks \
                             ({} remaining).\nIndependently verify the delegated work \
                             above, check off finished tasks in the plan document, then \
                             delegate the next task.",
                            progress.completed,
                            progress.total,
                            progress.remaining()
                        );
                    }
                }
            }
        }
        "## Verification Required\nSubagent reports are not trusted at face value. \
         Independently verify the changes above (read the modified files, run the \
         relevant tests) before treating this task as complete."
            .to_owned()
    }

    /// Idle half: keep an active boulder rolling.
    #[instrument(skip(self))]
    async fn handle_idle(&self, session_id: &str) {
        let Some(path) = &self.config.boulder_path else {
            return;
        };
        let Some(state) = read_boulder_state(path) else {
            return;
        };
        if !state.is_active() || !state.has_session(session_id) {
            return;
        }
        let Some(progress) = get_plan_progress(path, &state) else {
            return;
        };
        if progress.is_complete() {
            return;
        }
        if !self.acting_as_orchestrator(session_id) {
            return;
        }
        if self.store.abort_seen(session_id) {
            debug!(session_id, "abort seen, boulder continuation suppressed");
            return;
        }
        if self.background.has_running(session_id) {
            return;
        }
        let min_interval = Duration::from_millis(self.config.min_prompt_interval_ms);
        if !self.store.note_attempt(session_id, min_interval) {
            return;
        }

        let name = state.plan_name.as_deref().unwrap_or("active plan");
        let text = format!(
            "The plan \"{name}\" still has {} task(s) remaining. Continue working the \
             plan: verify the last delegated task, check it off in the plan document, \
             then delegate the next one.",
            progress.remaining()
        );
        match self.client.prompt(PromptRequest::text(session_id, text)).await {
            Ok(()) => {
                counter!("hooks_boulder_continuations_total").increment(1);
                debug!(session_id, "boulder continuation sent");
            }
            Err(e) => warn!(session_id, error = %e, "boulder continuation failed"),
        }
    }
}

fn is_background_ack(output: &str) -> bool {
    let lowered = output.trim_start().to_ascii_lowercase();
    lowered.starts_with("background task") || lowered.contains("running in background")
}

#[async_trait]
impl EventHandler for OrchestratorPolicy {
    fn name(&self) -> &str {
        "orchestrator-policy"
    }

    async fn on_event(&self, event: &HostEvent) {
        match event {
            HostEvent::SessionIdle { session_id } => self.handle_idle(session_id).await,
            HostEvent::SessionDeleted { session_id } => {
                self.pending_writes
                    .lock()
                    .retain(|_, w| w.session_id != *session_id);
            }
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
