//! Tiered context-overflow recovery.
//!
//! When a session hits its context window, recovery walks a strictly
//! ordered fallback chain, least destructive first:
//!
//! 1. **Truncate** the single largest stored tool result in place.
//! 2. **Summarize** the session, with bounded exponential-backoff retries.
//! 3. **Revert** the last user/assistant message pair.
//! 4. **Give up**: clear state and tell the user to start a new session.
//!
//! Every failure re-enters the chain from the top, so an exhausted tier is
//! simply skipped on the next pass. A per-session in-progress guard keeps
//! chains single-flight; each tier announces itself with a toast so the
//! user always sees which remedy is running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use sisyphus_core::{is_context_overflow, HostEvent, MessageInfo, Role};
use sisyphus_host::{
    toast_best_effort, HostClient, MetadataStore, PromptRequest, Toast, ToastVariant,
};
use sisyphus_settings::RecoverySettings;

use crate::bus::EventHandler;
use crate::session::SessionStore;

/// Per-session attempt counters. All reset together when a chain
/// terminates; revert additionally bounds itself monotonically across the
/// chain.
#[derive(Clone, Copy, Debug, Default)]
struct RecoveryRecord {
    retry_attempt: u32,
    truncate_attempt: u32,
    revert_attempt: u32,
}

/// The overflow-recovery executor. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AutoCompact {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn HostClient>,
    metadata: Arc<MetadataStore>,
    store: Arc<SessionStore>,
    settings: RecoverySettings,
    records: Mutex<HashMap<String, RecoveryRecord>>,
    in_progress: DashSet<String>,
}

/// What a single pass through the chain decided.
enum Outcome {
    /// A tier succeeded; resume the conversation after a settle delay.
    Resume,
    /// A tier failed or partially succeeded; re-enter the chain later.
    Retry(Duration),
    /// Every tier is exhausted.
    Exhausted,
}

impl AutoCompact {
    /// Wire up the executor.
    #[must_use]
    pub fn new(
        client: Arc<dyn HostClient>,
        metadata: Arc<MetadataStore>,
        store: Arc<SessionStore>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                metadata,
                store,
                settings,
                records: Mutex::new(HashMap::new()),
                in_progress: DashSet::new(),
            }),
        }
    }

    /// Whether a recovery pass is currently in flight for a session.
    #[must_use]
    pub fn in_flight(&self, session_id: &str) -> bool {
        self.inner.in_progress.contains(session_id)
    }

    /// Run one pass of the recovery chain for a session.
    ///
    /// Re-entrant calls while a pass is in flight are dropped (single
    /// flight per session).
    #[instrument(skip(self))]
    pub async fn run(&self, session_id: &str) {
        if !self.inner.in_progress.insert(session_id.to_owned()) {
            debug!(session_id, "recovery already in flight");
            return;
        }
        self.inner.store.mark_recovering(session_id);

        let outcome = self.run_tiers(session_id).await;

        let _ = self.inner.in_progress.remove(session_id);
        match outcome {
            Outcome::Resume => {
                self.clear(session_id);
                self.inner.store.mark_recovery_complete(session_id);
                self.schedule_continue(session_id);
            }
            Outcome::Retry(delay) => {
                // Keep the session marked recovering across the gap so the
                // continuation machinery stays out of the way.
                self.schedule_rerun(session_id, delay);
            }
            Outcome::Exhausted => {
                self.clear(session_id);
                self.inner.store.mark_recovery_complete(session_id);
                counter!("hooks_recovery_exhausted_total").increment(1);
                toast_best_effort(
                    self.inner.client.as_ref(),
                    Toast::new(
                        "Context recovery failed",
                        "Automatic recovery is exhausted. Please start a new session.",
                        ToastVariant::Error,
                        self.inner.settings.toast_duration_ms,
                    ),
                )
                .await;
            }
        }
    }

    async fn run_tiers(&self, session_id: &str) -> Outcome {
        if let Some(outcome) = self.try_truncate(session_id).await {
            return outcome;
        }
        if let Some(outcome) = self.try_summarize(session_id).await {
            return outcome;
        }
        if let Some(outcome) = self.try_revert(session_id).await {
            return outcome;
        }
        Outcome::Exhausted
    }

    /// Tier 1: truncate the largest stored tool result.
    async fn try_truncate(&self, session_id: &str) -> Option<Outcome> {
        let settings = &self.inner.settings.truncation;
        let attempt = {
            let records = self.inner.records.lock();
            records.get(session_id).copied().unwrap_or_default().truncate_attempt
        };
        if attempt >= settings.max_attempts {
            return None;
        }
        let largest = self.inner.metadata.largest_tool_result(session_id)?;
        if largest.len < settings.min_size_bytes {
            return None;
        }

        let attempt = {
            let mut records = self.inner.records.lock();
            let record = records.entry(session_id.to_owned()).or_default();
            record.truncate_attempt += 1;
            record.truncate_attempt
        };
        counter!("hooks_recovery_truncations_total").increment(1);
        self.tier_toast(
            session_id,
            format!(
                "Truncating largest tool result (attempt {attempt}/{})",
                settings.max_attempts
            ),
        )
        .await;

        match self.inner.metadata.truncate_tool_result(
            session_id,
            &largest.message_id,
            &largest.part_id,
            settings.keep_bytes,
        ) {
            Ok(true) => {
                info!(session_id, bytes = largest.len, "tool result truncated");
                Some(Outcome::Resume)
            }
            Ok(false) => {
                debug!(session_id, "result already small, moving on");
                None
            }
            Err(e) => {
                warn!(session_id, error = %e, "truncation failed");
                None
            }
        }
    }

    /// Tier 2: summarize the session through its last known model.
    async fn try_summarize(&self, session_id: &str) -> Option<Outcome> {
        let retry = &self.inner.settings.retry;
        let prior = {
            let records = self.inner.records.lock();
            records.get(session_id).copied().unwrap_or_default().retry_attempt
        };
        if prior >= retry.max_attempts {
            return None;
        }
        let (provider, model) = self.last_model(session_id).await?;

        let attempt = {
            let mut records = self.inner.records.lock();
            let record = records.entry(session_id.to_owned()).or_default();
            record.retry_attempt += 1;
            record.retry_attempt
        };
        counter!("hooks_recovery_summarizations_total").increment(1);
        self.tier_toast(
            session_id,
            format!("Summarizing session (attempt {attempt}/{})", retry.max_attempts),
        )
        .await;

        match self
            .inner
            .client
            .summarize(session_id, &provider, &model)
            .await
        {
            Ok(()) => {
                info!(session_id, "session summarized");
                Some(Outcome::Resume)
            }
            Err(e) => {
                warn!(session_id, attempt, error = %e, "summarize failed");
                Some(Outcome::Retry(Duration::from_millis(
                    retry.delay_for_attempt(attempt),
                )))
            }
        }
    }

    /// Tier 3: revert the last user/assistant message pair.
    async fn try_revert(&self, session_id: &str) -> Option<Outcome> {
        let max = self.inner.settings.revert_max_attempts;
        let prior = {
            let records = self.inner.records.lock();
            records.get(session_id).copied().unwrap_or_default().revert_attempt
        };
        if prior >= max {
            return None;
        }
        let messages = match self.inner.client.messages(session_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(session_id, error = %e, "message fetch failed");
                return None;
            }
        };
        let (user, assistant) = last_message_pair(&messages)?;

        let attempt = {
            let mut records = self.inner.records.lock();
            let record = records.entry(session_id.to_owned()).or_default();
            record.revert_attempt += 1;
            record.revert_attempt
        };
        counter!("hooks_recovery_reverts_total").increment(1);
        self.tier_toast(
            session_id,
            format!("Reverting last message pair (attempt {attempt}/{max})"),
        )
        .await;

        // Assistant first, then the user message that provoked it.
        if let Some(assistant) = assistant {
            if let Err(e) = self.inner.client.revert(session_id, assistant, None).await {
                warn!(session_id, error = %e, "assistant revert failed");
                return Some(Outcome::Retry(Duration::from_millis(
                    self.inner.settings.resume_delay_ms,
                )));
            }
        }
        if let Err(e) = self.inner.client.revert(session_id, user, None).await {
            warn!(session_id, error = %e, "user revert failed");
            return Some(Outcome::Retry(Duration::from_millis(
                self.inner.settings.resume_delay_ms,
            )));
        }

        // A shorter history may make truncation or summarization viable
        // again; only the revert budget stays spent.
        {
            let mut records = self.inner.records.lock();
            if let Some(record) = records.get_mut(session_id) {
                record.retry_attempt = 0;
                record.truncate_attempt = 0;
            }
        }
        info!(session_id, "message pair reverted");
        Some(Outcome::Retry(Duration::from_millis(
            self.inner.settings.resume_delay_ms,
        )))
    }

    /// Provider/model of the most recent assistant message that carries one.
    async fn last_model(&self, session_id: &str) -> Option<(String, String)> {
        let messages = self.inner.client.messages(session_id).await.ok()?;
        messages.iter().rev().find_map(|m| {
            if m.role != Some(Role::Assistant) {
                return None;
            }
            Some((m.provider_id.clone()?, m.model_id.clone()?))
        })
    }

    async fn tier_toast(&self, _session_id: &str, message: String) {
        toast_best_effort(
            self.inner.client.as_ref(),
            Toast::new(
                "Context recovery",
                message,
                ToastVariant::Warning,
                self.inner.settings.toast_duration_ms,
            ),
        )
        .await;
    }

    fn schedule_rerun(&self, session_id: &str, delay: Duration) {
        debug!(session_id, ?delay, "recovery rerun scheduled");
        let this = self.clone();
        let sid = session_id.to_owned();
        let _handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.run(&sid).await;
        });
    }

    /// After a successful tier, let the host settle and nudge the agent on.
    ///
    /// The nudge is addressed to the same agent/model as the in-flight
    /// conversation when the metadata store knows it.
    fn schedule_continue(&self, session_id: &str) {
        let this = self.clone();
        let sid = session_id.to_owned();
        let delay = Duration::from_millis(this.inner.settings.resume_delay_ms);
        let _handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut request = PromptRequest::text(&sid, "Continue");
            if let Some(binding) = this.inner.metadata.nearest_agent(&sid) {
                if let Some(agent) = binding.agent {
                    request = request.with_agent(agent);
                }
                if let (Some(provider), Some(model)) = (binding.provider_id, binding.model_id) {
                    request = request.with_model(provider, model);
                }
            }
            if let Err(e) = this.inner.client.prompt(request).await {
                warn!(session_id = sid, error = %e, "resume prompt failed");
            }
        });
    }

    /// Drop all per-session recovery state.
    pub fn clear(&self, session_id: &str) {
        let _ = self.inner.records.lock().remove(session_id);
    }
}

/// Last user message id plus the assistant reply following it, if any.
fn last_message_pair(messages: &[MessageInfo]) -> Option<(&str, Option<&str>)> {
    let user_idx = messages.iter().rposition(|m| m.role == Some(Role::User))?;
    let assistant = messages[user_idx + 1..]
        .iter()
        .rev()
        .find(|m| m.role == Some(Role::Assistant))
        .map(|m| m.id.as_str());
    Some((messages[user_idx].id.as_str(), assistant))
}

#[async_trait]
impl EventHandler for AutoCompact {
    fn name(&self) -> &str {
        "auto-compact"
    }

    async fn on_event(&self, event: &HostEvent) {
        match event {
            HostEvent::SessionError {
                session_id: Some(session_id),
                error,
            } if is_context_overflow(error) => {
                self.run(session_id).await;
            }
            HostEvent::SessionDeleted { session_id } => {
                self.clear(session_id);
                let _ = self.inner.in_progress.remove(session_id);
            }
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
