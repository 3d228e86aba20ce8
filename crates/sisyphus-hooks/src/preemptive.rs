//! Preemptive compaction: summarize before the window overflows.
//!
//! After every finished assistant turn (and on idle, as a catch-up), the
//! reported token usage is compared against the model's context limit.
//! Crossing the threshold triggers a proactive summarization directly —
//! prevention, not recovery, so the tiered executor is bypassed entirely.
//! An optional pre-compaction callback runs first, used to stamp
//! continuity-preserving instructions into the context about to be
//! summarized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashSet;
use futures::future::BoxFuture;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sisyphus_core::{usage_ratio, HostEvent, MessageInfo};
use sisyphus_host::HostClient;
use sisyphus_settings::CompactionSettings;

use crate::bus::EventHandler;

/// Async callback invoked with the session id just before summarizing.
pub type PreCompactHook = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// The preemptive compaction trigger.
pub struct PreemptiveCompaction {
    client: Arc<dyn HostClient>,
    settings: CompactionSettings,
    in_progress: DashSet<String>,
    last_compacted: Mutex<HashMap<String, Instant>>,
    before_compact: Option<PreCompactHook>,
}

impl PreemptiveCompaction {
    /// Wire up the trigger.
    #[must_use]
    pub fn new(client: Arc<dyn HostClient>, settings: CompactionSettings) -> Self {
        Self {
            client,
            settings,
            in_progress: DashSet::new(),
            last_compacted: Mutex::new(HashMap::new()),
            before_compact: None,
        }
    }

    /// Install a hook to run just before each proactive summarization.
    #[must_use]
    pub fn with_before_compact(mut self, hook: PreCompactHook) -> Self {
        self.before_compact = Some(hook);
        self
    }

    /// Evaluate one finished assistant message against the trigger rules.
    pub async fn check(&self, info: &MessageInfo) {
        if !self.settings.enabled || info.summary {
            return;
        }
        let Some(tokens) = info.tokens else { return };
        let total = tokens.context_total();
        if total < self.settings.min_total_tokens {
            return;
        }
        let (Some(provider), Some(model)) = (&info.provider_id, &info.model_id) else {
            return;
        };
        let ratio = usage_ratio(&tokens, model);
        if ratio < self.settings.threshold {
            return;
        }

        let session_id = &info.session_id;
        let cooldown = Duration::from_millis(self.settings.cooldown_ms);
        if self
            .last_compacted
            .lock()
            .get(session_id)
            .is_some_and(|at| at.elapsed() < cooldown)
        {
            debug!(session_id, "within compaction cooldown");
            return;
        }
        if !self.in_progress.insert(session_id.clone()) {
            return;
        }

        info!(session_id, total, ratio, model, "preemptive compaction triggered");
        counter!("hooks_preemptive_compactions_total").increment(1);
        if let Some(hook) = &self.before_compact {
            hook(session_id.clone()).await;
        }
        match self.client.summarize(session_id, provider, model).await {
            Ok(()) => {
                let _ = self
                    .last_compacted
                    .lock()
                    .insert(session_id.clone(), Instant::now());
            }
            Err(e) => warn!(session_id, error = %e, "preemptive summarize failed"),
        }
        let _ = self.in_progress.remove(session_id);
    }

    /// Idle catch-up: evaluate the last finished assistant message.
    async fn check_idle(&self, session_id: &str) {
        if !self.settings.enabled {
            return;
        }
        let messages = match self.client.messages(session_id).await {
            Ok(m) => m,
            Err(e) => {
                debug!(session_id, error = %e, "message fetch failed");
                return;
            }
        };
        let Some(last) = messages
            .iter()
            .rev()
            .find(|m| m.is_finished_assistant() && m.tokens.is_some())
        else {
            return;
        };
        self.check(last).await;
    }

    fn forget(&self, session_id: &str) {
        let _ = self.last_compacted.lock().remove(session_id);
        let _ = self.in_progress.remove(session_id);
    }
}

#[async_trait]
impl EventHandler for PreemptiveCompaction {
    fn name(&self) -> &str {
        "preemptive-compaction"
    }

    async fn on_event(&self, event: &HostEvent) {
        match event {
            HostEvent::MessageUpdated { info } if info.is_finished_assistant() => {
                self.check(info).await;
            }
            HostEvent::SessionIdle { session_id } => self.check_idle(session_id).await,
            HostEvent::SessionDeleted { session_id } => self.forget(session_id),
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockHost;
    use sisyphus_core::{Role, TokenUsage};

    fn heavy_message(session_id: &str) -> MessageInfo {
        MessageInfo {
            id: "m1".into(),
            session_id: session_id.into(),
            role: Some(Role::Assistant),
            completed_at: Some(1),
            tokens: Some(TokenUsage {
                input: 150_000,
                output: 5_000,
                cache_read: 40_000,
                cache_write: 0,
            }),
            provider_id: Some("anthropic".into()),
            model_id: Some("claude-sonnet-4-20250514".into()),
            ..MessageInfo::default()
        }
    }

    fn trigger(host: Arc<MockHost>) -> PreemptiveCompaction {
        PreemptiveCompaction::new(host, CompactionSettings::default())
    }

    #[tokio::test]
    async fn high_usage_triggers_summarize() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        hook.check(&heavy_message("s1")).await;

        let calls = host.summarize_calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "s1");
        assert_eq!(calls[0].2, "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn low_usage_does_not_trigger() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        let mut info = heavy_message("s1");
        info.tokens = Some(TokenUsage {
            input: 60_000,
            ..TokenUsage::default()
        });
        hook.check(&info).await;

        assert!(host.summarize_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn floor_blocks_small_sessions() {
        let host = Arc::new(MockHost::new());
        let settings = CompactionSettings {
            threshold: 0.1,
            min_total_tokens: 1_000_000,
            ..CompactionSettings::default()
        };
        let hook = PreemptiveCompaction::new(host.clone(), settings);

        hook.check(&heavy_message("s1")).await;
        assert!(host.summarize_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn summary_messages_skipped() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        let mut info = heavy_message("s1");
        info.summary = true;
        hook.check(&info).await;

        assert!(host.summarize_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn disabled_switch_wins() {
        let host = Arc::new(MockHost::new());
        let settings = CompactionSettings {
            enabled: false,
            ..CompactionSettings::default()
        };
        let hook = PreemptiveCompaction::new(host.clone(), settings);

        hook.check(&heavy_message("s1")).await;
        assert!(host.summarize_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn cooldown_suppresses_back_to_back_compactions() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        hook.check(&heavy_message("s1")).await;
        hook.check(&heavy_message("s1")).await;

        assert_eq!(host.summarize_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn sessions_cool_down_independently() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        hook.check(&heavy_message("s1")).await;
        hook.check(&heavy_message("s2")).await;

        assert_eq!(host.summarize_calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn callback_runs_before_summarize() {
        let host = Arc::new(MockHost::new());
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let hook = trigger(host.clone()).with_before_compact(Arc::new(move |sid| {
            let seen = seen.clone();
            Box::pin(async move {
                seen.lock().push(format!("hook:{sid}"));
            })
        }));

        hook.check(&heavy_message("s1")).await;

        assert_eq!(*order.lock(), vec!["hook:s1".to_string()]);
        assert_eq!(host.summarize_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn idle_event_catches_up() {
        let host = Arc::new(MockHost::new());
        host.set_messages("s1", vec![heavy_message("s1")]);
        let hook = trigger(host.clone());

        hook.on_event(&HostEvent::SessionIdle {
            session_id: "s1".into(),
        })
        .await;

        assert_eq!(host.summarize_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn finished_assistant_event_checked() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        hook.on_event(&HostEvent::MessageUpdated {
            info: heavy_message("s1"),
        })
        .await;
        assert_eq!(host.summarize_calls.lock().len(), 1);

        // Streaming messages are not evaluated.
        let mut streaming = heavy_message("s2");
        streaming.completed_at = None;
        hook.on_event(&HostEvent::MessageUpdated { info: streaming })
            .await;
        assert_eq!(host.summarize_calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn deletion_clears_cooldown() {
        let host = Arc::new(MockHost::new());
        let hook = trigger(host.clone());

        hook.check(&heavy_message("s1")).await;
        hook.on_event(&HostEvent::SessionDeleted {
            session_id: "s1".into(),
        })
        .await;
        hook.check(&heavy_message("s1")).await;

        assert_eq!(host.summarize_calls.lock().len(), 2);
    }
}
