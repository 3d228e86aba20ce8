//! Per-session coordination state.
//!
//! One [`SessionStore`] instance is shared by the continuation coordinator
//! and the orchestrator policy's idle half; each holds it by `Arc`. Records
//! are created lazily on first touch and removed on `session.deleted`.
//!
//! ## Version tokens
//!
//! Every record carries a monotonically increasing `version`. Asynchronous
//! work (countdown timers, awaited host calls) captures the version when it
//! starts and re-checks it before each externally visible effect; any event
//! that should cancel in-flight work just bumps the counter. Late-arriving
//! stale callbacks then self-discard — no cancellation token threading.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

/// Coordination mode of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Countdown timer running toward an injection.
    CountingDown,
    /// Injection re-validation / prompt send in progress.
    Injecting,
    /// Externally controlled history rewrite; suppresses all transitions.
    Recovering,
    /// Session errored; suppressed until the next user message.
    ErrorBypass,
}

#[derive(Default)]
struct SessionState {
    mode: Mode,
    version: u64,
    timer: Option<AbortHandle>,
    last_attempt: Option<Instant>,
    /// Whether the last error looked like a user-initiated abort.
    abort_seen: bool,
}

impl SessionState {
    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Session-keyed store of coordination state.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode for a session (untracked sessions are idle).
    #[must_use]
    pub fn mode(&self, session_id: &str) -> Mode {
        self.inner
            .lock()
            .get(session_id)
            .map(|s| s.mode)
            .unwrap_or_default()
    }

    /// Current version for a session (untracked sessions are at 0).
    #[must_use]
    pub fn version(&self, session_id: &str) -> u64 {
        self.inner
            .lock()
            .get(session_id)
            .map(|s| s.version)
            .unwrap_or(0)
    }

    /// Whether a captured version is still current *and* the session is in
    /// the given mode. The staleness check used at every await point.
    #[must_use]
    pub fn is_current(&self, session_id: &str, version: u64, mode: Mode) -> bool {
        self.inner
            .lock()
            .get(session_id)
            .is_some_and(|s| s.version == version && s.mode == mode)
    }

    /// Whether the last recorded error looked user-initiated.
    #[must_use]
    pub fn abort_seen(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .get(session_id)
            .is_some_and(|s| s.abort_seen)
    }

    /// Universal "something happened" rule: bump the version, clear any
    /// pending timer, and force the mode back to idle.
    ///
    /// `Recovering` and `ErrorBypass` survive invalidation — the former is
    /// owned by an external controller, the latter persists until an
    /// explicit user message clears it. The version still bumps so stale
    /// in-flight work dies either way.
    pub fn invalidate(&self, session_id: &str) -> u64 {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        let version = state.bump();
        state.clear_timer();
        if !matches!(state.mode, Mode::Recovering | Mode::ErrorBypass) {
            state.mode = Mode::Idle;
        }
        version
    }

    /// Record a session error. Enters `ErrorBypass` unless recovering.
    pub fn mark_error(&self, session_id: &str, user_abort: bool) {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        let _ = state.bump();
        state.clear_timer();
        state.abort_seen = user_abort;
        if state.mode != Mode::Recovering {
            state.mode = Mode::ErrorBypass;
        }
    }

    /// A user message arrived: leave `ErrorBypass` (no-op otherwise).
    pub fn clear_error_bypass(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.get_mut(session_id) {
            if state.mode == Mode::ErrorBypass {
                state.mode = Mode::Idle;
                state.abort_seen = false;
            }
        }
    }

    /// Enter `Recovering` on behalf of an external history-rewrite
    /// controller. Invalidation becomes a version-bump-only until cleared.
    pub fn mark_recovering(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        let _ = state.bump();
        state.clear_timer();
        state.mode = Mode::Recovering;
        debug!(session_id, "session marked recovering");
    }

    /// Leave `Recovering`.
    pub fn mark_recovery_complete(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.get_mut(session_id) {
            if state.mode == Mode::Recovering {
                let _ = state.bump();
                state.mode = Mode::Idle;
                debug!(session_id, "session recovery complete");
            }
        }
    }

    /// Start a countdown: only from `Idle`. Returns the captured version.
    #[must_use]
    pub fn begin_countdown(&self, session_id: &str) -> Option<u64> {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        if state.mode != Mode::Idle {
            return None;
        }
        let version = state.bump();
        state.mode = Mode::CountingDown;
        Some(version)
    }

    /// Attach the countdown timer handle, aborting any previous one.
    ///
    /// At most one live timer per session at any instant.
    pub fn set_timer(&self, session_id: &str, handle: AbortHandle) {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        state.clear_timer();
        state.timer = Some(handle);
    }

    /// Atomically transition `CountingDown` → `Injecting`.
    ///
    /// Fails when the captured version is stale, the mode has moved on, or
    /// the last attempt was less than `min_interval` ago. On success the
    /// attempt timestamp is stamped immediately — spacing is enforced
    /// regardless of the attempt's outcome.
    #[must_use]
    pub fn begin_injection(
        &self,
        session_id: &str,
        version: u64,
        min_interval: Duration,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(state) = inner.get_mut(session_id) else {
            return false;
        };
        if state.version != version || state.mode != Mode::CountingDown {
            return false;
        }
        if state
            .last_attempt
            .is_some_and(|at| at.elapsed() < min_interval)
        {
            debug!(session_id, "injection throttled");
            // Countdown is over either way; don't leave the mode dangling.
            state.mode = Mode::Idle;
            state.timer = None;
            return false;
        }
        state.mode = Mode::Injecting;
        state.last_attempt = Some(Instant::now());
        state.timer = None;
        true
    }

    /// Leave `Injecting` for `Idle`, unless an invalidation got there first.
    pub fn end_injection(&self, session_id: &str, version: u64) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.get_mut(session_id) {
            if state.version == version && state.mode == Mode::Injecting {
                state.mode = Mode::Idle;
            }
        }
    }

    /// Throttle gate for direct (countdown-less) injections.
    ///
    /// Returns true and stamps the attempt when at least `min_interval` has
    /// passed since the last one and the session is idle.
    #[must_use]
    pub fn note_attempt(&self, session_id: &str, min_interval: Duration) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.entry(session_id.to_owned()).or_default();
        if state.mode != Mode::Idle {
            return false;
        }
        if state
            .last_attempt
            .is_some_and(|at| at.elapsed() < min_interval)
        {
            return false;
        }
        state.last_attempt = Some(Instant::now());
        true
    }

    /// Drop all state for a deleted session, cancelling any pending timer.
    pub fn remove(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(mut state) = inner.remove(session_id) {
            state.clear_timer();
        }
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_session_is_idle_at_version_zero() {
        let store = SessionStore::new();
        assert_eq!(store.mode("s1"), Mode::Idle);
        assert_eq!(store.version("s1"), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn invalidate_strictly_increases_version() {
        let store = SessionStore::new();
        let mut last = store.version("s1");
        for _ in 0..10 {
            let v = store.invalidate("s1");
            assert!(v > last);
            last = v;
        }
    }

    #[test]
    fn captured_version_stale_after_invalidation() {
        let store = SessionStore::new();
        let captured = store.begin_countdown("s1").unwrap();
        assert!(store.is_current("s1", captured, Mode::CountingDown));

        let _ = store.invalidate("s1");
        assert!(!store.is_current("s1", captured, Mode::CountingDown));
    }

    #[test]
    fn begin_countdown_only_from_idle() {
        let store = SessionStore::new();
        let v1 = store.begin_countdown("s1").unwrap();
        // Already counting down — second countdown refused.
        assert!(store.begin_countdown("s1").is_none());

        assert!(store.begin_injection("s1", v1, Duration::ZERO));
        // Injecting — also refused.
        assert!(store.begin_countdown("s1").is_none());
    }

    #[test]
    fn injection_requires_current_version() {
        let store = SessionStore::new();
        let v = store.begin_countdown("s1").unwrap();
        let _ = store.invalidate("s1");
        assert!(!store.begin_injection("s1", v, Duration::ZERO));
    }

    #[test]
    fn injection_single_flight() {
        let store = SessionStore::new();
        let v = store.begin_countdown("s1").unwrap();
        assert!(store.begin_injection("s1", v, Duration::ZERO));
        // A second injection attempt with the same token must fail: the mode
        // already moved past CountingDown.
        assert!(!store.begin_injection("s1", v, Duration::ZERO));
    }

    #[test]
    fn injection_throttled_by_min_interval() {
        let store = SessionStore::new();
        let v1 = store.begin_countdown("s1").unwrap();
        assert!(store.begin_injection("s1", v1, Duration::from_secs(10)));
        store.end_injection("s1", v1);

        let v2 = store.begin_countdown("s1").unwrap();
        // Attempted immediately, inside the 10s window.
        assert!(!store.begin_injection("s1", v2, Duration::from_secs(10)));
        // Refusal settles the session back to idle.
        assert_eq!(store.mode("s1"), Mode::Idle);
    }

    #[test]
    fn end_injection_returns_to_idle() {
        let store = SessionStore::new();
        let v = store.begin_countdown("s1").unwrap();
        assert!(store.begin_injection("s1", v, Duration::ZERO));
        store.end_injection("s1", v);
        assert_eq!(store.mode("s1"), Mode::Idle);
    }

    #[test]
    fn end_injection_ignores_stale_version() {
        let store = SessionStore::new();
        let v = store.begin_countdown("s1").unwrap();
        assert!(store.begin_injection("s1", v, Duration::ZERO));
        let newer = store.invalidate("s1");
        store.end_injection("s1", v);
        assert_eq!(store.version("s1"), newer);
    }

    #[test]
    fn error_bypass_survives_invalidation() {
        let store = SessionStore::new();
        store.mark_error("s1", false);
        assert_eq!(store.mode("s1"), Mode::ErrorBypass);

        let _ = store.invalidate("s1");
        assert_eq!(store.mode("s1"), Mode::ErrorBypass);

        store.clear_error_bypass("s1");
        assert_eq!(store.mode("s1"), Mode::Idle);
    }

    #[test]
    fn error_records_abort_flag() {
        let store = SessionStore::new();
        store.mark_error("s1", true);
        assert!(store.abort_seen("s1"));

        store.clear_error_bypass("s1");
        assert!(!store.abort_seen("s1"));
    }

    #[test]
    fn recovering_suppresses_mode_changes() {
        let store = SessionStore::new();
        store.mark_recovering("s1");
        assert_eq!(store.mode("s1"), Mode::Recovering);

        // Invalidation bumps the version but leaves the mode alone.
        let before = store.version("s1");
        let after = store.invalidate("s1");
        assert!(after > before);
        assert_eq!(store.mode("s1"), Mode::Recovering);

        // Errors don't displace recovering either.
        store.mark_error("s1", false);
        assert_eq!(store.mode("s1"), Mode::Recovering);

        // Countdown refused while recovering.
        assert!(store.begin_countdown("s1").is_none());

        store.mark_recovery_complete("s1");
        assert_eq!(store.mode("s1"), Mode::Idle);
    }

    #[test]
    fn recovery_complete_noop_when_not_recovering() {
        let store = SessionStore::new();
        let _ = store.invalidate("s1");
        let v = store.version("s1");
        store.mark_recovery_complete("s1");
        assert_eq!(store.version("s1"), v);
        assert_eq!(store.mode("s1"), Mode::Idle);
    }

    #[test]
    fn remove_forgets_session() {
        let store = SessionStore::new();
        let _ = store.invalidate("s1");
        assert_eq!(store.len(), 1);
        store.remove("s1");
        assert!(store.is_empty());
        assert_eq!(store.version("s1"), 0);
    }

    #[test]
    fn note_attempt_throttles() {
        let store = SessionStore::new();
        assert!(store.note_attempt("s1", Duration::from_secs(10)));
        assert!(!store.note_attempt("s1", Duration::from_secs(10)));
        // Zero interval always passes.
        assert!(store.note_attempt("s1", Duration::ZERO));
    }

    #[test]
    fn note_attempt_requires_idle() {
        let store = SessionStore::new();
        let _ = store.begin_countdown("s1").unwrap();
        assert!(!store.note_attempt("s1", Duration::ZERO));
    }

    #[tokio::test]
    async fn set_timer_aborts_previous() {
        let store = SessionStore::new();
        let first = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let first_handle = first.abort_handle();
        store.set_timer("s1", first.abort_handle());

        let second = tokio::spawn(async {});
        store.set_timer("s1", second.abort_handle());

        // The first timer was aborted when the second was attached.
        assert!(first_handle.is_finished() || first.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn invalidate_cancels_pending_timer() {
        let store = SessionStore::new();
        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        store.set_timer("s1", timer.abort_handle());

        let _ = store.invalidate("s1");
        assert!(timer.await.unwrap_err().is_cancelled());
    }
}
