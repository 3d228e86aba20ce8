//! Background subtask accounting.
//!
//! Sessions with delegated work still running in the background must not be
//! re-prompted by the idle machinery; this tracker holds the per-session
//! count of such tasks. Counts are advisory and reset on session removal.

use std::collections::HashMap;

use metrics::gauge;
use parking_lot::Mutex;
use tracing::debug;

/// Per-session count of running background subtasks.
#[derive(Default)]
pub struct BackgroundTasks {
    counts: Mutex<HashMap<String, usize>>,
}

impl BackgroundTasks {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a background subtask starting under a session.
    pub fn begin(&self, session_id: &str) {
        let mut counts = self.counts.lock();
        let count = counts.entry(session_id.to_owned()).or_insert(0);
        *count += 1;
        gauge!("hooks_background_tasks", "session" => session_id.to_owned()).set(*count as f64);
        debug!(session_id, count, "background task started");
    }

    /// Record a background subtask finishing. Underflow is ignored.
    pub fn end(&self, session_id: &str) {
        let mut counts = self.counts.lock();
        let Some(count) = counts.get_mut(session_id) else {
            return;
        };
        *count = count.saturating_sub(1);
        gauge!("hooks_background_tasks", "session" => session_id.to_owned()).set(*count as f64);
        if *count == 0 {
            let _ = counts.remove(session_id);
        }
    }

    /// Whether any background subtask is running under a session.
    #[must_use]
    pub fn has_running(&self, session_id: &str) -> bool {
        self.counts.lock().get(session_id).is_some_and(|c| *c > 0)
    }

    /// Drop all accounting for a deleted session.
    pub fn clear_session(&self, session_id: &str) {
        let _ = self.counts.lock().remove(session_id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
