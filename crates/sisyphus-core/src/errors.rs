//! Error info carried on `session.error` events, plus the heuristic
//! predicates that classify host errors.
//!
//! Classification is deliberately pluggable: both predicates are free
//! functions over `(name, message)` so a host with a real error taxonomy can
//! substitute its own. The defaults match on substrings, which means an error
//! message that merely *mentions* "abort" will be classified as an abort —
//! an accepted trade-off of the heuristic approach.

use serde::{Deserialize, Serialize};

/// Error payload attached to a `session.error` event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorInfo {
    /// Error name / class as the host reports it.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Create an error info from name and message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Substrings that indicate a deliberate, user-initiated interruption.
const ABORT_MARKERS: &[&str] = &["abort", "cancel", "interrupt"];

/// Substrings that indicate the conversation hit the model's context window.
const OVERFLOW_MARKERS: &[&str] = &[
    "context window",
    "context length",
    "context_length",
    "maximum context",
    "prompt is too long",
    "token limit",
    "too many tokens",
    "input length and `max_tokens` exceed",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Heuristic: was this error caused by the user aborting/cancelling?
///
/// Matches on either the error name or the message. User-initiated
/// interruptions suppress automatic continuation until the next user message
/// and are never retried.
#[must_use]
pub fn is_user_abort(error: &ErrorInfo) -> bool {
    contains_any(&error.name, ABORT_MARKERS) || contains_any(&error.message, ABORT_MARKERS)
}

/// Heuristic: does this error indicate a context-window overflow?
///
/// Overflows are routed to the tiered recovery executor rather than the
/// ordinary error path.
#[must_use]
pub fn is_context_overflow(error: &ErrorInfo) -> bool {
    contains_any(&error.name, OVERFLOW_MARKERS) || contains_any(&error.message, OVERFLOW_MARKERS)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_detected_by_name() {
        assert!(is_user_abort(&ErrorInfo::new("AbortError", "stream closed")));
    }

    #[test]
    fn abort_detected_by_message() {
        assert!(is_user_abort(&ErrorInfo::new(
            "Error",
            "The operation was cancelled by the user"
        )));
    }

    #[test]
    fn abort_case_insensitive() {
        assert!(is_user_abort(&ErrorInfo::new("ABORTED", "")));
        assert!(is_user_abort(&ErrorInfo::new("", "Interrupted")));
    }

    #[test]
    fn genuine_failure_not_abort() {
        assert!(!is_user_abort(&ErrorInfo::new(
            "ProviderError",
            "rate limit exceeded"
        )));
    }

    #[test]
    fn overflow_detected_variants() {
        for msg in [
            "prompt is too long: 212000 tokens > 200000 maximum",
            "This model's maximum context length is 200000 tokens",
            "input length and `max_tokens` exceed context limit",
            "Context window exceeded",
        ] {
            assert!(is_context_overflow(&ErrorInfo::new("Error", msg)), "{msg}");
        }
    }

    #[test]
    fn ordinary_error_not_overflow() {
        assert!(!is_context_overflow(&ErrorInfo::new(
            "Error",
            "connection reset by peer"
        )));
    }

    #[test]
    fn incidental_abort_word_is_a_known_false_positive() {
        // Documented heuristic limitation: substring matching cannot tell
        // "user aborted" apart from an error that mentions aborting.
        assert!(is_user_abort(&ErrorInfo::new(
            "Error",
            "upstream aborted the connection"
        )));
    }
}
