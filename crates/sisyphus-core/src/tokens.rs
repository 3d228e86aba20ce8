//! Model context-window limits.
//!
//! A compiled table mapping model-name fragments to context limits. Lookup is
//! by *longest matching substring* so that e.g. `"claude-sonnet-4"` matches
//! `"anthropic/claude-sonnet-4-20250514"` while a more specific entry like
//! `"claude-sonnet-4-5"` wins when both match. Unknown models fall back to
//! [`DEFAULT_CONTEXT_LIMIT`]; the fallback is logged at debug level since it
//! means the table needs a new entry.

use crate::messages::TokenUsage;

/// Context limit assumed for models not in the table.
pub const DEFAULT_CONTEXT_LIMIT: u64 = 200_000;

/// Model-name fragment → context-window limit in tokens.
///
/// Maintained by hand; new model releases fall back to the default until an
/// entry is added.
const MODEL_CONTEXT_LIMITS: &[(&str, u64)] = &[
    ("claude-3-5-haiku", 200_000),
    ("claude-3-5-sonnet", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-sonnet-4-5", 200_000),
    ("claude-opus-4", 200_000),
    ("claude-haiku-4-5", 200_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("gpt-5", 400_000),
    ("o3", 200_000),
    ("o4-mini", 200_000),
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-2.5-pro", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    ("grok-3", 131_072),
    ("grok-4", 256_000),
    ("deepseek", 128_000),
    ("kimi-k2", 131_072),
    ("qwen3", 131_072),
];

/// Look up the context limit for a model name.
///
/// Longest matching table fragment wins; no match returns the default.
#[must_use]
pub fn context_limit_for_model(model: &str) -> u64 {
    let lower = model.to_lowercase();
    let best = MODEL_CONTEXT_LIMITS
        .iter()
        .filter(|(fragment, _)| lower.contains(fragment))
        .max_by_key(|(fragment, _)| fragment.len());

    match best {
        Some((_, limit)) => *limit,
        None => {
            tracing::debug!(model, "no context-limit entry, using default");
            DEFAULT_CONTEXT_LIMIT
        }
    }
}

/// Ratio of used context to the model's limit, in `[0.0, ∞)`.
#[must_use]
pub fn usage_ratio(usage: &TokenUsage, model: &str) -> f64 {
    let limit = context_limit_for_model(model);
    if limit == 0 {
        return 0.0;
    }
    usage.context_total() as f64 / limit as f64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_fragment_match() {
        assert_eq!(context_limit_for_model("gpt-4o"), 128_000);
    }

    #[test]
    fn substring_match_with_provider_prefix() {
        assert_eq!(
            context_limit_for_model("anthropic/claude-sonnet-4-20250514"),
            200_000
        );
    }

    #[test]
    fn longest_fragment_wins() {
        // Both "gpt-4.1" and "gpt-4.1-mini" match; the longer entry wins.
        assert_eq!(context_limit_for_model("openai/gpt-4.1-mini"), 1_047_576);
        // "gpt-4o" vs "gpt-4o-mini"
        assert_eq!(context_limit_for_model("gpt-4o-mini-2024"), 128_000);
    }

    #[test]
    fn unknown_model_uses_default() {
        assert_eq!(
            context_limit_for_model("totally-new-model"),
            DEFAULT_CONTEXT_LIMIT
        );
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(context_limit_for_model("Claude-Opus-4"), 200_000);
    }

    #[test]
    fn usage_ratio_half() {
        let usage = TokenUsage {
            input: 50_000,
            output: 10_000,
            cache_read: 4_000,
            cache_write: 0,
        };
        let ratio = usage_ratio(&usage, "gpt-4o");
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn usage_ratio_can_exceed_one() {
        let usage = TokenUsage {
            input: 300_000,
            ..TokenUsage::default()
        };
        assert!(usage_ratio(&usage, "unknown") > 1.0);
    }
}
