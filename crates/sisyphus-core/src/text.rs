//! UTF-8–safe string truncation.
//!
//! `&str[..n]` panics when `n` falls inside a multi-byte character, so all
//! truncation goes through [`truncate_str`], which snaps back to the nearest
//! char boundary. [`elide`] is the form used when rewriting oversized tool
//! output: keep a prefix and append a note stating what was dropped.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Keep the first `keep_bytes` of `s` and append an elision note.
///
/// Returns `None` when `s` already fits (no rewrite needed).
#[must_use]
pub fn elide(s: &str, keep_bytes: usize) -> Option<String> {
    if s.len() <= keep_bytes {
        return None;
    }
    let prefix = truncate_str(s, keep_bytes);
    Some(format!(
        "{prefix}\n\n[output truncated: {} of {} bytes kept]",
        prefix.len(),
        s.len()
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
