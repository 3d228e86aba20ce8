//! # sisyphus-settings
//!
//! Configuration values consumed by the hook coordinators.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON deep-merges over compiled defaults during deserialization. Settings
//! are plain data handed to each coordinator's constructor — there is no
//! global singleton, which keeps coordinators independently testable.
//!
//! Loading is the minimum file reader: [`load_from_path`] parses a JSON file
//! over defaults; a missing file yields defaults. How the host discovers the
//! path is its own concern.

#![deny(unsafe_code)]

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Settings loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File read failed for a reason other than absence.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// File contents are not valid JSON for the schema.
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Root settings for the hook layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Todo-continuation coordinator settings.
    pub continuation: ContinuationSettings,
    /// Preemptive compaction trigger settings.
    pub compaction: CompactionSettings,
    /// Overflow-recovery executor settings.
    pub recovery: RecoverySettings,
    /// Agent role names.
    pub roles: RoleSettings,
}

/// Todo-continuation timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinuationSettings {
    /// Delay between detecting idleness and sending the continuation prompt.
    pub countdown_ms: u64,
    /// Interval between countdown progress toasts.
    pub tick_ms: u64,
    /// Minimum spacing between injection attempts, regardless of outcome.
    pub min_injection_interval_ms: u64,
    /// How long countdown toasts stay visible.
    pub toast_duration_ms: u64,
}

impl Default for ContinuationSettings {
    fn default() -> Self {
        Self {
            countdown_ms: 2_000,
            tick_ms: 1_000,
            min_injection_interval_ms: 10_000,
            toast_duration_ms: 1_500,
        }
    }
}

/// Preemptive compaction trigger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Master switch for proactive summarization.
    pub enabled: bool,
    /// Usage ratio at which summarization is triggered.
    pub threshold: f64,
    /// Minimum time between proactive compactions per session.
    pub cooldown_ms: u64,
    /// Floor below which the trigger never fires, whatever the ratio.
    pub min_total_tokens: u64,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            cooldown_ms: 120_000,
            min_total_tokens: 50_000,
        }
    }
}

/// Tiered overflow-recovery executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoverySettings {
    /// Summarize-tier retry/backoff.
    pub retry: RetrySettings,
    /// Truncate-tier bounds.
    pub truncation: TruncationSettings,
    /// Maximum message-pair reverts across the whole chain.
    pub revert_max_attempts: u32,
    /// Settle delay before re-sending "Continue" after a successful tier.
    pub resume_delay_ms: u64,
    /// How long recovery toasts stay visible.
    pub toast_duration_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            truncation: TruncationSettings::default(),
            revert_max_attempts: 2,
            resume_delay_ms: 1_500,
            toast_duration_ms: 4_000,
        }
    }
}

/// Exponential backoff parameters for the summarize tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Maximum summarize attempts.
    pub max_attempts: u32,
}

impl RetrySettings {
    /// Backoff delay for a 1-based attempt number, capped at the maximum.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1);
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp as i32);
        if raw.is_finite() {
            (raw as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 3,
        }
    }
}

/// Truncate-tier bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TruncationSettings {
    /// Smallest tool result worth truncating, in bytes.
    pub min_size_bytes: usize,
    /// Bytes of the result kept after truncation.
    pub keep_bytes: usize,
    /// Maximum truncations per recovery chain.
    pub max_attempts: u32,
}

impl Default for TruncationSettings {
    fn default() -> Self {
        Self {
            min_size_bytes: 5_000,
            keep_bytes: 2_000,
            max_attempts: 2,
        }
    }
}

/// Agent role names the policy hooks key off.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleSettings {
    /// Delegating persona; restricted from direct file writes.
    pub orchestrator: String,
    /// Planning persona; restricted to markdown inside the scratch dir.
    pub planner: String,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            orchestrator: "sisyphus".to_string(),
            planner: "prometheus".to_string(),
        }
    }
}

impl HookSettings {
    /// Clamp ratio fields into range.
    ///
    /// Out-of-range values are corrected with a warning rather than rejected.
    pub fn validate(&mut self) {
        if !(0.0..=1.0).contains(&self.compaction.threshold) {
            let clamped = self.compaction.threshold.clamp(0.0, 1.0);
            tracing::warn!(
                threshold = self.compaction.threshold,
                clamped,
                "compaction threshold out of range, clamped"
            );
            self.compaction.threshold = clamped;
        }
        if self.recovery.retry.backoff_factor < 1.0 {
            tracing::warn!(
                factor = self.recovery.retry.backoff_factor,
                "backoff factor below 1.0, reset to 1.0"
            );
            self.recovery.retry.backoff_factor = 1.0;
        }
    }
}

/// Load settings from a JSON file, merging over defaults.
///
/// A missing file yields compiled defaults; any other error propagates.
pub fn load_from_path(path: &Path) -> Result<HookSettings, SettingsError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            return Ok(HookSettings::default());
        }
        Err(e) => return Err(e.into()),
    };
    let mut settings: HookSettings = serde_json::from_str(&raw)?;
    settings.validate();
    Ok(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
