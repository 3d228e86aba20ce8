//! # sisyphus-host
//!
//! External collaborators of the hook layer, specified at their interface:
//!
//! - **Client**: [`client::HostClient`] — the RPC-style surface the host
//!   exposes (todos, messages, prompt, summarize, revert, toast).
//! - **Metadata**: [`metadata::MetadataStore`] — file-backed, read-mostly
//!   per-session message metadata (nearest agent lookup, stored tool results).
//! - **Boulder**: [`boulder`] — persisted multi-task plan record shared
//!   across sessions (read + session-id append only).
//! - **Git**: [`git`] — working-tree change summaries for enriching
//!   delegated-task results.
//!
//! ## Crate Position
//!
//! Depends on: sisyphus-core. Depended on by: sisyphus-hooks.

#![deny(unsafe_code)]

pub mod boulder;
pub mod client;
pub mod git;
pub mod metadata;

pub use boulder::{
    append_session_id, get_plan_progress, read_boulder_state, BoulderState, PlanProgress,
};
pub use client::{
    toast_best_effort, ClientError, HostClient, PromptRequest, Toast, ToastVariant,
};
pub use git::{collect_git_stats, render_diff_summary, GitFileStat};
pub use metadata::{AgentBinding, MetadataStore, SessionRecord, StoredToolResult};
