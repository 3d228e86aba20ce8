//! # sisyphus-hooks
//!
//! The session-state coordination layer. Per-session state machines debounce
//! and sequence reactions to a stream of asynchronous, partially-ordered
//! host lifecycle events.
//!
//! - **Bus**: [`bus::EventBus`] fans each event out to registered handlers.
//! - **Session store**: [`session::SessionStore`] — mode, monotonic version
//!   counter, pending timer handle, throttle timestamps. The version counter
//!   is the single cancellation mechanism: suspended work captures it at the
//!   start and re-checks before every externally visible effect.
//! - **Continuation**: [`continuation::TodoContinuation`] — re-prompts the
//!   agent on sustained idleness with incomplete todos.
//! - **Enforcer**: [`enforcer::OrchestratorPolicy`] — keeps the delegating
//!   persona from writing files directly and pairs every delegated result
//!   with a verification demand.
//! - **Guard**: [`guard`] — markdown-only write policy for the planner role.
//! - **Compaction**: [`compaction::AutoCompact`] — tiered context-overflow
//!   recovery (truncate → summarize → revert → give up).
//! - **Preemptive**: [`preemptive::PreemptiveCompaction`] — proactive
//!   summarization before overflow ever happens.
//!
//! ## Concurrency model
//!
//! Handlers run one event at a time; all state mutation happens under short
//! `parking_lot` critical sections. Suspended continuations (timers, awaited
//! host calls) never hold locks and are cancelled cooperatively by version
//! staleness, never preempted.

#![deny(unsafe_code)]

pub mod background;
pub mod bus;
pub mod compaction;
pub mod continuation;
pub mod enforcer;
pub mod guard;
pub mod preemptive;
pub mod session;
pub mod tool_call;

#[cfg(test)]
pub(crate) mod testutil;

pub use background::BackgroundTasks;
pub use bus::{EventBus, EventHandler};
pub use compaction::AutoCompact;
pub use continuation::TodoContinuation;
pub use enforcer::{OrchestratorPolicy, PolicyConfig};
pub use guard::{check_write_path, MarkdownWriteGuard, PolicyViolation, RESERVED_DIR};
pub use preemptive::{PreCompactHook, PreemptiveCompaction};
pub use session::{Mode, SessionStore};
pub use tool_call::{AfterToolCall, BeforeToolCall};
