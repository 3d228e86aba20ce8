//! # sisyphus-core
//!
//! Foundation types for the sisyphus hook layer.
//!
//! - **Events**: Typed host lifecycle events ([`events::HostEvent`]) with
//!   `{type, properties}` wire tagging.
//! - **Messages**: Roles, token usage, todo items as the host reports them.
//! - **Errors**: Error info carried on `session.error` plus the heuristic
//!   predicates that classify aborts and context-window overflows.
//! - **Tokens**: Static model → context-limit table with substring matching.
//! - **Text**: UTF-8–safe truncation used by the recovery truncate tier.
//!
//! ## Crate Position
//!
//! Leaf crate. Depended on by: sisyphus-settings, sisyphus-host,
//! sisyphus-hooks. Depends on nothing internal.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod messages;
pub mod text;
pub mod tokens;

pub use errors::{is_context_overflow, is_user_abort, ErrorInfo};
pub use events::{HostEvent, MessageInfo, PartInfo};
pub use messages::{incomplete_count, Role, Todo, TodoStatus, TokenUsage};
pub use tokens::{context_limit_for_model, usage_ratio, DEFAULT_CONTEXT_LIMIT};
