//! Conversation memory
//!
//! Per-session history of user, model and tool messages, trimmed to a
//! token window at turn boundaries.

pub mod context_manager;
pub mod store;

pub use context_manager::{ContextConfig, ContextManager};
pub use store::ConversationContext;
