//! Context Window Management
//!
//! Keeps a conversation inside its token budget by dropping the oldest
//! whole turns. A turn starts at a user-typed message, so a tool call is
//! never separated from its result.

use crate::memory::store::ConversationContext;
use tracing::info;

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Token budget for the history sent to the model
    pub max_context_tokens: usize,
    /// Number of most recent turns that are never dropped
    pub preserve_recent_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: crate::config::DEFAULT_CONTEXT_MAX_TOKENS,
            preserve_recent_turns: 1,
        }
    }
}

pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn over_budget(&self, context: &ConversationContext) -> bool {
        context.total_tokens() > self.config.max_context_tokens
    }

    /// Get percentage of context window used
    pub fn get_context_usage_percent(&self, context: &ConversationContext) -> f32 {
        if self.config.max_context_tokens == 0 {
            return 100.0;
        }
        (context.total_tokens() as f32 / self.config.max_context_tokens as f32) * 100.0
    }

    /// Drop oldest turns until within budget. Returns the number of messages removed.
    pub fn trim(&self, context: &mut ConversationContext) -> usize {
        let mut removed = 0;

        while self.over_budget(context) && context.turn_count() > self.config.preserve_recent_turns
        {
            // Leading message plus everything up to the next user-typed message.
            if context.pop_front().is_none() {
                break;
            }
            removed += 1;
            while context.front().map_or(false, |m| !m.is_user_text()) {
                context.pop_front();
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                removed,
                tokens = context.total_tokens(),
                budget = self.config.max_context_tokens,
                "Trimmed conversation context"
            );
        }

        removed
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}
